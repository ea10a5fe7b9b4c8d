use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// J2534 Protocol IDs
pub const PROTOCOL_J1850VPW: u32 = 1;
pub const PROTOCOL_J1850PWM: u32 = 2;
pub const PROTOCOL_ISO9141: u32 = 3;
pub const PROTOCOL_ISO14230: u32 = 4;
pub const PROTOCOL_CAN: u32 = 5;
pub const PROTOCOL_ISO15765: u32 = 6;
pub const PROTOCOL_SCI_A_ENGINE: u32 = 7;
pub const PROTOCOL_SCI_A_TRANS: u32 = 8;
pub const PROTOCOL_SCI_B_ENGINE: u32 = 9;
pub const PROTOCOL_SCI_B_TRANS: u32 = 10;

// J2534 Filter Types
pub const FILTER_PASS: u32 = 1;
pub const FILTER_BLOCK: u32 = 2;
pub const FILTER_FLOW_CONTROL: u32 = 3;

// J2534 Connect Flags
pub const CAN_29BIT_ID: u32 = 0x0100;
pub const ISO9141_NO_CHECKSUM: u32 = 0x0200;
pub const CAN_ID_BOTH: u32 = 0x0800;
pub const ISO9141_K_LINE_ONLY: u32 = 0x1000;

// J2534 TxFlags
pub const ISO15765_FRAME_PAD: u32 = 0x0040;
pub const ISO15765_ADDR_TYPE: u32 = 0x0080;
pub const WAIT_P3_MIN_ONLY: u32 = 0x0200;
pub const SW_CAN_HV_TX: u32 = 0x0400;
pub const SCI_MODE: u32 = 0x0040_0000;
pub const SCI_TX_VOLTAGE: u32 = 0x0080_0000;

// J2534 IOCTL IDs
pub const GET_CONFIG: u32 = 0x01;
pub const SET_CONFIG: u32 = 0x02;
pub const READ_VBATT: u32 = 0x03;
pub const FIVE_BAUD_INIT: u32 = 0x04;
pub const FAST_INIT: u32 = 0x05;
pub const CLEAR_TX_BUFFER: u32 = 0x07;
pub const CLEAR_RX_BUFFER: u32 = 0x08;
pub const CLEAR_PERIODIC_MSGS: u32 = 0x09;
pub const CLEAR_MSG_FILTERS: u32 = 0x0A;
pub const CLEAR_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0B;
pub const ADD_TO_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0C;
pub const DELETE_FROM_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0D;
pub const READ_PROG_VOLTAGE: u32 = 0x0E;

// Config Parameter IDs
pub const DATA_RATE: u32 = 0x01;
pub const LOOPBACK: u32 = 0x03;
pub const NODE_ADDRESS: u32 = 0x04;
pub const NETWORK_LINE: u32 = 0x05;
pub const P1_MIN: u32 = 0x06;
pub const P1_MAX: u32 = 0x07;
pub const P2_MIN: u32 = 0x08;
pub const P2_MAX: u32 = 0x09;
pub const P3_MIN: u32 = 0x0A;
pub const P3_MAX: u32 = 0x0B;
pub const P4_MIN: u32 = 0x0C;
pub const P4_MAX: u32 = 0x0D;
pub const W0: u32 = 0x19;
pub const W1: u32 = 0x0E;
pub const W2: u32 = 0x0F;
pub const W3: u32 = 0x10;
pub const W4: u32 = 0x11;
pub const W5: u32 = 0x12;
pub const TIDLE: u32 = 0x13;
pub const TINIL: u32 = 0x14;
pub const TWUP: u32 = 0x15;
pub const PARITY: u32 = 0x16;
pub const BIT_SAMPLE_POINT: u32 = 0x17;
pub const SYNC_JUMP_WIDTH: u32 = 0x18;
pub const T1_MAX: u32 = 0x1A;
pub const T2_MAX: u32 = 0x1B;
pub const T4_MAX: u32 = 0x1C;
pub const T5_MAX: u32 = 0x1D;
pub const ISO15765_BS: u32 = 0x1E;
pub const ISO15765_STMIN: u32 = 0x1F;
pub const DATA_BITS: u32 = 0x20;
pub const FIVE_BAUD_MOD: u32 = 0x21;
pub const BS_TX: u32 = 0x22;
pub const STMIN_TX: u32 = 0x23;
pub const T3_MAX: u32 = 0x24;
pub const ISO15765_WFT_MAX: u32 = 0x25;

pub const MAX_DATA_SIZE: usize = 4128;

/// Size of the big-endian CAN ID header CAN and ISO15765 records carry in `data`
pub const CAN_ID_HEADER_LEN: usize = 4;

/// Resolve a protocol name as used in config files ("CAN", "ISO15765", ...)
pub fn protocol_from_name(name: &str) -> Option<u32> {
    let id = match name.to_ascii_uppercase().as_str() {
        "J1850VPW" => PROTOCOL_J1850VPW,
        "J1850PWM" => PROTOCOL_J1850PWM,
        "ISO9141" => PROTOCOL_ISO9141,
        "ISO14230" => PROTOCOL_ISO14230,
        "CAN" => PROTOCOL_CAN,
        "ISO15765" => PROTOCOL_ISO15765,
        "SCI_A_ENGINE" => PROTOCOL_SCI_A_ENGINE,
        "SCI_A_TRANS" => PROTOCOL_SCI_A_TRANS,
        "SCI_B_ENGINE" => PROTOCOL_SCI_B_ENGINE,
        "SCI_B_TRANS" => PROTOCOL_SCI_B_TRANS,
        _ => return None,
    };
    Some(id)
}

/// Format bytes as space separated upper-case hex
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// PASSTHRU_MSG structure matching the J2534 API spec
#[repr(C)]
#[derive(Clone, PartialEq, Eq)]
pub struct PassThruMsg {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_size: u32,
    pub extra_data_index: u32,
    pub data: [u8; MAX_DATA_SIZE],
}

impl Default for PassThruMsg {
    fn default() -> Self {
        Self {
            protocol_id: 0,
            rx_status: 0,
            tx_flags: 0,
            timestamp: 0,
            data_size: 0,
            extra_data_index: 0,
            data: [0u8; MAX_DATA_SIZE],
        }
    }
}

impl PassThruMsg {
    /// Build a transmit record carrying `data` verbatim
    pub fn new(protocol_id: u32, tx_flags: u32, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_DATA_SIZE {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max: MAX_DATA_SIZE,
            });
        }
        let mut msg = Self {
            protocol_id,
            tx_flags,
            data_size: data.len() as u32,
            ..Default::default()
        };
        msg.data[..data.len()].copy_from_slice(data);
        Ok(msg)
    }

    /// Build a record with the 4-byte big-endian CAN ID header followed by `payload`
    pub fn with_can_id(
        protocol_id: u32,
        tx_flags: u32,
        can_id: u32,
        payload: &[u8],
    ) -> Result<Self> {
        let len = CAN_ID_HEADER_LEN + payload.len();
        if len > MAX_DATA_SIZE {
            return Err(Error::PayloadTooLarge {
                len,
                max: MAX_DATA_SIZE,
            });
        }
        let mut msg = Self {
            protocol_id,
            tx_flags,
            data_size: len as u32,
            ..Default::default()
        };
        msg.data[..CAN_ID_HEADER_LEN].copy_from_slice(&can_id.to_be_bytes());
        msg.data[CAN_ID_HEADER_LEN..len].copy_from_slice(payload);
        Ok(msg)
    }

    /// Used bytes of the record. A driver reporting an oversized length is clamped.
    pub fn data(&self) -> &[u8] {
        let len = (self.data_size as usize).min(MAX_DATA_SIZE);
        &self.data[..len]
    }

    /// Bytes after the CAN ID header
    pub fn payload(&self) -> &[u8] {
        let data = self.data();
        if data.len() > CAN_ID_HEADER_LEN {
            &data[CAN_ID_HEADER_LEN..]
        } else {
            &[]
        }
    }

    pub fn can_id(&self) -> u32 {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }
}

impl fmt::Debug for PassThruMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassThruMsg")
            .field("protocol_id", &self.protocol_id)
            .field("rx_status", &self.rx_status)
            .field("tx_flags", &self.tx_flags)
            .field("timestamp", &self.timestamp)
            .field("data_size", &self.data_size)
            .field("data", &format_args!("[{}]", to_hex(self.data())))
            .finish()
    }
}

/// J2534 status codes. `NoError` is the only success value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Status {
    NoError,
    NotSupported,
    InvalidChannelId,
    InvalidProtocolId,
    NullParameter,
    InvalidIoctlValue,
    InvalidFlags,
    Failed,
    DeviceNotConnected,
    Timeout,
    InvalidMsg,
    InvalidTimeInterval,
    ExceededLimit,
    InvalidMsgId,
    DeviceInUse,
    InvalidIoctlId,
    BufferEmpty,
    BufferFull,
    BufferOverflow,
    PinInvalid,
    ChannelInUse,
    MsgProtocolId,
    InvalidFilterId,
    NoFlowControl,
    NotUnique,
    InvalidBaudrate,
    InvalidDeviceId,
    /// Vendor specific code, kept as reported
    Unknown(u32),
}

impl Status {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x00 => Self::NoError,
            0x01 => Self::NotSupported,
            0x02 => Self::InvalidChannelId,
            0x03 => Self::InvalidProtocolId,
            0x04 => Self::NullParameter,
            0x05 => Self::InvalidIoctlValue,
            0x06 => Self::InvalidFlags,
            0x07 => Self::Failed,
            0x08 => Self::DeviceNotConnected,
            0x09 => Self::Timeout,
            0x0A => Self::InvalidMsg,
            0x0B => Self::InvalidTimeInterval,
            0x0C => Self::ExceededLimit,
            0x0D => Self::InvalidMsgId,
            0x0E => Self::DeviceInUse,
            0x0F => Self::InvalidIoctlId,
            0x10 => Self::BufferEmpty,
            0x11 => Self::BufferFull,
            0x12 => Self::BufferOverflow,
            0x13 => Self::PinInvalid,
            0x14 => Self::ChannelInUse,
            0x15 => Self::MsgProtocolId,
            0x16 => Self::InvalidFilterId,
            0x17 => Self::NoFlowControl,
            0x18 => Self::NotUnique,
            0x19 => Self::InvalidBaudrate,
            0x1A => Self::InvalidDeviceId,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::NoError => 0x00,
            Self::NotSupported => 0x01,
            Self::InvalidChannelId => 0x02,
            Self::InvalidProtocolId => 0x03,
            Self::NullParameter => 0x04,
            Self::InvalidIoctlValue => 0x05,
            Self::InvalidFlags => 0x06,
            Self::Failed => 0x07,
            Self::DeviceNotConnected => 0x08,
            Self::Timeout => 0x09,
            Self::InvalidMsg => 0x0A,
            Self::InvalidTimeInterval => 0x0B,
            Self::ExceededLimit => 0x0C,
            Self::InvalidMsgId => 0x0D,
            Self::DeviceInUse => 0x0E,
            Self::InvalidIoctlId => 0x0F,
            Self::BufferEmpty => 0x10,
            Self::BufferFull => 0x11,
            Self::BufferOverflow => 0x12,
            Self::PinInvalid => 0x13,
            Self::ChannelInUse => 0x14,
            Self::MsgProtocolId => 0x15,
            Self::InvalidFilterId => 0x16,
            Self::NoFlowControl => 0x17,
            Self::NotUnique => 0x18,
            Self::InvalidBaudrate => 0x19,
            Self::InvalidDeviceId => 0x1A,
            Self::Unknown(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::NoError)
    }

    /// `Ok(())` for `NoError`, the status itself otherwise
    pub fn into_result(self) -> std::result::Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "No error"),
            Self::NotSupported => write!(f, "Not supported"),
            Self::InvalidChannelId => write!(f, "Invalid channel ID"),
            Self::InvalidProtocolId => write!(f, "Invalid protocol ID"),
            Self::NullParameter => write!(f, "Null parameter"),
            Self::InvalidIoctlValue => write!(f, "Invalid IOCTL value"),
            Self::InvalidFlags => write!(f, "Invalid flags"),
            Self::Failed => write!(f, "Failed"),
            Self::DeviceNotConnected => write!(f, "Device not connected"),
            Self::Timeout => write!(f, "Timeout"),
            Self::InvalidMsg => write!(f, "Invalid message"),
            Self::InvalidTimeInterval => write!(f, "Invalid time interval"),
            Self::ExceededLimit => write!(f, "Exceeded limit"),
            Self::InvalidMsgId => write!(f, "Invalid message ID"),
            Self::DeviceInUse => write!(f, "Device in use"),
            Self::InvalidIoctlId => write!(f, "Invalid IOCTL ID"),
            Self::BufferEmpty => write!(f, "Buffer empty"),
            Self::BufferFull => write!(f, "Buffer full"),
            Self::BufferOverflow => write!(f, "Buffer overflow"),
            Self::PinInvalid => write!(f, "Pin invalid"),
            Self::ChannelInUse => write!(f, "Channel in use"),
            Self::MsgProtocolId => write!(f, "Message protocol ID mismatch"),
            Self::InvalidFilterId => write!(f, "Invalid filter ID"),
            Self::NoFlowControl => write!(f, "No flow control"),
            Self::NotUnique => write!(f, "Not unique"),
            Self::InvalidBaudrate => write!(f, "Invalid baudrate"),
            Self::InvalidDeviceId => write!(f, "Invalid device ID"),
            Self::Unknown(code) => write!(f, "Unknown status (0x{:02X})", code),
        }
    }
}

impl std::error::Error for Status {}

/// Handle of an active periodic message. Owned by the caller, who must stop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodicMsgId(pub u32);

/// Handle of an active message filter. Owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub u32);

/// SCONFIG structure for IOCTL
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SConfig {
    pub parameter: u32,
    pub value: u32,
}

/// SCONFIG_LIST structure for IOCTL
#[repr(C)]
pub struct SConfigList {
    pub num_of_params: u32,
    pub config_ptr: *mut SConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_passthru_msg_size() {
        // 6 u32 fields (24 bytes) + 4128 byte data array = 4152
        assert_eq!(mem::size_of::<PassThruMsg>(), 4152);
    }

    #[test]
    fn test_passthru_msg_data_offset() {
        assert_eq!(mem::offset_of!(PassThruMsg, data), 24);
        assert_eq!(mem::offset_of!(PassThruMsg, data_size), 16);
    }

    #[test]
    fn test_sconfig_layout() {
        assert_eq!(mem::size_of::<SConfig>(), 8);
        assert_eq!(
            mem::offset_of!(SConfigList, config_ptr),
            mem::align_of::<*mut SConfig>()
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::NoError.to_string(), "No error");
        assert_eq!(Status::Timeout.to_string(), "Timeout");
        assert_eq!(Status::DeviceNotConnected.to_string(), "Device not connected");
        assert_eq!(Status::Unknown(0x10000).to_string(), "Unknown status (0x10000)");
    }

    #[test]
    fn test_status_from_code_keeps_vendor_codes() {
        assert_eq!(Status::from_code(0x00), Status::NoError);
        assert_eq!(Status::from_code(0x09), Status::Timeout);
        assert_eq!(Status::from_code(0x1A), Status::InvalidDeviceId);
        assert_eq!(Status::from_code(0xFF), Status::Unknown(0xFF));
        for code in 0x00..=0x1Bu32 {
            assert_eq!(Status::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_status_into_result() {
        assert_eq!(Status::NoError.into_result(), Ok(()));
        assert_eq!(Status::BufferFull.into_result(), Err(Status::BufferFull));
    }

    #[test]
    fn test_ioctl_id_values() {
        assert_eq!(GET_CONFIG, 0x01);
        assert_eq!(SET_CONFIG, 0x02);
        assert_eq!(CLEAR_TX_BUFFER, 0x07);
        assert_eq!(CLEAR_RX_BUFFER, 0x08);
        assert_eq!(CLEAR_MSG_FILTERS, 0x0A);
    }

    #[test]
    fn test_protocol_from_name() {
        assert_eq!(protocol_from_name("can"), Some(PROTOCOL_CAN));
        assert_eq!(protocol_from_name("ISO15765"), Some(PROTOCOL_ISO15765));
        assert_eq!(protocol_from_name("FlexRay"), None);
    }

    #[test]
    fn test_passthru_msg_new_copies_bytes() {
        let msg = PassThruMsg::new(PROTOCOL_CAN, CAN_29BIT_ID, &[1, 2, 3]).unwrap();
        assert_eq!(msg.protocol_id, PROTOCOL_CAN);
        assert_eq!(msg.tx_flags, CAN_29BIT_ID);
        assert_eq!(msg.data_size, 3);
        assert_eq!(msg.data(), &[1, 2, 3]);
        assert!(msg.data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_passthru_msg_new_rejects_oversized() {
        let data = vec![0u8; MAX_DATA_SIZE + 1];
        assert!(matches!(
            PassThruMsg::new(PROTOCOL_CAN, 0, &data),
            Err(Error::PayloadTooLarge { len, max }) if len == MAX_DATA_SIZE + 1 && max == MAX_DATA_SIZE
        ));
        assert!(PassThruMsg::new(PROTOCOL_CAN, 0, &data[..MAX_DATA_SIZE]).is_ok());
    }

    #[test]
    fn test_with_can_id_header() {
        let msg = PassThruMsg::with_can_id(PROTOCOL_CAN, 0, 0x18DA10F1, &[0xAA]).unwrap();
        assert_eq!(msg.data(), &[0x18, 0xDA, 0x10, 0xF1, 0xAA]);
        assert_eq!(msg.can_id(), 0x18DA10F1);
    }

    #[test]
    fn test_data_clamps_driver_length() {
        let mut msg = PassThruMsg::default();
        msg.data_size = u32::MAX;
        assert_eq!(msg.data().len(), MAX_DATA_SIZE);
    }

    #[test]
    fn test_passthru_msg_empty_payload() {
        let mut msg = PassThruMsg::default();
        msg.data_size = 4;
        assert_eq!(msg.payload(), &[] as &[u8]);
    }

    #[test]
    fn test_debug_shows_used_bytes_only() {
        let msg = PassThruMsg::new(PROTOCOL_CAN, 0, &[0xDE, 0xAD]).unwrap();
        let dbg = format!("{:?}", msg);
        assert!(dbg.contains("[DE AD]"));
    }
}
