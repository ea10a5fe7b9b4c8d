//! Application level messages and their expansion into driver records.

use crate::error::{Error, Result};
use crate::j2534::types::{PassThruMsg, CAN_ID_HEADER_LEN, MAX_DATA_SIZE};

/// Classic CAN payload limit
pub const CAN_MAX_DLC: usize = 8;

/// A logical message tagged with a CAN identifier that a channel can send.
///
/// A message may expand into any number of driver records; the channel
/// writes them in the order returned.
pub trait Message {
    fn can_id(&self) -> u32;

    /// Driver records for this message on a channel with the given protocol and tx flags
    fn to_passthru_msgs(&self, protocol_id: u32, tx_flags: u32) -> Vec<PassThruMsg>;
}

/// Record for one frame. Construction already bounded the length, so this cannot fail.
fn frame_record(protocol_id: u32, tx_flags: u32, can_id: u32, data: &[u8]) -> PassThruMsg {
    let mut msg = PassThruMsg {
        protocol_id,
        tx_flags,
        data_size: (CAN_ID_HEADER_LEN + data.len()) as u32,
        ..Default::default()
    };
    msg.data[..CAN_ID_HEADER_LEN].copy_from_slice(&can_id.to_be_bytes());
    msg.data[CAN_ID_HEADER_LEN..CAN_ID_HEADER_LEN + data.len()].copy_from_slice(data);
    msg
}

/// A single raw CAN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u32, data: &[u8]) -> Result<Self> {
        if data.len() > CAN_MAX_DLC {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max: CAN_MAX_DLC,
            });
        }
        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Message for CanFrame {
    fn can_id(&self) -> u32 {
        self.id
    }

    fn to_passthru_msgs(&self, protocol_id: u32, tx_flags: u32) -> Vec<PassThruMsg> {
        vec![frame_record(protocol_id, tx_flags, self.id, &self.data)]
    }
}

/// An ISO15765 (ISO-TP) request. The driver performs segmentation, so the
/// whole payload travels in one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoTpMessage {
    id: u32,
    payload: Vec<u8>,
}

impl IsoTpMessage {
    pub fn new(id: u32, payload: &[u8]) -> Result<Self> {
        let max = MAX_DATA_SIZE - CAN_ID_HEADER_LEN;
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }
        Ok(Self {
            id,
            payload: payload.to_vec(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl Message for IsoTpMessage {
    fn can_id(&self) -> u32 {
        self.id
    }

    fn to_passthru_msgs(&self, protocol_id: u32, tx_flags: u32) -> Vec<PassThruMsg> {
        vec![frame_record(protocol_id, tx_flags, self.id, &self.payload)]
    }
}

/// Several CAN frames on one identifier sent back to back, one record each
/// (e.g. a tester-present plus keep-alive sequence scheduled together).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBurst {
    id: u32,
    frames: Vec<Vec<u8>>,
}

impl FrameBurst {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, data: &[u8]) -> Result<&mut Self> {
        if data.len() > CAN_MAX_DLC {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max: CAN_MAX_DLC,
            });
        }
        self.frames.push(data.to_vec());
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Message for FrameBurst {
    fn can_id(&self) -> u32 {
        self.id
    }

    fn to_passthru_msgs(&self, protocol_id: u32, tx_flags: u32) -> Vec<PassThruMsg> {
        self.frames
            .iter()
            .map(|frame| frame_record(protocol_id, tx_flags, self.id, frame))
            .collect()
    }
}
