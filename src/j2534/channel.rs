use std::ffi::c_void;
use std::ptr;

use crate::error::{Error, Result};
use crate::j2534::message::Message;
use crate::j2534::types::*;
use crate::j2534::PassThru;

/// Timeout used by callers that have no better value, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Records requested per driver read in [`Channel::read_msgs_with`]
pub const READ_BATCH: usize = 10;

/// An open PassThru channel.
///
/// The channel id is obtained in [`Channel::connect`] and released exactly
/// once when the value is dropped. Every other operation forwards to the
/// driver with that id and hands back the driver's [`Status`] unchanged.
///
/// A channel is meant to be used from one thread at a time; open several
/// channels if several buses are needed.
pub struct Channel<D: PassThru> {
    driver: D,
    channel_id: u32,
    protocol_id: u32,
    tx_flags: u32,
    baudrate: u32,
}

impl<D: PassThru> Channel<D> {
    /// Open a channel. On failure the driver's last-error text is returned and
    /// nothing needs closing.
    pub fn connect(
        driver: D,
        protocol_id: u32,
        flags: u32,
        baudrate: u32,
        tx_flags: u32,
    ) -> Result<Self> {
        let mut channel_id: u32 = 0;
        let status = driver.connect(protocol_id, flags, baudrate, &mut channel_id);
        if !status.is_ok() {
            let message = driver.get_last_error();
            log::error!("PassThruConnect failed: {} ({})", status, message);
            return Err(Error::Connect { status, message });
        }
        log::info!(
            "PassThruConnect: channel {} (protocol {}, baudrate {})",
            channel_id,
            protocol_id,
            baudrate
        );
        Ok(Self {
            driver,
            channel_id,
            protocol_id,
            tx_flags,
            baudrate,
        })
    }

    /// Read pending messages. `msgs.len()` is the number requested; the vector
    /// is truncated to what the driver delivered.
    pub fn read_msgs(&self, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status {
        self.driver.read_msgs(self.channel_id, msgs, timeout_ms)
    }

    /// Keep reading and hand each record's data to `on_msg` until it returns
    /// `false`. Empty reads and timeouts keep polling; any other driver
    /// failure ends the loop and is returned.
    pub fn read_msgs_with<F>(&self, timeout_ms: u32, mut on_msg: F) -> Status
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut msgs = Vec::with_capacity(READ_BATCH);
        loop {
            msgs.clear();
            msgs.resize(READ_BATCH, PassThruMsg::default());
            let status = self.read_msgs(&mut msgs, timeout_ms);
            match status {
                Status::NoError | Status::Timeout | Status::BufferEmpty => {}
                other => {
                    log::debug!("read loop on channel {} ended: {}", self.channel_id, other);
                    return other;
                }
            }
            for msg in &msgs {
                if !on_msg(msg.data()) {
                    return Status::NoError;
                }
            }
        }
    }

    /// Write prepared driver records as-is
    pub fn write_raw_msgs(
        &self,
        msgs: &[PassThruMsg],
        num_sent: &mut u32,
        timeout_ms: u32,
    ) -> Status {
        self.driver.write_msgs(self.channel_id, msgs, num_sent, timeout_ms)
    }

    /// Expand each message with this channel's protocol and tx flags and write
    /// all records in one call, keeping message order.
    pub fn write_msgs(&self, msgs: &[&dyn Message], num_sent: &mut u32, timeout_ms: u32) -> Status {
        let records = self.expand(msgs.iter().copied());
        self.write_raw_msgs(&records, num_sent, timeout_ms)
    }

    pub fn write_message(&self, msg: &dyn Message, num_sent: &mut u32, timeout_ms: u32) -> Status {
        let records = self.expand(std::iter::once(msg));
        self.write_raw_msgs(&records, num_sent, timeout_ms)
    }

    /// Send `data` as the body of a single record
    pub fn write_msg(&self, data: &[u8], timeout_ms: u32) -> Status {
        let msg = match PassThruMsg::new(self.protocol_id, self.tx_flags, data) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("write_msg on channel {}: {}", self.channel_id, e);
                return Status::InvalidMsg;
            }
        };
        let mut num_msgs: u32 = 1;
        self.write_raw_msgs(std::slice::from_ref(&msg), &mut num_msgs, timeout_ms)
    }

    pub fn start_periodic_msg(
        &self,
        msg: &PassThruMsg,
        interval_ms: u32,
    ) -> std::result::Result<PeriodicMsgId, Status> {
        let mut msg_id: u32 = 0;
        self.driver
            .start_periodic_msg(self.channel_id, msg, &mut msg_id, interval_ms)
            .into_result()?;
        Ok(PeriodicMsgId(msg_id))
    }

    /// Start one periodic transmission per record of `msg`. Returns the ids
    /// of the ones the driver accepted, in record order; rejected records are
    /// skipped.
    pub fn start_periodic_msgs(&self, msg: &dyn Message, interval_ms: u32) -> Vec<PeriodicMsgId> {
        msg.to_passthru_msgs(self.protocol_id, self.tx_flags)
            .iter()
            .filter_map(|record| match self.start_periodic_msg(record, interval_ms) {
                Ok(id) => Some(id),
                Err(status) => {
                    log::debug!(
                        "PassThruStartPeriodicMsg on channel {} skipped: {}",
                        self.channel_id,
                        status
                    );
                    None
                }
            })
            .collect()
    }

    pub fn stop_periodic_msg(&self, msg_id: PeriodicMsgId) -> Status {
        self.driver.stop_periodic_msg(self.channel_id, msg_id.0)
    }

    /// Stop every id in `ids`, ignoring individual failures
    pub fn stop_periodic_msgs(&self, ids: &[PeriodicMsgId]) {
        for &id in ids {
            let status = self.stop_periodic_msg(id);
            if !status.is_ok() {
                log::debug!("PassThruStopPeriodicMsg({}) ignored: {}", id.0, status);
            }
        }
    }

    /// Install a filter. Absent records reach the driver as NULL.
    pub fn start_msg_filter(
        &self,
        filter_type: u32,
        mask: Option<&PassThruMsg>,
        pattern: Option<&PassThruMsg>,
        flow_control: Option<&PassThruMsg>,
    ) -> std::result::Result<FilterId, Status> {
        let mut filter_id: u32 = 0;
        self.driver
            .start_msg_filter(
                self.channel_id,
                filter_type,
                mask,
                pattern,
                flow_control,
                &mut filter_id,
            )
            .into_result()?;
        Ok(FilterId(filter_id))
    }

    pub fn stop_msg_filter(&self, filter_id: FilterId) -> Status {
        self.driver.stop_msg_filter(self.channel_id, filter_id.0)
    }

    /// Remove every filter in `ids`, ignoring individual failures
    pub fn stop_msg_filters(&self, ids: &[FilterId]) {
        for &id in ids {
            let status = self.stop_msg_filter(id);
            if !status.is_ok() {
                log::debug!("PassThruStopMsgFilter({}) ignored: {}", id.0, status);
            }
        }
    }

    /// Raw ioctl on this channel.
    ///
    /// # Safety
    ///
    /// `input` and `output` must each be null or point to the structure the
    /// driver expects for `ioctl_id`, valid for the duration of the call.
    pub unsafe fn pass_thru_ioctl(
        &self,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status {
        self.driver.ioctl(self.channel_id, ioctl_id, input, output)
    }

    pub fn clear_rx(&self) -> Status {
        unsafe { self.pass_thru_ioctl(CLEAR_RX_BUFFER, ptr::null(), ptr::null_mut()) }
    }

    pub fn clear_tx(&self) -> Status {
        unsafe { self.pass_thru_ioctl(CLEAR_TX_BUFFER, ptr::null(), ptr::null_mut()) }
    }

    pub fn clear_periodic_msgs(&self) -> Status {
        unsafe { self.pass_thru_ioctl(CLEAR_PERIODIC_MSGS, ptr::null(), ptr::null_mut()) }
    }

    pub fn clear_msg_filters(&self) -> Status {
        unsafe { self.pass_thru_ioctl(CLEAR_MSG_FILTERS, ptr::null(), ptr::null_mut()) }
    }

    /// SET_CONFIG with the caller's parameters, passed by pointer and not copied
    pub fn set_config(&self, config: &[SConfig]) -> Status {
        let config_list = SConfigList {
            num_of_params: config.len() as u32,
            // The driver only reads SET_CONFIG parameters
            config_ptr: config.as_ptr() as *mut SConfig,
        };
        unsafe {
            self.pass_thru_ioctl(
                SET_CONFIG,
                &config_list as *const SConfigList as *const c_void,
                ptr::null_mut(),
            )
        }
    }

    /// GET_CONFIG: the driver fills in `value` for each requested `parameter`
    pub fn get_config(&self, config: &mut [SConfig]) -> Status {
        let config_list = SConfigList {
            num_of_params: config.len() as u32,
            config_ptr: config.as_mut_ptr(),
        };
        unsafe {
            self.pass_thru_ioctl(
                GET_CONFIG,
                &config_list as *const SConfigList as *const c_void,
                ptr::null_mut(),
            )
        }
    }

    pub fn protocol_id(&self) -> u32 {
        self.protocol_id
    }

    pub fn tx_flags(&self) -> u32 {
        self.tx_flags
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    fn expand<'m>(&self, msgs: impl IntoIterator<Item = &'m dyn Message>) -> Vec<PassThruMsg> {
        msgs.into_iter()
            .flat_map(|m| m.to_passthru_msgs(self.protocol_id, self.tx_flags))
            .collect()
    }
}

impl<D: PassThru> Drop for Channel<D> {
    fn drop(&mut self) {
        let status = self.driver.disconnect(self.channel_id);
        if !status.is_ok() {
            log::warn!("PassThruDisconnect({}) failed: {}", self.channel_id, status);
        }
    }
}
