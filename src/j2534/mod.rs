pub mod channel;
pub mod device;
pub mod dll;
pub mod message;
#[cfg(test)]
pub mod mock;
pub mod types;

use std::ffi::c_void;
use std::sync::Arc;

use types::{PassThruMsg, Status};

/// Channel-level PassThru entry points of a driver. Every call reports the
/// driver's status verbatim; no retry or translation happens at this layer.
/// Implemented by the real [`device::Device`] and by the test mock.
pub trait PassThru {
    fn connect(&self, protocol_id: u32, flags: u32, baudrate: u32, channel_id: &mut u32) -> Status;

    fn disconnect(&self, channel_id: u32) -> Status;

    /// Requests up to `msgs.len()` records; `msgs` is truncated to the number read.
    fn read_msgs(&self, channel_id: u32, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status;

    /// Sends all of `msgs`; `num_msgs` receives the count the driver reports as sent.
    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        num_msgs: &mut u32,
        timeout_ms: u32,
    ) -> Status;

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status;

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status;

    /// `None` is passed to the driver as NULL.
    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: Option<&PassThruMsg>,
        pattern: Option<&PassThruMsg>,
        flow_control: Option<&PassThruMsg>,
        filter_id: &mut u32,
    ) -> Status;

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status;

    /// # Safety
    ///
    /// `input` and `output` must each be null or point to the structure the
    /// driver expects for `ioctl_id`, valid for the duration of the call.
    unsafe fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status;

    fn get_last_error(&self) -> String;
}

impl<T: PassThru + ?Sized> PassThru for &T {
    fn connect(&self, protocol_id: u32, flags: u32, baudrate: u32, channel_id: &mut u32) -> Status {
        (**self).connect(protocol_id, flags, baudrate, channel_id)
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        (**self).disconnect(channel_id)
    }

    fn read_msgs(&self, channel_id: u32, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status {
        (**self).read_msgs(channel_id, msgs, timeout_ms)
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        num_msgs: &mut u32,
        timeout_ms: u32,
    ) -> Status {
        (**self).write_msgs(channel_id, msgs, num_msgs, timeout_ms)
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        (**self).start_periodic_msg(channel_id, msg, msg_id, interval_ms)
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        (**self).stop_periodic_msg(channel_id, msg_id)
    }

    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: Option<&PassThruMsg>,
        pattern: Option<&PassThruMsg>,
        flow_control: Option<&PassThruMsg>,
        filter_id: &mut u32,
    ) -> Status {
        (**self).start_msg_filter(channel_id, filter_type, mask, pattern, flow_control, filter_id)
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        (**self).stop_msg_filter(channel_id, filter_id)
    }

    unsafe fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status {
        (**self).ioctl(handle_id, ioctl_id, input, output)
    }

    fn get_last_error(&self) -> String {
        (**self).get_last_error()
    }
}

impl<T: PassThru + ?Sized> PassThru for Arc<T> {
    fn connect(&self, protocol_id: u32, flags: u32, baudrate: u32, channel_id: &mut u32) -> Status {
        (**self).connect(protocol_id, flags, baudrate, channel_id)
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        (**self).disconnect(channel_id)
    }

    fn read_msgs(&self, channel_id: u32, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status {
        (**self).read_msgs(channel_id, msgs, timeout_ms)
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        num_msgs: &mut u32,
        timeout_ms: u32,
    ) -> Status {
        (**self).write_msgs(channel_id, msgs, num_msgs, timeout_ms)
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        (**self).start_periodic_msg(channel_id, msg, msg_id, interval_ms)
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        (**self).stop_periodic_msg(channel_id, msg_id)
    }

    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: Option<&PassThruMsg>,
        pattern: Option<&PassThruMsg>,
        flow_control: Option<&PassThruMsg>,
        filter_id: &mut u32,
    ) -> Status {
        (**self).start_msg_filter(channel_id, filter_type, mask, pattern, flow_control, filter_id)
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        (**self).stop_msg_filter(channel_id, filter_id)
    }

    unsafe fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status {
        (**self).ioctl(handle_id, ioctl_id, input, output)
    }

    fn get_last_error(&self) -> String {
        (**self).get_last_error()
    }
}
