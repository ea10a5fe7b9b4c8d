use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::j2534::dll::{c_string, J2534Lib, J2534_STRING_LEN};
use crate::j2534::types::*;
use crate::j2534::PassThru;

/// Represents an opened J2534 device (PassThruOpen handle)
pub struct Device {
    lib: Arc<J2534Lib>,
    device_id: u32,
}

impl Device {
    /// Open the first device served by the loaded DLL
    pub fn open(lib: Arc<J2534Lib>) -> Result<Self> {
        let mut device_id: u32 = 0;
        let ret = unsafe { (lib.pass_thru_open)(ptr::null(), &mut device_id) };
        if ret != 0 {
            return Err(Error::Open {
                status: Status::from_code(ret),
                message: lib.last_error(),
            });
        }
        log::info!("PassThruOpen: device {} via {}", device_id, lib.path());
        Ok(Self { lib, device_id })
    }

    /// Read device version strings
    pub fn read_version(&self) -> Result<DeviceVersion> {
        let mut firmware = [0u8; J2534_STRING_LEN];
        let mut dll = [0u8; J2534_STRING_LEN];
        let mut api = [0u8; J2534_STRING_LEN];
        let ret = unsafe {
            (self.lib.pass_thru_read_version)(
                self.device_id,
                firmware.as_mut_ptr() as *mut c_char,
                dll.as_mut_ptr() as *mut c_char,
                api.as_mut_ptr() as *mut c_char,
            )
        };
        Status::from_code(ret).into_result()?;
        Ok(DeviceVersion {
            firmware: c_string(&firmware),
            dll: c_string(&dll),
            api: c_string(&api),
        })
    }

    /// Read battery voltage from the device
    pub fn read_battery_voltage(&self) -> Result<f32> {
        battery_voltage(self, self.device_id)
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let ret = unsafe { (self.lib.pass_thru_close)(self.device_id) };
        if ret != 0 {
            log::warn!(
                "PassThruClose({}) failed: {}",
                self.device_id,
                Status::from_code(ret)
            );
        }
    }
}

impl PassThru for Device {
    fn connect(&self, protocol_id: u32, flags: u32, baudrate: u32, channel_id: &mut u32) -> Status {
        let ret = unsafe {
            (self.lib.pass_thru_connect)(self.device_id, protocol_id, flags, baudrate, channel_id)
        };
        Status::from_code(ret)
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        Status::from_code(unsafe { (self.lib.pass_thru_disconnect)(channel_id) })
    }

    fn read_msgs(&self, channel_id: u32, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status {
        let mut num_msgs = msgs.len() as u32;
        let ret = unsafe {
            (self.lib.pass_thru_read_msgs)(channel_id, msgs.as_mut_ptr(), &mut num_msgs, timeout_ms)
        };
        let status = Status::from_code(ret);
        keep_delivered(msgs, num_msgs, status);
        status
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        num_msgs: &mut u32,
        timeout_ms: u32,
    ) -> Status {
        *num_msgs = msgs.len() as u32;
        let ret = unsafe {
            (self.lib.pass_thru_write_msgs)(channel_id, msgs.as_ptr(), num_msgs, timeout_ms)
        };
        Status::from_code(ret)
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        let ret = unsafe {
            (self.lib.pass_thru_start_periodic_msg)(channel_id, msg, msg_id, interval_ms)
        };
        Status::from_code(ret)
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        Status::from_code(unsafe { (self.lib.pass_thru_stop_periodic_msg)(channel_id, msg_id) })
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
        let as_ptr = |msg: Option<&PassThruMsg>| msg.map_or(ptr::null(), |m| m as *const _);
        let ret = unsafe {
            (self.lib.pass_thru_start_msg_filter)(
                channel_id,
                filter_type,
                as_ptr(mask),
                as_ptr(pattern),
                as_ptr(flow_control),
                filter_id,
            )
        };
        Status::from_code(ret)
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        Status::from_code(unsafe { (self.lib.pass_thru_stop_msg_filter)(channel_id, filter_id) })
    }

    unsafe fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status {
        Status::from_code((self.lib.pass_thru_ioctl)(handle_id, ioctl_id, input, output))
    }

    fn get_last_error(&self) -> String {
        self.lib.last_error()
    }
}

/// READ_VBATT on `device_id`, in volts
fn battery_voltage<D: PassThru>(driver: &D, device_id: u32) -> Result<f32> {
    let mut voltage: u32 = 0;
    let status = unsafe {
        driver.ioctl(
            device_id,
            READ_VBATT,
            ptr::null(),
            &mut voltage as *mut u32 as *mut c_void,
        )
    };
    status.into_result()?;
    // Voltage is returned in millivolts
    Ok(voltage as f32 / 1000.0)
}

/// Drop the records the driver did not fill. Timeout and BufferEmpty may still
/// come back with a partial batch; on any other failure the count is not trusted.
fn keep_delivered(msgs: &mut Vec<PassThruMsg>, num_msgs: u32, status: Status) {
    match status {
        Status::NoError | Status::Timeout | Status::BufferEmpty => {
            msgs.truncate(num_msgs as usize)
        }
        _ => msgs.clear(),
    }
}

/// Version info from a J2534 device
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceVersion {
    pub firmware: String,
    pub dll: String,
    pub api: String,
}
