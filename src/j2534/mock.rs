use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::c_void;

use crate::j2534::types::*;
use crate::j2534::PassThru;

/// One driver entry point invocation as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect {
        protocol_id: u32,
        flags: u32,
        baudrate: u32,
    },
    Disconnect(u32),
    ReadMsgs {
        channel_id: u32,
        requested: usize,
        timeout_ms: u32,
    },
    WriteMsgs {
        channel_id: u32,
        msgs: Vec<PassThruMsg>,
        timeout_ms: u32,
    },
    StartPeriodicMsg {
        channel_id: u32,
        msg: PassThruMsg,
        interval_ms: u32,
    },
    StopPeriodicMsg {
        channel_id: u32,
        msg_id: u32,
    },
    StartMsgFilter {
        channel_id: u32,
        filter_type: u32,
        mask: Option<PassThruMsg>,
        pattern: Option<PassThruMsg>,
        flow_control: Option<PassThruMsg>,
    },
    StopMsgFilter {
        channel_id: u32,
        filter_id: u32,
    },
    Ioctl {
        handle_id: u32,
        ioctl_id: u32,
        input_null: bool,
        output_null: bool,
        /// Parameters referenced by an SCONFIG_LIST input, copied at call time
        config: Option<Vec<SConfig>>,
    },
    GetLastError,
}

/// Scripted PassThru driver for testing channels without hardware.
/// Records every call and answers with configurable statuses.
pub struct MockDriver {
    calls: RefCell<Vec<Call>>,
    connect_status: Cell<Status>,
    next_channel_id: Cell<u32>,
    last_error: RefCell<String>,
    /// Outcomes for successive read_msgs calls; BufferEmpty once exhausted
    reads: RefCell<VecDeque<(Status, Option<Vec<PassThruMsg>>)>>,
    write_status: Cell<Status>,
    /// Outcomes for successive start_periodic_msg calls; NoError once exhausted
    periodic_statuses: RefCell<VecDeque<Status>>,
    next_msg_id: Cell<u32>,
    failing_stops: RefCell<HashSet<u32>>,
    filter_status: Cell<Status>,
    next_filter_id: Cell<u32>,
    disconnect_status: Cell<Status>,
    ioctl_status: Cell<Status>,
    /// Reported by READ_VBATT, in millivolts
    vbatt_mv: Cell<u32>,
    /// Driver-side config values, updated by SET_CONFIG and served by GET_CONFIG
    config_values: RefCell<HashMap<u32, u32>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            connect_status: Cell::new(Status::NoError),
            next_channel_id: Cell::new(1),
            last_error: RefCell::new(String::new()),
            reads: RefCell::new(VecDeque::new()),
            write_status: Cell::new(Status::NoError),
            periodic_statuses: RefCell::new(VecDeque::new()),
            next_msg_id: Cell::new(100),
            failing_stops: RefCell::new(HashSet::new()),
            filter_status: Cell::new(Status::NoError),
            next_filter_id: Cell::new(0),
            disconnect_status: Cell::new(Status::NoError),
            ioctl_status: Cell::new(Status::NoError),
            vbatt_mv: Cell::new(12_000),
            config_values: RefCell::new(HashMap::new()),
        }
    }

    /// Make the next connect fail with `status` and report `text` as last error
    pub fn fail_connect(&self, status: Status, text: &str) {
        self.connect_status.set(status);
        *self.last_error.borrow_mut() = text.to_string();
    }

    pub fn set_next_channel_id(&self, id: u32) {
        self.next_channel_id.set(id);
    }

    pub fn push_read(&self, status: Status, msgs: Vec<PassThruMsg>) {
        self.reads.borrow_mut().push_back((status, Some(msgs)));
    }

    /// Next read fails and leaves the caller's buffer at its requested length
    pub fn push_untouched_read(&self, status: Status) {
        self.reads.borrow_mut().push_back((status, None));
    }

    pub fn set_write_status(&self, status: Status) {
        self.write_status.set(status);
    }

    pub fn push_periodic_status(&self, status: Status) {
        self.periodic_statuses.borrow_mut().push_back(status);
    }

    pub fn set_next_msg_id(&self, id: u32) {
        self.next_msg_id.set(id);
    }

    pub fn fail_stop(&self, msg_id: u32) {
        self.failing_stops.borrow_mut().insert(msg_id);
    }

    pub fn set_filter_status(&self, status: Status) {
        self.filter_status.set(status);
    }

    pub fn set_disconnect_status(&self, status: Status) {
        self.disconnect_status.set(status);
    }

    pub fn set_ioctl_status(&self, status: Status) {
        self.ioctl_status.set(status);
    }

    pub fn set_battery_mv(&self, millivolts: u32) {
        self.vbatt_mv.set(millivolts);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn disconnects(&self) -> Vec<u32> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Disconnect(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Records of every write call, in call order
    pub fn written(&self) -> Vec<Vec<PassThruMsg>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::WriteMsgs { msgs, .. } => Some(msgs.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl PassThru for MockDriver {
    fn connect(&self, protocol_id: u32, flags: u32, baudrate: u32, channel_id: &mut u32) -> Status {
        self.record(Call::Connect {
            protocol_id,
            flags,
            baudrate,
        });
        let status = self.connect_status.get();
        if status.is_ok() {
            *channel_id = self.next_channel_id.get();
            self.next_channel_id.set(*channel_id + 1);
        }
        status
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        self.record(Call::Disconnect(channel_id));
        self.disconnect_status.get()
    }

    fn read_msgs(&self, channel_id: u32, msgs: &mut Vec<PassThruMsg>, timeout_ms: u32) -> Status {
        self.record(Call::ReadMsgs {
            channel_id,
            requested: msgs.len(),
            timeout_ms,
        });
        let (status, queued) = self
            .reads
            .borrow_mut()
            .pop_front()
            .unwrap_or((Status::BufferEmpty, Some(Vec::new())));
        if let Some(mut queued) = queued {
            queued.truncate(msgs.len());
            *msgs = queued;
        }
        status
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        num_msgs: &mut u32,
        timeout_ms: u32,
    ) -> Status {
        self.record(Call::WriteMsgs {
            channel_id,
            msgs: msgs.to_vec(),
            timeout_ms,
        });
        let status = self.write_status.get();
        *num_msgs = if status.is_ok() { msgs.len() as u32 } else { 0 };
        status
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        self.record(Call::StartPeriodicMsg {
            channel_id,
            msg: msg.clone(),
            interval_ms,
        });
        let status = self
            .periodic_statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Status::NoError);
        let id = self.next_msg_id.get();
        self.next_msg_id.set(id + 1);
        if status.is_ok() {
            *msg_id = id;
        }
        status
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        self.record(Call::StopPeriodicMsg { channel_id, msg_id });
        if self.failing_stops.borrow().contains(&msg_id) {
            Status::InvalidMsgId
        } else {
            Status::NoError
        }
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
        self.record(Call::StartMsgFilter {
            channel_id,
            filter_type,
            mask: mask.cloned(),
            pattern: pattern.cloned(),
            flow_control: flow_control.cloned(),
        });
        let status = self.filter_status.get();
        if status.is_ok() {
            *filter_id = self.next_filter_id.get();
            self.next_filter_id.set(*filter_id + 1);
        }
        status
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        self.record(Call::StopMsgFilter {
            channel_id,
            filter_id,
        });
        if filter_id < self.next_filter_id.get() {
            Status::NoError
        } else {
            Status::InvalidFilterId
        }
    }

    unsafe fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: u32,
        input: *const c_void,
        output: *mut c_void,
    ) -> Status {
        let config = if ioctl_id == SET_CONFIG && !input.is_null() {
            let list = &*(input as *const SConfigList);
            let params = std::slice::from_raw_parts(list.config_ptr, list.num_of_params as usize);
            let mut values = self.config_values.borrow_mut();
            for param in params {
                values.insert(param.parameter, param.value);
            }
            Some(params.to_vec())
        } else if ioctl_id == GET_CONFIG && !input.is_null() {
            let list = &*(input as *const SConfigList);
            let params =
                std::slice::from_raw_parts_mut(list.config_ptr, list.num_of_params as usize);
            let seen = params.to_vec();
            let values = self.config_values.borrow();
            for param in params.iter_mut() {
                if let Some(value) = values.get(&param.parameter) {
                    param.value = *value;
                }
            }
            Some(seen)
        } else {
            if ioctl_id == READ_VBATT && !output.is_null() {
                *(output as *mut u32) = self.vbatt_mv.get();
            }
            None
        };
        self.record(Call::Ioctl {
            handle_id,
            ioctl_id,
            input_null: input.is_null(),
            output_null: output.is_null(),
            config,
        });
        self.ioctl_status.get()
    }

    fn get_last_error(&self) -> String {
        self.record(Call::GetLastError);
        self.last_error.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_connect_assigns_increasing_ids() {
        let mock = MockDriver::new();
        let (mut a, mut b) = (0, 0);
        assert!(mock.connect(PROTOCOL_CAN, 0, 500_000, &mut a).is_ok());
        assert!(mock.connect(PROTOCOL_CAN, 0, 500_000, &mut b).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_mock_failed_connect_leaves_id() {
        let mock = MockDriver::new();
        mock.fail_connect(Status::InvalidBaudrate, "bad rate");
        let mut id = 77;
        assert_eq!(mock.connect(PROTOCOL_CAN, 0, 1, &mut id), Status::InvalidBaudrate);
        assert_eq!(id, 77);
        assert_eq!(mock.get_last_error(), "bad rate");
    }

    #[test]
    fn test_mock_read_truncates_to_request() {
        let mock = MockDriver::new();
        mock.push_read(Status::NoError, vec![PassThruMsg::default(); 5]);
        let mut buf = vec![PassThruMsg::default(); 2];
        assert!(mock.read_msgs(1, &mut buf, 10).is_ok());
        assert_eq!(buf.len(), 2);
        assert_eq!(mock.read_msgs(1, &mut buf, 10), Status::BufferEmpty);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_mock_config_roundtrip() {
        let mock = MockDriver::new();
        let mut params = [SConfig {
            parameter: DATA_RATE,
            value: 250_000,
        }];
        let set = SConfigList {
            num_of_params: 1,
            config_ptr: params.as_mut_ptr(),
        };
        unsafe {
            let input = &set as *const SConfigList as *const c_void;
            assert!(mock.ioctl(1, SET_CONFIG, input, std::ptr::null_mut()).is_ok());
        }
        params[0].value = 0;
        let get = SConfigList {
            num_of_params: 1,
            config_ptr: params.as_mut_ptr(),
        };
        unsafe {
            let input = &get as *const SConfigList as *const c_void;
            assert!(mock.ioctl(1, GET_CONFIG, input, std::ptr::null_mut()).is_ok());
        }
        assert_eq!(params[0].value, 250_000);
    }
}
