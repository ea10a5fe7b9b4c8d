//! Channel-level wrapper around the SAE J2534 PassThru API.
//!
//! [`Channel`] owns one driver channel for its lifetime and forwards reads,
//! writes, periodic messages, filters and ioctls to a [`PassThru`] driver
//! handle, normally a [`Device`] opened on a vendor DLL loaded with
//! [`J2534Lib`].

pub mod config;
pub mod error;
pub mod j2534;

pub use error::{Error, Result};
pub use j2534::channel::Channel;
pub use j2534::device::Device;
pub use j2534::dll::J2534Lib;
pub use j2534::message::Message;
pub use j2534::types::{FilterId, PassThruMsg, PeriodicMsgId, SConfig, Status};
pub use j2534::PassThru;
