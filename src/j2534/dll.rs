use std::ffi::{c_char, c_void};
use std::path::PathBuf;

use libloading::Library;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::j2534::types::*;

/// Type aliases for J2534 DLL function pointers
type PassThruOpenFn = unsafe extern "system" fn(*const c_void, *mut u32) -> u32;
type PassThruCloseFn = unsafe extern "system" fn(u32) -> u32;
type PassThruConnectFn = unsafe extern "system" fn(u32, u32, u32, u32, *mut u32) -> u32;
type PassThruDisconnectFn = unsafe extern "system" fn(u32) -> u32;
type PassThruReadMsgsFn = unsafe extern "system" fn(u32, *mut PassThruMsg, *mut u32, u32) -> u32;
type PassThruWriteMsgsFn = unsafe extern "system" fn(u32, *const PassThruMsg, *mut u32, u32) -> u32;
type PassThruStartPeriodicMsgFn =
    unsafe extern "system" fn(u32, *const PassThruMsg, *mut u32, u32) -> u32;
type PassThruStopPeriodicMsgFn = unsafe extern "system" fn(u32, u32) -> u32;
type PassThruStartMsgFilterFn = unsafe extern "system" fn(
    u32,
    u32,
    *const PassThruMsg,
    *const PassThruMsg,
    *const PassThruMsg,
    *mut u32,
) -> u32;
type PassThruStopMsgFilterFn = unsafe extern "system" fn(u32, u32) -> u32;
type PassThruIoctlFn = unsafe extern "system" fn(u32, u32, *const c_void, *mut c_void) -> u32;
type PassThruReadVersionFn =
    unsafe extern "system" fn(u32, *mut c_char, *mut c_char, *mut c_char) -> u32;
type PassThruGetLastErrorFn = unsafe extern "system" fn(*mut c_char) -> u32;

/// J2534 text outputs are at most 80 bytes including the terminator
pub const J2534_STRING_LEN: usize = 80;

/// Holds a dynamically loaded J2534 DLL and its function pointers
pub struct J2534Lib {
    _lib: Library,
    path: String,
    pub pass_thru_open: PassThruOpenFn,
    pub pass_thru_close: PassThruCloseFn,
    pub pass_thru_connect: PassThruConnectFn,
    pub pass_thru_disconnect: PassThruDisconnectFn,
    pub pass_thru_read_msgs: PassThruReadMsgsFn,
    pub pass_thru_write_msgs: PassThruWriteMsgsFn,
    pub pass_thru_start_periodic_msg: PassThruStartPeriodicMsgFn,
    pub pass_thru_stop_periodic_msg: PassThruStopPeriodicMsgFn,
    pub pass_thru_start_msg_filter: PassThruStartMsgFilterFn,
    pub pass_thru_stop_msg_filter: PassThruStopMsgFilterFn,
    pub pass_thru_ioctl: PassThruIoctlFn,
    pub pass_thru_read_version: PassThruReadVersionFn,
    pub pass_thru_get_last_error: PassThruGetLastErrorFn,
}

/// Resolve one exported entry point. The pointer stays valid while `lib` is loaded.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T> {
    let sym = lib
        .get::<T>(name.as_bytes())
        .map_err(|source| Error::MissingSymbol { name, source })?;
    Ok(*sym)
}

impl J2534Lib {
    /// Load J2534 DLL from the given path
    pub fn load(dll_path: &str) -> Result<Self> {
        unsafe {
            let lib = Library::new(dll_path).map_err(|source| Error::Load {
                path: dll_path.to_string(),
                source,
            })?;

            let pass_thru_open = symbol::<PassThruOpenFn>(&lib, "PassThruOpen")?;
            let pass_thru_close = symbol::<PassThruCloseFn>(&lib, "PassThruClose")?;
            let pass_thru_connect = symbol::<PassThruConnectFn>(&lib, "PassThruConnect")?;
            let pass_thru_disconnect = symbol::<PassThruDisconnectFn>(&lib, "PassThruDisconnect")?;
            let pass_thru_read_msgs = symbol::<PassThruReadMsgsFn>(&lib, "PassThruReadMsgs")?;
            let pass_thru_write_msgs = symbol::<PassThruWriteMsgsFn>(&lib, "PassThruWriteMsgs")?;
            let pass_thru_start_periodic_msg =
                symbol::<PassThruStartPeriodicMsgFn>(&lib, "PassThruStartPeriodicMsg")?;
            let pass_thru_stop_periodic_msg =
                symbol::<PassThruStopPeriodicMsgFn>(&lib, "PassThruStopPeriodicMsg")?;
            let pass_thru_start_msg_filter =
                symbol::<PassThruStartMsgFilterFn>(&lib, "PassThruStartMsgFilter")?;
            let pass_thru_stop_msg_filter =
                symbol::<PassThruStopMsgFilterFn>(&lib, "PassThruStopMsgFilter")?;
            let pass_thru_ioctl = symbol::<PassThruIoctlFn>(&lib, "PassThruIoctl")?;
            let pass_thru_read_version =
                symbol::<PassThruReadVersionFn>(&lib, "PassThruReadVersion")?;
            let pass_thru_get_last_error =
                symbol::<PassThruGetLastErrorFn>(&lib, "PassThruGetLastError")?;

            log::info!("Loaded J2534 DLL {}", dll_path);

            Ok(Self {
                _lib: lib,
                path: dll_path.to_string(),
                pass_thru_open,
                pass_thru_close,
                pass_thru_connect,
                pass_thru_disconnect,
                pass_thru_read_msgs,
                pass_thru_write_msgs,
                pass_thru_start_periodic_msg,
                pass_thru_stop_periodic_msg,
                pass_thru_start_msg_filter,
                pass_thru_stop_msg_filter,
                pass_thru_ioctl,
                pass_thru_read_version,
                pass_thru_get_last_error,
            })
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Text of the driver's most recent error, empty if the driver can't provide one
    pub fn last_error(&self) -> String {
        let mut buf = [0u8; J2534_STRING_LEN];
        let ret = unsafe { (self.pass_thru_get_last_error)(buf.as_mut_ptr() as *mut c_char) };
        if ret != 0 {
            log::debug!(
                "PassThruGetLastError failed: {}",
                Status::from_code(ret)
            );
            return String::new();
        }
        c_string(&buf)
    }
}

/// Decode a NUL terminated driver string buffer
pub fn c_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).to_string()
}

/// A PassThru driver registered on this machine
#[derive(Debug, Clone, Serialize)]
pub struct DriverEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Discover J2534 DLL paths from Windows registry.
/// Searches both native and WOW6432Node paths to catch all devices.
#[cfg(target_os = "windows")]
pub fn discover_j2534_dlls() -> Vec<DriverEntry> {
    use winreg::enums::*;
    use winreg::RegKey;

    let mut results = Vec::new();
    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);

    let registry_paths = [
        (r"SOFTWARE\PassThruSupport.04.04", KEY_READ | KEY_WOW64_64KEY),
        (r"SOFTWARE\PassThruSupport.04.04", KEY_READ | KEY_WOW64_32KEY),
    ];

    let mut seen_dlls = std::collections::HashSet::new();

    for (path, flags) in &registry_paths {
        let Ok(key) = hklm.open_subkey_with_flags(path, *flags) else {
            continue;
        };
        for name in key.enum_keys().filter_map(|k| k.ok()) {
            let Ok(subkey) = key.open_subkey_with_flags(&name, KEY_READ) else {
                continue;
            };
            let Ok(dll_path) = subkey.get_value::<String, _>("FunctionLibrary") else {
                continue;
            };
            // Deduplicate by DLL path (case-insensitive)
            if !seen_dlls.insert(dll_path.to_lowercase()) {
                continue;
            }
            let device_name = subkey
                .get_value::<String, _>("Name")
                .unwrap_or_else(|_| name.clone());
            log::debug!("Found J2534 driver {} at {}", device_name, dll_path);
            results.push(DriverEntry {
                name: device_name,
                path: PathBuf::from(dll_path),
            });
        }
    }

    results
}

#[cfg(not(target_os = "windows"))]
pub fn discover_j2534_dlls() -> Vec<DriverEntry> {
    // PassThruSupport registration only exists on Windows
    Vec::new()
}
