use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::j2534::types::{protocol_from_name, PassThruMsg, SConfig, PROTOCOL_CAN};

/// Protocol given either by J2534 number or by name ("CAN", "ISO15765", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolSetting {
    Id(u32),
    Name(String),
}

impl ProtocolSetting {
    pub fn resolve(&self) -> Result<u32> {
        match self {
            Self::Id(id) => Ok(*id),
            Self::Name(name) => protocol_from_name(name)
                .ok_or_else(|| Error::Config(format!("unknown protocol '{}'", name))),
        }
    }
}

/// Pass filter given as hex strings, e.g. `"00 00 07 FF"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassFilter {
    pub mask: String,
    pub pattern: String,
}

impl PassFilter {
    /// Mask and pattern records for a channel running `protocol_id`
    pub fn records(&self, protocol_id: u32) -> Result<(PassThruMsg, PassThruMsg)> {
        let mask = parse_hex(&self.mask)?;
        let pattern = parse_hex(&self.pattern)?;
        if mask.len() != pattern.len() {
            return Err(Error::Config(format!(
                "filter mask and pattern differ in length ({} vs {})",
                mask.len(),
                pattern.len()
            )));
        }
        Ok((
            PassThruMsg::new(protocol_id, 0, &mask)?,
            PassThruMsg::new(protocol_id, 0, &pattern)?,
        ))
    }
}

/// Channel settings for the monitor, read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Driver library; the first registered driver is used when absent
    pub dll_path: Option<PathBuf>,
    pub protocol: ProtocolSetting,
    pub flags: u32,
    pub baudrate: u32,
    pub tx_flags: u32,
    /// Applied with SET_CONFIG after connecting
    pub params: Vec<SConfig>,
    pub filters: Vec<PassFilter>,
    pub read_timeout_ms: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dll_path: None,
            protocol: ProtocolSetting::Id(PROTOCOL_CAN),
            flags: 0,
            baudrate: 500_000,
            tx_flags: 0,
            params: Vec::new(),
            filters: Vec::new(),
            read_timeout_ms: 1000,
        }
    }
}

impl ChannelConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded channel config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.protocol.resolve()?;
        Ok(config)
    }
}

/// Parse hex bytes, ignoring whitespace: `"07 E8"` and `"07e8"` both give `[0x07, 0xE8]`
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(Error::Config(format!("invalid hex '{}'", text)));
    }
    if digits.len() % 2 != 0 {
        return Err(Error::Config(format!("odd number of hex digits in '{}'", text)));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| Error::Config(format!("invalid hex '{}'", text)))
        })
        .collect()
}
