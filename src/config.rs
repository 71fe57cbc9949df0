//! Runtime configuration for the SMAPI transport.

use crate::constants::{DEFAULT_COMMAND_PORT, DEFAULT_LOCK_PATH};
use crate::error::{Result, SmapiError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where to find the firmware interface and how to serialize access to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmapiConfig {
    /// SMAPI command port. 0xB2 unless the machine's CMOS says otherwise.
    pub command_port: u16,
    /// Advisory lock held while the transport is open; `None` disables it
    pub lock_path: Option<PathBuf>,
}

impl Default for SmapiConfig {
    fn default() -> Self {
        SmapiConfig {
            command_port: DEFAULT_COMMAND_PORT,
            lock_path: Some(PathBuf::from(DEFAULT_LOCK_PATH)),
        }
    }
}

impl SmapiConfig {
    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }

    pub fn with_lock_path(mut self, path: Option<PathBuf>) -> Self {
        self.lock_path = path;
        self
    }
}

/// Parse a port number written in decimal or with a `0x` prefix.
pub fn parse_port(s: &str) -> Result<u16> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|_| SmapiError::InvalidPort(s.to_string()))
}
