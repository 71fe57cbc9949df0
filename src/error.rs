//! Error types for SMAPI threshold operations.

use thiserror::Error;

/// Result type alias for SMAPI operations.
pub type Result<T> = std::result::Result<T, SmapiError>;

/// Error types for SMAPI firmware communication.
#[derive(Error, Debug)]
pub enum SmapiError {
    /// Firmware answered status 0xA6 and asked to be called again
    #[error("Firmware busy, try again")]
    Retryable,

    /// Firmware rejected the call with a nonzero status
    #[error("Firmware rejected call: status {status:#04x}")]
    FirmwareStatus {
        /// Status byte reported in AH
        status: u8,
    },

    /// Firmware accepted a get but did not flag the result as valid
    #[error("Invalid response: result word {result:#06x} lacks the valid flag")]
    InvalidResponse {
        /// Raw result word
        result: u16,
    },

    /// The privileged I/O ports could not be made accessible
    #[error("Transport unavailable: {what}")]
    TransportUnavailable {
        /// What was being attempted
        what: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Battery index outside the two supported bays
    #[error("Invalid battery index: {0} (expected 0 or 1)")]
    InvalidBattery(u8),

    /// Unknown threshold kind string
    #[error("Invalid threshold kind: {0} (expected start or stop)")]
    InvalidKind(String),

    /// Port number that could not be parsed
    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// Coarse classification of a [`SmapiError`], used by callers to pick a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient, safe to retry after a backoff
    Retryable,
    /// Malformed call or unsupported battery/threshold combination
    Protocol,
    /// Ports could not be accessed; raised before any protocol call
    TransportUnavailable,
    /// Caller supplied an unusable argument
    InvalidArgument,
}

impl SmapiError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SmapiError::Retryable => ErrorKind::Retryable,
            SmapiError::FirmwareStatus { .. } | SmapiError::InvalidResponse { .. } => {
                ErrorKind::Protocol
            }
            SmapiError::TransportUnavailable { .. } => ErrorKind::TransportUnavailable,
            SmapiError::InvalidBattery(_)
            | SmapiError::InvalidKind(_)
            | SmapiError::InvalidPort(_) => ErrorKind::InvalidArgument,
        }
    }

    /// True when the firmware asked to be called again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    /// Map a raw firmware status byte to a result.
    pub(crate) fn check_status(status: u8) -> Result<()> {
        match status {
            0 => Ok(()),
            crate::constants::STATUS_RETRY => Err(SmapiError::Retryable),
            status => Err(SmapiError::FirmwareStatus { status }),
        }
    }

    pub(crate) fn unavailable(what: impl Into<String>, source: std::io::Error) -> Self {
        SmapiError::TransportUnavailable {
            what: what.into(),
            source,
        }
    }
}
