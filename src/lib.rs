//! # SMAPI Charge Library
//!
//! A Rust library for reading and setting ThinkPad battery charge thresholds
//! through the SMAPI BIOS interface, reached with privileged port I/O.
//!
//! ## Features
//!
//! - Read the start and stop charge thresholds of either battery
//! - Set thresholds, relaying the firmware's session tokens and honouring the
//!   settle delay it needs after every write
//! - Classified errors so callers can tell "try again" from a real refusal
//! - Pluggable transport, so the protocol runs against a fake in tests
//!
//! ## Example
//!
//! ```no_run
//! use smapi_charge::{Battery, PortIo, Smapi, SmapiConfig, ThresholdKind};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let smapi = Smapi::new(PortIo::open(&SmapiConfig::default())?);
//!     smapi.set_threshold(Battery::Primary, ThresholdKind::Stop, 80)?;
//!     let report = smapi.read_thresholds(Battery::Primary)?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod types;

pub use config::SmapiConfig;
pub use error::{ErrorKind, Result, SmapiError};
pub use protocol::Smapi;
pub use retry::RetryPolicy;
pub use transport::{PortIo, Registers, Transport};
pub use types::*;
