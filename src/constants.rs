//! Protocol constants for SMAPI charge-threshold calls.
//!
//! This module defines the constants used by the SMAPI BIOS call convention,
//! including the entry code, sub-function selectors, status codes, port
//! numbers and timing parameters.

/// SMAPI entry code loaded into EAX; AL is what gets written to the ports
pub const SMAPI_FUNCTION: u32 = 0x5380;

/// Get the start (begin charging) threshold
pub const GET_START_THRESHOLD: u16 = 0x2116;

/// Set the start (begin charging) threshold
pub const SET_START_THRESHOLD: u16 = 0x2117;

/// Get the stop (stop charging) threshold
pub const GET_STOP_THRESHOLD: u16 = 0x211A;

/// Set the stop (stop charging) threshold
pub const SET_STOP_THRESHOLD: u16 = 0x211B;

/// Firmware status meaning "try again"
pub const STATUS_RETRY: u8 = 0xA6;

/// Bit in the result word set by firmware when a get returned usable data
pub const RESULT_VALID: u16 = 0x0100;

/// Default SMAPI command port (X200s and most ThinkPads of that era)
pub const DEFAULT_COMMAND_PORT: u16 = 0xB2;

/// Fixed secondary port written after the command port
pub const SECONDARY_PORT: u16 = 0x4F;

/// Quiet period after a set before firmware accepts another call
pub const SETTLE_DELAY_MS: u64 = 50;

/// Advisory lock serializing SMAPI access between processes
pub const DEFAULT_LOCK_PATH: &str = "/run/lock/smapi-charge.lock";

/// Threshold byte meaning "firmware default" (98% for start, 100% for stop)
pub const THRESHOLD_DEFAULT: u8 = 0;

/// Effective start threshold when firmware reports 0
pub const START_DEFAULT_PERCENT: u8 = 98;

/// Effective stop threshold when firmware reports 0
pub const STOP_DEFAULT_PERCENT: u8 = 100;
