use crate::constants::*;
use crate::transport::Registers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Battery bay addressed by a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Battery {
    /// First bay (`BAT0`), firmware battery number 1
    Primary,
    /// Second bay (`BAT1`), firmware battery number 2
    Secondary,
}

impl Battery {
    /// All bays, in firmware order
    pub const ALL: [Battery; 2] = [Battery::Primary, Battery::Secondary];

    /// Look up a bay by its zero-based index (0 for `BAT0`, 1 for `BAT1`).
    pub fn from_index(index: u8) -> Result<Self, crate::SmapiError> {
        match index {
            0 => Ok(Battery::Primary),
            1 => Ok(Battery::Secondary),
            _ => Err(crate::SmapiError::InvalidBattery(index)),
        }
    }

    /// Zero-based index
    pub fn index(self) -> u8 {
        match self {
            Battery::Primary => 0,
            Battery::Secondary => 1,
        }
    }

    /// Battery number as firmware expects it in CH
    pub fn number(self) -> u8 {
        self.index() + 1
    }
}

impl fmt::Display for Battery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BAT{}", self.index())
    }
}

/// Which charge threshold a call reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdKind {
    /// Percentage below which charging begins
    Start,
    /// Percentage at which charging stops
    Stop,
}

impl ThresholdKind {
    /// Sub-function selector for reading this threshold
    pub fn get_selector(self) -> u16 {
        match self {
            ThresholdKind::Start => GET_START_THRESHOLD,
            ThresholdKind::Stop => GET_STOP_THRESHOLD,
        }
    }

    /// Sub-function selector for writing this threshold
    pub fn set_selector(self) -> u16 {
        match self {
            ThresholdKind::Start => SET_START_THRESHOLD,
            ThresholdKind::Stop => SET_STOP_THRESHOLD,
        }
    }

    /// Percentage a raw threshold byte stands for.
    ///
    /// Firmware stores 0 as "default": 98% for start, 100% for stop. Every
    /// other value is taken literally. This is for display only; the protocol
    /// always passes the raw byte through.
    pub fn effective_percent(self, raw: u8) -> u8 {
        match (self, raw) {
            (ThresholdKind::Start, THRESHOLD_DEFAULT) => START_DEFAULT_PERCENT,
            (ThresholdKind::Stop, THRESHOLD_DEFAULT) => STOP_DEFAULT_PERCENT,
            (_, raw) => raw,
        }
    }
}

impl FromStr for ThresholdKind {
    type Err = crate::SmapiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(ThresholdKind::Start),
            "stop" => Ok(ThresholdKind::Stop),
            _ => Err(crate::SmapiError::InvalidKind(s.to_string())),
        }
    }
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdKind::Start => f.write_str("start"),
            ThresholdKind::Stop => f.write_str("stop"),
        }
    }
}

/// Opaque words (ESI, EDI) handed out by a get and echoed back on the next set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub si: u32,
    pub di: u32,
}

/// One SMAPI request before it is bound to registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub function: u32,
    pub sub_function: u16,
    pub battery: Battery,
    pub payload: u8,
    pub tokens: TokenPair,
}

impl Request {
    /// Read request: zero payload, zero tokens.
    pub fn get(battery: Battery, kind: ThresholdKind) -> Self {
        Request {
            function: SMAPI_FUNCTION,
            sub_function: kind.get_selector(),
            battery,
            payload: 0,
            tokens: TokenPair::default(),
        }
    }

    /// Write request carrying `value` and the tokens from the preceding get.
    pub fn set(battery: Battery, kind: ThresholdKind, value: u8, tokens: TokenPair) -> Self {
        Request {
            function: SMAPI_FUNCTION,
            sub_function: kind.set_selector(),
            battery,
            payload: value,
            tokens,
        }
    }

    /// CX: battery number in CH, payload in CL
    pub fn control_word(&self) -> u16 {
        (self.battery.number() as u16) << 8 | self.payload as u16
    }

    /// Bind this request to the SMAPI register convention.
    pub fn to_registers(&self) -> Registers {
        Registers {
            eax: self.function,
            ebx: self.sub_function as u32,
            ecx: self.control_word() as u32,
            esi: self.tokens.si,
            edi: self.tokens.di,
        }
    }
}

/// Firmware answer decoded from the registers it left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub result: u16,
    pub tokens: TokenPair,
}

impl Response {
    /// Status from AH, result word from CX, tokens from ESI/EDI.
    pub fn from_registers(regs: &Registers) -> Self {
        Response {
            status: ((regs.eax >> 8) & 0xFF) as u8,
            result: (regs.ecx & 0xFFFF) as u16,
            tokens: TokenPair {
                si: regs.esi,
                di: regs.edi,
            },
        }
    }

    /// Whether firmware flagged the result word as holding data
    pub fn is_valid(&self) -> bool {
        self.result & RESULT_VALID == RESULT_VALID
    }

    /// Threshold byte (CL)
    pub fn value(&self) -> u8 {
        (self.result & 0xFF) as u8
    }
}

/// Both thresholds of one battery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub timestamp: DateTime<Utc>,
    pub battery: Battery,
    pub start: u8,
    pub stop: u8,
    pub start_percent: u8,
    pub stop_percent: u8,
}

impl ThresholdReport {
    pub fn new(battery: Battery, start: u8, stop: u8) -> Self {
        ThresholdReport {
            timestamp: Utc::now(),
            battery,
            start,
            stop,
            start_percent: ThresholdKind::Start.effective_percent(start),
            stop_percent: ThresholdKind::Stop.effective_percent(stop),
        }
    }
}

impl fmt::Display for ThresholdReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start = {}, stop = {}", self.start, self.stop)
    }
}
