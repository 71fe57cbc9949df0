use crate::constants::SETTLE_DELAY_MS;
use crate::error::{Result, SmapiError};
use crate::transport::Transport;
use crate::types::*;
use log::debug;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Step of a threshold operation, used for logging
#[derive(Debug, Clone, Copy)]
enum Phase {
    Querying,
    Validating,
    Mutating,
    Settling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Querying => "querying",
            Phase::Validating => "validating",
            Phase::Mutating => "mutating",
            Phase::Settling => "settling",
        };
        f.write_str(name)
    }
}

/// Main SMAPI threshold interface
///
/// Every operation holds an internal lock for its full duration, including
/// both calls of a set and the settle delay after it, so a `Smapi` over a
/// `Send` transport can be shared between threads. [`crate::PortIo`] is not
/// `Send`; a `Smapi` built on it stays on the thread that opened the ports.
/// No operation retries on its own; a [`SmapiError::Retryable`] is handed
/// back to the caller.
pub struct Smapi<T: Transport> {
    transport: Mutex<T>,
}

impl<T: Transport> Smapi<T> {
    /// Create a new SMAPI interface over an already usable transport
    pub fn new(transport: T) -> Self {
        Smapi {
            transport: Mutex::new(transport),
        }
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        // A panic mid-call leaves no state behind worth protecting.
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one request and decode whatever comes back
    fn exchange(transport: &mut T, request: &Request) -> Response {
        let regs = transport.call(request.to_registers());
        Response::from_registers(&regs)
    }

    /// Issue a get and check it. The response keeps the tokens a set needs.
    fn query(transport: &mut T, battery: Battery, kind: ThresholdKind) -> Result<Response> {
        debug!("{} {}: {}", battery, kind, Phase::Querying);
        let response = Self::exchange(transport, &Request::get(battery, kind));

        debug!("{} {}: {} status {:#04x}", battery, kind, Phase::Validating, response.status);
        SmapiError::check_status(response.status)?;
        if !response.is_valid() {
            return Err(SmapiError::InvalidResponse {
                result: response.result,
            });
        }
        Ok(response)
    }

    /// Read one charge threshold.
    ///
    /// The raw byte is returned as-is: a start threshold of 0 means 98% and a
    /// stop threshold of 0 means 100% (see [`ThresholdKind::effective_percent`]).
    pub fn get_threshold(&self, battery: Battery, kind: ThresholdKind) -> Result<u8> {
        let mut transport = self.lock();
        let response = Self::query(&mut transport, battery, kind)?;
        Ok(response.value())
    }

    /// Write one charge threshold.
    ///
    /// Firmware only accepts a set carrying the tokens from a fresh get, so
    /// this reads the threshold first and relays its tokens. If that read
    /// fails the error is returned straight away. Once the set itself has been
    /// issued, the call sleeps for the settle delay before returning, whatever
    /// the firmware answered; a call arriving sooner can make firmware drop
    /// the new value.
    ///
    /// `value` is passed through unchecked. 0 selects the firmware default;
    /// firmware rejects a stop threshold of 100.
    pub fn set_threshold(&self, battery: Battery, kind: ThresholdKind, value: u8) -> Result<()> {
        let mut transport = self.lock();
        let current = Self::query(&mut transport, battery, kind)?;

        debug!(
            "{} {}: {} {} -> {}",
            battery,
            kind,
            Phase::Mutating,
            current.value(),
            value
        );
        let request = Request::set(battery, kind, value, current.tokens);
        let response = Self::exchange(&mut transport, &request);

        debug!("{} {}: {}", battery, kind, Phase::Settling);
        thread::sleep(Duration::from_millis(SETTLE_DELAY_MS));

        SmapiError::check_status(response.status)
    }

    /// Read the start and stop thresholds of one battery
    pub fn read_thresholds(&self, battery: Battery) -> Result<ThresholdReport> {
        let start = self.get_threshold(battery, ThresholdKind::Start)?;
        let stop = self.get_threshold(battery, ThresholdKind::Stop)?;
        Ok(ThresholdReport::new(battery, start, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::Registers;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Replays canned answers and records every call
    #[derive(Default)]
    struct Scripted {
        replies: VecDeque<Registers>,
        calls: Vec<Registers>,
    }

    impl Scripted {
        fn reply(mut self, status: u8, result: u16, si: u32, di: u32) -> Self {
            self.replies.push_back(Registers {
                eax: (status as u32) << 8 | 0x80,
                ebx: 0,
                ecx: result as u32,
                esi: si,
                edi: di,
            });
            self
        }
    }

    impl Transport for Scripted {
        fn call(&mut self, regs: Registers) -> Registers {
            self.calls.push(regs);
            self.replies.pop_front().expect("unexpected SMAPI call")
        }
    }

    const SETTLE: Duration = Duration::from_millis(SETTLE_DELAY_MS);

    #[test]
    fn get_returns_low_byte_of_result() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0105, 0, 0));
        let value = smapi.get_threshold(Battery::Primary, ThresholdKind::Start).unwrap();
        assert_eq!(value, 5);

        let calls = smapi.into_inner().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].eax, 0x5380);
        assert_eq!(calls[0].ebx, 0x2116);
        assert_eq!(calls[0].ecx, 0x0100);
        assert_eq!((calls[0].esi, calls[0].edi), (0, 0));
    }

    #[test]
    fn get_busy_is_retryable() {
        let smapi = Smapi::new(Scripted::default().reply(0xA6, 0x0150, 0, 0));
        let err = smapi.get_threshold(Battery::Primary, ThresholdKind::Stop).unwrap_err();
        assert!(matches!(err, SmapiError::Retryable));
        assert_eq!(smapi.into_inner().calls.len(), 1);
    }

    #[test]
    fn get_other_status_is_protocol_error() {
        let smapi = Smapi::new(Scripted::default().reply(0x53, 0x0150, 0, 0));
        let err = smapi.get_threshold(Battery::Secondary, ThresholdKind::Stop).unwrap_err();
        assert!(matches!(err, SmapiError::FirmwareStatus { status: 0x53 }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn get_without_valid_flag_is_rejected() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0050, 0, 0));
        let err = smapi.get_threshold(Battery::Primary, ThresholdKind::Stop).unwrap_err();
        assert!(matches!(err, SmapiError::InvalidResponse { result: 0x0050 }));
    }

    #[test]
    fn set_relays_tokens_and_settles() {
        let smapi = Smapi::new(
            Scripted::default()
                .reply(0, 0x0150, 0xAAAA_0001, 0xBBBB_0002)
                .reply(0, 0, 0, 0),
        );

        let started = Instant::now();
        smapi.set_threshold(Battery::Secondary, ThresholdKind::Stop, 0).unwrap();
        assert!(started.elapsed() >= SETTLE);

        let calls = smapi.into_inner().calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].ebx, 0x211A);
        assert_eq!(calls[0].ecx, 0x0200);
        assert_eq!(calls[1].ebx, 0x211B);
        assert_eq!(calls[1].ecx, 0x0200);
        assert_eq!(calls[1].esi, 0xAAAA_0001);
        assert_eq!(calls[1].edi, 0xBBBB_0002);
    }

    #[test]
    fn set_start_carries_value_in_cl() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0100, 3, 4).reply(0, 0, 0, 0));
        smapi.set_threshold(Battery::Primary, ThresholdKind::Start, 40).unwrap();

        let calls = smapi.into_inner().calls;
        assert_eq!(calls[0].ebx, 0x2116);
        assert_eq!(calls[1].ebx, 0x2117);
        assert_eq!(calls[1].ecx, 0x0128);
    }

    #[test]
    fn failed_query_skips_mutate_and_delay() {
        let smapi = Smapi::new(Scripted::default().reply(0xA6, 0, 0, 0));

        let started = Instant::now();
        let err = smapi
            .set_threshold(Battery::Primary, ThresholdKind::Start, 40)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(started.elapsed() < SETTLE);
        assert_eq!(smapi.into_inner().calls.len(), 1);
    }

    #[test]
    fn invalid_query_aborts_set() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0028, 0, 0));
        let err = smapi
            .set_threshold(Battery::Primary, ThresholdKind::Start, 40)
            .unwrap_err();
        assert!(matches!(err, SmapiError::InvalidResponse { .. }));
        assert_eq!(smapi.into_inner().calls.len(), 1);
    }

    #[test]
    fn rejected_mutate_still_settles() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0150, 1, 2).reply(0x86, 0, 0, 0));

        let started = Instant::now();
        let err = smapi
            .set_threshold(Battery::Primary, ThresholdKind::Stop, 100)
            .unwrap_err();
        assert!(started.elapsed() >= SETTLE);
        assert!(matches!(err, SmapiError::FirmwareStatus { status: 0x86 }));

        // 100 goes out untouched
        let calls = smapi.into_inner().calls;
        assert_eq!(calls[1].ecx, 0x0164);
    }

    #[test]
    fn busy_mutate_is_retryable() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0150, 1, 2).reply(0xA6, 0, 0, 0));
        let started = Instant::now();
        let err = smapi
            .set_threshold(Battery::Primary, ThresholdKind::Stop, 80)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(started.elapsed() >= SETTLE);
    }

    #[test]
    fn set_response_needs_no_valid_flag() {
        // Result word of the set reply has bit 8 clear
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0150, 1, 2).reply(0, 0x0000, 0, 0));
        assert!(smapi
            .set_threshold(Battery::Primary, ThresholdKind::Stop, 80)
            .is_ok());
    }

    #[test]
    fn read_thresholds_reads_start_then_stop() {
        let smapi = Smapi::new(Scripted::default().reply(0, 0x0100, 0, 0).reply(0, 0x0150, 0, 0));
        let report = smapi.read_thresholds(Battery::Primary).unwrap();
        assert_eq!((report.start, report.stop), (0, 0x50));
        assert_eq!(report.start_percent, 98);
        assert_eq!(report.stop_percent, 80);

        let calls = smapi.into_inner().calls;
        assert_eq!(calls[0].ebx, 0x2116);
        assert_eq!(calls[1].ebx, 0x211A);
    }
}
