//! Simulated platform: a beacon without hardware
//!
//! `SimDevice` owns one retained block and plays power cycles against it,
//! with a fresh transport, power controller and clock per boot, the way a
//! real chip comes back from power-off. Any number of devices can live in
//! one process.

use std::time::Duration;

use beacon_proto::{AdvertisementData, CounterSnapshot};

use crate::config::LifecycleConfig;
use crate::lifecycle::{CycleReport, LifecycleController, Phase};
use crate::power::{BootReason, Clock, PowerControl, WakeSource};
use crate::ready::{ReadyNotifier, StackError};
use crate::retained::{RetainedBlock, BLOCK_LEN};
use crate::transport::AdvertisingTransport;

/// What SRAM holds when the battery first goes in
pub const POWER_ON_GARBAGE: [u8; BLOCK_LEN] = [
    0xa5, 0x5a, 0x3c, 0xc3, 0x0f, 0xf0, 0x96, 0x69, 0x11, 0xee, 0x22, 0xdd, 0x33, 0xcc, 0x44, 0xbb,
    0x55, 0xaa, 0x66, 0x99, 0x77, 0x88, 0x00, 0xff,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimError(pub &'static str);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimClock {
    now: Duration,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
    }
}

/// Faults the simulated radio injects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportFaults {
    /// `init()` itself returns an error
    pub init: bool,
    /// The ready callback reports this stack error
    pub ready: Option<StackError>,
    /// The ready callback never fires
    pub silent: bool,
    pub start: bool,
    pub update: bool,
    pub stop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Init,
    Start(Vec<u8>),
    Update(Vec<u8>),
    Stop,
}

#[derive(Debug, Default)]
pub struct SimTransport {
    faults: TransportFaults,
    advertising: bool,
    // Held so a silent stack keeps the channel open until the waiter times out.
    pending: Option<ReadyNotifier>,
    events: Vec<TransportEvent>,
}

impl SimTransport {
    pub fn new(faults: TransportFaults) -> Self {
        Self {
            faults,
            ..Default::default()
        }
    }

    pub fn events(&self) -> &[TransportEvent] {
        &self.events
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }
}

impl AdvertisingTransport for SimTransport {
    type Error = SimError;

    fn init(&mut self, ready: ReadyNotifier) -> Result<(), SimError> {
        self.events.push(TransportEvent::Init);
        if self.faults.init {
            return Err(SimError("controller did not respond"));
        }
        match self.faults.ready {
            Some(code) => ready.failed(code),
            None if self.faults.silent => self.pending = Some(ready),
            None => ready.ready(),
        }
        Ok(())
    }

    fn start(&mut self, payload: &AdvertisementData) -> Result<(), SimError> {
        if self.faults.start {
            return Err(SimError("advertising set unavailable"));
        }
        self.advertising = true;
        self.events.push(TransportEvent::Start(payload.as_bytes().to_vec()));
        Ok(())
    }

    fn update(&mut self, payload: &AdvertisementData) -> Result<(), SimError> {
        if !self.advertising {
            return Err(SimError("not advertising"));
        }
        if self.faults.update {
            return Err(SimError("advertising data rejected"));
        }
        self.events.push(TransportEvent::Update(payload.as_bytes().to_vec()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SimError> {
        if self.faults.stop {
            return Err(SimError("advertising set busy"));
        }
        self.advertising = false;
        self.events.push(TransportEvent::Stop);
        Ok(())
    }
}

/// Power controller whose off primitive always returns, as a broken one
/// would. `SimDevice` never calls it; it ends the cycle itself.
#[derive(Debug)]
pub struct SimPower {
    boot_reason: BootReason,
    fail_wake: bool,
    armed: Option<WakeSource>,
    power_off_calls: u32,
}

impl SimPower {
    pub fn new(boot_reason: BootReason) -> Self {
        Self {
            boot_reason,
            fail_wake: false,
            armed: None,
            power_off_calls: 0,
        }
    }

    pub fn failing_wake(mut self) -> Self {
        self.fail_wake = true;
        self
    }

    pub fn armed(&self) -> Option<WakeSource> {
        self.armed
    }

    pub fn power_off_calls(&self) -> u32 {
        self.power_off_calls
    }
}

impl PowerControl for SimPower {
    type Error = SimError;

    fn boot_reason(&self) -> BootReason {
        self.boot_reason
    }

    fn configure_wake_source(&mut self, source: WakeSource) -> Result<(), SimError> {
        if self.fail_wake {
            return Err(SimError("wake pin is not RTC capable"));
        }
        self.armed = Some(source);
        Ok(())
    }

    fn power_off(&mut self) -> SimError {
        self.power_off_calls += 1;
        SimError("simulated power domain stays on")
    }
}

/// One simulated boot
#[derive(Debug, Clone)]
pub struct SimCycle {
    pub report: CycleReport,
    pub events: Vec<TransportEvent>,
    pub armed: Option<WakeSource>,
}

pub struct SimDevice {
    block: RetainedBlock,
    config: LifecycleConfig,
    next_boot: BootReason,
    pub faults: TransportFaults,
}

impl SimDevice {
    /// A device straight off the assembly line: retained memory is garbage
    pub fn new(config: LifecycleConfig) -> Self {
        Self::with_retained(
            RetainedBlock::from_bytes(&POWER_ON_GARBAGE),
            config,
            BootReason::PowerOn,
        )
    }

    pub fn with_retained(
        block: RetainedBlock,
        config: LifecycleConfig,
        next_boot: BootReason,
    ) -> Self {
        Self {
            block,
            config,
            next_boot,
            faults: TransportFaults::default(),
        }
    }

    pub fn block(&self) -> &RetainedBlock {
        &self.block
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        self.block.snapshot()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Flip bits of the retained image while the device is off. `index`
    /// must lie inside the `BLOCK_LEN`-byte image.
    pub fn corrupt_byte(&mut self, index: usize, mask: u8) -> Result<(), SimError> {
        let mut image = self.block.to_bytes();
        let byte = image
            .get_mut(index)
            .ok_or(SimError("byte index outside the retained block"))?;
        *byte ^= mask;
        self.block = RetainedBlock::from_bytes(&image);
        Ok(())
    }

    /// Boot, run the whole cycle and power off
    pub fn power_cycle(&mut self) -> SimCycle {
        self.run(Phase::PoweringOff)
    }

    /// Boot and lose power right after `phase` completes. The retention
    /// domain survives, so the next boot is a brownout reset.
    pub fn power_cut_after(&mut self, phase: Phase) -> SimCycle {
        self.run(phase)
    }

    fn run(&mut self, last: Phase) -> SimCycle {
        let boot_reason = self.next_boot;
        let mut ctl = LifecycleController::new(
            &mut self.block,
            SimTransport::new(self.faults),
            SimPower::new(boot_reason),
            SimClock::new(),
            self.config.clone(),
        );

        ctl.begin_cycle();
        let mut phase = Phase::ColdStart;
        while phase != last && phase != Phase::PoweringOff {
            phase = ctl.step();
        }
        let report = ctl.take_report();
        let (transport, power, _) = ctl.into_parts();

        self.next_boot = if phase == Phase::PoweringOff {
            BootReason::WakeFromOff
        } else {
            BootReason::Reset
        };

        SimCycle {
            report,
            events: transport.events,
            armed: power.armed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleError;

    fn config() -> LifecycleConfig {
        LifecycleConfig {
            active_window: Duration::from_millis(500),
            update_interval: Duration::ZERO,
            ready_timeout: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[test]
    fn garbage_is_not_a_valid_block() {
        assert!(!RetainedBlock::from_bytes(&POWER_ON_GARBAGE).validate());
    }

    #[test]
    fn wake_failure_still_reaches_power_off() {
        let mut block = RetainedBlock::new();
        let mut ctl = LifecycleController::new(
            &mut block,
            SimTransport::new(TransportFaults::default()),
            SimPower::new(BootReason::WakeFromOff).failing_wake(),
            SimClock::new(),
            config(),
        );

        let report = ctl.run_cycle();
        assert_eq!(report.phases.last(), Some(&Phase::PoweringOff));
        assert!(matches!(
            report.faults.as_slice(),
            [LifecycleError::WakeSourceFailure(_)]
        ));
        assert_eq!(ctl.power().armed(), None);

        let err = ctl.power_off();
        assert!(err.is_fatal());
        assert_eq!(ctl.power().power_off_calls(), 3);
    }

    #[test]
    fn silent_stack_is_held_until_timeout() {
        let mut block = RetainedBlock::new();
        let faults = TransportFaults {
            silent: true,
            ..Default::default()
        };
        let mut ctl = LifecycleController::new(
            &mut block,
            SimTransport::new(faults),
            SimPower::new(BootReason::WakeFromOff),
            SimClock::new(),
            config(),
        );

        let report = ctl.run_cycle();
        assert!(matches!(
            report.faults.as_slice(),
            [LifecycleError::TransportInitFailure(msg)] if msg.contains("not ready")
        ));
        assert!(!ctl.transport().is_advertising());
        assert_eq!(ctl.transport().events(), &[TransportEvent::Init]);
    }

    #[test]
    fn corruption_index_must_be_in_range() {
        let mut device = SimDevice::new(config());
        device.power_cycle();
        let before = device.block().to_bytes();

        assert_eq!(
            device.corrupt_byte(BLOCK_LEN, 0x01),
            Err(SimError("byte index outside the retained block"))
        );
        assert_eq!(device.block().to_bytes(), before);
        assert!(device.block().validate());

        assert_eq!(device.corrupt_byte(BLOCK_LEN - 1, 0x01), Ok(()));
        assert!(!device.block().validate());
    }

    #[test]
    fn cut_during_validation_keeps_new_boot() {
        let mut device = SimDevice::new(config());
        device.power_cycle();

        let cut = device.power_cut_after(Phase::Validating);
        assert_eq!(cut.report.snapshot.boots, 2);
        assert!(cut.events.is_empty());
        assert_eq!(cut.armed, None);
        assert_eq!(device.snapshot().off_count, 1);
    }
}
