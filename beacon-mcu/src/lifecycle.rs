//! Lifecycle controller - one power cycle, from entry to the power-off call
//!
//! ```text
//! ColdStart -> Validating -> Advertising -> ActiveWindow -> Persisting -> PoweringOff
//!                                 \________(radio down)________/
//! ```
//!
//! The controller is the only writer of the retained block. Every mutation
//! is followed by `commit()` inside the same phase, so power can be lost
//! between any two phases and the next boot still finds a valid tag.
//!
//! Radio trouble never stops the cycle: counters are persisted and the
//! device powers off regardless. Only the power-off primitive returning is
//! fatal, and that restarts the cycle.

use std::time::Duration;

use beacon_proto::{AdvertisementData, CounterSnapshot, EncodeError, ServiceData};
use log::*;

use crate::config::LifecycleConfig;
use crate::counters::CounterOverflow;
use crate::power::{BootReason, Clock, PowerControl};
use crate::ready::ready_channel;
use crate::retained::{RetainedBlock, RetentionError};
use crate::transport::AdvertisingTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ColdStart,
    Validating,
    Advertising,
    ActiveWindow,
    Persisting,
    PoweringOff,
}

/// Why the retained counters went back to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    PowerOn,
    CorruptRetainedState,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("retained state corrupt, reset to defaults: {0}")]
    CorruptRetainedState(RetentionError),
    #[error(transparent)]
    CounterOverflow(#[from] CounterOverflow),
    #[error("Bluetooth init failed: {0}")]
    TransportInitFailure(String),
    #[error("advertising failed to start: {0}")]
    AdvertisingStartFailed(String),
    #[error("failed to update advertising data: {0}")]
    AdvertisementUpdateFailed(String),
    #[error("failed to stop advertising: {0}")]
    AdvertisingStopFailed(String),
    #[error("cannot build advertising payload: {0}")]
    PayloadEncoding(#[from] EncodeError),
    #[error("failed to configure wake source: {0}")]
    WakeSourceFailure(String),
    #[error("power-off primitive returned {attempts} time(s), last error: {last}")]
    PowerOffPrimitiveFailure { attempts: u32, last: String },
}

impl LifecycleError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LifecycleError::PowerOffPrimitiveFailure { .. })
    }
}

/// What happened during one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub boot_reason: BootReason,
    pub phases: Vec<Phase>,
    pub reset: Option<ResetCause>,
    /// Counters as of the last commit
    pub snapshot: CounterSnapshot,
    /// Advertising was started this cycle
    pub advertised: bool,
    pub pushes: u32,
    pub last_payload: Option<AdvertisementData>,
    pub active_time: Duration,
    /// Non-fatal conditions, in the order they happened
    pub faults: Vec<LifecycleError>,
}

impl CycleReport {
    fn new(boot_reason: BootReason) -> Self {
        Self {
            boot_reason,
            phases: Vec::new(),
            reset: None,
            snapshot: CounterSnapshot::default(),
            advertised: false,
            pushes: 0,
            last_payload: None,
            active_time: Duration::ZERO,
            faults: Vec::new(),
        }
    }

    /// The cycle made it through `Persisting`
    pub fn persisted(&self) -> bool {
        self.phases.contains(&Phase::Persisting)
    }
}

pub struct LifecycleController<'r, T, P, C> {
    block: &'r mut RetainedBlock,
    transport: T,
    power: P,
    clock: C,
    config: LifecycleConfig,
    phase: Phase,
    /// Init and readiness succeeded this cycle
    radio_up: bool,
    advertising: bool,
    restarted: bool,
    cycle_start: Duration,
    report: CycleReport,
}

impl<'r, T, P, C> LifecycleController<'r, T, P, C>
where
    T: AdvertisingTransport,
    P: PowerControl,
    C: Clock,
{
    pub fn new(
        block: &'r mut RetainedBlock,
        transport: T,
        power: P,
        clock: C,
        config: LifecycleConfig,
    ) -> Self {
        let report = CycleReport::new(power.boot_reason());
        Self {
            block,
            transport,
            power,
            clock,
            config,
            phase: Phase::ColdStart,
            radio_up: false,
            advertising: false,
            restarted: false,
            cycle_start: Duration::ZERO,
            report,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        self.block.snapshot()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn into_parts(self) -> (T, P, C) {
        (self.transport, self.power, self.clock)
    }

    /// Run one full cycle up to, but not including, the power-off call
    pub fn run_cycle(&mut self) -> CycleReport {
        self.begin_cycle();
        while self.step() != Phase::PoweringOff {}
        self.take_report()
    }

    /// Run cycles forever. Returns only through the power-off primitive
    /// halting the chip; a failing primitive restarts the cycle.
    pub fn run(mut self) -> ! {
        loop {
            let report = self.run_cycle();
            debug!("cycle report: {:?}", report);
            let err = self.power_off();
            error!("{}; restarting cycle", err);
        }
    }

    /// Enter `ColdStart` and start a fresh report
    pub fn begin_cycle(&mut self) {
        // Once the power-off primitive has failed, the boot reason the
        // environment reported no longer describes this pass.
        let boot_reason = if self.restarted {
            BootReason::Reset
        } else {
            self.power.boot_reason()
        };

        self.report = CycleReport::new(boot_reason);
        self.cycle_start = self.clock.now();
        self.radio_up = false;
        self.advertising = false;
        self.phase = Phase::ColdStart;
        self.report.phases.push(Phase::ColdStart);
        info!("Cycle start, boot reason {:?}", boot_reason);
    }

    /// Perform the transition out of the current phase; returns the new
    /// phase. `PoweringOff` is terminal and stepping it does nothing.
    pub fn step(&mut self) -> Phase {
        match self.phase {
            Phase::ColdStart => self.validate(),
            Phase::Validating => self.advertise(),
            Phase::Advertising if self.radio_up => self.active_window(),
            Phase::Advertising | Phase::ActiveWindow => self.persist(),
            Phase::Persisting => self.prepare_power_off(),
            Phase::PoweringOff => {}
        }
        self.phase
    }

    pub fn take_report(&mut self) -> CycleReport {
        let boot_reason = self.report.boot_reason;
        std::mem::replace(&mut self.report, CycleReport::new(boot_reason))
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.report.phases.push(phase);
    }

    fn fault(&mut self, fault: LifecycleError) {
        self.report.faults.push(fault);
    }

    fn validate(&mut self) {
        self.enter(Phase::Validating);

        if self.report.boot_reason == BootReason::PowerOn {
            info!("First power-up, resetting retained counters");
            self.block.reset_to_defaults();
            self.report.reset = Some(ResetCause::PowerOn);
        } else if let Err(e) = self.block.check() {
            warn!("Retained state untrusted ({}), resetting to defaults", e);
            self.block.reset_to_defaults();
            self.report.reset = Some(ResetCause::CorruptRetainedState);
            self.fault(LifecycleError::CorruptRetainedState(e));
        }

        if let Err(e) = self.block.on_boot() {
            warn!("{}", e);
            self.fault(e.into());
        }
        self.block.commit();

        let snapshot = self.block.snapshot();
        self.report.snapshot = snapshot;
        info!(
            "Boot #{} (off count {}, uptime {} ms)",
            snapshot.boots, snapshot.off_count, snapshot.uptime_ms
        );
    }

    fn advertise(&mut self) {
        self.enter(Phase::Advertising);

        let (notifier, waiter) = ready_channel();
        if let Err(e) = self.transport.init(notifier) {
            error!("Bluetooth init failed (err {:?})", e);
            self.fault(LifecycleError::TransportInitFailure(format!("{:?}", e)));
            return;
        }
        if let Err(e) = waiter.wait(self.config.ready_timeout) {
            error!("{}", e);
            self.fault(LifecycleError::TransportInitFailure(e.to_string()));
            return;
        }
        info!("Bluetooth initialized");
        self.radio_up = true;

        let payload = match self.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot build advertising payload: {}", e);
                self.fault(e.into());
                return;
            }
        };

        if let Err(e) = self.transport.start(&payload) {
            error!("Advertising failed to start (err {:?})", e);
            self.fault(LifecycleError::AdvertisingStartFailed(format!("{:?}", e)));
            return;
        }

        self.advertising = true;
        self.report.advertised = true;
        self.record_push(payload);
        info!("Advertising as '{}'", self.config.device_name);
    }

    /// Encode the current counters into a full advertising payload
    pub fn encode(&self) -> Result<AdvertisementData, EncodeError> {
        let service_data = ServiceData::encode(&self.block.snapshot(), self.config.layout);
        AdvertisementData::new(&self.config.device_name, &service_data)
    }

    /// Re-encode and hand the payload to the transport
    pub fn push(&mut self) -> Result<(), LifecycleError> {
        let payload = self.encode()?;
        self.transport
            .update(&payload)
            .map_err(|e| LifecycleError::AdvertisementUpdateFailed(format!("{:?}", e)))?;
        self.record_push(payload);
        Ok(())
    }

    fn record_push(&mut self, payload: AdvertisementData) {
        debug!("Payload {:02x?}", payload.as_bytes());
        self.report.pushes += 1;
        self.report.last_payload = Some(payload);
    }

    fn active_window(&mut self) {
        self.enter(Phase::ActiveWindow);

        let deadline = self.clock.now() + self.config.active_window;
        loop {
            let now = self.clock.now();
            if now >= deadline {
                break;
            }

            let remaining = deadline - now;
            // Without a running advertisement there is nothing to refresh.
            let nap = if !self.advertising || self.config.update_interval.is_zero() {
                remaining
            } else {
                remaining.min(self.config.update_interval)
            };
            self.clock.sleep(nap);

            if self.advertising && self.clock.now() < deadline {
                if let Err(e) = self.push() {
                    warn!("{}", e);
                    self.fault(e);
                }
            }
        }
    }

    fn persist(&mut self) {
        self.enter(Phase::Persisting);

        let elapsed = self.clock.now().saturating_sub(self.cycle_start);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if let Err(e) = self.block.on_off(elapsed_ms) {
            warn!("{}", e);
            self.fault(e.into());
        }
        self.block.commit();

        let snapshot = self.block.snapshot();
        self.report.snapshot = snapshot;
        self.report.active_time = elapsed;
        info!(
            "Persisted: off count {}, uptime {} ms (+{} ms)",
            snapshot.off_count, snapshot.uptime_ms, elapsed_ms
        );
    }

    fn prepare_power_off(&mut self) {
        self.enter(Phase::PoweringOff);

        if self.advertising {
            if let Err(e) = self.transport.stop() {
                warn!("Failed to stop advertising (err {:?})", e);
                self.fault(LifecycleError::AdvertisingStopFailed(format!("{:?}", e)));
            }
            self.advertising = false;
        }

        if let Err(e) = self.power.configure_wake_source(self.config.wake_source) {
            error!("Failed to configure wake source (err {:?})", e);
            self.fault(LifecycleError::WakeSourceFailure(format!("{:?}", e)));
        }
    }

    /// Invoke the power-off primitive. Only comes back if every attempt
    /// returned, and then marks the next cycle as a restart.
    pub fn power_off(&mut self) -> LifecycleError {
        let attempts = self.config.power_off_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            info!("Powering off (attempt {}/{})", attempt, attempts);
            let err = self.power.power_off();
            error!("Power-off primitive returned (err {:?})", err);
            last = format!("{:?}", err);
        }

        self.restarted = true;
        LifecycleError::PowerOffPrimitiveFailure { attempts, last }
    }
}
