//! Power, wake and time traits
//!
//! MCU-specific crates implement these with their sleep controller and
//! system timer.

use std::time::Duration;

/// Why the chip is running, as reported by the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootReason {
    /// First power application (battery inserted); retained memory is garbage
    PowerOn,
    /// Woken from the power-off state by the wake source
    WakeFromOff,
    /// Software, watchdog or brownout reset; retained memory survived
    Reset,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// External signal that brings the device back from power-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    Pin { gpio: u8, level: Level },
}

/// Trait for the power-off / wake primitive
pub trait PowerControl {
    /// Error type for power operations
    type Error: std::fmt::Debug;

    fn boot_reason(&self) -> BootReason;

    /// Arm the wake source. Must be called before `power_off()`.
    fn configure_wake_source(&mut self, source: WakeSource) -> Result<(), Self::Error>;

    /// Halt until the wake source fires; execution restarts at the entry
    /// point. Returns only if the primitive failed.
    fn power_off(&mut self) -> Self::Error;
}

/// Monotonic time since boot, and the one blocking wait the lifecycle uses
pub trait Clock {
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// `Clock` backed by `std::time` and `std::thread::sleep`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    boot: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.boot.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration)
    }
}
