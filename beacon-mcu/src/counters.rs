//! Counter rules for each lifecycle phase
//!
//! Every counter saturates instead of wrapping. A capped value is still
//! truthful about "at least this many"; a wrapped one silently rewrites the
//! history the beacon reports. Callers must `commit()` after each update.

use crate::retained::RetainedBlock;
use beacon_proto::CounterSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Boots,
    OffCount,
    Uptime,
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Counter::Boots => "boots",
            Counter::OffCount => "off_count",
            Counter::Uptime => "uptime_ms",
        })
    }
}

/// A counter hit its maximum and was clamped there
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("counter {counter} saturated")]
pub struct CounterOverflow {
    pub counter: Counter,
}

impl RetainedBlock {
    /// Count one transition into the active phase
    pub fn on_boot(&mut self) -> Result<(), CounterOverflow> {
        self.boots = self
            .boots
            .checked_add(1)
            .ok_or(CounterOverflow { counter: Counter::Boots })?;
        Ok(())
    }

    /// Count one completed active phase of `elapsed_ms` milliseconds.
    ///
    /// Both counters are updated even when one of them saturates; the first
    /// overflow is reported.
    pub fn on_off(&mut self, elapsed_ms: u64) -> Result<(), CounterOverflow> {
        let mut overflow = None;

        match self.off_count.checked_add(1) {
            Some(next) => self.off_count = next,
            None => overflow = Some(Counter::OffCount),
        }

        match self.uptime_ms.checked_add(elapsed_ms) {
            Some(next) => self.uptime_ms = next,
            None => {
                self.uptime_ms = u64::MAX;
                overflow.get_or_insert(Counter::Uptime);
            }
        }

        match overflow {
            Some(counter) => Err(CounterOverflow { counter }),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            boots: self.boots,
            off_count: self.off_count,
            uptime_ms: self.uptime_ms,
        }
    }
}
