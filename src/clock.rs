//! Time sources for partitions.
//!
//! A partition is bound to exactly one [`TimeSource`]:
//! - [`SimulatedClock`]: virtual time that only moves when the engine
//!   teleports it during an advance.
//! - [`RealTimeClock`]: the host wall clock, read-only.
//!
//! Event behaviors only ever see `&dyn TimeProvider`, so they can read the
//! current instant but never warp it.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

pub type Timestamp = DateTime<Utc>;

/// Read-only view of "now" handed to event behaviors.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Settable virtual clock used by simulated partitions.
#[derive(Debug)]
pub struct SimulatedClock {
    now: Mutex<Timestamp>,
}

impl SimulatedClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Teleport the clock. Engine-internal: behaviors never get a handle to this.
    pub(crate) fn set(&self, at: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl TimeProvider for SimulatedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock time, always UTC regardless of the host timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeClock;

impl RealTimeClock {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for RealTimeClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// The clock a partition is bound to. Owned by the engine once registered.
#[derive(Debug)]
pub enum TimeSource {
    Simulated(SimulatedClock),
    RealTime(RealTimeClock),
}

impl TimeSource {
    pub fn simulated(start: Timestamp) -> Self {
        TimeSource::Simulated(SimulatedClock::new(start))
    }

    pub fn real_time() -> Self {
        TimeSource::RealTime(RealTimeClock::new())
    }

    pub fn as_simulated(&self) -> Option<&SimulatedClock> {
        match self {
            TimeSource::Simulated(clock) => Some(clock),
            TimeSource::RealTime(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TimeSource::Simulated(_) => "simulated",
            TimeSource::RealTime(_) => "real-time",
        }
    }
}

impl TimeProvider for TimeSource {
    fn now(&self) -> Timestamp {
        match self {
            TimeSource::Simulated(clock) => clock.now(),
            TimeSource::RealTime(clock) => clock.now(),
        }
    }
}
