//! Hybrid logical-time scheduling engine.
//!
//! Named partitions run on simulated clocks that only move when advanced;
//! the reserved `SYSTEM` partition follows the wall clock and is drained by a
//! background worker.

pub mod billing;
pub mod clock;
pub mod config;
pub mod engine;
pub mod logging;
pub mod probe;
pub mod shell;

pub use clock::{RealTimeClock, SimulatedClock, TimeProvider, TimeSource, Timestamp};
pub use engine::{
    Diagnostic, Engine, EngineError, Event, EventQueue, JsonDiagnostic, RealTimeWorker,
    TraceDigest, SYSTEM_PARTITION,
};
