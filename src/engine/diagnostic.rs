//! Observer hooks invoked synchronously by the engine.
//!
//! Hooks are side-effect-only. The engine never reads anything back from a
//! diagnostic, so correctness does not depend on one being installed.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};

use crate::clock::Timestamp;
use crate::logging::{log, obj, v_str, v_time, Domain, Level};

pub trait Diagnostic: Send + Sync {
    fn on_advance_start(&self, partition: &str, from: Timestamp, to: Timestamp);
    fn on_event_execute(&self, partition: &str, event_kind: &str, at: Timestamp);
    fn on_event_created(
        &self,
        partition: &str,
        event_kind: &str,
        scheduled_for: Timestamp,
        at: Timestamp,
    );
    fn on_advance_finish(&self, partition: &str, landed: Timestamp);
}

/// Routes every hook to a structured log record in the engine domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDiagnostic;

impl Diagnostic for JsonDiagnostic {
    fn on_advance_start(&self, partition: &str, from: Timestamp, to: Timestamp) {
        log(
            Level::Info,
            Domain::Engine,
            "advance_start",
            obj(&[
                ("partition", v_str(partition)),
                ("from", v_time(from)),
                ("to", v_time(to)),
            ]),
        );
    }

    fn on_event_execute(&self, partition: &str, event_kind: &str, at: Timestamp) {
        log(
            Level::Info,
            Domain::Engine,
            "execute",
            obj(&[
                ("partition", v_str(partition)),
                ("event_kind", v_str(event_kind)),
                ("at", v_time(at)),
            ]),
        );
    }

    fn on_event_created(
        &self,
        partition: &str,
        event_kind: &str,
        scheduled_for: Timestamp,
        at: Timestamp,
    ) {
        log(
            Level::Info,
            Domain::Engine,
            "chain",
            obj(&[
                ("partition", v_str(partition)),
                ("event_kind", v_str(event_kind)),
                ("scheduled_for", v_time(scheduled_for)),
                ("at", v_time(at)),
                ("lead_secs", json!((scheduled_for - at).num_seconds())),
            ]),
        );
    }

    fn on_advance_finish(&self, partition: &str, landed: Timestamp) {
        log(
            Level::Info,
            Domain::Engine,
            "advance_finish",
            obj(&[("partition", v_str(partition)), ("landed", v_time(landed))]),
        );
    }
}

/// Replay fingerprint: SHA-256 over every executed (partition, kind, time)
/// triple in execution order. Two runs with the same inputs and seed produce
/// the same digest.
#[derive(Debug)]
pub struct TraceDigest {
    state: Mutex<DigestState>,
}

#[derive(Debug)]
struct DigestState {
    hasher: Sha256,
    executed: u64,
}

impl TraceDigest {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DigestState {
                hasher: Sha256::new(),
                executed: 0,
            }),
        }
    }

    pub fn executed(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).executed
    }

    /// Hex digest of everything observed so far. Does not reset.
    pub fn hex(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        hex::encode(state.hasher.clone().finalize())
    }

    pub fn log_checkpoint(&self, label: &str) {
        log(
            Level::Info,
            Domain::Audit,
            "trace_digest",
            obj(&[
                ("label", v_str(label)),
                ("digest", v_str(&self.hex())),
                ("executed", json!(self.executed())),
            ]),
        );
    }
}

impl Default for TraceDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostic for TraceDigest {
    fn on_advance_start(&self, _partition: &str, _from: Timestamp, _to: Timestamp) {}

    fn on_event_execute(&self, partition: &str, event_kind: &str, at: Timestamp) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.hasher.update(partition.as_bytes());
        state.hasher.update([0u8]);
        state.hasher.update(event_kind.as_bytes());
        state.hasher.update([0u8]);
        state.hasher.update(at.timestamp_nanos_opt().unwrap_or(i64::MAX).to_be_bytes());
        state.executed += 1;
    }

    fn on_event_created(
        &self,
        _partition: &str,
        _event_kind: &str,
        _scheduled_for: Timestamp,
        _at: Timestamp,
    ) {
    }

    fn on_advance_finish(&self, _partition: &str, _landed: Timestamp) {}
}
