#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use hybridtime::{Diagnostic, Event, TimeProvider, Timestamp};

pub type Behavior = Arc<dyn Fn(&dyn TimeProvider) -> Vec<Box<dyn Event>> + Send + Sync>;

/// Event whose behavior is a closure, for building causal chains in tests.
pub struct FnEvent {
    pub at: Timestamp,
    pub name: String,
    pub partition: String,
    pub behavior: Option<Behavior>,
}

impl FnEvent {
    pub fn leaf(at: Timestamp, name: &str, partition: &str) -> Box<dyn Event> {
        Box::new(Self {
            at,
            name: name.to_string(),
            partition: partition.to_string(),
            behavior: None,
        })
    }

    pub fn with<F>(at: Timestamp, name: &str, partition: &str, f: F) -> Box<dyn Event>
    where
        F: Fn(&dyn TimeProvider) -> Vec<Box<dyn Event>> + Send + Sync + 'static,
    {
        Box::new(Self {
            at,
            name: name.to_string(),
            partition: partition.to_string(),
            behavior: Some(Arc::new(f)),
        })
    }
}

impl Event for FnEvent {
    fn time(&self) -> Timestamp {
        self.at
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn partition_id(&self) -> &str {
        &self.partition
    }

    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>> {
        match &self.behavior {
            Some(f) => f(clock),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub partition: String,
    pub name: String,
    pub at: Timestamp,
}

/// Captures every hook invocation.
#[derive(Default)]
pub struct Recorder {
    pub starts: Mutex<Vec<(String, Timestamp, Timestamp)>>,
    pub executed: Mutex<Vec<Executed>>,
    pub created: Mutex<Vec<(String, String, Timestamp, Timestamp)>>,
    pub finishes: Mutex<Vec<(String, Timestamp)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed_names(&self) -> Vec<String> {
        self.executed.lock().unwrap().iter().map(|e| e.name.clone()).collect()
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl Diagnostic for Recorder {
    fn on_advance_start(&self, partition: &str, from: Timestamp, to: Timestamp) {
        self.starts.lock().unwrap().push((partition.to_string(), from, to));
    }

    fn on_event_execute(&self, partition: &str, event_kind: &str, at: Timestamp) {
        self.executed.lock().unwrap().push(Executed {
            partition: partition.to_string(),
            name: event_kind.to_string(),
            at,
        });
    }

    fn on_event_created(
        &self,
        partition: &str,
        event_kind: &str,
        scheduled_for: Timestamp,
        at: Timestamp,
    ) {
        self.created.lock().unwrap().push((
            partition.to_string(),
            event_kind.to_string(),
            scheduled_for,
            at,
        ));
    }

    fn on_advance_finish(&self, partition: &str, landed: Timestamp) {
        self.finishes.lock().unwrap().push((partition.to_string(), landed));
    }
}

/// 2025-03-01T10:00:00Z
pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

pub fn as_diag(rec: &Arc<Recorder>) -> Option<Arc<dyn Diagnostic>> {
    Some(Arc::clone(rec) as Arc<dyn Diagnostic>)
}
