//! Logging probe events for demos and smoke checks.

use chrono::Duration;

use crate::clock::{TimeProvider, Timestamp};
use crate::engine::Event;
use crate::logging::{log, obj, v_str, v_time, Domain, Level};

/// Logs its own execution and optionally schedules one follow-up probe.
#[derive(Debug, Clone)]
pub struct ProbeEvent {
    at: Timestamp,
    name: String,
    partition: String,
    follow_up: Option<(Duration, String)>,
}

impl ProbeEvent {
    pub fn new(at: Timestamp, name: &str, partition: &str) -> Self {
        Self {
            at,
            name: name.to_string(),
            partition: partition.to_string(),
            follow_up: None,
        }
    }

    /// Schedule a probe named `name` at `delay` after this one executes.
    pub fn with_follow_up(mut self, delay: Duration, name: &str) -> Self {
        self.follow_up = Some((delay, name.to_string()));
        self
    }
}

impl Event for ProbeEvent {
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
        log(
            Level::Debug,
            Domain::Engine,
            "probe",
            obj(&[
                ("partition", v_str(&self.partition)),
                ("event_kind", v_str(&self.name)),
                ("at", v_time(clock.now())),
            ]),
        );

        let Some((delay, name)) = &self.follow_up else {
            return Vec::new();
        };
        match clock.now().checked_add_signed(*delay) {
            Some(at) => vec![Box::new(ProbeEvent::new(at, name, &self.partition))],
            None => {
                log(
                    Level::Warn,
                    Domain::Engine,
                    "probe_follow_up_dropped",
                    obj(&[("event_kind", v_str(name)), ("msg", v_str("out of range"))]),
                );
                Vec::new()
            }
        }
    }
}
