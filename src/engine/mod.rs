//! Multi-partition discrete-event scheduling engine.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐  schedule  ┌────────────────────────────┐
//! │   Callers    │───────────►│  Directory (RwLock)        │
//! │ (shell/test) │            │  id -> EventQueue          │
//! └──────┬───────┘            │  id -> TimeSource          │
//!        │ advance(id, T)     └─────────────┬──────────────┘
//!        ▼                                  │
//! ┌──────────────┐  follow-ups  ┌───────────▼──────────────┐
//! │ Causal walk  │─────────────►│ schedule (any partition) │
//! │ (simulated)  │              └───────────▲──────────────┘
//! └──────────────┘                          │ follow-ups
//!                             ┌─────────────┴──────────────┐
//!                             │ Real-time worker (SYSTEM)  │
//!                             │ tokio interval ticks       │
//!                             └────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! The directory lock only guards partition membership. Each queue sits behind
//! its own mutex so scheduling into a partition never blocks on an unrelated
//! partition. Callers must still drive any one partition from a single control
//! flow at a time: two concurrent advances of the same id race on its clock.
//! The SYSTEM partition is drained only by the real-time worker.

pub mod diagnostic;
pub mod events;
pub mod queue;
pub mod worker;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use thiserror::Error;

use crate::clock::{RealTimeClock, TimeProvider, TimeSource, Timestamp};
use crate::logging::{
    log_advance, log_advance_rejected, log_partition_registered, log_queue_created,
    log_worker_tick,
};

pub use diagnostic::{Diagnostic, JsonDiagnostic, TraceDigest};
pub use events::{is_system_partition, Event, SYSTEM_PARTITION};
pub use queue::EventQueue;
pub use worker::RealTimeWorker;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("partition '{0}' is not registered")]
    PartitionNotRegistered(String),

    #[error("invalid operation: the SYSTEM partition follows wall-clock time and cannot be {operation}")]
    ReservedPartition { operation: &'static str },

    #[error("partition '{0}' is not bound to a simulated clock; manual time-warping is unsupported")]
    UnsupportedTimeWarp(String),

    #[error("partition '{partition}' is at {current}; cannot advance backward to {target}")]
    TargetInPast {
        partition: String,
        current: Timestamp,
        target: Timestamp,
    },

    #[error("real-time worker is already running for this engine")]
    WorkerAlreadyRunning,

    #[error("real-time worker requires a running Tokio runtime")]
    NoAsyncRuntime,
}

type SharedQueue = Arc<Mutex<EventQueue>>;

/// Partition membership. Queue and clock are tracked independently: a queue
/// can exist (lazily created by `schedule`) before any clock is bound.
#[derive(Default)]
struct Directory {
    queues: HashMap<String, SharedQueue>,
    clocks: HashMap<String, Arc<TimeSource>>,
}

pub struct Engine {
    directory: RwLock<Directory>,
    system_queue: SharedQueue,
    system_clock: RealTimeClock,
    diagnostic: Option<Arc<dyn Diagnostic>>,
    worker_started: Arc<AtomicBool>,
}

pub(crate) fn lock(queue: &Mutex<EventQueue>) -> MutexGuard<'_, EventQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    pub fn new(diagnostic: Option<Arc<dyn Diagnostic>>) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            system_queue: Arc::new(Mutex::new(EventQueue::new())),
            system_clock: RealTimeClock::new(),
            diagnostic,
            worker_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind (or rebind) the clock for `id`, creating an empty queue if none
    /// exists. Rebinding keeps already-queued events; the last binding wins.
    pub fn register_partition(&self, id: &str, clock: TimeSource) -> Result<(), EngineError> {
        if is_system_partition(id) {
            return Err(EngineError::ReservedPartition {
                operation: "registered as a simulated partition",
            });
        }

        let clock_kind = clock.kind();
        let now = clock.now();
        let rebound = {
            let mut dir = self.directory.write().unwrap_or_else(PoisonError::into_inner);
            dir.queues
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(EventQueue::new())));
            dir.clocks.insert(id.to_string(), Arc::new(clock)).is_some()
        };

        log_partition_registered(id, clock_kind, now, rebound);
        Ok(())
    }

    /// Route `event` to the queue of its declared partition.
    ///
    /// SYSTEM events go straight to the system queue. Unknown ids get a queue
    /// created on first use: a shared-lock lookup first, then an exclusive
    /// lock with a re-check so racing callers never create two queues.
    pub fn schedule(&self, event: Box<dyn Event>) {
        if is_system_partition(event.partition_id()) {
            lock(&self.system_queue).push(event);
            return;
        }

        let queue = self.queue_or_create(event.partition_id());
        lock(&queue).push(event);
    }

    fn queue_or_create(&self, id: &str) -> SharedQueue {
        {
            let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(queue) = dir.queues.get(id) {
                return Arc::clone(queue);
            }
        }

        let mut dir = self.directory.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(queue) = dir.queues.get(id) {
            return Arc::clone(queue);
        }
        let queue = Arc::new(Mutex::new(EventQueue::new()));
        dir.queues.insert(id.to_string(), Arc::clone(&queue));
        drop(dir);

        log_queue_created(id);
        queue
    }

    /// Queue and clock for `id`; both must exist.
    fn partition(&self, id: &str) -> Result<(SharedQueue, Arc<TimeSource>), EngineError> {
        let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        match (dir.queues.get(id), dir.clocks.get(id)) {
            (Some(queue), Some(clock)) => Ok((Arc::clone(queue), Arc::clone(clock))),
            _ => Err(EngineError::PartitionNotRegistered(id.to_string())),
        }
    }

    /// Drain and execute every event in `id` due at or before `target`,
    /// teleporting the partition clock to each event's timestamp, then land
    /// the clock on `target`.
    ///
    /// Follow-up events are scheduled as they are produced, so same-partition
    /// follow-ups due before `target` run within this call. An event that
    /// keeps rescheduling itself at or before its own instant is not guarded
    /// against and will keep this call busy.
    pub fn advance(&self, id: &str, target: Timestamp) -> Result<(), EngineError> {
        let result = self.try_advance(id, target);
        if let Err(err) = &result {
            log_advance_rejected(id, &err.to_string());
        }
        result
    }

    fn try_advance(&self, id: &str, target: Timestamp) -> Result<(), EngineError> {
        if is_system_partition(id) {
            return Err(EngineError::ReservedPartition {
                operation: "manually advanced",
            });
        }

        let (queue, source) = self.partition(id)?;
        let clock = source
            .as_simulated()
            .ok_or_else(|| EngineError::UnsupportedTimeWarp(id.to_string()))?;

        let from = clock.now();
        if target < from {
            return Err(EngineError::TargetInPast {
                partition: id.to_string(),
                current: from,
                target,
            });
        }

        if let Some(diag) = &self.diagnostic {
            diag.on_advance_start(id, from, target);
        }

        let mut executed = 0u64;
        loop {
            // Release the queue before executing: follow-ups may land back here.
            let next = lock(&queue).pop_due(target);
            let Some(event) = next else {
                clock.set(target);
                if let Some(diag) = &self.diagnostic {
                    diag.on_advance_finish(id, target);
                }
                log_advance(id, from, target, executed);
                return Ok(());
            };

            // Late events run at the current instant; the clock never rewinds.
            let at = event.time().max(clock.now());
            clock.set(at);

            if let Some(diag) = &self.diagnostic {
                diag.on_event_execute(id, event.name(), at);
            }
            let follow_ups = event.execute(&*source);
            executed += 1;
            self.schedule_follow_ups(follow_ups, at);
        }
    }

    fn schedule_follow_ups(&self, follow_ups: Vec<Box<dyn Event>>, at: Timestamp) {
        for next in follow_ups {
            let partition = next.partition_id().to_string();
            let kind = next.name().to_string();
            let scheduled_for = next.time();
            self.schedule(next);
            if let Some(diag) = &self.diagnostic {
                diag.on_event_created(&partition, &kind, scheduled_for, at);
            }
        }
    }

    /// One tick of the real-time drain: capture wall-clock now once, then
    /// execute every system event due at or before it. Returns the number of
    /// events executed.
    pub fn drain_system_tick(&self) -> usize {
        let now = self.system_clock.now();
        let mut executed = 0;

        loop {
            // Guard must drop before execute: follow-ups may target SYSTEM.
            let next = lock(&self.system_queue).pop_due(now);
            let Some(event) = next else { break };

            if let Some(diag) = &self.diagnostic {
                diag.on_event_execute(SYSTEM_PARTITION, event.name(), now);
            }
            let follow_ups = event.execute(&self.system_clock);
            executed += 1;
            self.schedule_follow_ups(follow_ups, self.system_clock.now());
        }

        log_worker_tick(now, executed, self.pending_events(SYSTEM_PARTITION));
        executed
    }

    /// Current time of a partition. SYSTEM reports the wall clock.
    pub fn partition_time(&self, id: &str) -> Result<Timestamp, EngineError> {
        if is_system_partition(id) {
            return Ok(self.system_clock.now());
        }
        let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        dir.clocks
            .get(id)
            .map(|clock| clock.now())
            .ok_or_else(|| EngineError::PartitionNotRegistered(id.to_string()))
    }

    /// Pending events for `id`; 0 for ids with no queue.
    pub fn pending_events(&self, id: &str) -> usize {
        if is_system_partition(id) {
            return lock(&self.system_queue).len();
        }
        let queue = {
            let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
            dir.queues.get(id).map(Arc::clone)
        };
        queue.map(|q| lock(&q).len()).unwrap_or(0)
    }

    /// Whether `id` has both a queue and a clock.
    pub fn is_registered(&self, id: &str) -> bool {
        self.partition(id).is_ok()
    }

    /// Every known partition id (registered or lazily created), sorted.
    pub fn partition_ids(&self) -> Vec<String> {
        let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = dir.queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Human-readable summary per partition id, SYSTEM included.
    pub fn status(&self) -> BTreeMap<String, String> {
        let snapshot: Vec<(String, SharedQueue, Option<Arc<TimeSource>>)> = {
            let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
            dir.queues
                .iter()
                .map(|(id, q)| (id.clone(), Arc::clone(q), dir.clocks.get(id).map(Arc::clone)))
                .collect()
        };

        let mut out = BTreeMap::new();
        for (id, queue, clock) in snapshot {
            let pending = lock(&queue).len();
            let time = match clock {
                Some(clock) => format!("{} ({})", clock.now().to_rfc3339(), clock.kind()),
                None => "unbound".to_string(),
            };
            out.insert(id, format!("Time: {} | Pending Events: {}", time, pending));
        }

        let system_pending = lock(&self.system_queue).len();
        out.insert(
            SYSTEM_PARTITION.to_string(),
            format!(
                "Time: {} (real-time) | Pending Events: {}",
                self.system_clock.now().to_rfc3339(),
                system_pending
            ),
        );
        out
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(None)
    }
}
