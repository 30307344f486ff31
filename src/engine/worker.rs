//! Background drain loop for the SYSTEM partition.
//!
//! Readiness is checked at tick granularity: an event due between two ticks
//! runs on the following tick. A tick whose event behavior panics is logged
//! and abandoned; the loop keeps running and the remaining due events run on
//! the next tick.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{Engine, EngineError};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

/// Handle to a running real-time worker. Dropping it leaves the loop running.
#[derive(Debug)]
pub struct RealTimeWorker {
    task: JoinHandle<()>,
    interval: Duration,
    started: Arc<AtomicBool>,
}

impl RealTimeWorker {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Abort the loop and release the engine's worker slot, so a new worker
    /// may be started. A tick already in progress runs to completion first,
    /// since the drain itself never yields.
    pub fn stop(self) {
        self.task.abort();
        self.started.store(false, Ordering::SeqCst);
        log(
            Level::Info,
            Domain::Worker,
            "worker_stopped",
            obj(&[("interval_secs", v_num(self.interval.as_secs_f64()))]),
        );
    }
}

impl Engine {
    /// Spawn the SYSTEM drain loop on the current Tokio runtime. One worker
    /// per engine.
    pub fn start_real_time_worker(
        self: &Arc<Self>,
        every: Duration,
    ) -> Result<RealTimeWorker, EngineError> {
        let handle = Handle::try_current().map_err(|_| EngineError::NoAsyncRuntime)?;
        if self.worker_started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::WorkerAlreadyRunning);
        }

        let engine = Arc::clone(self);
        let task = handle.spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| engine.drain_system_tick())) {
                    log(
                        Level::Error,
                        Domain::Worker,
                        "worker_tick_panicked",
                        obj(&[("msg", v_str(&panic_message(panic.as_ref())))]),
                    );
                }
            }
        });

        log(
            Level::Info,
            Domain::Worker,
            "worker_started",
            obj(&[("interval_secs", v_num(every.as_secs_f64()))]),
        );
        Ok(RealTimeWorker {
            task,
            interval: every,
            started: Arc::clone(&self.worker_started),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
