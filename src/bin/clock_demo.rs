//! Deterministic walk through a simulated partition.
//!
//! Schedules two probes out of order, advances five hours, then runs a
//! seeded billing chain twice and compares the replay digests.

use anyhow::{bail, Context, Result};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use hybridtime::billing::{BillingContext, SubscriptionCreated};
use hybridtime::config::Config;
use hybridtime::engine::{Diagnostic, Engine, JsonDiagnostic, TraceDigest};
use hybridtime::probe::ProbeEvent;
use hybridtime::{TimeSource, Timestamp};

fn billing_run(cfg: &Config, start: Timestamp) -> Result<Arc<TraceDigest>> {
    let digest = Arc::new(TraceDigest::new());
    let engine = Engine::new(Some(Arc::clone(&digest) as Arc<dyn Diagnostic>));
    engine.register_partition("tenant", TimeSource::simulated(start))?;

    let ctx = BillingContext::seeded(cfg.payment_policy(), cfg.seed);
    engine.schedule(Box::new(SubscriptionCreated::new(
        start,
        "CUST-tenant",
        Duration::days(cfg.trial_days),
        "tenant",
        ctx,
    )));
    engine.advance("tenant", start + Duration::days(180))?;
    Ok(digest)
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let start = Utc
        .with_ymd_and_hms(2025, 3, 1, 10, 0, 0)
        .single()
        .context("invalid demo start time")?;

    let engine = Engine::new(Some(Arc::new(JsonDiagnostic)));
    engine.register_partition("A", TimeSource::simulated(start))?;

    // Out of order on purpose
    engine.schedule(Box::new(
        ProbeEvent::new(start + Duration::hours(2), "Event-B", "A")
            .with_follow_up(Duration::minutes(90), "Event-2A"),
    ));
    engine.schedule(Box::new(ProbeEvent::new(
        start + Duration::hours(1),
        "Event-A",
        "A",
    )));
    engine.advance("A", start + Duration::hours(5))?;

    let first = billing_run(&cfg, start)?;
    let second = billing_run(&cfg, start)?;
    first.log_checkpoint("billing_run_1");
    second.log_checkpoint("billing_run_2");
    if first.hex() != second.hex() {
        bail!("replay diverged: {} != {}", first.hex(), second.hex());
    }
    println!(
        "replay digest {} over {} executions",
        first.hex(),
        first.executed()
    );
    Ok(())
}
