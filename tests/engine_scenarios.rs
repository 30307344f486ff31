//! End-to-end advance scenarios against the public engine API.

mod common;

use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{as_diag, t0, FnEvent, Recorder};
use hybridtime::billing::{BillingContext, PaymentPolicy, SubscriptionCreated};
use hybridtime::probe::ProbeEvent;
use hybridtime::{Engine, EngineError, Event, TimeSource, SYSTEM_PARTITION};

// ---------------------------------------------------------------------------
// Scenario 1: out-of-order schedule executes in time order, clock lands on T
// ---------------------------------------------------------------------------
#[test]
fn scenario_out_of_order_probes() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("A", TimeSource::simulated(t0())).unwrap();

    eng.schedule(Box::new(ProbeEvent::new(t0() + Duration::hours(2), "B", "A")));
    eng.schedule(Box::new(ProbeEvent::new(t0() + Duration::hours(1), "A", "A")));

    let target = t0() + Duration::hours(5);
    eng.advance("A", target).unwrap();

    assert_eq!(rec.executed_names(), vec!["A", "B"]);
    assert_eq!(eng.partition_time("A").unwrap(), target);

    let executed = rec.executed();
    assert_eq!(executed[0].at, t0() + Duration::hours(1));
    assert_eq!(executed[1].at, t0() + Duration::hours(2));

    assert_eq!(rec.starts.lock().unwrap().clone(), vec![("A".to_string(), t0(), target)]);
    assert_eq!(rec.finishes.lock().unwrap().clone(), vec![("A".to_string(), target)]);
}

// ---------------------------------------------------------------------------
// Scenario 2: subscription lifecycle chain
// ---------------------------------------------------------------------------
#[test]
fn scenario_subscription_lifecycle_chain() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("U", TimeSource::simulated(t0())).unwrap();

    eng.schedule(FnEvent::with(t0(), "SubscriptionCreated", "U", |tp| {
        vec![FnEvent::with(
            tp.now() + Duration::days(14),
            "TrialEnded",
            "U",
            |tp| vec![FnEvent::leaf(tp.now() + Duration::hours(1), "InvoiceCreated", "U")],
        )]
    }));

    let target = t0() + Duration::days(20);
    eng.advance("U", target).unwrap();

    assert_eq!(
        rec.executed_names(),
        vec!["SubscriptionCreated", "TrialEnded", "InvoiceCreated"]
    );
    let times: Vec<_> = rec.executed().iter().map(|e| e.at).collect();
    assert_eq!(
        times,
        vec![
            t0(),
            t0() + Duration::days(14),
            t0() + Duration::days(14) + Duration::hours(1),
        ]
    );
    assert_eq!(eng.partition_time("U").unwrap(), target);
    assert_eq!(rec.created_count(), 2);
}

#[test]
fn billing_chain_with_reliable_payments() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("U", TimeSource::simulated(t0())).unwrap();

    let ctx = BillingContext::seeded(
        PaymentPolicy {
            failure_rate: 0.0,
            ..PaymentPolicy::default()
        },
        1,
    );
    eng.schedule(Box::new(SubscriptionCreated::new(
        t0(),
        "CUST-U",
        Duration::days(14),
        "U",
        ctx,
    )));

    eng.advance("U", t0() + Duration::days(20)).unwrap();

    assert_eq!(
        rec.executed_names(),
        vec!["SubscriptionCreated", "TrialEnded", "InvoiceCreated", "PaymentAttempt"]
    );
    // Next cycle's invoice waits a month out.
    assert_eq!(eng.pending_events("U"), 1);
}

#[test]
fn billing_chain_retries_then_gives_up() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("U", TimeSource::simulated(t0())).unwrap();

    let ctx = BillingContext::seeded(
        PaymentPolicy {
            failure_rate: 1.0,
            max_retries: 3,
            ..PaymentPolicy::default()
        },
        1,
    );
    eng.schedule(Box::new(SubscriptionCreated::new(
        t0(),
        "CUST-U",
        Duration::days(0),
        "U",
        ctx,
    )));

    eng.advance("U", t0() + Duration::days(2)).unwrap();

    let payments: Vec<_> = rec
        .executed()
        .into_iter()
        .filter(|e| e.name == "PaymentAttempt")
        .map(|e| e.at)
        .collect();
    let first = t0() + Duration::hours(1) + Duration::minutes(10);
    assert_eq!(
        payments,
        vec![
            first,
            first + Duration::hours(1),
            first + Duration::hours(3),
            first + Duration::hours(6),
        ]
    );
    assert_eq!(eng.pending_events("U"), 0);
}

// ---------------------------------------------------------------------------
// Scenario 3: equal timestamps are all executed (as a set)
// ---------------------------------------------------------------------------
#[test]
fn scenario_simultaneous_events() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("X", TimeSource::simulated(t0())).unwrap();

    let at = t0() + Duration::hours(1);
    for name in ["p1", "p2", "p3"] {
        eng.schedule(FnEvent::leaf(at, name, "X"));
    }

    let target = at + Duration::minutes(1);
    eng.advance("X", target).unwrap();

    let names: BTreeSet<String> = rec.executed_names().into_iter().collect();
    let expected: BTreeSet<String> = ["p1", "p2", "p3"].iter().map(|s| s.to_string()).collect();
    assert_eq!(names, expected);
    assert!(rec.executed().iter().all(|e| e.at == at));
    assert_eq!(eng.partition_time("X").unwrap(), target);
}

// ---------------------------------------------------------------------------
// Scenarios 4 & 5: rejections leave no trace
// ---------------------------------------------------------------------------
#[test]
fn scenario_unregistered_partition() {
    let eng = Engine::default();
    let err = eng.advance("GHOST", t0()).unwrap_err();

    assert_eq!(err, EngineError::PartitionNotRegistered("GHOST".to_string()));
    assert!(eng.partition_ids().is_empty());
    assert!(!eng.status().contains_key("GHOST"));
}

#[test]
fn scenario_system_advance_rejected() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));

    let err = eng.advance(SYSTEM_PARTITION, t0()).unwrap_err();
    assert!(matches!(err, EngineError::ReservedPartition { .. }));

    eng.schedule(FnEvent::leaf(t0(), "Queued", SYSTEM_PARTITION));
    let err = eng
        .advance(SYSTEM_PARTITION, t0() + Duration::days(365 * 10))
        .unwrap_err();
    assert!(matches!(err, EngineError::ReservedPartition { .. }));
    assert_eq!(eng.pending_events(SYSTEM_PARTITION), 1);
    assert!(rec.executed().is_empty());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------
#[test]
fn landing_on_empty_partition() {
    let eng = Engine::default();
    eng.register_partition("empty", TimeSource::simulated(t0())).unwrap();

    let target = t0() + Duration::days(3);
    eng.advance("empty", target).unwrap();
    assert_eq!(eng.partition_time("empty").unwrap(), target);
}

#[test]
fn monotonic_clock_across_advances() {
    let eng = Engine::default();
    eng.register_partition("m", TimeSource::simulated(t0())).unwrap();
    eng.schedule(FnEvent::leaf(t0() + Duration::hours(3), "later", "m"));

    let t1 = t0() + Duration::hours(1);
    let t2 = t0() + Duration::hours(4);
    eng.advance("m", t1).unwrap();
    let after_first = eng.partition_time("m").unwrap();
    eng.advance("m", t2).unwrap();
    let after_second = eng.partition_time("m").unwrap();

    assert_eq!(after_first, t1);
    assert!(after_second >= after_first);
    assert_eq!(eng.pending_events("m"), 0);
}

#[test]
fn events_beyond_target_stay_queued() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("q", TimeSource::simulated(t0())).unwrap();
    eng.schedule(FnEvent::leaf(t0() + Duration::hours(1), "due", "q"));
    eng.schedule(FnEvent::leaf(t0() + Duration::hours(2), "boundary", "q"));
    eng.schedule(FnEvent::leaf(t0() + Duration::hours(3), "future", "q"));

    eng.advance("q", t0() + Duration::hours(2)).unwrap();
    assert_eq!(rec.executed_names(), vec!["due", "boundary"]);
    assert_eq!(eng.pending_events("q"), 1);
}

#[test]
fn causal_fan_out_schedules_every_follow_up() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.register_partition("fan", TimeSource::simulated(t0())).unwrap();
    eng.register_partition("other", TimeSource::simulated(t0())).unwrap();

    eng.schedule(FnEvent::with(t0(), "root", "fan", |tp| {
        vec![
            FnEvent::leaf(tp.now() + Duration::minutes(1), "same-1", "fan"),
            FnEvent::leaf(tp.now() + Duration::minutes(2), "same-2", "fan"),
            FnEvent::leaf(tp.now() + Duration::days(2), "same-late", "fan"),
            FnEvent::leaf(tp.now() + Duration::minutes(1), "cross", "other"),
            FnEvent::leaf(tp.now(), "sys", SYSTEM_PARTITION),
        ]
    }));

    eng.advance("fan", t0() + Duration::hours(1)).unwrap();

    assert_eq!(rec.created_count(), 5);
    let created = rec.created.lock().unwrap().clone();
    let entry = |partition: &str, kind: &str, scheduled_for| {
        (partition.to_string(), kind.to_string(), scheduled_for, t0())
    };
    assert_eq!(
        created,
        vec![
            entry("fan", "same-1", t0() + Duration::minutes(1)),
            entry("fan", "same-2", t0() + Duration::minutes(2)),
            entry("fan", "same-late", t0() + Duration::days(2)),
            entry("other", "cross", t0() + Duration::minutes(1)),
            entry(SYSTEM_PARTITION, "sys", t0()),
        ]
    );
    assert_eq!(rec.executed_names(), vec!["root", "same-1", "same-2"]);
    assert_eq!(eng.pending_events("fan"), 1);
    assert_eq!(eng.pending_events("other"), 1);
    assert_eq!(eng.pending_events(SYSTEM_PARTITION), 1);
    // The other partition's clock is untouched.
    assert_eq!(eng.partition_time("other").unwrap(), t0());
}

#[test]
fn behaviors_observe_their_own_timestamp() {
    let eng = Engine::default();
    eng.register_partition("obs", TimeSource::simulated(t0())).unwrap();

    let mismatches = Arc::new(AtomicUsize::new(0));
    for h in [5, 1, 3] {
        let at = t0() + Duration::hours(h);
        let counter = Arc::clone(&mismatches);
        eng.schedule(FnEvent::with(at, "obs", "obs", move |tp| {
            if tp.now() != at {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Vec::new()
        }));
    }

    eng.advance("obs", t0() + Duration::hours(6)).unwrap();
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

#[test]
fn lazily_queued_events_run_once_clock_is_bound() {
    let rec = Recorder::new();
    let eng = Engine::new(as_diag(&rec));
    eng.schedule(FnEvent::leaf(t0() + Duration::hours(1), "early-bird", "late"));
    assert!(eng.advance("late", t0() + Duration::hours(2)).is_err());

    eng.register_partition("late", TimeSource::simulated(t0())).unwrap();
    eng.advance("late", t0() + Duration::hours(2)).unwrap();
    assert_eq!(rec.executed_names(), vec!["early-bird"]);
}

#[test]
fn follow_up_boxes_keep_identity() {
    let follow: Box<dyn Event> = FnEvent::leaf(t0(), "kind", "owner");
    assert_eq!(follow.name(), "kind");
    assert_eq!(follow.partition_id(), "owner");
    assert_eq!(follow.time(), t0());
}
