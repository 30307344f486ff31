//! Subscription billing workflow built on the event contract.
//!
//! ```text
//! SubscriptionCreated ──trial──► TrialEnded ──1h──► InvoiceCreated ──10m──► PaymentAttempt
//!                                                        ▲                      │
//!                                                        └──── +1 month ◄── success
//!                                          retry (linear backoff) ◄── failure
//! ```
//!
//! Payment outcomes are drawn from a seeded RNG carried in [`BillingContext`],
//! so a run is reproducible from its seed.

mod events;

pub use events::{InvoiceCreated, PaymentAttempt, SubscriptionCreated, TrialEnded};

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingKind {
    SubscriptionCreated,
    TrialEnded,
    InvoiceCreated,
    PaymentAttempt,
}

impl BillingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingKind::SubscriptionCreated => "SubscriptionCreated",
            BillingKind::TrialEnded => "TrialEnded",
            BillingKind::InvoiceCreated => "InvoiceCreated",
            BillingKind::PaymentAttempt => "PaymentAttempt",
        }
    }
}

/// Timing and failure knobs for the billing chain.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub failure_rate: f64,
    pub max_retries: u32,
    /// Delay between trial end and the first invoice.
    pub invoice_delay: Duration,
    /// Delay between an invoice and its payment attempt.
    pub payment_delay: Duration,
    /// Backoff unit; retry `n` waits `(n + 1) * retry_step`.
    pub retry_step: Duration,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            failure_rate: 0.2,
            max_retries: 3,
            invoice_delay: Duration::hours(1),
            payment_delay: Duration::minutes(10),
            retry_step: Duration::hours(1),
        }
    }
}

impl PaymentPolicy {
    /// Linear backoff: 1x, 2x, 3x ... the retry step. `None` on overflow.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Option<Duration> {
        let factor = i32::try_from(attempt).ok()?.checked_add(1)?;
        self.retry_step.checked_mul(factor)
    }
}

#[derive(Debug)]
struct BillingEnv {
    policy: PaymentPolicy,
    rng: Mutex<StdRng>,
}

/// Shared policy + randomness handed to every billing event at construction.
#[derive(Debug, Clone)]
pub struct BillingContext {
    env: Arc<BillingEnv>,
}

impl BillingContext {
    pub fn seeded(policy: PaymentPolicy, seed: u64) -> Self {
        Self {
            env: Arc::new(BillingEnv {
                policy,
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.env.policy
    }

    /// Draw one payment outcome. `true` means the attempt failed.
    pub fn draw_failure(&self) -> bool {
        let mut rng = self.env.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen::<f64>() < self.env.policy.failure_rate
    }
}

/// Identity carried along one customer's chain.
#[derive(Debug, Clone)]
pub(crate) struct Account {
    pub customer_id: String,
    pub partition: String,
    pub ctx: BillingContext,
}
