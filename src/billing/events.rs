use chrono::{Duration, Months};
use serde_json::json;

use super::{Account, BillingContext, BillingKind};
use crate::clock::{TimeProvider, Timestamp};
use crate::engine::Event;
use crate::logging::{log, obj, v_str, v_time, Domain, Level};

fn log_billing(
    level: Level,
    event: &str,
    account: &Account,
    fields: &[(&str, serde_json::Value)],
) {
    let mut map = obj(fields);
    map.insert("customer_id".to_string(), v_str(&account.customer_id));
    map.insert("partition".to_string(), v_str(&account.partition));
    log(level, Domain::Billing, event, map);
}

/// Pass through a computed follow-up instant; log when it fell off the calendar.
fn checked_follow_up(account: &Account, step: &str, at: Option<Timestamp>) -> Option<Timestamp> {
    if at.is_none() {
        log_billing(
            Level::Error,
            "follow_up_out_of_range",
            account,
            &[("step", v_str(step))],
        );
    }
    at
}

pub struct SubscriptionCreated {
    at: Timestamp,
    trial: Duration,
    account: Account,
}

impl SubscriptionCreated {
    pub fn new(
        at: Timestamp,
        customer_id: &str,
        trial: Duration,
        partition: &str,
        ctx: BillingContext,
    ) -> Self {
        Self {
            at,
            trial,
            account: Account {
                customer_id: customer_id.to_string(),
                partition: partition.to_string(),
                ctx,
            },
        }
    }
}

impl Event for SubscriptionCreated {
    fn time(&self) -> Timestamp {
        self.at
    }

    fn name(&self) -> &str {
        BillingKind::SubscriptionCreated.as_str()
    }

    fn partition_id(&self) -> &str {
        &self.account.partition
    }

    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>> {
        let trial_end = clock.now().checked_add_signed(self.trial);
        let Some(trial_end) = checked_follow_up(&self.account, "trial_end", trial_end) else {
            return Vec::new();
        };
        log_billing(
            Level::Info,
            "subscription_created",
            &self.account,
            &[("trial_end", v_time(trial_end))],
        );
        vec![Box::new(TrialEnded {
            at: trial_end,
            account: self.account.clone(),
        })]
    }
}

pub struct TrialEnded {
    at: Timestamp,
    account: Account,
}

impl Event for TrialEnded {
    fn time(&self) -> Timestamp {
        self.at
    }

    fn name(&self) -> &str {
        BillingKind::TrialEnded.as_str()
    }

    fn partition_id(&self) -> &str {
        &self.account.partition
    }

    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>> {
        let invoice_at = clock
            .now()
            .checked_add_signed(self.account.ctx.policy().invoice_delay);
        let Some(invoice_at) = checked_follow_up(&self.account, "invoice", invoice_at) else {
            return Vec::new();
        };
        log_billing(
            Level::Info,
            "trial_ended",
            &self.account,
            &[("invoice_at", v_time(invoice_at))],
        );
        vec![Box::new(InvoiceCreated::for_account(invoice_at, self.account.clone()))]
    }
}

pub struct InvoiceCreated {
    at: Timestamp,
    account: Account,
}

impl InvoiceCreated {
    pub fn new(at: Timestamp, customer_id: &str, partition: &str, ctx: BillingContext) -> Self {
        Self::for_account(
            at,
            Account {
                customer_id: customer_id.to_string(),
                partition: partition.to_string(),
                ctx,
            },
        )
    }

    fn for_account(at: Timestamp, account: Account) -> Self {
        Self { at, account }
    }
}

impl Event for InvoiceCreated {
    fn time(&self) -> Timestamp {
        self.at
    }

    fn name(&self) -> &str {
        BillingKind::InvoiceCreated.as_str()
    }

    fn partition_id(&self) -> &str {
        &self.account.partition
    }

    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>> {
        let payment_at = clock
            .now()
            .checked_add_signed(self.account.ctx.policy().payment_delay);
        let Some(payment_at) = checked_follow_up(&self.account, "payment", payment_at) else {
            return Vec::new();
        };
        log_billing(
            Level::Info,
            "invoice_created",
            &self.account,
            &[("payment_at", v_time(payment_at))],
        );
        vec![Box::new(PaymentAttempt {
            at: payment_at,
            retry: 0,
            account: self.account.clone(),
        })]
    }
}

pub struct PaymentAttempt {
    at: Timestamp,
    retry: u32,
    account: Account,
}

impl PaymentAttempt {
    pub fn new(
        at: Timestamp,
        customer_id: &str,
        partition: &str,
        retry: u32,
        ctx: BillingContext,
    ) -> Self {
        Self {
            at,
            retry,
            account: Account {
                customer_id: customer_id.to_string(),
                partition: partition.to_string(),
                ctx,
            },
        }
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }
}

impl Event for PaymentAttempt {
    fn time(&self) -> Timestamp {
        self.at
    }

    fn name(&self) -> &str {
        BillingKind::PaymentAttempt.as_str()
    }

    fn partition_id(&self) -> &str {
        &self.account.partition
    }

    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>> {
        let now = clock.now();
        let policy = self.account.ctx.policy();

        if self.account.ctx.draw_failure() {
            if self.retry >= policy.max_retries {
                log_billing(
                    Level::Error,
                    "payment_failed_permanently",
                    &self.account,
                    &[("retries", json!(self.retry))],
                );
                return Vec::new();
            }

            let retry_at = policy
                .backoff_for_attempt(self.retry)
                .and_then(|backoff| now.checked_add_signed(backoff));
            let Some(retry_at) = checked_follow_up(&self.account, "payment_retry", retry_at)
            else {
                return Vec::new();
            };
            log_billing(
                Level::Warn,
                "payment_failed",
                &self.account,
                &[("retry", json!(self.retry + 1)), ("retry_at", v_time(retry_at))],
            );
            return vec![Box::new(PaymentAttempt {
                at: retry_at,
                retry: self.retry + 1,
                account: self.account.clone(),
            })];
        }

        // Month-end dates clamp (Jan 31 -> Feb 28).
        let next_cycle = now.checked_add_months(Months::new(1));
        let Some(next_cycle) = checked_follow_up(&self.account, "next_invoice", next_cycle) else {
            return Vec::new();
        };
        log_billing(
            Level::Info,
            "payment_succeeded",
            &self.account,
            &[("at", v_time(now)), ("next_invoice", v_time(next_cycle))],
        );
        vec![Box::new(InvoiceCreated::for_account(next_cycle, self.account.clone()))]
    }
}
