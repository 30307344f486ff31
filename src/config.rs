use serde::Serialize;
use std::time::Duration;

use crate::billing::PaymentPolicy;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Real-time worker tick interval.
    pub tick_secs: u64,
    /// Seed for the billing RNG.
    pub seed: u64,
    /// Default trial length used by the shell's `schedule` command.
    pub trial_days: i64,
    pub payment_failure_rate: f64,
    pub payment_max_retries: u32,
    /// Zero-day trials on SYSTEM are stretched to this so the worker sees them.
    pub system_min_trial_secs: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            tick_secs: env_or("HLT_TICK_SECS", 30),
            seed: env_or("HLT_SEED", 42),
            trial_days: env_or("HLT_TRIAL_DAYS", 14),
            payment_failure_rate: env_or("HLT_PAYMENT_FAILURE_RATE", 0.2),
            payment_max_retries: env_or("HLT_PAYMENT_MAX_RETRIES", 3),
            system_min_trial_secs: env_or("HLT_SYSTEM_MIN_TRIAL_SECS", 60),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn payment_policy(&self) -> PaymentPolicy {
        PaymentPolicy {
            failure_rate: self.payment_failure_rate.clamp(0.0, 1.0),
            max_retries: self.payment_max_retries,
            ..PaymentPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            seed: 42,
            trial_days: 14,
            payment_failure_rate: 0.2,
            payment_max_retries: 3,
            system_min_trial_secs: 60,
        }
    }
}
