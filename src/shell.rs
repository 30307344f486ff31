//! Line-oriented command shell over an [`Engine`].
//!
//! ```text
//! create-partition <id> <rfc3339>
//! schedule <id> <n> <s|h|d|m> [trial_days]
//! advance <id> <n> <s|h|d|m>
//! status
//! quit | exit
//! ```
//! The unit `m` is a 30-day month.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::billing::{BillingContext, SubscriptionCreated};
use crate::clock::TimeSource;
use crate::config::Config;
use crate::engine::{is_system_partition, Engine};
use crate::logging::{log, obj, v_str, Domain, Level};

pub const USAGE: &str = "\
Commands:
  create-partition <id> <frozen_time_rfc3339>
      e.g. create-partition user_123 2025-01-01T10:00:00Z
  schedule <id> <value> <s|h|d|m> [trial_days]
  advance <id> <value> <s|h|d|m>
  status
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreatePartition { id: String, start: DateTime<Utc> },
    Schedule { id: String, delay: Duration, trial_days: Option<i64> },
    Advance { id: String, jump: Duration },
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Output(String),
    Quit,
}

/// Convert a count and unit into an offset. Unknown units fall back to seconds.
pub fn parse_offset(value: i64, unit: &str) -> Result<Duration> {
    let offset = match unit.to_lowercase().as_str() {
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "m" => value.checked_mul(30).and_then(Duration::try_days),
        _ => Duration::try_seconds(value),
    };
    offset.ok_or_else(|| anyhow!("offset out of range: {} {}", value, unit))
}

fn shift(from: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    from.checked_add_signed(by).ok_or_else(|| {
        anyhow!(
            "time out of range: {} + {}s",
            from.to_rfc3339(),
            by.num_seconds()
        )
    })
}

fn parse_count(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .with_context(|| format!("invalid number '{}'", raw))
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(head) = args.first() else {
        return Ok(None);
    };

    let cmd = match *head {
        "create-partition" => {
            if args.len() < 3 {
                bail!("usage: create-partition <id> <2025-01-01T10:00:00Z>");
            }
            let start = DateTime::parse_from_rfc3339(args[2])
                .map_err(|e| anyhow!("invalid time format: {}", e))?
                .with_timezone(&Utc);
            Command::CreatePartition {
                id: args[1].to_string(),
                start,
            }
        }
        "schedule" => {
            if args.len() < 4 {
                bail!("usage: schedule <id> <val> <s|h|d|m> [trial_days]");
            }
            let trial_days = match args.get(4) {
                Some(raw) => Some(parse_count(raw)?),
                None => None,
            };
            Command::Schedule {
                id: args[1].to_string(),
                delay: parse_offset(parse_count(args[2])?, args[3])?,
                trial_days,
            }
        }
        "advance" => {
            if args.len() < 4 {
                bail!("usage: advance <partitionID> <value> <s|h|d|m>");
            }
            Command::Advance {
                id: args[1].to_string(),
                jump: parse_offset(parse_count(args[2])?, args[3])?,
            }
        }
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: {}", other),
    };
    Ok(Some(cmd))
}

pub struct Shell {
    engine: Arc<Engine>,
    cfg: Config,
    billing: BillingContext,
}

impl Shell {
    pub fn new(engine: Arc<Engine>, cfg: Config) -> Self {
        let billing = BillingContext::seeded(cfg.payment_policy(), cfg.seed);
        Self {
            engine,
            cfg,
            billing,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Parse and run one line. Blank input yields an empty output.
    pub fn handle_line(&self, line: &str) -> Result<Reply> {
        match parse(line)? {
            Some(cmd) => self.execute(cmd),
            None => Ok(Reply::Output(String::new())),
        }
    }

    pub fn execute(&self, cmd: Command) -> Result<Reply> {
        log(
            Level::Debug,
            Domain::Shell,
            "command",
            obj(&[("msg", v_str(&format!("{:?}", cmd)))]),
        );

        match cmd {
            Command::CreatePartition { id, start } => {
                if is_system_partition(&id) {
                    bail!("cannot create partition '{}': reserved keyword", id);
                }
                self.engine
                    .register_partition(&id, TimeSource::simulated(start))?;
                Ok(Reply::Output(format!(
                    "Registered partition '{}' starting at {}",
                    id,
                    start.to_rfc2822()
                )))
            }
            Command::Schedule {
                id,
                delay,
                trial_days,
            } => {
                let current = self.engine.partition_time(&id)?;
                let start = shift(current, delay)?;
                let trial_days = trial_days.unwrap_or(self.cfg.trial_days);

                let mut note = String::new();
                let trial = if is_system_partition(&id) && trial_days == 0 {
                    note = format!(
                        "Note: 0-day trial on SYSTEM auto-adjusted to {}s for worker polling.\n",
                        self.cfg.system_min_trial_secs
                    );
                    Duration::try_seconds(self.cfg.system_min_trial_secs)
                        .ok_or_else(|| anyhow!("minimum SYSTEM trial out of range"))?
                } else {
                    Duration::try_days(trial_days)
                        .ok_or_else(|| anyhow!("trial out of range: {} days", trial_days))?
                };
                shift(start, trial).context("trial ends out of range")?;

                let customer = format!("CUST-{}", id);
                self.engine.schedule(Box::new(SubscriptionCreated::new(
                    start,
                    &customer,
                    trial,
                    &id,
                    self.billing.clone(),
                )));
                Ok(Reply::Output(format!(
                    "{}Scheduled '{}' for {} (trial: {}s)",
                    note,
                    id,
                    start.to_rfc2822(),
                    trial.num_seconds()
                )))
            }
            Command::Advance { id, jump } => {
                if is_system_partition(&id) {
                    bail!("cannot advance '{}': reserved keyword", id);
                }
                let current = self.engine.partition_time(&id)?;
                let target = shift(current, jump)?;
                self.engine
                    .advance(&id, target)
                    .with_context(|| format!("advance of '{}' failed", id))?;
                Ok(Reply::Output(format!(
                    "Advanced '{}' to {}",
                    id,
                    target.to_rfc2822()
                )))
            }
            Command::Status => {
                let mut lines = vec!["--- Engine Partition Status ---".to_string()];
                for (id, info) in self.engine.status() {
                    lines.push(format!("[{}] {}", id, info));
                }
                Ok(Reply::Output(lines.join("\n")))
            }
            Command::Quit => Ok(Reply::Quit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shell() -> Shell {
        let cfg = Config {
            payment_failure_rate: 0.0,
            ..Config::default()
        };
        Shell::new(Arc::new(Engine::default()), cfg)
    }

    #[test]
    fn test_parse_offset_units() {
        assert_eq!(parse_offset(30, "s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_offset(2, "H").unwrap(), Duration::hours(2));
        assert_eq!(parse_offset(3, "d").unwrap(), Duration::days(3));
        assert_eq!(parse_offset(1, "m").unwrap(), Duration::days(30));
        assert_eq!(parse_offset(5, "fortnight").unwrap(), Duration::seconds(5));
    }

    #[test]
    fn test_parse_offset_out_of_range() {
        assert!(parse_offset(999_999_999_999, "d").is_err());
        assert!(parse_offset(i64::MAX, "m").is_err());
        assert!(parse_offset(i64::MAX, "s").is_err());
        assert!(parse("advance p 999999999999 d").is_err());
    }

    #[test]
    fn test_huge_offsets_rejected_without_state_change() {
        let sh = shell();
        sh.handle_line("create-partition p 2025-01-01T10:00:00Z").unwrap();
        let start = sh.engine().partition_time("p").unwrap();

        assert!(sh.handle_line("advance p 999999999999 d").is_err());
        assert!(sh.handle_line("advance p 9000000000000 h").is_err());
        assert!(sh.handle_line("schedule p 9000000000000 h").is_err());
        assert!(sh.handle_line("schedule p 1 h 99999999999999").is_err());
        assert_eq!(sh.engine().partition_time("p").unwrap(), start);
        assert_eq!(sh.engine().pending_events("p"), 0);
    }

    #[test]
    fn test_trial_past_the_calendar_rejected() {
        let sh = shell();
        sh.handle_line("create-partition p 2025-01-01T10:00:00Z").unwrap();

        // Fits in a Duration but lands beyond the last representable date.
        let err = sh.handle_line("schedule p 1 h 100000000").unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
        assert_eq!(sh.engine().pending_events("p"), 0);

        sh.handle_line("advance p 2 h").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            sh.engine().partition_time("p").unwrap(),
            start + Duration::hours(2)
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("status").unwrap(), Some(Command::Status));
        assert_eq!(parse("exit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse("create-partition user_1 2025-01-01T10:00:00Z").unwrap(),
            Some(Command::CreatePartition {
                id: "user_1".to_string(),
                start: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            })
        );
        assert_eq!(
            parse("schedule user_1 1 h 0").unwrap(),
            Some(Command::Schedule {
                id: "user_1".to_string(),
                delay: Duration::hours(1),
                trial_days: Some(0),
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("create-partition only_id").is_err());
        assert!(parse("create-partition x yesterday").is_err());
        assert!(parse("advance x ten d").is_err());
        assert!(parse("launch").is_err());
    }

    #[test]
    fn test_create_schedule_advance_flow() {
        let sh = shell();
        sh.handle_line("create-partition user_1 2025-01-01T10:00:00Z").unwrap();
        sh.handle_line("schedule user_1 1 h").unwrap();
        assert_eq!(sh.engine().pending_events("user_1"), 1);

        sh.handle_line("advance user_1 20 d").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            sh.engine().partition_time("user_1").unwrap(),
            start + Duration::days(20)
        );
        // Payment succeeded; next month's invoice is pending.
        assert_eq!(sh.engine().pending_events("user_1"), 1);
    }

    #[test]
    fn test_reserved_partition_rejected() {
        let sh = shell();
        assert!(sh.handle_line("create-partition SYSTEM 2025-01-01T10:00:00Z").is_err());
        assert!(sh.handle_line("advance SYSTEM 1 h").is_err());
    }

    #[test]
    fn test_schedule_on_system_zero_trial_is_stretched() {
        let sh = shell();
        let reply = sh.handle_line("schedule SYSTEM 30 s 0").unwrap();
        match reply {
            Reply::Output(text) => assert!(text.contains("auto-adjusted")),
            Reply::Quit => panic!("unexpected quit"),
        }
        assert_eq!(sh.engine().pending_events("SYSTEM"), 1);
    }

    #[test]
    fn test_schedule_unknown_partition_fails() {
        let sh = shell();
        let err = sh.handle_line("schedule ghost 1 h").unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_status_lists_partitions() {
        let sh = shell();
        sh.handle_line("create-partition p 2025-01-01T10:00:00Z").unwrap();
        match sh.handle_line("status").unwrap() {
            Reply::Output(text) => {
                assert!(text.contains("[p] "));
                assert!(text.contains("[SYSTEM] "));
                assert!(text.contains("Pending Events: 0"));
            }
            Reply::Quit => panic!("unexpected quit"),
        }
    }
}
