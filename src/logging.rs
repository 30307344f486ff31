//! Structured JSON-lines logging for the scheduling engine.
//!
//! Every record carries a run id and a process-wide sequence number so that
//! interleaved output from the real-time worker and simulated advances can be
//! reordered and correlated after the fact.
//!
//! Records go to stdout and, when the run directory can be created, to
//! `<LOG_DIR>/<RUN_ID>/events.jsonl` (info and above) and `trace.jsonl`
//! (trace/debug).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::clock::Timestamp;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").as_deref().unwrap_or("info"))
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Engine,    // Advance walks, executions, causal creations
    Worker,    // Real-time drain loop ticks
    Partition, // Registration, lazy queue creation
    Billing,   // Subscription/invoice/payment collaborators
    Shell,     // Interactive command shell
    System,    // Startup, shutdown
    Audit,     // Replay fingerprints
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Engine => "engine",
            Domain::Worker => "worker",
            Domain::Partition => "partition",
            Domain::Billing => "billing",
            Domain::Shell => "shell",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS is a comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// Sinks for one run. File sinks are optional; stdout always receives records.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

impl RunContext {
    /// Open `<base>/<run_id>/` and its sink files. Failures leave that sink
    /// disabled.
    pub fn open(base: &Path, run_id: String) -> Self {
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        Self {
            events: open_sink(&run_dir.join("events.jsonl")),
            trace: open_sink(&run_dir.join("trace.jsonl")),
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn write(&self, level: Level, line: &str) {
        let sink = match level {
            Level::Trace | Level::Debug => &self.trace,
            _ => &self.events,
        };
        if let Some(writer) = sink {
            write_line(writer, line);
        }
    }
}

fn open_sink(path: &Path) -> Option<Mutex<BufWriter<File>>> {
    match File::create(path) {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        RunContext::open(Path::new(&base), run_id)
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["partition", "event_kind", "customer_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds (for run ids)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let ctx = ensure_run_context();
    let line = format_record(ctx.run_id(), level, domain.as_str(), event, fields);
    ctx.write(level, &line);
    println!("{}", line);
}

/// Build one JSON line. `partition`, `event_kind`, `customer_id` and `msg`
/// are promoted to top-level keys; everything else lands under `data`.
pub fn format_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_partition_registered(partition: &str, clock_kind: &str, now: Timestamp, rebound: bool) {
    log(
        Level::Info,
        Domain::Partition,
        "partition_registered",
        obj(&[
            ("partition", v_str(partition)),
            ("clock", v_str(clock_kind)),
            ("now", v_time(now)),
            ("rebound", Value::Bool(rebound)),
        ]),
    );
}

pub fn log_queue_created(partition: &str) {
    log(
        Level::Debug,
        Domain::Partition,
        "queue_created",
        obj(&[("partition", v_str(partition))]),
    );
}

pub fn log_advance(partition: &str, from: Timestamp, to: Timestamp, executed: u64) {
    log(
        Level::Debug,
        Domain::Engine,
        "advance_complete",
        obj(&[
            ("partition", v_str(partition)),
            ("from", v_time(from)),
            ("to", v_time(to)),
            ("executed", json!(executed)),
        ]),
    );
}

pub fn log_advance_rejected(partition: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Engine,
        "advance_rejected",
        obj(&[("partition", v_str(partition)), ("msg", v_str(reason))]),
    );
}

pub fn log_worker_tick(now: Timestamp, executed: usize, pending: usize) {
    let level = if executed > 0 { Level::Info } else { Level::Trace };
    log(
        level,
        Domain::Worker,
        "tick",
        obj(&[
            ("now", v_time(now)),
            ("executed", json!(executed)),
            ("pending", json!(pending)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

pub fn v_time(t: Timestamp) -> Value {
    Value::String(t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

// =============================================================================
// Tests
// =============================================================================
