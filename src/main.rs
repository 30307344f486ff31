use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use hybridtime::config::Config;
use hybridtime::engine::{Engine, JsonDiagnostic};
use hybridtime::logging::{log, obj, v_num, v_str, Domain, Level};
use hybridtime::shell::{Reply, Shell, USAGE};
use serde_json::to_value;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("config", to_value(&cfg)?)]),
    );

    let engine = Arc::new(Engine::new(Some(Arc::new(JsonDiagnostic))));
    let worker = engine.start_real_time_worker(cfg.tick_interval())?;

    println!("HYBRID LOGICAL TIME ENGINE");
    println!("==========================");
    println!("Real-time worker active ({}s ticks)", worker.interval().as_secs());
    println!("{}", USAGE);

    let shell = Shell::new(Arc::clone(&engine), cfg);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        match shell.handle_line(&line?) {
            Ok(Reply::Output(text)) => {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            Ok(Reply::Quit) => break,
            Err(e) => {
                println!("Error: {:#}", e);
                log(
                    Level::Warn,
                    Domain::Shell,
                    "command_failed",
                    obj(&[("msg", v_str(&format!("{:#}", e)))]),
                );
            }
        }
    }

    worker.stop();
    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[("partitions", v_num(engine.partition_ids().len() as f64))]),
    );
    Ok(())
}
