//! skriptd
//!
//! Loads every script of the configured directory and runs them against
//! events read as JSON lines from stdin:
//!
//! ```text
//! {"event": "join", "data": {"player": "alex"}}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use sk_config::{EngineConfig, MatchPolicy};
use sk_core::Context;
use sk_event_bus::{EventBus, EventEnvelope};
use sk_script::{
    builtin_syntax, Continuation, EngineSettings, ExecutorConfig, ScriptEngine, TokioScheduler,
};
use sk_syntax::{ParsePolicy, ParserConfig};
use sk_variables::GlobalVariables;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Parser)]
#[command(name = "skriptd", version, about = "Run scripts against events from stdin")]
struct Args {
    /// Engine configuration file
    #[arg(short, long, default_value = "skript.yaml")]
    config: PathBuf,
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn engine_settings(config: &EngineConfig) -> EngineSettings {
    let policy = match config.parser.policy {
        MatchPolicy::FirstMatch => ParsePolicy::FirstMatch,
        MatchPolicy::BestMatch => ParsePolicy::BestMatch,
    };
    EngineSettings {
        parser: ParserConfig {
            max_depth: config.parser.max_depth,
            max_steps: config.parser.max_steps,
            max_line_steps: config.parser.max_line_steps,
            policy,
        },
        executor: ExecutorConfig {
            max_loop_iterations: config.executor.max_loop_iterations,
            min_delay: Duration::from_millis(config.executor.min_delay_ms),
        },
    }
}

fn resume(engine: &Arc<ScriptEngine>, continuation: Continuation) {
    if continuation.worker {
        let engine = Arc::clone(engine);
        tokio::task::spawn_blocking(move || engine.resume(continuation));
    } else {
        engine.resume(continuation);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(config = %args.config.display(), "Starting skriptd");

    let globals = Arc::new(
        GlobalVariables::load(&config.variables_file).context("loading global variables")?,
    );
    let (scheduler, mut continuations) = TokioScheduler::new();
    let engine = Arc::new(ScriptEngine::new(
        builtin_syntax().context("registering built-in syntax")?,
        engine_settings(&config),
        Arc::clone(&globals),
        Arc::new(scheduler),
    ));

    let bus = Arc::new(EventBus::new());
    engine.start_listening(Arc::clone(&bus));

    if let Err(e) = engine.load_dir(&config.scripts_dir) {
        warn!(dir = %config.scripts_dir.display(), "Could not load scripts: {}", e);
    }

    let tick_interval = Duration::from_millis(config.executor.tick_interval_ms.max(1));
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(continuation) = continuations.recv() => {
                resume(&engine, continuation);
            }
            _ = ticker.tick() => {
                engine.tick(tick_interval);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match EventEnvelope::parse_line(&line) {
                        Ok(envelope) => {
                            let event = envelope.into_event(Context::new());
                            debug!(event_type = %event.event_type, "Event from stdin");
                            bus.fire(event);
                        }
                        Err(e) => warn!(line = %line, "Ignoring malformed event: {}", e),
                    },
                    Ok(None) => {
                        info!("stdin closed, no more external events");
                        stdin_open = false;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    engine.shutdown();
    globals
        .save(&config.variables_file)
        .context("saving global variables")?;
    Ok(())
}
