//! Script engine
//!
//! Owns the loaded scripts and dispatches events to their triggers. An
//! invocation runs synchronously until it completes or suspends; suspended
//! invocations are handed to the [`Scheduler`] and resumed by the host,
//! either through [`ScriptEngine::tick`] or by feeding continuations from a
//! [`TokioScheduler`](crate::TokioScheduler) back into
//! [`ScriptEngine::resume`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use sk_core::events::ScriptLoadData;
use sk_core::{Context, Event};
use sk_event_bus::SharedEventBus;
use sk_syntax::{
    CancellationToken, ExecutionContext, LogSink, OutputSink, Parser, ParserConfig,
    SyntaxRegistry,
};
use sk_variables::SharedGlobals;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::builder::ScriptCompiler;
use crate::error::{EngineError, EngineResult};
use crate::executor::{Continuation, Executor, ExecutorConfig, Outcome, Suspension};
use crate::scheduler::Scheduler;
use crate::trigger::{periodic_event_type, Script, Trigger};

/// Parser and executor settings of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub parser: ParserConfig,
    pub executor: ExecutorConfig,
}

/// A periodic trigger and when it is next due on the engine clock
#[derive(Debug)]
struct PeriodicEntry {
    trigger: Arc<Trigger>,
    interval: Duration,
    next_due: Duration,
}

#[derive(Debug)]
struct LoadedScript {
    script: Arc<Script>,
    /// Parent of the tokens of every invocation of this script
    token: CancellationToken,
    periodic: Vec<PeriodicEntry>,
}

/// Outcome of loading a directory of scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct ScriptEngine {
    compiler: ScriptCompiler,
    executor: Executor,
    globals: SharedGlobals,
    output: Arc<dyn OutputSink>,
    scheduler: Arc<dyn Scheduler>,
    /// Loaded scripts by name, in load order
    scripts: RwLock<IndexMap<String, LoadedScript>>,
    /// Time advanced by `tick`
    clock: Mutex<Duration>,
    root: CancellationToken,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ScriptEngine {
    pub fn new(
        syntax: Arc<SyntaxRegistry>,
        settings: EngineSettings,
        globals: SharedGlobals,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let parser = Arc::new(Parser::new(syntax, settings.parser));
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            compiler: ScriptCompiler::new(parser, settings.executor.min_delay)
                .with_executor(Executor::new(settings.executor)),
            executor: Executor::new(settings.executor),
            globals,
            output: Arc::new(LogSink),
            scheduler,
            scripts: RwLock::new(IndexMap::new()),
            clock: Mutex::new(Duration::ZERO),
            root: CancellationToken::new(),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Send `broadcast` messages to `output` instead of the log
    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    pub fn compiler(&self) -> &ScriptCompiler {
        &self.compiler
    }

    pub fn globals(&self) -> &SharedGlobals {
        &self.globals
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Compile `source` and load it as `name`, replacing any script of
    /// that name
    ///
    /// On compile errors the previous version, if any, stays loaded.
    /// Returns the number of triggers loaded.
    #[instrument(skip(self, source))]
    pub fn load_script(&self, name: &str, source: &str) -> EngineResult<usize> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }

        let script = match self.compiler.compile(name, source) {
            Ok(script) => Arc::new(script),
            Err(errors) => {
                for error in errors.iter() {
                    error!(
                        script = name,
                        line = error.line,
                        kind = ?error.kind,
                        span = %error.span,
                        "{}",
                        error.message
                    );
                }
                return Err(EngineError::Compile {
                    script: name.to_string(),
                    errors,
                });
            }
        };

        let triggers = script.triggers.len();
        let now = *self.clock.lock();
        let periodic = script
            .triggers
            .iter()
            .filter_map(|trigger| {
                trigger.interval().map(|interval| PeriodicEntry {
                    trigger: Arc::clone(trigger),
                    interval,
                    next_due: now + interval,
                })
            })
            .collect();
        let loaded = LoadedScript {
            script,
            token: self.root.child(),
            periodic,
        };

        let previous = self.scripts.write().insert(name.to_string(), loaded);
        if let Some(previous) = &previous {
            previous.token.cancel();
        }
        info!(script = name, triggers, replaced = previous.is_some(), "Loaded script");

        let data = ScriptLoadData {
            script: name.to_string(),
            triggers,
        };
        self.handle_event(Event::typed(data, Context::engine()).into_untyped());
        Ok(triggers)
    }

    /// Load a script file, named after its file stem
    pub fn load_file(&self, path: &Path) -> EngineResult<usize> {
        let source = std::fs::read_to_string(path).map_err(|source| EngineError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.load_script(&name, &source)
    }

    /// Load every `*.sk` file of `dir` in name order
    ///
    /// A script that fails to compile is logged and skipped.
    pub fn load_dir(&self, dir: &Path) -> EngineResult<LoadSummary> {
        let entries = std::fs::read_dir(dir).map_err(|source| EngineError::ReadScript {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sk"))
            .collect();
        paths.sort();

        let mut summary = LoadSummary::default();
        for path in paths {
            let name = path.display().to_string();
            match self.load_file(&path) {
                Ok(_) => summary.loaded.push(name),
                Err(EngineError::Compile { .. }) => summary.failed.push(name),
                Err(e) => {
                    warn!(path = %name, error = %e, "Failed to load script");
                    summary.failed.push(name);
                }
            }
        }
        info!(
            dir = %dir.display(),
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            "Loaded scripts"
        );
        Ok(summary)
    }

    /// Remove a script and cancel its pending invocations
    #[instrument(skip(self))]
    pub fn unload_script(&self, name: &str) -> EngineResult<()> {
        let removed = self
            .scripts
            .write()
            .shift_remove(name)
            .ok_or_else(|| EngineError::UnknownScript(name.to_string()))?;
        removed.token.cancel();
        let functions = self.compiler.parser().syntax().functions().remove_script(name);
        info!(
            triggers = removed.script.triggers.len(),
            functions,
            "Unloaded script"
        );
        Ok(())
    }

    /// Names of the loaded scripts, in load order
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.read().keys().cloned().collect()
    }

    pub fn script(&self, name: &str) -> Option<Arc<Script>> {
        self.scripts
            .read()
            .get(name)
            .map(|loaded| Arc::clone(&loaded.script))
    }

    /// Start every trigger `event` matches; returns how many were started
    pub fn handle_event(&self, event: Event) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        let event = Arc::new(event);
        let matched: Vec<(Arc<Trigger>, CancellationToken)> = self
            .scripts
            .read()
            .values()
            .flat_map(|loaded| {
                loaded
                    .script
                    .triggers
                    .iter()
                    .filter(|trigger| trigger.matches(&event))
                    .map(|trigger| (Arc::clone(trigger), loaded.token.clone()))
            })
            .collect();

        trace!(event_type = %event.event_type, triggers = matched.len(), "Dispatching event");
        for (trigger, token) in &matched {
            self.start(Arc::clone(trigger), Arc::clone(&event), token);
        }
        matched.len()
    }

    fn start(&self, trigger: Arc<Trigger>, event: Arc<Event>, token: &CancellationToken) {
        let ctx = ExecutionContext::new(
            Arc::from(trigger.name.as_str()),
            event,
            Arc::clone(&self.globals),
            Arc::clone(&self.output),
            token.child(),
        );
        debug!(
            script = %trigger.script,
            trigger = %trigger.name,
            invocation = %ctx.id,
            "Starting trigger"
        );
        self.drive(Continuation::start(trigger, ctx));
    }

    /// Continue a suspended invocation
    pub fn resume(&self, continuation: Continuation) {
        if continuation.is_cancelled() {
            debug!(invocation = continuation.id(), "Dropping cancelled continuation");
            return;
        }
        self.drive(continuation);
    }

    fn drive(&self, continuation: Continuation) {
        match self.executor.run(continuation) {
            Outcome::Completed | Outcome::Failed(_) => {}
            Outcome::Suspended(Suspension::Delay(delay), continuation) => {
                self.scheduler.schedule_delayed(continuation, delay);
            }
            Outcome::Suspended(Suspension::Async, continuation) => {
                self.scheduler.schedule_async(continuation);
            }
        }
    }

    /// Advance the engine clock by one host tick
    ///
    /// Resumes every continuation the scheduler reports due, then starts
    /// periodic triggers whose interval has elapsed. Returns the number of
    /// continuations resumed and triggers started.
    pub fn tick(&self, elapsed: Duration) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        let due = self.scheduler.advance(elapsed);
        let mut ran = due.len();
        for continuation in due {
            self.resume(continuation);
        }

        let now = {
            let mut clock = self.clock.lock();
            *clock += elapsed;
            *clock
        };
        let mut periodic = Vec::new();
        for loaded in self.scripts.write().values_mut() {
            for entry in &mut loaded.periodic {
                while entry.next_due <= now {
                    periodic.push((Arc::clone(&entry.trigger), loaded.token.clone()));
                    entry.next_due += entry.interval;
                }
            }
        }
        ran += periodic.len();
        for (trigger, token) in periodic {
            let interval = trigger.interval().unwrap_or_default();
            let event = Event::new(
                periodic_event_type(interval),
                serde_json::Value::Null,
                Context::engine(),
            );
            self.start(trigger, Arc::new(event), &token);
        }
        ran
    }

    /// Dispatch every event of `bus` until the bus closes or
    /// [`ScriptEngine::stop`] is called
    pub fn start_listening(self: &Arc<Self>, bus: SharedEventBus) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Script engine already listening");
            return;
        }
        info!("Starting script engine");

        let mut event_rx = bus.subscribe_all();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event_result = event_rx.recv() => {
                        match event_result {
                            Ok(event) => {
                                engine.handle_event(event);
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Script engine lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Event bus closed, stopping script engine");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            engine.running.store(false, Ordering::SeqCst);
            info!("Script engine stopped");
        });
    }

    /// Stop listening to the event bus
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        info!("Stopping script engine");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel every invocation and drop pending continuations
    ///
    /// The engine refuses new scripts and events afterwards.
    pub fn shutdown(&self) {
        self.stop();
        self.root.cancel();
        let dropped = self.scheduler.clear();
        info!(dropped, "Script engine shut down");
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("scripts", &self.scripts())
            .field("scheduler", &self.scheduler)
            .field("running", &self.is_running())
            .finish()
    }
}
