//! The lifecycle driver: from a `name[:context]` target to an exit code.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use darkwing_common::{DEFAULT_CONTEXT, DarkwingError, DarkwingPaths, DarkwingResult, sys};
use darkwing_oci::ContainerState;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ConfigStore, Context, ContextResolver, LifecycleMode};
use crate::loader::ContainerLoader;
use crate::runtime::{ExecutorConfig, OciRuntime, RuncRuntime, RuntimeExecutor, Step};

/// Builds the runtime used for one execution.
pub type RuntimeFactory =
    Box<dyn Fn(&Context, &ExecutorConfig) -> Arc<dyn OciRuntime> + Send + Sync>;

/// A parsed `name[:context]` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Container name.
    pub container: String,
    /// Context name.
    pub context: String,
}

/// Split a target at the first `:`.
///
/// A missing or empty context means `default`. Names are not validated
/// here.
#[must_use]
pub fn parse_target(raw: &str) -> Target {
    let (container, context) = match raw.split_once(':') {
        Some((container, context)) if !context.is_empty() => (container, context),
        Some((container, _)) => (container, DEFAULT_CONTEXT),
        None => (raw, DEFAULT_CONTEXT),
    };
    Target {
        container: container.to_string(),
        context: context.to_string(),
    }
}

/// Per-invocation overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Delete runtime state and the run directory after the run.
    pub remove: bool,
    /// Force runtime diagnostics on.
    pub debug: bool,
    /// Override the context's wait bound.
    pub timeout: Option<Duration>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            remove: true,
            debug: false,
            timeout: None,
        }
    }
}

/// Resolves, loads and supervises containers.
pub struct Driver {
    resolver: ContextResolver,
    loader: ContainerLoader,
    options: DriverOptions,
    factory: RuntimeFactory,
    forward_signals: bool,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("resolver", &self.resolver)
            .field("loader", &self.loader)
            .field("options", &self.options)
            .field("forward_signals", &self.forward_signals)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Create a driver using runc-compatible runtimes.
    pub fn new(store: Arc<dyn ConfigStore>, paths: DarkwingPaths) -> Self {
        Self {
            resolver: ContextResolver::new(Arc::clone(&store), paths),
            loader: ContainerLoader::new(store),
            options: DriverOptions::default(),
            factory: Box::new(
                |context: &Context, config: &ExecutorConfig| -> Arc<dyn OciRuntime> {
                    Arc::new(RuncRuntime::from_context(context).with_debug(config.debug))
                },
            ),
            forward_signals: true,
        }
    }

    /// Set per-invocation options.
    #[must_use]
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the container loader.
    #[must_use]
    pub fn with_loader(mut self, loader: ContainerLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Replace how runtimes are built.
    #[must_use]
    pub fn with_runtime_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Context, &ExecutorConfig) -> Arc<dyn OciRuntime> + Send + Sync + 'static,
    {
        self.factory = Box::new(factory);
        self
    }

    /// Enable or disable forwarding of SIGINT, SIGTERM, SIGHUP and SIGQUIT.
    #[must_use]
    pub const fn with_signal_forwarding(mut self, enabled: bool) -> Self {
        self.forward_signals = enabled;
        self
    }

    fn executor_config(&self, context: &Context) -> ExecutorConfig {
        let mut config = ExecutorConfig::from_context(context);
        if self.options.debug {
            config.debug = true;
        }
        if let Some(timeout) = self.options.timeout {
            config.timeout = Some(timeout);
        }
        config
    }

    /// Run a container to completion and return its exit code.
    ///
    /// Resolution and loading happen before any subprocess is started, so
    /// their failures leave nothing behind.
    ///
    /// # Errors
    ///
    /// Returns any resolution, loading or supervision error.
    pub async fn execute(&self, raw_target: &str) -> DarkwingResult<i32> {
        let target = parse_target(raw_target);
        let context = self.resolver.resolve(Some(&target.context))?;
        let config = self.executor_config(&context);

        if context.lifecycle == LifecycleMode::Split {
            sys::set_child_subreaper()?;
        }

        let (signals, forwarder) = if self.forward_signals {
            let (tx, rx) = mpsc::channel(8);
            (Some(rx), Some(spawn_signal_forwarder(tx)?))
        } else {
            (None, None)
        };

        let result = self.supervise(&target, &context, config, signals).await;

        if let Some(task) = forwarder {
            task.abort();
        }

        result
    }

    async fn supervise(
        &self,
        target: &Target,
        context: &Context,
        config: ExecutorConfig,
        signals: Option<mpsc::Receiver<i32>>,
    ) -> DarkwingResult<i32> {
        let rundir = self.loader.load(&target.container, context, true)?;
        tracing::info!(
            container = %target.container,
            context = %context.name,
            path = %rundir.path().display(),
            "Prepared run directory"
        );

        let runtime = (self.factory)(context, &config);
        let mut executor = RuntimeExecutor::new(runtime, config);
        if let Some(signals) = signals {
            executor = executor.with_signals(signals);
        }

        executor
            .run_until_complete(&rundir, self.options.remove)
            .await
    }

    /// Query the runtime state of an existing run.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::RunDirectoryNotFound`] if the container has
    /// no run directory, or the runtime's failure.
    pub async fn status(&self, raw_target: &str) -> DarkwingResult<ContainerState> {
        let target = parse_target(raw_target);
        let context = self.resolver.resolve(Some(&target.context))?;
        let rundir = self.loader.load(&target.container, &context, false)?;

        let runtime = (self.factory)(&context, &self.executor_config(&context));
        let output = runtime.state(&rundir).await?.check(Step::State)?;
        output.container_state()
    }

    /// Remove a left-behind run.
    ///
    /// Without `force` the launcher that owned the run must be gone and the
    /// runtime must not report the container as active. Runtime state is
    /// force-deleted best-effort before the directory goes.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::ContainerActive`] if the run is still alive
    /// and `force` is not set.
    pub async fn remove(&self, raw_target: &str, force: bool) -> DarkwingResult<()> {
        let target = parse_target(raw_target);
        let context = self.resolver.resolve(Some(&target.context))?;
        let rundir = self.loader.load(&target.container, &context, false)?;

        if !force && !rundir.is_stale()? {
            return Err(DarkwingError::ContainerActive {
                id: rundir.container_id(),
                status: "owner is running".to_string(),
            });
        }

        let runtime = (self.factory)(&context, &self.executor_config(&context));
        if !force {
            let state = runtime.state(&rundir).await;
            if let Ok(state) = state.and_then(|o| o.check(Step::State)?.container_state()) {
                if state.status.is_active() {
                    return Err(DarkwingError::ContainerActive {
                        id: rundir.container_id(),
                        status: state.status.to_string(),
                    });
                }
            }
        }

        let deleted = runtime.delete(&rundir, true).await;
        if let Err(e) = deleted.and_then(|o| o.check(Step::Delete)) {
            tracing::warn!(error = %e, "Failed to delete container from runtime");
        }

        self.loader.remove_stale(&target.container, &context, force)
    }
}

/// Relay termination signals into `tx` until the receiver goes away.
fn spawn_signal_forwarder(tx: mpsc::Sender<i32>) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        loop {
            let number = tokio::select! {
                _ = interrupt.recv() => libc::SIGINT,
                _ = terminate.recv() => libc::SIGTERM,
                _ = hangup.recv() => libc::SIGHUP,
                _ = quit.recv() => libc::SIGQUIT,
            };
            if tx.send(number).await.is_err() {
                break;
            }
        }
    }))
}
