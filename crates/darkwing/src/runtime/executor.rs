//! Supervising one container execution.

use std::future::pending;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use darkwing_common::{DarkwingError, DarkwingResult};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use super::config::ExecutorConfig;
use super::exit::ExitOutcome;
use super::handle::{RunHandle, RunState};
use super::oci::{OciRuntime, Step, StepOutput};
use crate::loader::RunDirectory;

/// Drives a runtime through create, start, wait and cleanup.
#[derive(Debug)]
pub struct RuntimeExecutor {
    runtime: Arc<dyn OciRuntime>,
    config: ExecutorConfig,
    signals: Option<mpsc::Receiver<i32>>,
    handle: Option<RunHandle>,
    log_offset: u64,
}

impl RuntimeExecutor {
    /// Create an executor over a runtime.
    pub fn new(runtime: Arc<dyn OciRuntime>, config: ExecutorConfig) -> Self {
        Self {
            runtime,
            config,
            signals: None,
            handle: None,
            log_offset: 0,
        }
    }

    /// Forward signals received on `signals` to the container while waiting.
    #[must_use]
    pub fn with_signals(mut self, signals: mpsc::Receiver<i32>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Handle of the most recent run.
    #[must_use]
    pub const fn last_run(&self) -> Option<&RunHandle> {
        self.handle.as_ref()
    }

    /// Run the container to completion and return its exit code.
    ///
    /// A signal-terminated container yields `128 + signal`. With `remove`
    /// the runtime state and the run directory are deleted afterwards, even
    /// when the run failed; cleanup problems are logged and never change
    /// the result.
    ///
    /// # Errors
    ///
    /// - [`DarkwingError::RuntimeInvocation`] if the runtime cannot be run
    /// - [`DarkwingError::RuntimeStepFailed`] if create or start fails
    /// - [`DarkwingError::TimeoutExceeded`] if the wait bound runs out
    pub async fn run_until_complete(
        &mut self,
        rundir: &RunDirectory,
        remove: bool,
    ) -> DarkwingResult<i32> {
        let mut handle = RunHandle::new(rundir.container_id());
        let span = tracing::info_span!(
            "run",
            container = %rundir.container(),
            context = %rundir.context().name
        );

        let result = self
            .supervise(rundir, &mut handle)
            .instrument(span.clone())
            .await;

        if let Err(e) = &result {
            handle.fail();
            tracing::debug!(parent: &span, error = %e, "Run failed");
        }

        if remove {
            self.cleanup(rundir, &mut handle).instrument(span).await;
        }

        self.handle = Some(handle);
        result
    }

    async fn supervise(
        &mut self,
        rundir: &RunDirectory,
        handle: &mut RunHandle,
    ) -> DarkwingResult<i32> {
        let output = self.runtime.create(rundir).await?;
        self.step_done(rundir, Step::Create, &output);
        output.check(Step::Create)?;
        handle.advance(RunState::Started)?;

        let output = self.runtime.start(rundir).await?;
        self.step_done(rundir, Step::Start, &output);
        output.check(Step::Start)?;
        handle.advance(RunState::Running)?;
        tracing::info!(container_id = %handle.container_id(), "Container running");

        let outcome = self.wait(rundir, handle.container_id()).await?;
        handle.exited(outcome.code())?;
        tracing::info!(container_id = %handle.container_id(), %outcome, "Container finished");

        Ok(outcome.code())
    }

    async fn wait(&mut self, rundir: &RunDirectory, id: &str) -> DarkwingResult<ExitOutcome> {
        let runtime = Arc::clone(&self.runtime);
        let wait = runtime.wait(rundir);
        tokio::pin!(wait);

        let deadline = self.config.timeout.map(|t| Instant::now() + t);

        loop {
            tokio::select! {
                output = &mut wait => {
                    let output = output?;
                    self.step_done(rundir, Step::Wait, &output);
                    return Ok(output.status);
                }
                signal = next_signal(&mut self.signals) => {
                    tracing::info!(container_id = %id, signal, "Forwarding signal");
                    self.signal(rundir, signal).await;
                }
                () = elapsed(deadline) => {
                    let seconds = self.config.timeout.map_or(0, |t| t.as_secs());
                    tracing::warn!(container_id = %id, seconds, "Container exceeded wait timeout, killing");
                    self.signal(rundir, libc::SIGKILL).await;

                    match tokio::time::timeout(self.config.kill_grace, &mut wait).await {
                        Ok(Ok(output)) => {
                            tracing::debug!(container_id = %id, outcome = %output.status, "Reaped container after kill");
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(container_id = %id, error = %e, "Failed to reap container after kill");
                        }
                        Err(_) => {
                            tracing::warn!(container_id = %id, "Container not reaped within grace period");
                        }
                    }

                    return Err(DarkwingError::TimeoutExceeded {
                        id: id.to_string(),
                        seconds,
                    });
                }
            }
        }
    }

    /// Deliver a signal, logging rather than failing.
    async fn signal(&mut self, rundir: &RunDirectory, signal: i32) {
        let result = self.runtime.kill(rundir, signal).await;
        match result {
            Ok(output) => {
                self.step_done(rundir, Step::Kill, &output);
                if let Err(e) = output.check(Step::Kill) {
                    tracing::warn!(signal, error = %e, "Failed to signal container");
                }
            }
            Err(e) => tracing::warn!(signal, error = %e, "Failed to signal container"),
        }
    }

    async fn cleanup(&mut self, rundir: &RunDirectory, handle: &mut RunHandle) {
        let mut clean = true;

        let result = self.runtime.delete(rundir, true).await;
        match result {
            Ok(output) => {
                self.step_done(rundir, Step::Delete, &output);
                if let Err(e) = output.check(Step::Delete) {
                    clean = false;
                    tracing::warn!(error = %e, "Failed to delete container from runtime");
                }
            }
            Err(e) => {
                clean = false;
                tracing::warn!(error = %e, "Failed to delete container from runtime");
            }
        }

        if let Err(e) = rundir.remove() {
            clean = false;
            tracing::warn!(path = %rundir.path().display(), error = %e, "Failed to remove run directory");
        }

        if clean && handle.state() == RunState::Exited {
            if let Err(e) = handle.advance(RunState::Deleted) {
                tracing::warn!(error = %e, "Failed to record deletion");
            }
        }
    }

    /// Emit step output and new runtime log lines when debugging.
    fn step_done(&mut self, rundir: &RunDirectory, step: Step, output: &StepOutput) {
        if !self.config.debug {
            return;
        }

        tracing::debug!(target: "darkwing::runtime", %step, status = %output.status, "Runtime step finished");
        for line in output.stdout.lines().filter(|l| !l.is_empty()) {
            tracing::debug!(target: "darkwing::runtime", %step, stream = "stdout", "{line}");
        }
        for line in output.stderr.lines().filter(|l| !l.is_empty()) {
            tracing::debug!(target: "darkwing::runtime", %step, stream = "stderr", "{line}");
        }

        match read_from(&rundir.runtime_log(), self.log_offset) {
            Ok(Some((text, offset))) => {
                self.log_offset = offset;
                for line in text.lines().filter(|l| !l.is_empty()) {
                    tracing::debug!(target: "darkwing::runtime", stream = "log", "{line}");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Failed to read runtime log"),
        }
    }
}

async fn next_signal(signals: &mut Option<mpsc::Receiver<i32>>) -> i32 {
    match signals {
        Some(rx) => match rx.recv().await {
            Some(signal) => signal,
            None => pending().await,
        },
        None => pending().await,
    }
}

async fn elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Read whatever follows `offset`, returning it with the new offset.
fn read_from(path: &std::path::Path, offset: u64) -> std::io::Result<Option<(String, u64)>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    let read = file.read_to_end(&mut bytes)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some((
        String::from_utf8_lossy(&bytes).into_owned(),
        offset + read as u64,
    )))
}
