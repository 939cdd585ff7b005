//! A runc-compatible runtime binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use darkwing_common::{DarkwingError, DarkwingResult};
use parking_lot::Mutex;
use tokio::process::{Child, Command};

use super::exit::{ExitOutcome, wait_pid};
use super::oci::{OciRuntime, Step, StepOutput};
use crate::config::{Context, LifecycleMode};
use crate::loader::RunDirectory;

/// Drives `runc` (or `crun`, `youki`, ...) as a subprocess.
///
/// Every invocation runs as
/// `<binary> --root <rundir>/state [--debug --log <rundir>/runtime.log] <step> ...`
/// with the context's environment overrides applied.
#[derive(Debug)]
pub struct RuncRuntime {
    binary: PathBuf,
    env: BTreeMap<String, String>,
    lifecycle: LifecycleMode,
    debug: bool,
    child: Mutex<Option<Child>>,
}

impl RuncRuntime {
    /// Create a runtime for a binary, using the split lifecycle.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            env: BTreeMap::new(),
            lifecycle: LifecycleMode::Split,
            debug: false,
            child: Mutex::new(None),
        }
    }

    /// Create a runtime configured by a context.
    #[must_use]
    pub fn from_context(context: &Context) -> Self {
        Self::new(&context.runtime_binary_path)
            .with_env(context.environment_overrides.clone())
            .with_lifecycle(context.lifecycle)
            .with_debug(context.debug)
    }

    /// Set environment applied to every invocation.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the lifecycle mode.
    #[must_use]
    pub const fn with_lifecycle(mut self, lifecycle: LifecycleMode) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Pass `--debug` and `--log` to the runtime.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The runtime executable.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, rundir: &RunDirectory, step: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.envs(&self.env);
        cmd.arg("--root").arg(rundir.state_dir());
        if self.debug {
            cmd.arg("--debug").arg("--log").arg(rundir.runtime_log());
        }
        cmd.arg(step);
        cmd
    }

    fn bundle_command(&self, rundir: &RunDirectory, step: &str) -> Command {
        let mut cmd = self.command(rundir, step);
        cmd.arg("--bundle")
            .arg(rundir.path())
            .arg("--pid-file")
            .arg(rundir.pid_file())
            .arg(rundir.container_id());
        cmd
    }

    fn invocation_error(&self, source: std::io::Error) -> DarkwingError {
        DarkwingError::RuntimeInvocation {
            binary: self.binary.clone(),
            source,
        }
    }

    /// Run a step with captured output.
    async fn captured(&self, step: Step, mut cmd: Command) -> DarkwingResult<StepOutput> {
        tracing::debug!(target: "darkwing::runtime", %step, command = ?cmd.as_std(), "Invoking runtime");
        cmd.stdin(Stdio::null());
        let output = cmd
            .output()
            .await
            .map_err(|e| self.invocation_error(e))?;
        Ok(output.into())
    }

    /// Run a step that shares our standard streams with the container.
    async fn inherited(&self, step: Step, mut cmd: Command) -> DarkwingResult<StepOutput> {
        tracing::debug!(target: "darkwing::runtime", %step, command = ?cmd.as_std(), "Invoking runtime");
        let status = cmd
            .status()
            .await
            .map_err(|e| self.invocation_error(e))?;
        Ok(StepOutput::with_status(status.into()))
    }

    async fn wait_pid_file(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput> {
        let pid_file = rundir.pid_file();
        let contents = tokio::fs::read_to_string(&pid_file).await?;
        let pid: libc::pid_t = contents.trim().parse().map_err(|_| DarkwingError::Internal {
            message: format!("malformed pid file {}: {contents:?}", pid_file.display()),
        })?;

        tracing::debug!(pid, "Waiting for container init");

        let outcome = wait_pid(pid).await.map_err(|e| DarkwingError::Internal {
            message: format!("waitpid({pid}) failed: {e}"),
        })?;

        Ok(StepOutput::with_status(outcome))
    }

    async fn wait_child(&self) -> DarkwingResult<StepOutput> {
        let child = self.child.lock().take();
        let Some(mut child) = child else {
            return Err(DarkwingError::Internal {
                message: "wait called before create".to_string(),
            });
        };

        let status = child.wait().await?;
        Ok(StepOutput::with_status(ExitOutcome::from(status)))
    }
}

#[async_trait]
impl OciRuntime for RuncRuntime {
    async fn create(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput> {
        match self.lifecycle {
            LifecycleMode::Split => {
                self.inherited(Step::Create, self.bundle_command(rundir, "create"))
                    .await
            }
            LifecycleMode::Run => {
                let mut cmd = self.bundle_command(rundir, "run");
                tracing::debug!(target: "darkwing::runtime", step = %Step::Create, command = ?cmd.as_std(), "Invoking runtime");
                let child = cmd.spawn().map_err(|e| self.invocation_error(e))?;
                *self.child.lock() = Some(child);
                Ok(StepOutput::success())
            }
        }
    }

    async fn start(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput> {
        match self.lifecycle {
            LifecycleMode::Split => {
                let mut cmd = self.command(rundir, "start");
                cmd.arg(rundir.container_id());
                self.captured(Step::Start, cmd).await
            }
            LifecycleMode::Run => Ok(StepOutput::success()),
        }
    }

    async fn wait(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput> {
        match self.lifecycle {
            LifecycleMode::Split => self.wait_pid_file(rundir).await,
            LifecycleMode::Run => self.wait_child().await,
        }
    }

    async fn kill(&self, rundir: &RunDirectory, signal: i32) -> DarkwingResult<StepOutput> {
        let mut cmd = self.command(rundir, "kill");
        cmd.arg(rundir.container_id()).arg(signal.to_string());
        self.captured(Step::Kill, cmd).await
    }

    async fn delete(&self, rundir: &RunDirectory, force: bool) -> DarkwingResult<StepOutput> {
        let id = rundir.container_id();
        if !rundir.state_dir().join(&id).exists() {
            tracing::debug!(container_id = %id, "No runtime state to delete");
            return Ok(StepOutput::success());
        }

        let mut cmd = self.command(rundir, "delete");
        if force {
            cmd.arg("--force");
        }
        cmd.arg(id);
        self.captured(Step::Delete, cmd).await
    }

    async fn state(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput> {
        let mut cmd = self.command(rundir, "state");
        cmd.arg(rundir.container_id());
        self.captured(Step::State, cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::fixture;

    #[test]
    fn command_layout() {
        let fx = fixture("bundle = \"@BUNDLE@\"");
        let rundir = fx.loader.load("mybox", &fx.context, true).unwrap();
        let runtime = RuncRuntime::new("/usr/bin/runc").with_debug(true);

        let cmd = runtime.bundle_command(&rundir, "create");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let state = rundir.state_dir().display().to_string();
        let log = rundir.runtime_log().display().to_string();
        let bundle = rundir.path().display().to_string();
        let pid = rundir.pid_file().display().to_string();
        assert_eq!(
            args,
            vec![
                "--root",
                state.as_str(),
                "--debug",
                "--log",
                log.as_str(),
                "create",
                "--bundle",
                bundle.as_str(),
                "--pid-file",
                pid.as_str(),
                "default-mybox",
            ]
        );
    }

    #[test]
    fn context_settings_carry_over() {
        let fx = fixture("bundle = \"@BUNDLE@\"");
        let mut context = fx.context.clone();
        context.lifecycle = LifecycleMode::Run;
        context
            .environment_overrides
            .insert("XDG_RUNTIME_DIR".to_string(), "/run/user/1000".to_string());

        let runtime = RuncRuntime::from_context(&context);
        assert_eq!(runtime.binary(), Path::new("runc"));
        assert_eq!(runtime.lifecycle, LifecycleMode::Run);
        assert_eq!(runtime.env.len(), 1);
    }

    #[tokio::test]
    async fn missing_binary_is_invocation_error() {
        let fx = fixture("bundle = \"@BUNDLE@\"");
        let rundir = fx.loader.load("mybox", &fx.context, true).unwrap();
        let runtime = RuncRuntime::new(fx.temp.path().join("no-such-runc"));

        let err = runtime.create(&rundir).await.unwrap_err();
        assert!(matches!(err, DarkwingError::RuntimeInvocation { .. }));
        assert_eq!(err.exit_code(), darkwing_common::error::EXIT_NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_without_state_is_noop() {
        let fx = fixture("bundle = \"@BUNDLE@\"");
        let rundir = fx.loader.load("mybox", &fx.context, true).unwrap();
        let runtime = RuncRuntime::new(fx.temp.path().join("no-such-runc"));

        let output = runtime.delete(&rundir, true).await.unwrap();
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn wait_before_create_fails() {
        let fx = fixture("bundle = \"@BUNDLE@\"");
        let rundir = fx.loader.load("mybox", &fx.context, true).unwrap();
        let runtime = RuncRuntime::new("runc").with_lifecycle(LifecycleMode::Run);

        let err = runtime.wait(&rundir).await.unwrap_err();
        assert!(matches!(err, DarkwingError::Internal { .. }));
    }
}
