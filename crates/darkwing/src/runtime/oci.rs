//! The runtime binary seam.

use std::fmt;

use async_trait::async_trait;
use darkwing_common::{DarkwingError, DarkwingResult};
use darkwing_oci::ContainerState;

use super::exit::ExitOutcome;
use crate::loader::RunDirectory;

/// A runtime lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Create the container from the bundle.
    Create,
    /// Start the user process.
    Start,
    /// Wait for the container to exit.
    Wait,
    /// Send a signal.
    Kill,
    /// Remove runtime state.
    Delete,
    /// Query runtime state.
    State,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Wait => write!(f, "wait"),
            Self::Kill => write!(f, "kill"),
            Self::Delete => write!(f, "delete"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Status and captured output of one step.
///
/// Steps that hand the terminal streams to the container leave `stdout`
/// and `stderr` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// How the step terminated. For [`Step::Wait`] this is the container's.
    pub status: ExitOutcome,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl StepOutput {
    /// A successful step with no output.
    #[must_use]
    pub const fn success() -> Self {
        Self::with_status(ExitOutcome::Exited(0))
    }

    /// A step with the given status and no output.
    #[must_use]
    pub const fn with_status(status: ExitOutcome) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Turn a failed status into [`DarkwingError::RuntimeStepFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the step did not exit with status zero.
    pub fn check(self, step: Step) -> DarkwingResult<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(DarkwingError::RuntimeStepFailed {
                step: step.to_string(),
                code: self.status.code(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }

    /// Parse the output of [`Step::State`].
    ///
    /// # Errors
    ///
    /// Returns an error if stdout is not an OCI state document.
    pub fn container_state(&self) -> DarkwingResult<ContainerState> {
        Ok(serde_json::from_str(&self.stdout)?)
    }
}

impl From<std::process::Output> for StepOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// An OCI runtime driven through its command line.
///
/// Implementations report a step that ran but failed through
/// [`StepOutput::status`]; `Err` is reserved for steps that could not be run
/// at all.
#[async_trait]
pub trait OciRuntime: Send + Sync + fmt::Debug {
    /// Create the container described by the run directory.
    async fn create(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput>;

    /// Start the created container.
    async fn start(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput>;

    /// Block until the container exits, reporting its termination.
    ///
    /// The executor keeps polling the same future while it delivers
    /// signals through [`kill`](Self::kill).
    async fn wait(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput>;

    /// Deliver a signal to the container.
    async fn kill(&self, rundir: &RunDirectory, signal: i32) -> DarkwingResult<StepOutput>;

    /// Remove the container's runtime state.
    async fn delete(&self, rundir: &RunDirectory, force: bool) -> DarkwingResult<StepOutput>;

    /// Query the container's runtime state.
    async fn state(&self, rundir: &RunDirectory) -> DarkwingResult<StepOutput>;
}
