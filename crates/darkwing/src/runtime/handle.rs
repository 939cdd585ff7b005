//! In-memory lifecycle tracking for one supervised run.

use std::fmt;

use darkwing_common::{DarkwingError, DarkwingResult};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Handle exists, runtime not yet asked to create.
    Created,
    /// The runtime created the container.
    Started,
    /// The user process is running.
    Running,
    /// The container exited; the exit code is known.
    Exited,
    /// Runtime state and run directory were removed.
    Deleted,
    /// A step failed or the wait bound was exceeded.
    Failed,
}

impl RunState {
    /// Whether the state machine allows moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Started)
                | (Self::Started, Self::Running)
                | (Self::Running, Self::Exited)
                | (Self::Exited, Self::Deleted)
                | (Self::Created | Self::Started | Self::Running, Self::Failed)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Deleted => write!(f, "deleted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks one execution from creation to exit or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    container_id: String,
    state: RunState,
    exit_code: Option<i32>,
}

impl RunHandle {
    /// A fresh handle in [`RunState::Created`].
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            state: RunState::Created,
            exit_code: None,
        }
    }

    /// Runtime container id.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Exit code, once the container exited.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::Internal`] for transitions the state machine
    /// does not allow.
    pub fn advance(&mut self, next: RunState) -> DarkwingResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DarkwingError::Internal {
                message: format!(
                    "invalid run transition {} -> {next} for {}",
                    self.state, self.container_id
                ),
            });
        }
        tracing::debug!(container_id = %self.container_id, from = %self.state, to = %next, "Run state changed");
        self.state = next;
        Ok(())
    }

    /// Record the container's exit.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::Internal`] unless the handle is running.
    pub fn exited(&mut self, code: i32) -> DarkwingResult<()> {
        self.advance(RunState::Exited)?;
        self.exit_code = Some(code);
        Ok(())
    }

    /// Mark the run failed, if it has not already finished.
    pub fn fail(&mut self) {
        if self.state.can_transition_to(RunState::Failed) {
            self.state = RunState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut handle = RunHandle::new("default-mybox");
        handle.advance(RunState::Started).unwrap();
        handle.advance(RunState::Running).unwrap();
        handle.exited(17).unwrap();
        assert_eq!(handle.exit_code(), Some(17));
        handle.advance(RunState::Deleted).unwrap();
        assert!(handle.state().is_terminal());
    }

    #[test]
    fn no_skipping_states() {
        let mut handle = RunHandle::new("default-mybox");
        assert!(handle.advance(RunState::Running).is_err());
        assert!(handle.exited(0).is_err());
        assert_eq!(handle.exit_code(), None);
        assert_eq!(handle.state(), RunState::Created);
    }

    #[test]
    fn fail_keeps_finished_runs() {
        let mut handle = RunHandle::new("default-mybox");
        handle.advance(RunState::Started).unwrap();
        handle.fail();
        assert_eq!(handle.state(), RunState::Failed);

        let mut handle = RunHandle::new("default-mybox");
        handle.advance(RunState::Started).unwrap();
        handle.advance(RunState::Running).unwrap();
        handle.exited(0).unwrap();
        handle.fail();
        assert_eq!(handle.state(), RunState::Exited);
    }

    #[test]
    fn deleted_only_after_exit() {
        assert!(!RunState::Failed.can_transition_to(RunState::Deleted));
        assert!(!RunState::Running.can_transition_to(RunState::Deleted));
        assert!(RunState::Exited.can_transition_to(RunState::Deleted));
    }
}
