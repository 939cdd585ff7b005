//! Executor configuration.

use std::time::Duration;

use crate::config::Context;

/// How long a killed container may take to be reaped after a timeout.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);

/// Executor configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Surface runtime output and logs through tracing.
    pub debug: bool,
    /// Maximum time to wait for the container.
    pub timeout: Option<Duration>,
    /// Reap grace period after a timeout kill.
    pub kill_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl ExecutorConfig {
    /// Take debug and timeout settings from a context.
    #[must_use]
    pub fn from_context(context: &Context) -> Self {
        Self {
            debug: context.debug,
            timeout: context.wait_timeout,
            ..Self::default()
        }
    }

    /// Enable debug output.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the wait bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the reap grace period.
    #[must_use]
    pub const fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}
