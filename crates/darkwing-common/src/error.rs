//! Common error types for darkwing.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`DarkwingError`].
pub type DarkwingResult<T> = Result<T, DarkwingError>;

/// Process exit status used for setup and runtime failures.
pub const EXIT_SETUP_FAILURE: u8 = 125;
/// Process exit status used when the runtime binary cannot be executed.
pub const EXIT_CANNOT_INVOKE: u8 = 126;
/// Process exit status used when the runtime binary does not exist.
pub const EXIT_NOT_FOUND: u8 = 127;
/// Process exit status used when the wait bound was exceeded.
pub const EXIT_TIMEOUT: u8 = 124;

/// Errors raised while resolving, preparing and supervising a container run.
#[derive(Error, Diagnostic, Debug)]
pub enum DarkwingError {
    /// No stored configuration matches the context name.
    #[error("Context not found: {name}")]
    #[diagnostic(
        code(darkwing::context::not_found),
        help("Create {name}.toml in ./.darkwing or the darkwing config directory")
    )]
    ContextNotFound {
        /// The context name that was looked up.
        name: String,
    },

    /// Stored configuration exists but cannot be used.
    #[error("Invalid configuration for {subject}: {message}")]
    #[diagnostic(code(darkwing::config::invalid))]
    ConfigInvalid {
        /// What was being configured (context or container name).
        subject: String,
        /// Why it was rejected.
        message: String,
    },

    /// No container definition matches the name in the context.
    #[error("Container not found: {name} (context {context})")]
    #[diagnostic(code(darkwing::container::not_found))]
    ContainerNotFound {
        /// The container name.
        name: String,
        /// The context it was looked up in.
        context: String,
    },

    /// Container name fails validation.
    #[error("Invalid container name: {name}")]
    #[diagnostic(
        code(darkwing::container::invalid_name),
        help("Container names must be alphanumeric with '-', '_' or '.', 1-64 characters")
    )]
    InvalidContainerName {
        /// The rejected name.
        name: String,
    },

    /// A run directory already exists for this container and context.
    #[error("Run directory already exists: {}", .path.display())]
    #[diagnostic(
        code(darkwing::rundir::conflict),
        help("If no run is active, remove it with `darkwing rm`")
    )]
    RunDirectoryConflict {
        /// The existing run directory.
        path: PathBuf,
        /// Whether the owning run looks dead or never finished setup.
        stale: bool,
    },

    /// An existing run directory was required but none was found.
    #[error("No run directory at {}", .path.display())]
    #[diagnostic(code(darkwing::rundir::not_found))]
    RunDirectoryNotFound {
        /// The expected run directory.
        path: PathBuf,
    },

    /// The run directory belongs to a run that still looks alive.
    #[error("Container {id} is still active ({status})")]
    #[diagnostic(
        code(darkwing::rundir::active),
        help("Pass --force to remove it anyway")
    )]
    ContainerActive {
        /// The runtime container id.
        id: String,
        /// Why it is considered active.
        status: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(darkwing::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(darkwing::serialization))]
    Serialization(String),

    /// The runtime binary could not be launched at all.
    #[error("Failed to invoke runtime {}: {source}", .binary.display())]
    #[diagnostic(
        code(darkwing::runtime::invocation),
        help("Check runtime.binary in the context configuration")
    )]
    RuntimeInvocation {
        /// The binary that was executed.
        binary: PathBuf,
        /// The spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A runtime step ran but reported failure.
    #[error("Runtime {step} failed with status {code}: {stderr}")]
    #[diagnostic(code(darkwing::runtime::step_failed))]
    RuntimeStepFailed {
        /// The lifecycle step (create, start, ...).
        step: String,
        /// The mapped exit status of the runtime process.
        code: i32,
        /// Captured diagnostic output.
        stderr: String,
    },

    /// The container outlived the configured wait bound.
    #[error("Container {id} did not exit within {seconds}s")]
    #[diagnostic(code(darkwing::runtime::timeout))]
    TimeoutExceeded {
        /// The runtime container id.
        id: String,
        /// The configured bound.
        seconds: u64,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(darkwing::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl DarkwingError {
    /// Shorthand for [`DarkwingError::ConfigInvalid`].
    pub fn config(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// The process exit status this error maps to.
    ///
    /// Launcher failures use the 124-127 band of shell conventions.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::TimeoutExceeded { .. } => EXIT_TIMEOUT,
            Self::RuntimeInvocation { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                EXIT_NOT_FOUND
            }
            Self::RuntimeInvocation { .. } => EXIT_CANNOT_INVOKE,
            _ => EXIT_SETUP_FAILURE,
        }
    }
}

impl From<serde_json::Error> for DarkwingError {
    fn from(err: serde_json::Error) -> Self {
        DarkwingError::Serialization(err.to_string())
    }
}
