//! Supervision of the external runtime binary.
//!
//! [`RuntimeExecutor`] drives one container through the runtime's
//! lifecycle; [`OciRuntime`] is the seam to the runtime binary, implemented
//! for runc-compatible runtimes by [`RuncRuntime`].

mod config;
mod executor;
mod exit;
mod handle;
mod oci;
mod runc;

pub use config::ExecutorConfig;
pub use executor::RuntimeExecutor;
pub use exit::ExitOutcome;
pub use handle::{RunHandle, RunState};
pub use oci::{OciRuntime, Step, StepOutput};
pub use runc::RuncRuntime;
