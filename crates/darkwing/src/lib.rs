//! # Darkwing
//!
//! Darkwing launches a single named container through an external
//! OCI runtime such as `runc`, supervises it to completion and reports
//! its exit code.
//!
//! ## Components
//!
//! - **Contexts**: named runtime environments resolved from TOML files
//! - **Loader**: renders a container definition into a private run directory
//! - **Runtime**: drives the OCI runtime's create/start/wait/delete lifecycle
//! - **Driver**: ties the three together for a `name[:context]` target
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use darkwing::Driver;
//! use darkwing::config::FsConfigStore;
//! use darkwing_common::DarkwingPaths;
//!
//! # async fn example() -> darkwing_common::DarkwingResult<()> {
//! let paths = DarkwingPaths::new();
//! let store = FsConfigStore::from_paths(&paths);
//! let driver = Driver::new(Arc::new(store), paths);
//!
//! let exit_code = driver.execute("mybox:ci").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod loader;
pub mod runtime;

pub use driver::{Driver, DriverOptions, Target, parse_target};
