//! # darkwing-common
//!
//! Shared types for the darkwing container launcher.
//!
//! This crate provides functionality used across all darkwing crates:
//! - Container name validation and runtime ids
//! - Standard filesystem paths
//! - Small process and permission helpers
//! - The common error type

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;
pub mod sys;

pub use error::{DarkwingError, DarkwingResult};
pub use id::{ContainerName, DEFAULT_CONTEXT};
pub use paths::DarkwingPaths;
