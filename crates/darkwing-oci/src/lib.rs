//! # darkwing-oci
//!
//! OCI (Open Container Initiative) specification types for darkwing.
//!
//! This crate provides Rust types for:
//! - OCI Runtime Specification (config.json), round-tripping unknown fields
//! - Container state as reported by the runtime
//! - Spec rewriting helpers used when rendering a run bundle

#![warn(missing_docs)]

pub mod patch;
pub mod runtime;
pub mod state;

pub use runtime::Spec;
pub use state::{ContainerState, ContainerStatus};
