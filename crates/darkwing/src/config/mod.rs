//! Stored configuration: contexts and container definitions.

pub mod container;
pub mod context;
pub mod store;

pub use container::{ContainerConfig, MountConfig, MountKind};
pub use context::{Context, ContextConfig, ContextResolver, LifecycleMode, UserIds};
pub use store::{ConfigKey, ConfigRecord, ConfigStore, FsConfigStore, MemoryConfigStore};
