//! Context records and their resolution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use darkwing_common::{ContainerName, DEFAULT_CONTEXT, DarkwingError, DarkwingPaths, DarkwingResult, sys};
use serde::{Deserialize, Serialize};

use super::store::ConfigStore;

/// Runtime binary used when a context does not name one.
pub const DEFAULT_RUNTIME: &str = "runc";

/// How the runtime binary is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleMode {
    /// Separate `create`, `start`, wait and `delete` invocations.
    #[default]
    Split,
    /// One blocking `run` invocation covering create, start and wait.
    Run,
}

/// User and group owning a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIds {
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl UserIds {
    /// Ids of the current process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: sys::effective_uid(),
            gid: sys::effective_gid(),
        }
    }
}

/// Context record as stored in `<context>.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// DNS domain for container hostnames.
    pub domain: Option<String>,
    /// Whether containers run in a user namespace owned by `user`.
    pub rootless: Option<bool>,
    /// Host ids owning the context.
    pub user: Option<UserIds>,
    /// Runtime settings.
    pub runtime: RuntimeSection,
}

/// `[runtime]` table of a context record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// Runtime executable; bare names are looked up on `PATH`.
    pub binary: Option<PathBuf>,
    /// Base directory for run directories.
    pub state_root: Option<PathBuf>,
    /// Lifecycle mode.
    pub lifecycle: LifecycleMode,
    /// Environment applied to every runtime invocation.
    pub env: BTreeMap<String, String>,
    /// Maximum time to wait for the container, in seconds.
    pub timeout_secs: Option<u64>,
    /// Surface runtime diagnostics.
    pub debug: bool,
}

/// A fully resolved execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Context name.
    pub name: String,
    /// Runtime executable.
    pub runtime_binary_path: PathBuf,
    /// Base directory for run directories.
    pub state_root: PathBuf,
    /// Environment applied to runtime invocations.
    pub environment_overrides: BTreeMap<String, String>,
    /// Lifecycle mode.
    pub lifecycle: LifecycleMode,
    /// Optional wait bound.
    pub wait_timeout: Option<Duration>,
    /// Surface runtime diagnostics.
    pub debug: bool,
    /// DNS domain for container hostnames.
    pub domain: String,
    /// Whether containers run rootless.
    pub rootless: bool,
    /// Host ids owning the context.
    pub user: UserIds,
}

impl Context {
    /// Build a context from a stored record, filling defaults from `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::ConfigInvalid`] if required fields are empty
    /// or the state root is not writable.
    pub fn from_config(
        name: &str,
        config: ContextConfig,
        paths: &DarkwingPaths,
    ) -> DarkwingResult<Self> {
        let runtime = config.runtime;

        let runtime_binary_path = runtime
            .binary
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME));
        if runtime_binary_path.as_os_str().is_empty() {
            return Err(DarkwingError::config(
                format!("context {name}"),
                "runtime.binary is empty",
            ));
        }

        let state_root = runtime
            .state_root
            .unwrap_or_else(|| paths.state_root(name));
        if !state_root.is_absolute() {
            return Err(DarkwingError::config(
                format!("context {name}"),
                format!("runtime.state_root must be absolute: {}", state_root.display()),
            ));
        }
        if !sys::is_writable(&state_root) {
            return Err(DarkwingError::config(
                format!("context {name}"),
                format!("runtime.state_root is not writable: {}", state_root.display()),
            ));
        }

        if runtime.timeout_secs == Some(0) {
            return Err(DarkwingError::config(
                format!("context {name}"),
                "runtime.timeout_secs must be positive",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            runtime_binary_path,
            state_root,
            environment_overrides: runtime.env,
            lifecycle: runtime.lifecycle,
            wait_timeout: runtime.timeout_secs.map(Duration::from_secs),
            debug: runtime.debug,
            domain: config
                .domain
                .unwrap_or_else(|| format!("{name}.darkwing.local")),
            rootless: config.rootless.unwrap_or_else(|| !sys::is_root()),
            user: config.user.unwrap_or_else(UserIds::current),
        })
    }
}

/// Resolves context names to [`Context`] records.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    store: Arc<dyn ConfigStore>,
    paths: DarkwingPaths,
}

impl ContextResolver {
    /// Create a resolver over a store.
    pub fn new(store: Arc<dyn ConfigStore>, paths: DarkwingPaths) -> Self {
        Self { store, paths }
    }

    /// Resolve a context by name.
    ///
    /// An absent or empty name means `default`. A `default` context with no
    /// stored record resolves to built-in defaults; any other missing name
    /// is an error. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::ContextNotFound`] for unknown names and
    /// [`DarkwingError::ConfigInvalid`] for unusable records.
    pub fn resolve(&self, name: Option<&str>) -> DarkwingResult<Context> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_CONTEXT);

        if ContainerName::new(name).is_err() {
            return Err(DarkwingError::ContextNotFound {
                name: name.to_string(),
            });
        }

        let config = match self.store.find_context(name)? {
            Some(record) => record.parse::<ContextConfig>()?,
            None if name == DEFAULT_CONTEXT => {
                tracing::debug!("No stored default context, using built-in defaults");
                ContextConfig::default()
            }
            None => {
                return Err(DarkwingError::ContextNotFound {
                    name: name.to_string(),
                });
            }
        };

        let context = Context::from_config(name, config, &self.paths)?;
        tracing::debug!(
            context = %context.name,
            runtime = %context.runtime_binary_path.display(),
            state_root = %context.state_root.display(),
            "Resolved context"
        );
        Ok(context)
    }
}
