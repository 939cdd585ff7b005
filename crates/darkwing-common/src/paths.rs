//! Standard filesystem paths for darkwing.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::sys;

/// Explicit configuration directory, overriding the per-user default.
pub static DARKWING_CONFIG_DIR: Lazy<Option<PathBuf>> =
    Lazy::new(|| std::env::var_os("DARKWING_CONFIG_DIR").map(PathBuf::from));

/// Explicit runtime directory, overriding the per-user default.
pub static DARKWING_RUNTIME_DIR: Lazy<Option<PathBuf>> =
    Lazy::new(|| std::env::var_os("DARKWING_RUNTIME_DIR").map(PathBuf::from));

/// Name of the per-project configuration directory searched first.
pub const LOCAL_CONFIG_DIR: &str = ".darkwing";

/// Standard paths used by darkwing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DarkwingPaths {
    /// Configuration base (default: /etc/darkwing, or ~/.darkwing rootless).
    pub config: PathBuf,
    /// Runtime base holding run directories (default: /run/darkwing).
    pub runtime: PathBuf,
}

impl DarkwingPaths {
    /// Paths for the current user, honouring the environment overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths for a root or rootless installation, ignoring overrides.
    #[must_use]
    pub fn for_user(rootless: bool, uid: u32) -> Self {
        let config = if rootless {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(LOCAL_CONFIG_DIR)
        } else {
            PathBuf::from("/etc/darkwing")
        };

        Self {
            config,
            runtime: default_runtime_dir(uid),
        }
    }

    /// Create paths with a custom configuration directory.
    #[must_use]
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = config.into();
        self
    }

    /// Create paths with a custom runtime directory.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Directories searched for configuration, highest priority first.
    #[must_use]
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(2);
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd.join(LOCAL_CONFIG_DIR));
        }
        dirs.push(self.config.clone());
        dirs
    }

    /// Default state root for a context.
    #[must_use]
    pub fn state_root(&self, context: &str) -> PathBuf {
        self.runtime.join(context)
    }
}

impl Default for DarkwingPaths {
    fn default() -> Self {
        let paths = Self::for_user(!sys::is_root(), sys::effective_uid());
        Self {
            config: DARKWING_CONFIG_DIR.clone().unwrap_or(paths.config),
            runtime: DARKWING_RUNTIME_DIR.clone().unwrap_or(paths.runtime),
        }
    }
}

/// Context configuration file inside a search directory.
#[must_use]
pub fn context_file(dir: &Path, context: &str) -> PathBuf {
    dir.join(format!("{context}.toml"))
}

/// Container configuration file inside a search directory.
#[must_use]
pub fn container_file(dir: &Path, context: &str, container: &str) -> PathBuf {
    dir.join(context).join(format!("{container}.toml"))
}

/// Per-user runtime directory.
///
/// `$XDG_RUNTIME_DIR/darkwing` when set, otherwise `/run/user/<uid>/darkwing`
/// for unprivileged users and `/run/darkwing` for root.
#[must_use]
pub fn default_runtime_dir(uid: u32) -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("darkwing"),
        _ if uid != 0 => PathBuf::from("/run/user").join(uid.to_string()).join("darkwing"),
        _ => PathBuf::from("/run/darkwing"),
    }
}
