//! Lookup of stored context and container records.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use darkwing_common::paths::{container_file, context_file};
use darkwing_common::{DarkwingPaths, DarkwingResult};

/// Key of a stored configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// A context record, by context name.
    Context(String),
    /// A container definition inside a context.
    Container {
        /// Context the definition belongs to.
        context: String,
        /// Container name.
        name: String,
    },
}

impl ConfigKey {
    /// Key for a context record.
    pub fn context(name: impl Into<String>) -> Self {
        Self::Context(name.into())
    }

    /// Key for a container definition.
    pub fn container(context: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Container {
            context: context.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(name) => write!(f, "context {name}"),
            Self::Container { context, name } => write!(f, "container {name} (context {context})"),
        }
    }
}

/// A raw TOML record returned by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Where the record came from, for error messages.
    pub origin: String,
    /// TOML document.
    pub contents: String,
}

impl ConfigRecord {
    /// Parse the record into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::ConfigInvalid`](darkwing_common::DarkwingError::ConfigInvalid)
    /// if the TOML is malformed or does not match `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> DarkwingResult<T> {
        toml::from_str(&self.contents)
            .map_err(|e| darkwing_common::DarkwingError::config(&self.origin, e.to_string()))
    }
}

/// Storage backend for named contexts and container definitions.
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Find a record by key, returning `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while reading.
    fn find(&self, key: &ConfigKey) -> DarkwingResult<Option<ConfigRecord>>;

    /// Find a context record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while reading.
    fn find_context(&self, name: &str) -> DarkwingResult<Option<ConfigRecord>> {
        self.find(&ConfigKey::context(name))
    }

    /// Find a container definition inside a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while reading.
    fn find_container(&self, context: &str, name: &str) -> DarkwingResult<Option<ConfigRecord>> {
        self.find(&ConfigKey::container(context, name))
    }
}

/// Store reading `<context>.toml` and `<context>/<name>.toml` files.
///
/// Directories are searched in order and the first hit wins.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    dirs: Vec<PathBuf>,
}

impl FsConfigStore {
    /// Create a store over explicit directories.
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a store over `./.darkwing` and the configuration base.
    #[must_use]
    pub fn from_paths(paths: &DarkwingPaths) -> Self {
        Self::new(paths.search_dirs())
    }

    /// Directories searched, highest priority first.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn candidate(&self, dir: &std::path::Path, key: &ConfigKey) -> PathBuf {
        match key {
            ConfigKey::Context(name) => context_file(dir, name),
            ConfigKey::Container { context, name } => container_file(dir, context, name),
        }
    }
}

impl ConfigStore for FsConfigStore {
    fn find(&self, key: &ConfigKey) -> DarkwingResult<Option<ConfigRecord>> {
        for dir in &self.dirs {
            let path = self.candidate(dir, key);
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    tracing::debug!(%key, path = %path.display(), "Found configuration");
                    return Ok(Some(ConfigRecord {
                        origin: path.display().to_string(),
                        contents,
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    records: HashMap<ConfigKey, String>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context record.
    #[must_use]
    pub fn with_context(mut self, name: &str, toml: &str) -> Self {
        self.records.insert(ConfigKey::context(name), toml.to_string());
        self
    }

    /// Add a container definition.
    #[must_use]
    pub fn with_container(mut self, context: &str, name: &str, toml: &str) -> Self {
        self.records
            .insert(ConfigKey::container(context, name), toml.to_string());
        self
    }
}

impl ConfigStore for MemoryConfigStore {
    fn find(&self, key: &ConfigKey) -> DarkwingResult<Option<ConfigRecord>> {
        Ok(self.records.get(key).map(|contents| ConfigRecord {
            origin: key.to_string(),
            contents: contents.clone(),
        }))
    }
}
