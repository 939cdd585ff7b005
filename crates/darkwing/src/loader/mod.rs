//! Container loading and run directory management.
//!
//! A run directory is `<state_root>/<container>` and holds everything the
//! runtime binary needs for one execution:
//!
//! ```text
//! config.json     rendered bundle spec
//! state/          runtime --root
//! container.pid   init pid written by the runtime
//! secrets/        mounted read-only at the secrets target
//! volumes/        sources of `type = "runtime"` mounts
//! resolv.conf     copy of the host resolver configuration
//! hostname        container hostname
//! runtime.log     runtime diagnostics (debug only)
//! run.json        marker, written last
//! ```
//!
//! Creation is guarded by an atomic `mkdir`, so two launches of the same
//! container in one context never share a directory. A directory without a
//! marker is a partial leftover and is reported as stale.

pub mod bundle;

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use darkwing_common::id::runtime_id;
use darkwing_common::{ContainerName, DarkwingError, DarkwingResult, sys};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigStore, ContainerConfig, Context, MountKind};

/// Host file copied into each run directory.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

const SPEC_FILE: &str = "config.json";
const STATE_DIR: &str = "state";
const PID_FILE: &str = "container.pid";
const SECRETS_DIR: &str = "secrets";
const VOLUMES_DIR: &str = "volumes";
const RESOLV_CONF_FILE: &str = "resolv.conf";
const HOSTNAME_FILE: &str = "hostname";
const RUNTIME_LOG: &str = "runtime.log";
const MARKER_FILE: &str = "run.json";

/// Marker proving a run directory was fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    /// Container name.
    pub container: String,
    /// Context name.
    pub context: String,
    /// Pid of the launcher that created the directory.
    pub owner_pid: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Handle to a run directory on disk.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
    created: bool,
    container: ContainerName,
    context: Context,
    definition: ContainerConfig,
}

impl RunDirectory {
    /// Root of the run directory, also used as the runtime bundle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this invocation created the directory.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.created
    }

    /// Container name.
    #[must_use]
    pub const fn container(&self) -> &ContainerName {
        &self.container
    }

    /// Context the directory belongs to.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Container definition it was rendered from.
    #[must_use]
    pub const fn definition(&self) -> &ContainerConfig {
        &self.definition
    }

    /// Id the runtime knows the container by.
    #[must_use]
    pub fn container_id(&self) -> String {
        runtime_id(&self.context.name, &self.container)
    }

    /// Container hostname.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.definition
            .hostname
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.container, self.context.domain))
    }

    /// Rendered `config.json`.
    #[must_use]
    pub fn spec_path(&self) -> PathBuf {
        self.path.join(SPEC_FILE)
    }

    /// Directory passed to the runtime as `--root`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.path.join(STATE_DIR)
    }

    /// File the runtime writes the init pid to.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.path.join(PID_FILE)
    }

    /// Secrets directory.
    #[must_use]
    pub fn secrets_dir(&self) -> PathBuf {
        self.path.join(SECRETS_DIR)
    }

    /// Runtime volumes directory.
    #[must_use]
    pub fn volumes_dir(&self) -> PathBuf {
        self.path.join(VOLUMES_DIR)
    }

    /// Copied resolver configuration.
    #[must_use]
    pub fn resolv_conf(&self) -> PathBuf {
        self.path.join(RESOLV_CONF_FILE)
    }

    /// Hostname file.
    #[must_use]
    pub fn hostname_file(&self) -> PathBuf {
        self.path.join(HOSTNAME_FILE)
    }

    /// Runtime diagnostics log.
    #[must_use]
    pub fn runtime_log(&self) -> PathBuf {
        self.path.join(RUNTIME_LOG)
    }

    /// Marker file.
    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        self.path.join(MARKER_FILE)
    }

    /// Read the marker, if the directory was fully populated.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read or parsed.
    pub fn marker(&self) -> DarkwingResult<Option<RunMarker>> {
        read_marker(&self.path)
    }

    /// Whether no live launcher owns the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read or parsed.
    pub fn is_stale(&self) -> DarkwingResult<bool> {
        Ok(marker_is_stale(self.marker()?.as_ref()))
    }

    /// Remove the directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for a reason other than the
    /// directory already being gone.
    pub fn remove(&self) -> DarkwingResult<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed run directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_marker(dir: &Path) -> DarkwingResult<Option<RunMarker>> {
    match std::fs::read_to_string(dir.join(MARKER_FILE)) {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn marker_is_stale(marker: Option<&RunMarker>) -> bool {
    marker.is_none_or(|m| !sys::process_alive(m.owner_pid))
}

/// Locates container definitions and prepares run directories.
#[derive(Debug, Clone)]
pub struct ContainerLoader {
    store: Arc<dyn ConfigStore>,
    host_resolv_conf: PathBuf,
    host_env: Option<BTreeMap<String, String>>,
}

impl ContainerLoader {
    /// Create a loader over a configuration store.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            host_resolv_conf: PathBuf::from(HOST_RESOLV_CONF),
            host_env: None,
        }
    }

    /// Copy resolver configuration from another file.
    #[must_use]
    pub fn with_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_resolv_conf = path.into();
        self
    }

    /// Use a fixed host environment instead of the process environment.
    #[must_use]
    pub fn with_host_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.host_env = Some(env);
        self
    }

    /// Locate a container definition and prepare its run directory.
    ///
    /// With `make_rundir` a fresh directory is created and populated; an
    /// existing one is a conflict. Without it the directory must already
    /// exist and is returned untouched.
    ///
    /// # Errors
    ///
    /// - [`DarkwingError::InvalidContainerName`] for malformed names
    /// - [`DarkwingError::ContainerNotFound`] if no definition exists
    /// - [`DarkwingError::RunDirectoryConflict`] if the directory exists
    /// - [`DarkwingError::RunDirectoryNotFound`] if reuse finds nothing
    /// - [`DarkwingError::ConfigInvalid`] or I/O errors while populating
    pub fn load(
        &self,
        name: &str,
        context: &Context,
        make_rundir: bool,
    ) -> DarkwingResult<RunDirectory> {
        let container = ContainerName::new(name)?;
        let definition = self.definition(&container, context)?;

        let rundir = RunDirectory {
            path: context.state_root.join(container.as_str()),
            created: make_rundir,
            container,
            context: context.clone(),
            definition,
        };

        if make_rundir {
            self.create(&rundir)?;
        } else if !rundir.path.is_dir() {
            return Err(DarkwingError::RunDirectoryNotFound { path: rundir.path });
        }

        tracing::debug!(
            container = %rundir.container,
            context = %context.name,
            path = %rundir.path.display(),
            created = rundir.created,
            "Loaded container"
        );

        Ok(rundir)
    }

    /// Remove a left-behind run directory.
    ///
    /// Without `force` the directory must be stale: its marker is missing
    /// or the launcher that wrote it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DarkwingError::ContainerActive`] if the owner is alive and
    /// `force` is not set, plus any error from [`Self::load`].
    pub fn remove_stale(&self, name: &str, context: &Context, force: bool) -> DarkwingResult<()> {
        let rundir = self.load(name, context, false)?;

        if !force {
            if let Some(marker) = rundir.marker()? {
                if sys::process_alive(marker.owner_pid) {
                    return Err(DarkwingError::ContainerActive {
                        id: rundir.container_id(),
                        status: format!("owned by pid {}", marker.owner_pid),
                    });
                }
            }
        }

        rundir.remove()?;
        tracing::info!(container = %rundir.container, context = %context.name, "Removed run directory");
        Ok(())
    }

    fn definition(&self, name: &ContainerName, context: &Context) -> DarkwingResult<ContainerConfig> {
        let record = self
            .store
            .find_container(&context.name, name.as_str())?
            .ok_or_else(|| DarkwingError::ContainerNotFound {
                name: name.to_string(),
                context: context.name.clone(),
            })?;

        let definition: ContainerConfig = record.parse()?;
        bundle::check_bundle_path(&record.origin, &definition.bundle)?;
        bundle::check_mounts(&record.origin, &definition.mounts)?;
        Ok(definition)
    }

    fn create(&self, rundir: &RunDirectory) -> DarkwingResult<()> {
        std::fs::create_dir_all(&rundir.context.state_root)?;

        match std::fs::create_dir(&rundir.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let stale = read_marker(&rundir.path)
                    .map(|m| marker_is_stale(m.as_ref()))
                    .unwrap_or(true);
                return Err(DarkwingError::RunDirectoryConflict {
                    path: rundir.path.clone(),
                    stale,
                });
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.populate(rundir) {
            if let Err(cleanup) = rundir.remove() {
                tracing::warn!(
                    path = %rundir.path.display(),
                    error = %cleanup,
                    "Failed to remove partial run directory"
                );
            }
            return Err(e);
        }

        Ok(())
    }

    fn populate(&self, rundir: &RunDirectory) -> DarkwingResult<()> {
        set_mode(&rundir.path, 0o770)?;
        for (dir, mode) in [
            (rundir.state_dir(), 0o700),
            (rundir.secrets_dir(), 0o700),
            (rundir.volumes_dir(), 0o770),
        ] {
            std::fs::create_dir(&dir)?;
            set_mode(&dir, mode)?;
        }

        let volumes = rundir.volumes_dir();
        for mount in &rundir.definition.mounts {
            if mount.kind == MountKind::Runtime {
                std::fs::create_dir_all(mount.host_source(&volumes))?;
            }
        }

        match std::fs::read(&self.host_resolv_conf) {
            Ok(contents) => std::fs::write(rundir.resolv_conf(), contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.host_resolv_conf.display(),
                    "No host resolver configuration, writing an empty one"
                );
                std::fs::write(rundir.resolv_conf(), "")?;
            }
            Err(e) => return Err(e.into()),
        }
        std::fs::write(rundir.hostname_file(), format!("{}\n", rundir.hostname()))?;

        let spec = match &self.host_env {
            Some(env) => bundle::render(rundir, |name| env.get(name).cloned()),
            None => bundle::render(rundir, |name| std::env::var(name).ok()),
        }?;
        spec.save(&rundir.spec_path())?;

        let marker = RunMarker {
            container: rundir.container.to_string(),
            context: rundir.context.name.clone(),
            owner_pid: std::process::id(),
            created_at: Utc::now(),
        };
        std::fs::write(rundir.marker_path(), serde_json::to_string_pretty(&marker)?)?;

        Ok(())
    }
}

fn set_mode(path: &Path, mode: u32) -> DarkwingResult<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}
