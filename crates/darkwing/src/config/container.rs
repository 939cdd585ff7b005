//! Container definitions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default in-container directory for the secrets mount.
pub const DEFAULT_SECRETS_TARGET: &str = "/run/secrets";

/// Container definition as stored in `<context>/<name>.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    /// Bundle directory holding `config.json` and the unpacked rootfs.
    pub bundle: PathBuf,
    /// Container hostname, defaulting to `<name>.<context domain>`.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Process overrides.
    #[serde(default)]
    pub process: ProcessConfig,
    /// Environment overrides.
    #[serde(default)]
    pub env: EnvConfig,
    /// Capability overrides.
    #[serde(default)]
    pub caps: CapsConfig,
    /// Extra mounts.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    /// Where the run directory's secrets are mounted.
    #[serde(default = "default_secrets_target")]
    pub secrets_target: PathBuf,
}

fn default_secrets_target() -> PathBuf {
    PathBuf::from(DEFAULT_SECRETS_TARGET)
}

impl ContainerConfig {
    /// A definition with only a bundle set.
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
            hostname: None,
            process: ProcessConfig::default(),
            env: EnvConfig::default(),
            caps: CapsConfig::default(),
            mounts: Vec::new(),
            secrets_target: default_secrets_target(),
        }
    }

    /// Path of the bundle's base `config.json`.
    #[must_use]
    pub fn bundle_spec(&self) -> PathBuf {
        self.bundle.join("config.json")
    }
}

/// `[process]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// Replaces the first argument of the bundle's process.
    pub cmd: Option<String>,
    /// Replaces the remaining arguments of the bundle's process.
    pub args: Option<Vec<String>>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Allocate a terminal.
    pub terminal: bool,
    /// User id inside the container; the bundle's when unset.
    pub uid: Option<u32>,
    /// Group id inside the container; the bundle's when unset.
    pub gid: Option<u32>,
}

/// `[env]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    /// `NAME=value` sets, bare `NAME` unsets.
    pub vars: Vec<String>,
    /// `NAME[=default]` copied from the host environment.
    pub host: Vec<String>,
}

/// `[caps]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapsConfig {
    /// Capabilities added to every set.
    pub add: Vec<String>,
    /// Capabilities removed from every set.
    pub drop: Vec<String>,
}

/// Where a mount source is resolved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// `source` is an absolute host path.
    #[default]
    Bind,
    /// `source` is relative to the run directory's `volumes/`.
    Runtime,
}

/// One `[[mounts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Host path, or a name under `volumes/` for runtime mounts.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: PathBuf,
    /// Source kind.
    #[serde(rename = "type", default)]
    pub kind: MountKind,
    /// Mount read-only.
    #[serde(default)]
    pub readonly: bool,
}

impl MountConfig {
    /// Host path of the mount source.
    #[must_use]
    pub fn host_source(&self, volumes: &Path) -> PathBuf {
        match self.kind {
            MountKind::Bind => self.source.clone(),
            MountKind::Runtime => volumes.join(&self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_definition() {
        let config: ContainerConfig = toml::from_str("bundle = \"/srv/bundles/mybox\"").unwrap();
        assert_eq!(config, ContainerConfig::new("/srv/bundles/mybox"));
        assert_eq!(config.secrets_target, PathBuf::from("/run/secrets"));
        assert_eq!(config.bundle_spec(), PathBuf::from("/srv/bundles/mybox/config.json"));
    }

    #[test]
    fn full_definition() {
        let config: ContainerConfig = toml::from_str(
            r#"
            bundle = "/srv/bundles/web"
            hostname = "web"
            secrets_target = "/secrets"

            [process]
            cmd = "/usr/bin/nginx"
            args = ["-g", "daemon off;"]
            cwd = "/srv"
            uid = 101
            gid = 101

            [env]
            vars = ["APP_MODE=prod", "DEBUG"]
            host = ["TZ=UTC"]

            [caps]
            add = ["CAP_NET_BIND_SERVICE"]
            drop = ["CAP_NET_RAW"]

            [[mounts]]
            source = "/srv/www"
            target = "/var/www"
            readonly = true

            [[mounts]]
            source = "cache"
            target = "/var/cache/nginx"
            type = "runtime"
            "#,
        )
        .unwrap();

        assert_eq!(config.process.cmd.as_deref(), Some("/usr/bin/nginx"));
        assert_eq!(config.process.uid, Some(101));
        assert_eq!(config.env.host, vec!["TZ=UTC".to_string()]);
        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].kind, MountKind::Bind);
        assert_eq!(
            config.mounts[1].host_source(Path::new("/run/dw/mybox/volumes")),
            PathBuf::from("/run/dw/mybox/volumes/cache")
        );
    }

    #[test]
    fn unknown_mount_type_rejected() {
        let result: Result<ContainerConfig, _> = toml::from_str(
            r#"
            bundle = "/b"
            [[mounts]]
            source = "x"
            target = "/x"
            type = "shared"
            "#,
        );
        assert!(result.is_err());
    }
}
