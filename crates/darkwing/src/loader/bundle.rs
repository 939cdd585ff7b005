//! Rendering a container definition onto its bundle's `config.json`.

use std::path::{Component, Path};

use darkwing_common::{DarkwingError, DarkwingResult};
use darkwing_oci::Spec;
use darkwing_oci::patch::{bind_mount, merge_mounts, remap_ids, update_capabilities, update_environment};

use super::RunDirectory;
use crate::config::{LifecycleMode, MountConfig, MountKind};

/// In-container path of the copied resolver configuration.
pub const RESOLV_CONF_TARGET: &str = "/etc/resolv.conf";
/// In-container path of the hostname file.
pub const HOSTNAME_TARGET: &str = "/etc/hostname";

/// Produce the spec the runtime will see for `rundir`.
///
/// `lookup` reads the host environment for `env.host` entries.
///
/// # Errors
///
/// Returns [`DarkwingError::ConfigInvalid`] if the bundle spec is missing or
/// unusable, or the definition asks for something the context cannot do.
pub fn render<F>(rundir: &RunDirectory, lookup: F) -> DarkwingResult<Spec>
where
    F: Fn(&str) -> Option<String>,
{
    let definition = rundir.definition();
    let context = rundir.context();
    let subject = format!("container {}", rundir.container());
    let invalid = |message: String| DarkwingError::config(subject.clone(), message);

    let spec_path = definition.bundle_spec();
    let mut spec = match Spec::load(&spec_path) {
        Ok(spec) => spec,
        Err(DarkwingError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(invalid(format!(
                "bundle spec not found: {}",
                spec_path.display()
            )));
        }
        Err(DarkwingError::Serialization(message)) => {
            return Err(invalid(format!("{}: {message}", spec_path.display())));
        }
        Err(e) => return Err(e),
    };

    let root = spec
        .root
        .as_mut()
        .ok_or_else(|| invalid("bundle spec has no root".to_string()))?;
    if root.path.is_relative() {
        root.path = definition.bundle.join(&root.path);
    }

    spec.hostname = Some(rundir.hostname());

    let process = spec
        .process
        .as_mut()
        .ok_or_else(|| invalid("bundle spec has no process".to_string()))?;
    let overrides = &definition.process;

    if overrides.terminal && context.lifecycle == LifecycleMode::Split {
        return Err(invalid(
            "process.terminal needs runtime.lifecycle = \"run\"".to_string(),
        ));
    }
    process.terminal = overrides.terminal;
    if let Some(uid) = overrides.uid {
        process.user.uid = uid;
    }
    if let Some(gid) = overrides.gid {
        process.user.gid = gid;
    }
    let user = (process.user.uid, process.user.gid);

    if let Some(cwd) = &overrides.cwd {
        process.cwd.clone_from(cwd);
    }
    if let Some(cmd) = &overrides.cmd {
        match process.args.first_mut() {
            Some(first) => first.clone_from(cmd),
            None => process.args.push(cmd.clone()),
        }
    }
    if let Some(args) = &overrides.args {
        process.args.truncate(1);
        process.args.extend(args.iter().cloned());
    }
    if process.args.is_empty() {
        return Err(invalid("process has no command".to_string()));
    }

    let caps = &definition.caps;
    if !caps.add.is_empty() || !caps.drop.is_empty() {
        update_capabilities(
            process.capabilities.get_or_insert_with(Default::default),
            &caps.add,
            &caps.drop,
        );
    }

    process.env = update_environment(&process.env, &definition.env.vars, &definition.env.host, lookup);

    let volumes = rundir.volumes_dir();
    let mut mounts = Vec::with_capacity(definition.mounts.len() + 3);
    for mount in &definition.mounts {
        if mount.kind == MountKind::Bind && mount.source.is_relative() {
            return Err(invalid(format!(
                "bind mount source must be absolute: {}",
                mount.source.display()
            )));
        }
        mounts.push(bind_mount(
            mount.host_source(&volumes),
            &mount.target,
            mount.readonly,
        ));
    }
    mounts.push(bind_mount(rundir.secrets_dir(), &definition.secrets_target, true));
    mounts.push(bind_mount(rundir.resolv_conf(), RESOLV_CONF_TARGET, true));
    mounts.push(bind_mount(rundir.hostname_file(), HOSTNAME_TARGET, false));
    merge_mounts(&mut spec.mounts, mounts);

    if context.rootless {
        if let Some(linux) = spec.linux.as_mut() {
            remap_ids(&mut linux.uid_mappings, user.0, context.user.uid);
            remap_ids(&mut linux.gid_mappings, user.1, context.user.gid);
        }
    }

    Ok(spec)
}

/// Whether `path` is usable as a bundle directory reference.
pub(crate) fn check_bundle_path(subject: &str, path: &Path) -> DarkwingResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(DarkwingError::config(
            subject,
            format!("bundle must be an absolute path: {}", path.display()),
        ))
    }
}

/// Whether every runtime mount source names a path inside `volumes/`.
pub(crate) fn check_mounts(subject: &str, mounts: &[MountConfig]) -> DarkwingResult<()> {
    for mount in mounts.iter().filter(|m| m.kind == MountKind::Runtime) {
        let mut components = mount.source.components().peekable();
        let inside = components.peek().is_some()
            && components.all(|c| matches!(c, Component::Normal(_)));
        if !inside {
            return Err(DarkwingError::config(
                subject,
                format!(
                    "runtime mount source must be a relative path below volumes/: {}",
                    mount.source.display()
                ),
            ));
        }
    }
    Ok(())
}
