//! Helpers that rewrite parts of a [`Spec`](crate::Spec) in place.

use std::path::PathBuf;

use crate::runtime::{Capabilities, IdMapping, Mount};

/// Options applied to every bind mount darkwing adds.
pub const BIND_OPTIONS: [&str; 3] = ["bind", "nodev", "nosuid"];

/// Drop and add capabilities across every capability set.
///
/// Dropped names are removed first; added names are appended to each set
/// unless already present, keeping the original order otherwise.
pub fn update_capabilities(caps: &mut Capabilities, add: &[String], drop: &[String]) {
    for set in caps.sets_mut() {
        set.retain(|cap| !drop.contains(cap));
        for cap in add {
            if !set.contains(cap) {
                set.push(cap.clone());
            }
        }
    }
}

/// Compute a process environment from the image env and overrides.
///
/// - `fixed` entries `NAME=value` set a variable, bare `NAME` unsets it.
/// - `host` entries `NAME[=default]` copy the variable from `lookup`, fall
///   back to the default when given, and unset it otherwise.
///
/// Variables keep their first position; new ones are appended.
pub fn update_environment<F>(
    env: &[String],
    fixed: &[String],
    host: &[String],
    lookup: F,
) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut vars: Vec<(String, String)> = Vec::with_capacity(env.len() + fixed.len());

    let set = |vars: &mut Vec<(String, String)>, name: &str, value: String| {
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => vars.push((name.to_string(), value)),
        }
    };
    let unset = |vars: &mut Vec<(String, String)>, name: &str| vars.retain(|(n, _)| n != name);

    for entry in env {
        let (name, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
        set(&mut vars, name, value.to_string());
    }

    for entry in fixed {
        match entry.split_once('=') {
            Some((name, value)) => set(&mut vars, name, value.to_string()),
            None => unset(&mut vars, entry.as_str()),
        }
    }

    for entry in host {
        let (name, default) = match entry.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (entry.as_str(), None),
        };
        match lookup(name).or_else(|| default.map(str::to_string)) {
            Some(value) => set(&mut vars, name, value),
            None => unset(&mut vars, name),
        }
    }

    vars.into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect()
}

/// Build a bind mount entry.
#[must_use]
pub fn bind_mount(
    source: impl Into<PathBuf>,
    destination: impl Into<PathBuf>,
    readonly: bool,
) -> Mount {
    let mut options: Vec<String> = BIND_OPTIONS.iter().map(ToString::to_string).collect();
    if readonly {
        options.push("ro".to_string());
    }

    Mount {
        destination: destination.into(),
        mount_type: Some("bind".to_string()),
        source: Some(source.into()),
        options,
    }
}

/// Merge mounts, replacing any existing mount with the same destination.
///
/// Replaced mounts keep their position; new destinations are appended.
pub fn merge_mounts(mounts: &mut Vec<Mount>, extra: impl IntoIterator<Item = Mount>) {
    for mount in extra {
        match mounts
            .iter_mut()
            .find(|m| m.destination == mount.destination)
        {
            Some(slot) => *slot = mount,
            None => mounts.push(mount),
        }
    }
}

/// Point the mapping for `container_id` at `host_id`.
///
/// Other mappings are left alone.
pub fn remap_ids(maps: &mut [IdMapping], container_id: u32, host_id: u32) {
    for map in maps.iter_mut().filter(|m| m.container_id == container_id) {
        map.host_id = host_id;
    }
}
