//! Shared fixtures: a fake runc and an on-disk configuration tree.
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use darkwing::Driver;
use darkwing::config::FsConfigStore;
use darkwing_common::DarkwingPaths;
use tempfile::TempDir;

/// Speaks enough of the runc command line for darkwing.
///
/// `DW_EXIT` sets the container's exit code and `DW_CALLS` names a file that
/// collects the steps. `DW_MODE=signal` makes `run` die from SIGKILL;
/// `DW_MODE=stuck` makes a split container ignore signals until the file
/// `DW_RELEASE` appears (`kill` never does anything). `DW_STATUS` is the
/// status `state` reports.
const FAKE_RUNC: &str = r#"#!/bin/sh
root=$2
shift 2
if [ "$1" = "--debug" ]; then
    echo "fake runtime debug" >> "$3"
    shift 3
fi
step=$1
shift
if [ -n "$DW_CALLS" ]; then
    echo "$step" >> "$DW_CALLS"
fi
case "$step" in
run)
    test -f "$2/config.json" || exit 1
    mkdir -p "$root/$5"
    if [ "$DW_MODE" = "signal" ]; then
        kill -9 $$
    fi
    exit "${DW_EXIT:-0}"
    ;;
create)
    test -f "$2/config.json" || exit 1
    mkdir -p "$root/$5"
    (
        if [ "$DW_MODE" = "stuck" ]; then
            trap '' INT TERM HUP QUIT
            while [ ! -f "$DW_RELEASE" ]; do sleep 0.05; done
            exit "${DW_EXIT:-0}"
        fi
        while [ ! -f "$root/$5/started" ]; do sleep 0.05; done
        exit "${DW_EXIT:-0}"
    ) < /dev/null > /dev/null 2>&1 &
    echo $! > "$4"
    ;;
start)
    touch "$root/$1/started"
    ;;
kill)
    ;;
delete)
    if [ "$1" = "--force" ]; then
        shift
    fi
    rm -rf "$root/$1"
    ;;
state)
    printf '{"ociVersion":"1.0.2","id":"%s","status":"%s","bundle":"%s"}\n' "$1" "${DW_STATUS:-stopped}" "$root"
    ;;
*)
    echo "unknown step $step" >&2
    exit 2
    ;;
esac
"#;

const BUNDLE_SPEC: &str = r#"{
    "ociVersion": "1.0.2",
    "process": {
        "terminal": false,
        "user": {"uid": 0, "gid": 0},
        "args": ["sh", "-c", "true"],
        "env": ["PATH=/usr/bin:/bin"],
        "cwd": "/"
    },
    "root": {"path": "rootfs"},
    "mounts": [{"destination": "/proc", "type": "proc", "source": "proc"}]
}"#;

/// A temporary darkwing installation.
pub struct Env {
    pub temp: TempDir,
}

impl Env {
    /// Config tree with a bundle and a fake runtime; no contexts yet.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let env = Self { temp };

        std::fs::create_dir_all(env.bundle().join("rootfs")).unwrap();
        std::fs::write(env.bundle().join("config.json"), BUNDLE_SPEC).unwrap();
        std::fs::create_dir_all(env.config_dir()).unwrap();

        let runc = env.runtime_binary();
        std::fs::write(&runc, FAKE_RUNC).unwrap();
        std::fs::set_permissions(&runc, std::fs::Permissions::from_mode(0o755)).unwrap();

        env
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.path().join("config")
    }

    pub fn bundle(&self) -> PathBuf {
        self.path().join("bundle")
    }

    pub fn runtime_binary(&self) -> PathBuf {
        self.path().join("fake-runc")
    }

    pub fn state_root(&self, context: &str) -> PathBuf {
        self.path().join("run").join(context)
    }

    /// Lets a `DW_MODE=stuck` container go once created.
    pub fn release_file(&self) -> PathBuf {
        self.path().join("release")
    }

    pub fn calls_file(&self) -> PathBuf {
        self.path().join("calls")
    }

    /// Steps the fake runtime was asked to run, in order.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.calls_file())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Write a context using the fake runtime; `env` lands in `[runtime.env]`.
    pub fn context(&self, name: &str, lifecycle: &str, env: &[(&str, &str)]) {
        self.context_with_binary(name, lifecycle, &self.runtime_binary(), env);
    }

    pub fn context_with_binary(
        &self,
        name: &str,
        lifecycle: &str,
        binary: &Path,
        env: &[(&str, &str)],
    ) {
        let mut toml = format!(
            "rootless = false\n\n[runtime]\nbinary = \"{}\"\nstate_root = \"{}\"\nlifecycle = \"{lifecycle}\"\n\n[runtime.env]\nDW_CALLS = \"{}\"\n",
            binary.display(),
            self.state_root(name).display(),
            self.calls_file().display(),
        );
        for (key, value) in env {
            toml.push_str(&format!("{key} = \"{value}\"\n"));
        }
        std::fs::write(self.config_dir().join(format!("{name}.toml")), toml).unwrap();
    }

    /// Write a container definition using the shared bundle.
    pub fn container(&self, context: &str, name: &str, extra: &str) {
        let dir = self.config_dir().join(context);
        std::fs::create_dir_all(&dir).unwrap();
        let toml = format!("bundle = \"{}\"\n{extra}", self.bundle().display());
        std::fs::write(dir.join(format!("{name}.toml")), toml).unwrap();
    }

    pub fn paths(&self) -> DarkwingPaths {
        DarkwingPaths::for_user(true, 1000)
            .with_config(self.config_dir())
            .with_runtime(self.path().join("run"))
    }

    /// A driver over this tree that leaves process signals alone.
    pub fn driver(&self) -> Driver {
        let store = FsConfigStore::new([self.config_dir()]);
        Driver::new(Arc::new(store), self.paths()).with_signal_forwarding(false)
    }
}
