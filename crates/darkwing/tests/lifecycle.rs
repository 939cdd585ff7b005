//! End-to-end runs through the driver against a fake runtime.
mod common;

use std::error::Error;

use common::Env;
use darkwing::DriverOptions;
use darkwing_common::DarkwingError;
use darkwing_common::error::EXIT_NOT_FOUND;
use darkwing_oci::{ContainerStatus, Spec};

#[tokio::test]
async fn test_run_mode_exit_code() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[("DW_EXIT", "17")]);
    env.container("default", "mybox", "");

    let code = env.driver().execute("mybox").await?;

    assert_eq!(code, 17);
    assert_eq!(env.calls(), vec!["run", "delete"]);
    assert!(!env.state_root("default").join("mybox").exists());
    Ok(())
}

#[tokio::test]
async fn test_signal_death_maps_to_128_plus() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[("DW_MODE", "signal")]);
    env.container("default", "mybox", "");

    let code = env.driver().execute("mybox:default").await?;

    assert_eq!(code, 128 + libc::SIGKILL);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_split_mode_waits_for_init() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("ci", "split", &[("DW_EXIT", "3")]);
    env.container("ci", "worker", "");

    let code = env.driver().execute("worker:ci").await?;

    assert_eq!(code, 3);
    assert_eq!(env.calls(), vec!["create", "start", "delete"]);
    assert!(!env.state_root("ci").join("worker").exists());
    Ok(())
}

#[tokio::test]
async fn test_keep_leaves_run_directory() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[]);
    env.container(
        "default",
        "mybox",
        "hostname = \"box1\"\n\n[process]\nargs = [\"echo\", \"hi\"]\n",
    );

    let driver = env.driver().with_options(DriverOptions {
        remove: false,
        ..DriverOptions::default()
    });
    assert_eq!(driver.execute("mybox").await?, 0);

    let rundir = env.state_root("default").join("mybox");
    assert!(rundir.join("state/default-mybox").is_dir());
    assert_eq!(std::fs::read_to_string(rundir.join("hostname"))?, "box1\n");

    let spec = Spec::load(&rundir.join("config.json"))?;
    let process = spec.process.ok_or("rendered spec has no process")?;
    assert_eq!(process.args, vec!["sh", "echo", "hi"]);
    assert_eq!(spec.hostname.as_deref(), Some("box1"));

    // A second run must not reuse the directory.
    let err = driver.execute("mybox").await.unwrap_err();
    assert!(matches!(err, DarkwingError::RunDirectoryConflict { stale: false, .. }));

    let state = driver.status("mybox").await?;
    assert_eq!(state.id, "default-mybox");
    assert_eq!(state.status, ContainerStatus::Stopped);

    // We wrote the marker, so we count as a live owner.
    let err = driver.remove("mybox", false).await.unwrap_err();
    assert!(matches!(err, DarkwingError::ContainerActive { .. }));

    driver.remove("mybox", true).await?;
    assert!(!rundir.exists());
    assert_eq!(env.calls(), vec!["run", "state", "delete"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_runtime_binary() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    let missing = env.path().join("no-such-runc");
    env.context_with_binary("default", "split", &missing, &[]);
    env.container("default", "mybox", "");

    let err = env.driver().execute("mybox").await.unwrap_err();

    assert!(matches!(err, DarkwingError::RuntimeInvocation { .. }));
    assert_eq!(err.exit_code(), EXIT_NOT_FOUND);
    assert!(!env.state_root("default").join("mybox").exists());
    Ok(())
}

#[tokio::test]
async fn test_unknown_context_has_no_side_effects() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[]);
    env.container("default", "mybox", "");

    let err = env.driver().execute("mybox:ghost").await.unwrap_err();

    assert!(matches!(err, DarkwingError::ContextNotFound { ref name } if name == "ghost"));
    assert!(!env.path().join("run").exists());
    assert!(env.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_container_has_no_side_effects() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[]);

    let err = env.driver().execute("nosuch").await.unwrap_err();

    assert!(matches!(err, DarkwingError::ContainerNotFound { .. }));
    assert!(!env.state_root("default").exists());
    assert!(env.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_status_without_run_directory() -> Result<(), Box<dyn Error>> {
    let env = Env::new();
    env.context("default", "run", &[]);
    env.container("default", "mybox", "");

    let err = env.driver().status("mybox").await.unwrap_err();

    assert!(matches!(err, DarkwingError::RunDirectoryNotFound { .. }));
    Ok(())
}
