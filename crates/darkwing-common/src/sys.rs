//! Thin wrappers over the few libc calls darkwing needs.
#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Effective user id of this process.
#[must_use]
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Effective group id of this process.
#[must_use]
pub fn effective_gid() -> u32 {
    // SAFETY: getegid has no preconditions and cannot fail.
    unsafe { libc::getegid() }
}

/// Whether this process is probably running as root.
#[must_use]
pub fn is_root() -> bool {
    effective_uid() == 0
}

/// Whether a process with this pid exists.
///
/// `EPERM` means the process exists but belongs to someone else.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether `path`, or its nearest existing ancestor, is writable by us.
#[must_use]
pub fn is_writable(path: &Path) -> bool {
    let Some(existing) = path.ancestors().find(|p| p.exists()) else {
        return false;
    };
    let Ok(c_path) = CString::new(existing.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Become a child subreaper so orphaned descendants are reparented to us.
///
/// # Errors
///
/// Returns the OS error if `prctl` fails.
#[cfg(target_os = "linux")]
pub fn set_child_subreaper() -> std::io::Result<()> {
    // SAFETY: PR_SET_CHILD_SUBREAPER takes a single integer argument.
    let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Become a child subreaper (no-op outside Linux).
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(target_os = "linux"))]
pub fn set_child_subreaper() -> std::io::Result<()> {
    Ok(())
}
