//! Janitor supervisor.
//!
//! The parent side forks a child that re-execs into the standalone
//! `janitor` binary, passing the MountPoint registry in reverse as argv.
//! That child outlives a `SIGKILL` of the parent and unmounts everything if
//! the parent disappears without tearing the stack down itself. This
//! module provides both halves: [`spawn`]/[`stop`] for the parent, and
//! [`run`] for the janitor binary's own main loop.

use std::ffi::CString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execve, fork, ForkResult, Pid};

use crate::config::FimConfig;
use crate::error::{FimError, FimResult};
use crate::mount::MountRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A spawned janitor child, from the parent's point of view.
pub struct JanitorHandle {
    pid: Pid,
}

/// Fork a child that redirects its stdio to log files and re-execs into the
/// `janitor` binary with `registry`'s contents, reversed, as argv.
pub fn spawn(config: &FimConfig, registry: &MountRegistry) -> FimResult<JanitorHandle> {
    let janitor_path = config.dir_app_bin.join("janitor");
    let (stdout_path, stderr_path) = config.janitor_log_paths();
    let parent_pid = std::process::id();
    let mountpoints = registry.reversed();

    // SAFETY: fork() followed immediately by either returning to the
    // caller (parent) or exec/abort (child) with no intervening heap
    // allocation in the child beyond what's needed to exec.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            tracing::debug!(pid = child.as_raw(), "spawned janitor");
            Ok(JanitorHandle { pid: child })
        }
        Ok(ForkResult::Child) => {
            child_main(&janitor_path, &stdout_path, &stderr_path, parent_pid, &mountpoints);
            // child_main never returns; this is unreachable but keeps the
            // match arm's type honest if it somehow did.
            std::process::abort();
        }
        Err(e) => Err(FimError::Environment(format!("failed to fork janitor: {e}"))),
    }
}

/// Send `SIGTERM` to the janitor and wait for it to exit. Never raises:
/// this runs on the dispose path, where cleanup is best-effort.
pub fn stop(handle: JanitorHandle) {
    if let Err(e) = signal::kill(handle.pid, Signal::SIGTERM) {
        tracing::warn!(pid = handle.pid.as_raw(), error = %e, "failed to signal janitor");
        return;
    }
    match waitpid(handle.pid, None) {
        Ok(WaitStatus::Exited(_, 0)) => {
            tracing::debug!(pid = handle.pid.as_raw(), "janitor exited cleanly");
        }
        Ok(WaitStatus::Exited(_, code)) => {
            tracing::warn!(pid = handle.pid.as_raw(), code, "janitor exited non-zero");
        }
        Ok(other) => {
            tracing::warn!(pid = handle.pid.as_raw(), status = ?other, "janitor exited abnormally");
        }
        Err(e) => {
            tracing::warn!(pid = handle.pid.as_raw(), error = %e, "failed to wait for janitor");
        }
    }
}

/// Child-side setup: redirect stdio, record the parent pid, and execve into
/// the janitor binary. Aborts the process if any step fails, since there is
/// no parent stack left to unwind into.
fn child_main(
    janitor_path: &Path,
    stdout_path: &Path,
    stderr_path: &Path,
    parent_pid: u32,
    mountpoints: &[PathBuf],
) {
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;

    let redirect = |path: &Path, fd: i32| -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        // SAFETY: dup2 onto a standard fd number with a valid open fd.
        if unsafe { libc::dup2(file.as_raw_fd(), fd) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    };

    if redirect(stdout_path, libc::STDOUT_FILENO).is_err()
        || redirect(stderr_path, libc::STDERR_FILENO).is_err()
    {
        std::process::abort();
    }
    // SAFETY: stdin is not needed by the janitor.
    unsafe { libc::close(libc::STDIN_FILENO) };

    // SAFETY: single-threaded child, no concurrent env access.
    unsafe { std::env::set_var("PID_PARENT", parent_pid.to_string()) };

    let Some(path_cstr) = path_to_cstring(janitor_path) else {
        std::process::abort();
    };
    let mut argv: Vec<CString> = Vec::with_capacity(mountpoints.len() + 1);
    argv.push(path_cstr.clone());
    for mp in mountpoints {
        match path_to_cstring(mp) {
            Some(c) => argv.push(c),
            None => std::process::abort(),
        }
    }

    let env: Vec<CString> = std::env::vars_os()
        .filter_map(|(k, v)| {
            let mut combined = k.into_vec();
            combined.push(b'=');
            combined.extend(v.into_vec());
            CString::new(combined).ok()
        })
        .collect();

    let _ = execve(&path_cstr, &argv, &env);
    // execve only returns on failure.
    std::process::abort();
}

fn path_to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_bytes()).ok()
}

/// The janitor binary's own main loop: poll the parent's liveness and exit
/// (unmounting everything in `mountpoints`) when it disappears, or
/// immediately on `SIGTERM`.
pub fn run(parent_pid: u32, mountpoints: &[PathBuf]) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TERMINATED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_sigterm(_: i32) {
        TERMINATED.store(true, Ordering::SeqCst);
    }

    // SAFETY: installing a simple flag-setting handler, no allocation or
    // non-async-signal-safe calls inside it.
    unsafe {
        libc::signal(libc::SIGTERM, on_sigterm as usize);
    }

    loop {
        if TERMINATED.load(Ordering::SeqCst) {
            tracing::debug!("janitor received SIGTERM");
            break;
        }
        if !is_process_alive(parent_pid) {
            tracing::debug!(pid = parent_pid, "janitor observed parent exit");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    for mountpoint in mountpoints {
        crate::mount::unmount_target(mountpoint);
    }
}

fn is_process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission check.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}
