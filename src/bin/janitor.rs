//! Janitor watchdog binary.
//!
//! Spawned by the resident launcher via `fork()` + `execve()`, never as a
//! thread, so it survives a `SIGKILL` of the parent's address space. Its
//! argv is the MountPoint registry in reverse order; `PID_PARENT` names the
//! process whose liveness it polls.

use std::path::PathBuf;

fn main() {
    fim::init_logging();

    let parent_pid: u32 = match std::env::var("PID_PARENT").ok().and_then(|v| v.parse().ok()) {
        Some(pid) => pid,
        None => {
            eprintln!("janitor: PID_PARENT is not set or not a valid pid");
            std::process::exit(1);
        }
    };

    let mountpoints: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();

    fim::janitor::run(parent_pid, &mountpoints);
}
