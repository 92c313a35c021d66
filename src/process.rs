//! Process launcher.
//!
//! Thin wrapper around [`std::process::Command`] that resolves helper
//! binaries against `PATH` with [`which`] and normalizes failures into
//! [`FimError`]. Every external helper (`dwarfs`, `ciopfs`,
//! `fuse-overlayfs`, `fusermount`, the janitor) is started through this
//! module so that "not found" and "exited non-zero" are reported the same
//! way everywhere.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use crate::error::{FimError, FimResult};

/// What to do with a spawned child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Share the parent's stdout/stderr. Used for the contained application,
    /// whose output is the user-visible program, not a helper's diagnostics.
    Inherit,
    /// Capture into pipes so the caller can inspect them (used for helpers
    /// whose readiness or failure is diagnosed from their own output).
    Piped,
}

impl OutputPolicy {
    fn stdio(self) -> Stdio {
        match self {
            OutputPolicy::Inherit => Stdio::inherit(),
            OutputPolicy::Piped => Stdio::piped(),
        }
    }

    /// Every helper mounted through this launcher takes no input of its
    /// own, so `Piped` closes stdin; the contained application is the one
    /// consumer that needs its stdin left alone (an interactive shell, or
    /// input piped to `fim` itself), so `Inherit` carries through to stdin
    /// too rather than always nulling it.
    fn stdin(self) -> Stdio {
        match self {
            OutputPolicy::Inherit => Stdio::inherit(),
            OutputPolicy::Piped => Stdio::null(),
        }
    }
}

/// A not-yet-spawned external command, resolved against `PATH`.
pub struct Launcher {
    program: PathBuf,
    command: Command,
}

impl Launcher {
    /// Resolve `name` on `PATH` via `which`, or fail with
    /// [`FimError::HelperNotFound`].
    pub fn find(name: &str) -> FimResult<Self> {
        let program = which::which(name)
            .map_err(|_| FimError::HelperNotFound(name.to_string()))?;
        Ok(Self::at(program))
    }

    /// Build a launcher for an already-resolved absolute path, skipping the
    /// `PATH` search. Used for binaries extracted into the cache directory
    /// during bootstrap, whose location is already known.
    pub fn at(program: PathBuf) -> Self {
        let command = Command::new(&program);
        Self { program, command }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.command.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command.args(args);
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.command.env(key, value);
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.current_dir(dir);
        self
    }

    pub fn stdio(mut self, policy: OutputPolicy) -> Self {
        self.command
            .stdin(policy.stdin())
            .stdout(policy.stdio())
            .stderr(policy.stdio());
        self
    }

    /// Spawn the child without waiting for it.
    pub fn spawn(mut self) -> FimResult<Child> {
        self.command.spawn().map_err(FimError::Io)
    }

    /// Spawn, then block until the child exits, judging a non-zero (or
    /// signal) exit as [`FimError::HelperFailed`]. Built on [`spawn`] and
    /// the free [`wait`] function: this is the caller-side judgment left to
    /// whoever interprets `wait`'s raw `Option<i32>`; the launcher itself
    /// only spawns and waits.
    pub fn run(self) -> FimResult<()> {
        let program = self.program.clone();
        let mut child = self.spawn()?;
        match wait(&mut child) {
            Some(0) => Ok(()),
            code => Err(FimError::HelperFailed { path: program, code }),
        }
    }

    /// Spawn, wait, and capture output, failing on a non-zero exit code.
    pub fn run_captured(self) -> FimResult<Output> {
        let program = self.program.clone();
        let mut command = self.command;
        let output = command.output().map_err(FimError::Io)?;
        if !output.status.success() {
            return Err(FimError::HelperFailed {
                path: program,
                code: output.status.code(),
            });
        }
        Ok(output)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Block on an already-spawned child: `None` when the child died on a
/// signal or the wait itself fails (there is no exit code to report either
/// way), `Some(k)` when it exited with code `k`. Judging whether a
/// particular code counts as failure is left to the caller.
/// [`Launcher::run`] treats anything but `Some(0)` as
/// [`FimError::HelperFailed`], but the contained application's own exit
/// code is forwarded as-is by callers that don't want that judgment.
pub fn wait(child: &mut Child) -> Option<i32> {
    match child.wait() {
        Ok(status) => status.code(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_resolves_a_binary_known_to_be_on_path() {
        let launcher = Launcher::find("true").expect("`true` should be on PATH in test envs");
        assert!(launcher.program().is_absolute());
    }

    #[test]
    fn find_fails_for_a_nonexistent_binary() {
        let err = Launcher::find("fim-definitely-not-a-real-binary-xyz").unwrap_err();
        assert!(matches!(err, FimError::HelperNotFound(_)));
    }

    #[test]
    fn run_succeeds_for_true_and_fails_for_false() {
        Launcher::find("true").unwrap().run().unwrap();
        let err = Launcher::find("false").unwrap().run().unwrap_err();
        assert!(matches!(err, FimError::HelperFailed { code: Some(1), .. }));
    }

    #[test]
    fn run_captured_returns_stdout() {
        let output = Launcher::find("echo")
            .unwrap()
            .arg("hello")
            .stdio(OutputPolicy::Piped)
            .run_captured()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn wait_returns_the_raw_exit_code_without_judging_it() {
        let mut child = Launcher::find("false").unwrap().spawn().unwrap();
        assert_eq!(wait(&mut child), Some(1));

        let mut child = Launcher::find("true").unwrap().spawn().unwrap();
        assert_eq!(wait(&mut child), Some(0));
    }
}
