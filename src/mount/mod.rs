//! Mount drivers.
//!
//! Three kinds of FUSE mount, one shape: construction spawns the backing
//! helper process and waits for it to come up; destruction unmounts with
//! bounded retry. Modeled as a tagged enum rather than a trait-object
//! hierarchy (there are exactly three kinds, and the "construct mounts,
//! drop unmounts" contract is the same for all of them).

mod casefold;
mod overlay;
mod readonly_layer;

pub use casefold::CaseFoldDriver;
pub use overlay::OverlayDriver;
pub use readonly_layer::ReadOnlyLayerDriver;

use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use crate::error::FimResult;
use crate::process::Launcher;

const UNMOUNT_RETRIES: u32 = 10;
const UNMOUNT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One live FUSE mount, of whichever kind. Dropping it unmounts.
pub enum MountDriver {
    ReadOnlyLayer(ReadOnlyLayerDriver),
    CaseFold(CaseFoldDriver),
    Overlay(OverlayDriver),
}

impl MountDriver {
    pub fn target(&self) -> &Path {
        match self {
            MountDriver::ReadOnlyLayer(d) => d.target(),
            MountDriver::CaseFold(d) => d.target(),
            MountDriver::Overlay(d) => d.target(),
        }
    }
}

impl std::fmt::Debug for MountDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountDriver::ReadOnlyLayer(d) => write!(f, "ReadOnlyLayer({})", d.target().display()),
            MountDriver::CaseFold(d) => write!(f, "CaseFold({})", d.target().display()),
            MountDriver::Overlay(d) => write!(f, "Overlay({})", d.target().display()),
        }
    }
}

/// Shared precondition: the mount directory must already exist as a directory.
fn require_mount_dir(path: &Path) -> FimResult<()> {
    if !path.is_dir() {
        return Err(crate::error::FimError::Environment(format!(
            "mount point '{}' does not exist or is not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Unmount an arbitrary path with the same retry discipline the drivers use
/// in their own `Drop` impls. Used by the Janitor, which unmounts by path
/// alone rather than holding live driver values.
pub fn unmount_target(target: &Path) {
    unmount_with_retry(target);
}

/// Unmount `target` with the same retry discipline used by every driver:
/// up to [`UNMOUNT_RETRIES`] attempts, `fusermount -zu` (lazy, unmount even
/// if busy), 100 ms between attempts. Never raises: callers are `Drop`
/// impls, which must not panic or propagate errors.
fn unmount_with_retry(target: &Path) {
    let fusermount = match Launcher::find("fusermount") {
        Ok(l) => l,
        Err(_) => {
            tracing::warn!(target = %target.display(), "fusermount not found on PATH, cannot unmount");
            return;
        }
    };

    for attempt in 1..=UNMOUNT_RETRIES {
        let result = Launcher::at(fusermount.program().to_path_buf())
            .arg("-zu")
            .arg(target)
            .run();
        match result {
            Ok(()) => {
                tracing::debug!(target = %target.display(), attempt, "unmounted");
                return;
            }
            Err(_) if attempt < UNMOUNT_RETRIES => {
                sleep(UNMOUNT_RETRY_DELAY);
            }
            Err(cause) => {
                // Retry budget exhausted: this is the filesystem-busy case.
                // Destructors never return `Result`, so there is no caller
                // to hand the error to; it is built only so its `Display`
                // text (not `cause`'s, which is just "fusermount exited
                // non-zero") names the condition precisely in the log line.
                let busy = crate::error::FimError::Busy(target.to_path_buf());
                tracing::warn!(
                    target = %target.display(),
                    attempt,
                    %busy,
                    cause = %cause,
                    "giving up unmounting after retries"
                );
            }
        }
    }
}

/// Registry of mount points in the exact order they were composed.
/// The Filesystem stack pushes as it builds and the Janitor's argv is the
/// reverse of this list.
#[derive(Debug, Default, Clone)]
pub struct MountRegistry {
    points: Vec<PathBuf>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf) {
        self.points.push(path);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.points.iter()
    }

    /// The registry contents in reverse construction order, the order the
    /// Janitor unmounts in.
    pub fn reversed(&self) -> Vec<PathBuf> {
        let mut points = self.points.clone();
        points.reverse();
        points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reverses_push_order() {
        let mut registry = MountRegistry::new();
        registry.push(PathBuf::from("/a"));
        registry.push(PathBuf::from("/b"));
        registry.push(PathBuf::from("/c"));
        assert_eq!(
            registry.reversed(),
            vec![PathBuf::from("/c"), PathBuf::from("/b"), PathBuf::from("/a")]
        );
    }

    #[test]
    fn require_mount_dir_rejects_missing_path() {
        let err = require_mount_dir(Path::new("/does/not/exist/fim-test")).unwrap_err();
        assert!(matches!(err, crate::error::FimError::Environment(_)));
    }
}
