//! CaseFold driver: an optional case-insensitive pass-through mount layered
//! on top of the topmost Layer, used only when the `CASEFOLD` flag is set.

use std::path::{Path, PathBuf};

use crate::error::FimResult;
use crate::process::{Launcher, OutputPolicy};

use super::{require_mount_dir, unmount_with_retry};

pub struct CaseFoldDriver {
    target: PathBuf,
}

impl CaseFoldDriver {
    /// Mount a case-folding view of `lower` at `upper` using the `ciopfs`
    /// helper. `upper` doubles as both the mount point and the driver's
    /// target, matching how the original layers-root layout reuses one
    /// numbered directory per stage.
    pub fn mount(lower: &Path, upper: &Path) -> FimResult<Self> {
        require_mount_dir(lower)?;
        if !upper.is_dir() {
            std::fs::create_dir_all(upper)?;
        }

        Launcher::find("ciopfs")?
            .arg(lower)
            .arg(upper)
            .stdio(OutputPolicy::Piped)
            .run()?;

        Ok(Self {
            target: upper.to_path_buf(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for CaseFoldDriver {
    fn drop(&mut self) {
        unmount_with_retry(&self.target);
    }
}
