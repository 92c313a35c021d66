//! ReadOnlyLayer driver: mounts one compressed filesystem image straight out
//! of a byte range of the host binary.

use std::path::{Path, PathBuf};

use crate::error::{FimError, FimResult};
use crate::process::{Launcher, OutputPolicy};

use super::{require_mount_dir, unmount_with_retry};

pub struct ReadOnlyLayerDriver {
    target: PathBuf,
}

impl ReadOnlyLayerDriver {
    /// Mount the image embedded at `[offset, offset + length)` of
    /// `path_file_binary` onto `target` using the `dwarfs` helper.
    pub fn mount(
        path_file_binary: &Path,
        target: &Path,
        offset: u64,
        length: u64,
    ) -> FimResult<Self> {
        if !path_file_binary.is_file() {
            return Err(FimError::Environment(format!(
                "'{}' does not exist or is not a regular file",
                path_file_binary.display()
            )));
        }
        require_mount_dir(target)?;

        let launcher = Launcher::find("dwarfs")?;
        launcher
            .arg(path_file_binary)
            .arg(target)
            .arg("-o")
            .arg(format!("offset={offset},imagesize={length}"))
            .stdio(OutputPolicy::Piped)
            .run()?;

        Ok(Self {
            target: target.to_path_buf(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for ReadOnlyLayerDriver {
    fn drop(&mut self) {
        unmount_with_retry(&self.target);
    }
}
