//! Overlay driver: the union mount that merges Layers (lower, read-only)
//! with a writable upper/work pair rooted on persistent host state.

use std::path::{Path, PathBuf};

use crate::error::{FimError, FimResult};
use crate::process::{Launcher, OutputPolicy};

use super::{require_mount_dir, unmount_with_retry};

pub struct OverlayDriver {
    target: PathBuf,
}

impl OverlayDriver {
    /// Mount an overlay at `target` whose lower directories are the numbered
    /// subdirectories of `layers_root`, highest index first. If
    /// `casefold_upper` is given, it replaces the top layer in that list
    /// rather than adding to it. `upper_dir`/`work_dir` are the persistent
    /// writable pair.
    pub fn mount(
        layers_root: &Path,
        casefold_upper: Option<&Path>,
        upper_dir: &Path,
        work_dir: &Path,
        target: &Path,
    ) -> FimResult<Self> {
        require_mount_dir(target)?;
        std::fs::create_dir_all(upper_dir)?;
        std::fs::create_dir_all(work_dir)?;

        let lowerdirs = build_lowerdir_list(layers_root, casefold_upper)?;
        if lowerdirs.is_empty() {
            return Err(FimError::Environment(format!(
                "no layer directories found under '{}'",
                layers_root.display()
            )));
        }

        let lowerdir_arg = lowerdirs
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join(":");

        let options = format!(
            "lowerdir={},upperdir={},workdir={}",
            lowerdir_arg,
            upper_dir.display(),
            work_dir.display()
        );

        Launcher::find("fuse-overlayfs")?
            .arg("-o")
            .arg(options)
            .arg(target)
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

impl Drop for OverlayDriver {
    fn drop(&mut self) {
        unmount_with_retry(&self.target);
    }
}

/// Numbered subdirectories of `layers_root`, descending, with
/// `casefold_upper` (the one-past-last-layer directory) substituted for the
/// top entry when present.
fn build_lowerdir_list(
    layers_root: &Path,
    casefold_upper: Option<&Path>,
) -> FimResult<Vec<PathBuf>> {
    let mut indices: Vec<u64> = std::fs::read_dir(layers_root)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|n| n.parse().ok()))
        .collect();
    indices.sort_unstable();
    indices.reverse();

    // The CaseFold upper directory, if it exists, is itself a numbered
    // directory one past the last real layer; exclude it from the raw scan
    // since it is substituted in explicitly below.
    if let Some(upper) = casefold_upper {
        if let Some(upper_name) = upper.file_name().and_then(|n| n.to_str()) {
            if let Ok(upper_index) = upper_name.parse::<u64>() {
                indices.retain(|&i| i != upper_index);
            }
        }
    }

    let mut lowerdirs = Vec::with_capacity(indices.len() + 1);
    if let Some(upper) = casefold_upper {
        lowerdirs.push(upper.to_path_buf());
    }
    for index in indices {
        lowerdirs.push(layers_root.join(index.to_string()));
    }
    Ok(lowerdirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowerdir_list_descends_without_casefold() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3u64 {
            std::fs::create_dir(dir.path().join(i.to_string())).unwrap();
        }
        let list = build_lowerdir_list(dir.path(), None).unwrap();
        assert_eq!(
            list,
            vec![
                dir.path().join("2"),
                dir.path().join("1"),
                dir.path().join("0"),
            ]
        );
    }

    #[test]
    fn casefold_upper_replaces_top_layer() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3u64 {
            std::fs::create_dir(dir.path().join(i.to_string())).unwrap();
        }
        let upper = dir.path().join("3");
        std::fs::create_dir(&upper).unwrap();

        let list = build_lowerdir_list(dir.path(), Some(&upper)).unwrap();
        assert_eq!(
            list,
            vec![
                dir.path().join("3"),
                dir.path().join("1"),
                dir.path().join("0"),
            ]
        );
    }
}
