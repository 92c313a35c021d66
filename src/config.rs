//! Configuration resolver.
//!
//! Computes every working path the launcher needs from the process
//! environment and the location of the host binary, and creates the
//! per-user host-side configuration directory. The result is an immutable
//! record: read it, never mutate it (see [`FimConfig`]).

use std::path::{Path, PathBuf};

use crate::error::{FimError, FimResult};

/// Directory and file name constants used throughout the on-disk layout.
pub mod names {
    pub const LAYERS_DIR: &str = "layers";
    pub const OVERLAYFS_DIR: &str = "overlayfs";
    pub const OVERLAYS_STATE_DIR: &str = "overlays";
    pub const UPPER_DIR: &str = "upper";
    pub const WORK_DIR: &str = "work";
    pub const CACHE_BIN_DIR: &str = "bin";
    pub const CACHE_MOUNTS_DIR: &str = "mounts";
}

const DEFAULT_COMPRESSION_LEVEL: u32 = 15;
const DEFAULT_SLACK_MINIMUM: u32 = 20;

/// Flags toggled by `"1"`-valued environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub root: bool,
    pub read_only: bool,
    pub debug: bool,
    pub casefold: bool,
}

/// Immutable, fully-resolved launcher configuration.
///
/// Built once per process by [`FimConfig::resolve`]. Every path the
/// Filesystem stack, Mount drivers, and Janitor need is computed here so
/// that no other module re-derives them from the environment.
#[derive(Debug, Clone)]
pub struct FimConfig {
    pub dist: String,
    pub offset_filesystem: u64,
    pub dir_global: PathBuf,
    pub file_binary: PathBuf,
    pub dir_app: PathBuf,
    pub dir_app_bin: PathBuf,
    pub dir_instance: PathBuf,
    pub dir_mount: PathBuf,
    pub dir_mount_layers: PathBuf,
    pub dir_mount_overlayfs: PathBuf,
    pub dir_host_config: PathBuf,
    pub dir_data_overlayfs: PathBuf,
    pub dir_runtime: PathBuf,
    pub dir_runtime_host: PathBuf,
    pub flags: Flags,
    pub compression_level: u32,
    pub slack_minimum: u32,
    pub env_path: String,
}

impl FimConfig {
    /// Resolve configuration from the current process environment.
    ///
    /// Mirrors the original implementation's `ns_config::config()`: reads
    /// required variables (fatal if missing), optional flags, and tunables
    /// with defaults, then creates the per-user host config directory and
    /// prepends the app's bin directory to `PATH`.
    pub fn resolve() -> FimResult<Self> {
        let offset_filesystem: u64 = get_required("FIM_OFFSET")?
            .parse()
            .map_err(FimError::InvalidOffset)?;

        let dir_global = PathBuf::from(get_required("FIM_DIR_GLOBAL")?);
        let file_binary = PathBuf::from(get_required("FIM_FILE_BINARY")?);
        let dir_app = PathBuf::from(get_required("FIM_DIR_APP")?);
        let dir_app_bin = PathBuf::from(get_required("FIM_DIR_APP_BIN")?);
        let dir_instance = PathBuf::from(get_required("FIM_DIR_INSTANCE")?);
        let dir_mount = PathBuf::from(get_required("FIM_DIR_MOUNT")?);

        let dir_mount_layers = dir_mount.join(names::LAYERS_DIR);
        let dir_mount_overlayfs = dir_mount.join(names::OVERLAYFS_DIR);

        let flags = Flags {
            root: get_flag("FIM_ROOT"),
            read_only: get_flag("FIM_RO"),
            debug: get_flag("FIM_DEBUG"),
            casefold: get_flag("FIM_CASEFOLD"),
        };

        let dir_host_config = host_config_dir(&file_binary)?;
        let dir_data_overlayfs = dir_host_config.join(names::OVERLAYS_STATE_DIR);

        let dir_runtime = PathBuf::from("/tmp/fim/run");
        let dir_runtime_host = dir_runtime.join("host");

        let compression_level = get_or("FIM_COMPRESSION_LEVEL", DEFAULT_COMPRESSION_LEVEL)?;
        let slack_minimum = get_or("FIM_SLACK_MINIMUM", DEFAULT_SLACK_MINIMUM)?;

        let env_path = prepend_path(&dir_app_bin)?;
        prepend_library_path();

        let pid = std::process::id();
        // SAFETY: single-threaded at this point in startup, before any mount
        // child or the janitor has been forked.
        unsafe {
            std::env::set_var("PID", pid.to_string());
            std::env::set_var("FIM_PID", pid.to_string());
            std::env::set_var("FIM_DIST", "TRUNK");
            std::env::set_var("FIM_DIR_RUNTIME", &dir_runtime);
            std::env::set_var("FIM_DIR_RUNTIME_HOST", &dir_runtime_host);
            std::env::set_var("FIM_DIR_CONFIG", &dir_host_config);
        }

        Ok(Self {
            dist: "TRUNK".to_string(),
            offset_filesystem,
            dir_global,
            file_binary,
            dir_app,
            dir_app_bin,
            dir_instance,
            dir_mount,
            dir_mount_layers,
            dir_mount_overlayfs,
            dir_host_config,
            dir_data_overlayfs,
            dir_runtime,
            dir_runtime_host,
            flags,
            compression_level,
            slack_minimum,
            env_path,
        })
    }

    /// Mount directory for layer `index`: `<layers_root>/<index>`.
    pub fn layer_mount_dir(&self, index: u64) -> PathBuf {
        self.dir_mount_layers.join(index.to_string())
    }

    /// Upper directory for the case-fold translator: one past the last layer.
    pub fn casefold_upper_dir(&self, layer_count: u64) -> PathBuf {
        self.dir_mount_layers.join(layer_count.to_string())
    }

    /// Overlay writable upper directory, rooted on persistent host state.
    pub fn overlay_upper_dir(&self) -> PathBuf {
        self.dir_data_overlayfs.join(names::UPPER_DIR)
    }

    /// Overlay work directory, rooted on persistent host state.
    pub fn overlay_work_dir(&self) -> PathBuf {
        self.dir_data_overlayfs.join(names::WORK_DIR)
    }

    /// Directory inside the composed root where the contained application's
    /// own entry point and static assets live.
    pub fn dir_static(&self) -> PathBuf {
        self.dir_mount_overlayfs.join("fim/static")
    }

    /// Path to the janitor's stdout/stderr log files, siblings of the mount root.
    pub fn janitor_log_paths(&self) -> (PathBuf, PathBuf) {
        let mount_str = self.dir_mount.to_string_lossy();
        (
            PathBuf::from(format!("{mount_str}.janitor.stdout.log")),
            PathBuf::from(format!("{mount_str}.janitor.stderr.log")),
        )
    }
}

fn get_required(name: &str) -> FimResult<String> {
    std::env::var(name)
        .map_err(|_| FimError::Environment(format!("required variable '{name}' is not set")))
}

fn get_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

fn get_or(name: &str, default: u32) -> FimResult<u32> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(FimError::InvalidOffset),
        Err(_) => Ok(default),
    }
}

/// Per-binary host-side configuration directory: `<binary_dir>/.<binary_name>.config`.
fn host_config_dir(file_binary: &Path) -> FimResult<PathBuf> {
    let dir = file_binary
        .parent()
        .ok_or_else(|| FimError::Environment("FIM_FILE_BINARY has no parent directory".into()))?;
    let name = file_binary
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FimError::Environment("FIM_FILE_BINARY has no file name".into()))?;

    let dir_host_config = dir.join(format!(".{name}.config"));
    if !dir_host_config.exists() {
        std::fs::create_dir_all(&dir_host_config)?;
    }
    Ok(dir_host_config)
}

fn prepend_path(dir_app_bin: &Path) -> FimResult<String> {
    let path = std::env::var("PATH")
        .map_err(|_| FimError::Environment("required variable 'PATH' is not set".into()))?;
    let mut merged = format!("{}:{}", dir_app_bin.display(), path);
    merged.push_str(":/sbin:/usr/sbin:/usr/local/sbin:/bin:/usr/bin:/usr/local/bin");
    // SAFETY: single-threaded at this point in startup.
    unsafe {
        std::env::set_var("PATH", &merged);
    }
    Ok(merged)
}

fn prepend_library_path() {
    const MULTIARCH_DIRS: &str = "/usr/lib/x86_64-linux-gnu:/usr/lib/i386-linux-gnu";
    let value = match std::env::var("LD_LIBRARY_PATH") {
        Ok(existing) if !existing.is_empty() => format!("{MULTIARCH_DIRS}:{existing}"),
        _ => MULTIARCH_DIRS.to_string(),
    };
    // SAFETY: single-threaded at this point in startup.
    unsafe {
        std::env::set_var("LD_LIBRARY_PATH", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_mount_dir_is_index_joined() {
        let mut cfg = blank_config();
        cfg.dir_mount_layers = PathBuf::from("/tmp/fim/mount/layers");
        assert_eq!(
            cfg.layer_mount_dir(2),
            PathBuf::from("/tmp/fim/mount/layers/2")
        );
    }

    #[test]
    fn casefold_upper_dir_is_one_past_last_layer() {
        let mut cfg = blank_config();
        cfg.dir_mount_layers = PathBuf::from("/tmp/fim/mount/layers");
        assert_eq!(
            cfg.casefold_upper_dir(3),
            PathBuf::from("/tmp/fim/mount/layers/3")
        );
    }

    #[test]
    fn janitor_log_paths_are_siblings_of_mount_root() {
        let mut cfg = blank_config();
        cfg.dir_mount = PathBuf::from("/tmp/fim/mount/abc123");
        let (stdout, stderr) = cfg.janitor_log_paths();
        assert_eq!(
            stdout,
            PathBuf::from("/tmp/fim/mount/abc123.janitor.stdout.log")
        );
        assert_eq!(
            stderr,
            PathBuf::from("/tmp/fim/mount/abc123.janitor.stderr.log")
        );
    }

    fn blank_config() -> FimConfig {
        FimConfig {
            dist: "TRUNK".into(),
            offset_filesystem: 0,
            dir_global: PathBuf::new(),
            file_binary: PathBuf::new(),
            dir_app: PathBuf::new(),
            dir_app_bin: PathBuf::new(),
            dir_instance: PathBuf::new(),
            dir_mount: PathBuf::new(),
            dir_mount_layers: PathBuf::new(),
            dir_mount_overlayfs: PathBuf::new(),
            dir_host_config: PathBuf::new(),
            dir_data_overlayfs: PathBuf::new(),
            dir_runtime: PathBuf::new(),
            dir_runtime_host: PathBuf::new(),
            flags: Flags::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            slack_minimum: DEFAULT_SLACK_MINIMUM,
            env_path: String::new(),
        }
    }
}
