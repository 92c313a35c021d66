//! Bootstrap.
//!
//! Runs once per host-binary invocation, before the marker environment
//! variable is set: extracts the fixed set of helper executables embedded
//! in the host binary's own framed tail into a per-user cache directory,
//! computes `FIM_OFFSET` as the byte immediately following that tools
//! section, and re-execs into the cached resident launcher with the
//! original argv untouched. Once the marker is present, this module is a
//! no-op and [`crate::config::FimConfig::resolve`] takes over.

use std::ffi::CString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::execve;

use crate::error::{FimError, FimResult};
use crate::payload::PayloadReader;

/// Marker variable that, once set, means this process is already running
/// out of the cache and Bootstrap must not run again.
pub const MARKER_VAR: &str = "FIM_MAIN_LAUNCH";

/// Name of the application this launcher is distributed for. Used only to
/// namespace the per-user cache directory.
const APP_NAME: &str = "fim";

/// Fixed, ordered list of helper binaries stored in the host binary's tools
/// section. Frame `i` of the tools section is always named `HELPERS[i]`.
const HELPERS: &[&str] = &["dwarfs", "ciopfs", "fuse-overlayfs", "fusermount", "janitor"];

/// `true` if this process is already running out of the cache and
/// Bootstrap has nothing left to do.
pub fn already_bootstrapped() -> bool {
    std::env::var_os(MARKER_VAR).is_some()
}

/// Extract helpers (if not already present), compute `FIM_OFFSET`, and
/// re-exec into the cached launcher. Never returns on success; returns an
/// error only if something prevents the re-exec from happening at all.
pub fn run(argv: &[String]) -> FimResult<()> {
    let self_exe = std::fs::read_link("/proc/self/exe")
        .map_err(|e| FimError::Environment(format!("could not resolve /proc/self/exe: {e}")))?;

    let cache_root = cache_root()?;
    let bin_dir = cache_root.join("bin");
    let mounts_dir = cache_root.join("mounts");
    std::fs::create_dir_all(&bin_dir)?;
    std::fs::create_dir_all(&mounts_dir)?;

    let tools_start = elf_tail_offset(&self_exe)?;
    let mut reader = PayloadReader::open(&self_exe, tools_start)?;
    for name in HELPERS {
        let dest = bin_dir.join(name);
        match reader.next_frame()? {
            Some(blob) => {
                if !dest.exists() {
                    std::fs::write(&dest, &blob)?;
                    mark_executable(&dest)?;
                }
            }
            None => {
                return Err(FimError::Payload(format!(
                    "host binary has no frame for helper '{name}'"
                )));
            }
        }
    }
    let offset_filesystem = reader.cursor();

    // SAFETY: single-threaded at this point, before any fork.
    unsafe {
        std::env::set_var(MARKER_VAR, "1");
        std::env::set_var("FIM_OFFSET", offset_filesystem.to_string());
    }

    let resident = bin_dir.join("fim");
    if !resident.exists() {
        std::fs::copy(&self_exe, &resident)?;
        mark_executable(&resident)?;
    }

    reexec(&resident, argv)
}

/// Byte offset immediately past the end of `path`'s ELF section headers,
/// where the framed tools section begins. Only 64-bit little-endian ELF is
/// supported, which covers every platform this launcher targets.
fn elf_tail_offset(path: &Path) -> FimResult<u64> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 64];
    file.read_exact(&mut header)
        .map_err(|_| FimError::Payload("host binary is too short to contain an ELF header".into()))?;

    if &header[0..4] != b"\x7fELF" {
        return Err(FimError::Payload("host binary is not an ELF executable".into()));
    }
    if header[4] != 2 {
        return Err(FimError::Payload("only 64-bit ELF host binaries are supported".into()));
    }

    let e_shoff = u64::from_le_bytes(header[0x28..0x30].try_into().unwrap());
    let e_shentsize = u16::from_le_bytes(header[0x3a..0x3c].try_into().unwrap()) as u64;
    let e_shnum = u16::from_le_bytes(header[0x3c..0x3e].try_into().unwrap()) as u64;

    Ok(e_shoff + e_shentsize * e_shnum)
}

fn cache_root() -> FimResult<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join(APP_NAME));
        }
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".cache").join(APP_NAME));
    }
    Ok(PathBuf::from("/tmp").join(APP_NAME))
}

fn mark_executable(path: &Path) -> FimResult<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

fn reexec(resident: &Path, argv: &[String]) -> FimResult<()> {
    let path_cstr = CString::new(resident.as_os_str().as_bytes())
        .map_err(|_| FimError::Environment("resident launcher path contains NUL".into()))?;

    let mut args: Vec<CString> = Vec::with_capacity(argv.len() + 1);
    args.push(path_cstr.clone());
    for arg in argv {
        args.push(
            CString::new(arg.as_bytes())
                .map_err(|_| FimError::Environment("argv contains NUL byte".into()))?,
        );
    }

    let env: Vec<CString> = std::env::vars_os()
        .filter_map(|(k, v)| {
            let mut combined = k.into_vec();
            combined.push(b'=');
            combined.extend(v.into_vec());
            CString::new(combined).ok()
        })
        .collect();

    execve(&path_cstr, &args, &env)
        .map_err(|e| FimError::Environment(format!("execve into resident launcher failed: {e}")))?;
    unreachable!("execve only returns on failure")
}
