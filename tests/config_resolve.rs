//! Integration coverage for `FimConfig::resolve` against a fabricated
//! environment, using `assert_fs`/`predicates` for the on-disk assertions
//! the unit tests in `config.rs` don't reach (only a real process
//! environment round-trip exercises `resolve`'s directory creation).

use assert_fs::prelude::*;
use predicates::prelude::*;

use fim::config::FimConfig;

/// Serializes every test in this file: `resolve` reads/writes process-wide
/// environment variables, which is unsound to do concurrently.
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn set_required_env(binary: &std::path::Path, mount: &std::path::Path) {
    // SAFETY: caller holds `ENV_LOCK`, so no other thread observes a
    // half-updated environment.
    unsafe {
        std::env::set_var("FIM_OFFSET", "0");
        std::env::set_var("FIM_DIR_GLOBAL", mount.join("global").to_str().unwrap());
        std::env::set_var("FIM_FILE_BINARY", binary);
        std::env::set_var("FIM_DIR_APP", mount.join("app").to_str().unwrap());
        std::env::set_var("FIM_DIR_APP_BIN", mount.join("app/bin").to_str().unwrap());
        std::env::set_var(
            "FIM_DIR_INSTANCE",
            mount.join("instance").to_str().unwrap(),
        );
        std::env::set_var("FIM_DIR_MOUNT", mount.join("mount").to_str().unwrap());
    }
}

fn clear_env() {
    // SAFETY: caller holds `ENV_LOCK`.
    unsafe {
        for var in [
            "FIM_OFFSET",
            "FIM_DIR_GLOBAL",
            "FIM_FILE_BINARY",
            "FIM_DIR_APP",
            "FIM_DIR_APP_BIN",
            "FIM_DIR_INSTANCE",
            "FIM_DIR_MOUNT",
            "FIM_CASEFOLD",
        ] {
            std::env::remove_var(var);
        }
    }
}

#[test]
fn resolve_creates_the_per_binary_host_config_directory() {
    let _guard = ENV_LOCK.lock().unwrap();

    let scratch = assert_fs::TempDir::new().unwrap();
    let binary = scratch.child("my-app.bin");
    binary.write_binary(b"not a real elf, just needs to exist").unwrap();

    set_required_env(binary.path(), scratch.path());
    let config = FimConfig::resolve().expect("resolve should succeed with every required var set");
    clear_env();

    let expected_config_dir = scratch.child(".my-app.bin.config");
    expected_config_dir.assert(predicate::path::is_dir());
    assert_eq!(config.dir_host_config, expected_config_dir.path());
}

#[test]
fn resolve_respects_the_casefold_flag() {
    let _guard = ENV_LOCK.lock().unwrap();

    let scratch = assert_fs::TempDir::new().unwrap();
    let binary = scratch.child("app.bin");
    binary.write_binary(b"stand-in").unwrap();

    set_required_env(binary.path(), scratch.path());
    // SAFETY: `_guard` holds ENV_LOCK for this test's duration.
    unsafe { std::env::set_var("FIM_CASEFOLD", "1") };
    let config = FimConfig::resolve().unwrap();
    clear_env();

    assert!(config.flags.casefold);
}

#[test]
fn resolve_fails_fast_when_a_required_variable_is_missing() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = FimConfig::resolve().unwrap_err();
    assert!(matches!(err, fim::error::FimError::Environment(_)));
}
