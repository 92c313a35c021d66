//! Precondition checks for the Mount drivers that don't require a real FUSE
//! helper to be installed: bad inputs must fail construction before any
//! helper process is spawned, and must not leave a mount behind.

use fim::error::FimError;
use fim::mount::{CaseFoldDriver, ReadOnlyLayerDriver};

#[test]
fn readonly_layer_rejects_missing_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let mount_dir = dir.path().join("mount");
    std::fs::create_dir(&mount_dir).unwrap();

    let missing_image = dir.path().join("does-not-exist.bin");
    let err = ReadOnlyLayerDriver::mount(&missing_image, &mount_dir, 0, 10).unwrap_err();
    assert!(matches!(err, FimError::Environment(_)));
}

#[test]
fn readonly_layer_rejects_missing_mount_directory() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("image.bin");
    std::fs::write(&image, b"not a real filesystem image").unwrap();

    let missing_mount_dir = dir.path().join("nope");
    let err = ReadOnlyLayerDriver::mount(&image, &missing_mount_dir, 0, 10).unwrap_err();
    assert!(matches!(err, FimError::Environment(_)));
}

#[test]
fn casefold_rejects_missing_lower_directory() {
    let dir = tempfile::tempdir().unwrap();
    let lower = dir.path().join("missing-lower");
    let upper = dir.path().join("upper");

    let err = CaseFoldDriver::mount(&lower, &upper).unwrap_err();
    assert!(matches!(err, FimError::Environment(_)));
    // The driver must not have created the upper directory on a
    // precondition failure — no partial state left behind.
    assert!(!upper.exists());
}

#[test]
fn helper_not_found_is_reported_distinctly_from_bad_input() {
    // With valid inputs but without the real `dwarfs`/`ciopfs` helpers on
    // PATH in a bare test environment, construction must fail with
    // `HelperNotFound`, not panic or hang.
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("image.bin");
    std::fs::write(&image, b"stand-in image bytes").unwrap();
    let mount_dir = dir.path().join("mount");
    std::fs::create_dir(&mount_dir).unwrap();

    let result = ReadOnlyLayerDriver::mount(&image, &mount_dir, 0, image.metadata().unwrap().len());
    if let Err(e) = result {
        assert!(
            matches!(e, FimError::HelperNotFound(_)) || matches!(e, FimError::HelperFailed { .. }),
            "unexpected error variant: {e:?}"
        );
    }
}
