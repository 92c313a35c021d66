//! Filesystem stack.
//!
//! Composes the full mount chain (Layers, optional CaseFold, Overlay) in
//! order, registers each mount point, forks the Janitor, and tears
//! everything down again in reverse on dispose. If composition fails
//! partway through, everything already mounted is unwound before the error
//! is returned and the Janitor is never spawned.

use std::path::Path;

use crate::config::FimConfig;
use crate::error::FimResult;
use crate::janitor;
use crate::mount::{CaseFoldDriver, MountDriver, MountRegistry, OverlayDriver, ReadOnlyLayerDriver};
use crate::payload::PayloadReader;

/// The live, composed filesystem stack: every mount driver in construction
/// order plus the spawned Janitor. Dropping this drops the drivers in
/// reverse, which is also the Janitor's own unmount order.
pub struct FilesystemStack {
    drivers: Vec<MountDriver>,
    registry: MountRegistry,
    janitor: Option<janitor::JanitorHandle>,
}

impl FilesystemStack {
    /// Build the full mount chain described by `config`.
    pub fn compose(config: &FimConfig) -> FimResult<Self> {
        let mut drivers: Vec<MountDriver> = Vec::new();
        let mut registry = MountRegistry::new();

        match compose_inner(config, &mut drivers, &mut registry) {
            Ok(()) => {}
            Err(e) => {
                // Unwind whatever mounted successfully, in reverse
                // construction order. `Vec::clear()` would drop front to
                // back, unmounting e.g. a Layer before the CaseFold or
                // Overlay built on top of it, the reverse of construction
                // order. Popping from the back, as `dispose` does, gives
                // true reverse order.
                while let Some(driver) = drivers.pop() {
                    drop(driver);
                }
                return Err(e);
            }
        }

        let janitor = janitor::spawn(config, &registry)?;

        Ok(Self {
            drivers,
            registry,
            janitor: Some(janitor),
        })
    }

    pub fn registry(&self) -> &MountRegistry {
        &self.registry
    }

    /// Tear the stack down: stop the Janitor, then drop the mount drivers in
    /// reverse construction order so the Overlay goes before the Layers.
    pub fn dispose(mut self) {
        if let Some(handle) = self.janitor.take() {
            janitor::stop(handle);
        }
        while let Some(driver) = self.drivers.pop() {
            drop(driver);
        }
    }
}

fn compose_inner(
    config: &FimConfig,
    drivers: &mut Vec<MountDriver>,
    registry: &mut MountRegistry,
) -> FimResult<()> {
    std::fs::create_dir_all(&config.dir_mount_layers)?;

    let mut reader = PayloadReader::open(&config.file_binary, config.offset_filesystem)?;
    let mut layer_count: u64 = 0;
    while let Some(frame) = reader.next_layer()? {
        let layer_dir = config.layer_mount_dir(layer_count);
        std::fs::create_dir_all(&layer_dir)?;
        let driver = ReadOnlyLayerDriver::mount(
            &config.file_binary,
            &layer_dir,
            frame.offset,
            frame.length,
        )?;
        registry.push(driver.target().to_path_buf());
        drivers.push(MountDriver::ReadOnlyLayer(driver));
        layer_count += 1;
    }

    let mut casefold_upper: Option<std::path::PathBuf> = None;
    if config.flags.casefold && layer_count > 0 {
        let lower = config.layer_mount_dir(layer_count - 1);
        let upper = config.casefold_upper_dir(layer_count);
        let driver = CaseFoldDriver::mount(&lower, &upper)?;
        registry.push(driver.target().to_path_buf());
        casefold_upper = Some(driver.target().to_path_buf());
        drivers.push(MountDriver::CaseFold(driver));
    }

    std::fs::create_dir_all(&config.dir_mount_overlayfs)?;
    let overlay = OverlayDriver::mount(
        &config.dir_mount_layers,
        casefold_upper.as_deref(),
        &config.overlay_upper_dir(),
        &config.overlay_work_dir(),
        &config.dir_mount_overlayfs,
    )?;
    registry.push(overlay.target().to_path_buf());
    drivers.push(MountDriver::Overlay(overlay));

    Ok(())
}

/// Root directory under which the application's own root filesystem is
/// visible once the stack is composed.
pub fn app_root(config: &FimConfig) -> &Path {
    &config.dir_mount_overlayfs
}
