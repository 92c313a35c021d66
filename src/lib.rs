//! Self-extracting, self-mounting application bundle launcher.
//!
//! The host binary carries two framed regions appended to its own ELF
//! image: a fixed-size "tools" section of helper executables, followed by
//! the filesystem "layers" section the running application actually uses.
//! [`bootstrap`] extracts the former on first run and re-execs into a
//! cached resident copy; everything after that runs through
//! [`config::FimConfig::resolve`], [`stack::FilesystemStack::compose`], and
//! [`janitor`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod janitor;
pub mod mount;
pub mod payload;
pub mod process;
pub mod stack;

pub use config::FimConfig;
pub use error::{FimError, FimResult};
pub use stack::FilesystemStack;

/// Install the crate's tracing subscriber. `RUST_LOG` takes precedence;
/// `FIM_DEBUG=1` is treated as an implicit `debug` filter when `RUST_LOG`
/// is unset, matching the rest of this crate's `FIM_*` flag conventions.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if std::env::var("FIM_DEBUG").as_deref() == Ok("1") {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
