//! Crate-wide error type.

use std::path::PathBuf;

pub type FimResult<T> = Result<T, FimError>;

#[derive(Debug, thiserror::Error)]
pub enum FimError {
    #[error("environment error: {0}")]
    Environment(String),

    #[error("payload error: {0}")]
    Payload(String),

    #[error("helper not found on PATH: {0}")]
    HelperNotFound(String),

    #[error("helper '{path}' failed (exit code {code:?})")]
    HelperFailed { path: PathBuf, code: Option<i32> },

    #[error("mount point busy: {0}")]
    Busy(PathBuf),

    #[error("invalid offset: {0}")]
    InvalidOffset(#[from] std::num::ParseIntError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
