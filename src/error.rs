//! Error kinds surfaced on the public API (spec §7).

use std::io;
use thiserror::Error;

/// Every way a public `urbis` operation can fail.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("allocation failed: {0}")]
    Alloc(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("full: {0}")]
    Full(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("unsupported file version: {0}")]
    Version(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result alias used throughout the crate.
pub type IndexResult<T> = Result<T, IndexError>;
