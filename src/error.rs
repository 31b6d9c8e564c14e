use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob fails structural validation (bad magic, truncated payload,
    /// out-of-bounds offset).
    #[error("Corrupt blob: {0}")]
    BlobCorrupt(String),

    #[error("Blob version mismatch: expected {expected}, got {found}")]
    BlobVersionMismatch { expected: u64, found: u64 },

    #[error("Misaligned blob buffer at offset {offset} (required alignment {alignment})")]
    BlobAlignment { offset: u64, alignment: u64 },

    #[error("Missing asset: {0}")]
    MissingAsset(PathBuf),

    #[error("Texture error: {0}")]
    TextureError(String),

    #[error("Traversal backend error: {0}")]
    BackendError(String),

    #[error("Out of capacity: {0}")]
    OutOfCapacity(String),

    #[error("Invalid numeric value: {0}")]
    NumericInvalid(String),
}

impl Error {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::BlobCorrupt(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
