//! Error types for activity-archive

use thiserror::Error;

/// Failures of the seal/open transform.
///
/// Every `open` failure means the same thing to callers: the blob cannot be
/// read with this key. The variants only exist so logs can tell a truncated
/// file apart from a rotated key.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Blob too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Decryption failed (wrong key or corrupted blob)")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Compression failed: {0}")]
    Compress(std::io::Error),

    #[error("Decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(serde_json::Error),

    #[error("Parse failed: {0}")]
    Parse(serde_json::Error),
}

/// Failures of the remote activity source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
