//! Seal/open transform for partition blobs.
//!
//! # Pipeline
//!
//! ```text
//! seal: value -> JSON -> gzip -> ChaCha20-Poly1305 -> nonce || ciphertext
//! open: nonce || ciphertext -> decrypt -> gunzip -> JSON -> value
//! ```
//!
//! The encryption key is the SHA-256 digest of the caller's key string, so
//! keys of any length map to the same 32-byte cipher key every time. A fresh
//! nonce is drawn from the OS RNG on every call; sealing the same value twice
//! never yields the same bytes.
//!
//! Compression happens before encryption since ciphertext does not compress.

use std::io::{Read, Write};

use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Nonce length for ChaCha20-Poly1305 (12 bytes), stored at the front of every blob
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Smallest byte length `open` will attempt to decrypt
pub const MIN_BLOB_LEN: usize = NONCE_LEN + AUTH_TAG_LEN;

/// Derive the 256-bit cipher key from a caller-supplied key string.
pub fn derive_key(key: &str) -> [u8; 32] {
    let digest = Sha256::digest(key.as_bytes());
    let mut derived = [0u8; 32];
    derived.copy_from_slice(&digest);
    derived
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Serialize, compress and encrypt `value` under `key`.
///
/// Returns `nonce || ciphertext`, where the ciphertext carries the auth tag.
pub fn seal<T: Serialize + ?Sized>(value: &T, key: &str) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(value).map_err(CodecError::Serialize)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(CodecError::Compress)?;
    let compressed = encoder.finish().map_err(CodecError::Compress)?;

    let derived = derive_key(key);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derived));
    let nonce = generate_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), compressed.as_slice())
        .map_err(|_| CodecError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Reverse [`seal`].
///
/// # Errors
///
/// - [`CodecError::TooShort`] if the blob cannot hold a nonce and an auth tag
/// - [`CodecError::DecryptionFailed`] on a wrong key, flipped bits or truncation
/// - [`CodecError::Decompress`] / [`CodecError::Parse`] if the authenticated
///   payload is not a gzip'd JSON document of the expected shape
pub fn open<T: DeserializeOwned>(blob: &[u8], key: &str) -> Result<T, CodecError> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CodecError::TooShort {
            len: blob.len(),
            min: MIN_BLOB_LEN,
        });
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let derived = derive_key(key);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derived));
    let compressed = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CodecError::DecryptionFailed)?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(CodecError::Decompress)?;

    serde_json::from_slice(&json).map_err(CodecError::Parse)
}
