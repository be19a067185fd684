//! Checksum utilities for archive verification

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Default read size when hashing files
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 of a file, reading `chunk_size` bytes at a time
pub fn compute_file_checksum(path: impl AsRef<Path>, chunk_size: usize) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, chunk_size)
}

/// Compute the lowercase hex SHA-256 of any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, chunk_size: usize) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive digest comparison
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.trim().to_ascii_lowercase() == actual.trim().to_ascii_lowercase()
}
