//! File content hashing for move detection.
//!
//! Streams the whole file through SHA-256 in 1 MiB chunks, so memory use
//! stays flat no matter how large the audio file is.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::model::ContentHash;

const CHUNK_SIZE: usize = 1024 * 1024; // 1MB

/// Compute the SHA-256 of a file's full contents.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(ContentHash(hasher.finalize().into()))
}
