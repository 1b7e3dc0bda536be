// src/fs/checksum.rs

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use super::FileSystem;

/// Files are hashed in chunks of this size, so memory use stays flat no
/// matter how large a sequencing output file grows.
pub const CHECKSUM_CHUNK_SIZE: usize = 1024 * 1024;

/// Stream `path` through BLAKE3 and return the hex digest.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn compute_checksum(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = vec![0u8; CHECKSUM_CHUNK_SIZE];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n;
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize().to_hex().to_string();
    debug!(path = ?path, bytes = total, checksum = %digest, "computed file checksum");
    Ok(digest)
}
