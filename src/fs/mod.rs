// src/fs/mod.rs

//! Filesystem access used after classification.
//!
//! The classifier works from event paths alone. Anything that has to look
//! at a file afterwards (checksums, mtime refresh, sheet export) goes
//! through [`FileSystem`], so tests can run against [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub mod checksum;
pub mod mock;

pub use checksum::{compute_checksum, CHECKSUM_CHUNK_SIZE};

pub trait FileSystem: Send + Sync + Debug {
    /// Streaming reader over the file's bytes.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Create or replace `path`, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening {:?}", path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        fs::write(path, contents).with_context(|| format!("writing {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        let mtime = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("reading mtime of {:?}", path))?;
        Ok(mtime.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_write_creates_parents_and_reports_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duty-1").join("samplesheet.json");
        let before = Utc::now() - chrono::Duration::seconds(5);

        RealFileSystem.write(&path, b"{}").unwrap();

        assert!(RealFileSystem.exists(&path));
        assert!(RealFileSystem.modified(&path).unwrap() >= before);
        let mut text = String::new();
        RealFileSystem
            .open_read(&path)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "{}");
    }
}
