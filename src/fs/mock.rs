// src/fs/mock.rs

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::FileSystem;

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory filesystem for tests. Paths are used verbatim.
///
/// Clones share the same files, so a test can keep one handle while the
/// service holds another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, MockFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or replace) a file, stamped with the current time.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_at(path, content, Utc::now());
    }

    /// Add (or replace) a file with an explicit modification time.
    pub fn add_file_at(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) {
        self.files().insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Change a file's modification time, as a later write would.
    pub fn set_modified(&self, path: impl AsRef<Path>, at: DateTime<Utc>) -> Result<()> {
        let path = path.as_ref();
        let mut files = self.files();
        let file = files
            .get_mut(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;
        file.modified = at;
        Ok(())
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files().remove(path.as_ref());
    }

    /// Current contents of `path`, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files().get(path.as_ref()).map(|f| f.content.clone())
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = self
            .files()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;
        Ok(Box::new(Cursor::new(file.content)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        self.files()
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_files_and_mtimes() {
        let fs = MockFileSystem::new();
        let view = fs.clone();
        let at = Utc::now() - chrono::Duration::hours(3);
        fs.add_file_at("/data/E/S/R/a.fastq", "ACGT", at);

        let path = Path::new("/data/E/S/R/a.fastq");
        assert_eq!(view.modified(path).unwrap(), at);

        let later = Utc::now();
        view.set_modified(path, later).unwrap();
        assert_eq!(fs.modified(path).unwrap(), later);

        fs.remove(path);
        assert!(!view.exists(path));
        assert!(view.set_modified(path, later).is_err());
    }
}
