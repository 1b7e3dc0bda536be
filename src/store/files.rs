// src/store/files.rs

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{path_to_sql, Store};
use crate::errors::{Result, RunwardenError};
use crate::model::{EntityKind, FileId, FileRecord, RunId};

const FILE_SELECT: &str =
    "SELECT id, path, run_id, sample_id, checksum, last_modified, exported FROM files";

fn map_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        run: row.get(2)?,
        sample: row.get(3)?,
        checksum: row.get(4)?,
        last_modified: row.get(5)?,
        exported: row.get(6)?,
    })
}

fn file_by_path(conn: &Connection, key: &str) -> rusqlite::Result<Option<FileRecord>> {
    conn.query_row(&format!("{FILE_SELECT} WHERE path = ?1"), [key], map_file)
        .optional()
}

impl Store {
    /// Look up a file by path, creating it under `run` if absent.
    ///
    /// Returns the record and whether it was newly created.
    pub fn get_or_create_file(
        &self,
        path: &Path,
        run: RunId,
        last_modified: DateTime<Utc>,
    ) -> Result<(FileRecord, bool)> {
        let key = path_to_sql(path);
        self.with_tx(|tx| {
            if let Some(file) = file_by_path(tx, &key)? {
                return Ok((file, false));
            }
            tx.execute(
                "INSERT INTO files (path, run_id, last_modified) VALUES (?1, ?2, ?3)",
                params![key, run, last_modified],
            )?;
            let file = file_by_path(tx, &key)?
                .ok_or_else(|| RunwardenError::NotFound(format!("file at {key}")))?;
            Ok((file, true))
        })
    }

    pub fn file(&self, id: FileId) -> Result<Option<FileRecord>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{FILE_SELECT} WHERE id = ?1"), [id], map_file)
                .optional()
        })
    }

    pub fn file_by_path(&self, path: &Path) -> Result<Option<FileRecord>> {
        let key = path_to_sql(path);
        self.with_conn(|conn| file_by_path(conn, &key))
    }

    pub fn files_for_run(&self, run: RunId) -> Result<Vec<FileRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{FILE_SELECT} WHERE run_id = ?1 ORDER BY id"))?;
            let rows = stmt.query_map([run], map_file)?;
            rows.collect()
        })
    }

    /// Record a write observed at `at`.
    pub fn touch_file(&self, id: FileId, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET last_modified = ?1 WHERE id = ?2",
                params![at, id],
            )
        })?;
        Ok(())
    }

    /// Store the checksum, but only if none was recorded yet.
    ///
    /// Returns `false` when another pass already finalized the file.
    pub fn set_file_checksum(&self, id: FileId, checksum: &str) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET checksum = ?1 WHERE id = ?2 AND checksum IS NULL",
                params![checksum, id],
            )
        })?;
        Ok(changed == 1)
    }

    /// Remove a file record together with its own tag junctions.
    ///
    /// Tags themselves and the owning run's junctions are untouched. A file
    /// still referenced by a duty is kept; returns whether a row was removed.
    pub fn delete_file(&self, id: FileId) -> Result<bool> {
        let kind = EntityKind::File.as_str();
        self.with_tx(|tx| {
            let referenced: i64 = tx.query_row(
                "SELECT COUNT(*) FROM duties WHERE file_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if referenced > 0 {
                return Ok(false);
            }
            tx.execute(
                "DELETE FROM tag_junctions WHERE entity_kind = ?1 AND entity_id = ?2",
                params![kind, id],
            )?;
            tx.execute(
                "DELETE FROM ttag_junctions WHERE entity_kind = ?1 AND entity_id = ?2",
                params![kind, id],
            )?;
            let removed = tx.execute("DELETE FROM files WHERE id = ?1", [id])?;
            Ok(removed == 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityRef;

    fn store_with_run() -> (Store, RunId) {
        let store = Store::in_memory().unwrap();
        let (run, _) = store
            .get_or_create_run(Path::new("/data/E/S/R"), "R", Utc::now())
            .unwrap();
        (store, run.id)
    }

    #[test]
    fn checksum_is_written_once() {
        let (store, run) = store_with_run();
        let (file, _) = store
            .get_or_create_file(Path::new("/data/E/S/R/a.fastq"), run, Utc::now())
            .unwrap();

        assert!(store.set_file_checksum(file.id, "abc").unwrap());
        assert!(!store.set_file_checksum(file.id, "def").unwrap());
        assert_eq!(
            store.file(file.id).unwrap().unwrap().checksum.as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn delete_keeps_shared_tags_and_run_tags() {
        let (store, run) = store_with_run();
        let (a, _) = store
            .get_or_create_file(Path::new("/data/E/S/R/pass/a.fastq"), run, Utc::now())
            .unwrap();
        let (b, _) = store
            .get_or_create_file(Path::new("/data/E/S/R/pass/b.fastq"), run, Utc::now())
            .unwrap();
        store.tag(EntityRef::file(a.id), "pass").unwrap();
        store.tag(EntityRef::file(b.id), "pass").unwrap();
        store.tag(EntityRef::run(run), "pass").unwrap();

        assert!(store.delete_file(a.id).unwrap());
        assert!(store.file(a.id).unwrap().is_none());
        assert!(store.tags_of(EntityRef::file(b.id)).unwrap().contains("pass"));
        assert!(store.tags_of(EntityRef::run(run)).unwrap().contains("pass"));
    }
}
