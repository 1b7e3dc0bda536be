// src/store/tags.rs

//! Tag association service.
//!
//! Tags live in their own tables and are linked to records through junction
//! rows keyed by `(entity_kind, entity_id)`. Every operation here touches the
//! junctions of exactly one entity, so tagging never clears anything else.

use rusqlite::{params, OptionalExtension, Transaction};

use super::Store;
use crate::errors::{Result, RunwardenError};
use crate::model::{EntityKind, EntityRef, TagSet, TripleTag};

fn require_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RunwardenError::InvalidTag(format!("{what} must not be empty")));
    }
    Ok(())
}

fn tag_id(tx: &Transaction<'_>, name: &str) -> rusqlite::Result<i64> {
    tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
    tx.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| row.get(0))
}

fn triple_tag_id(tx: &Transaction<'_>, tag: &TripleTag) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT OR IGNORE INTO triple_tags (namespace, name, value) VALUES (?1, ?2, ?3)",
        params![tag.namespace, tag.name, tag.value],
    )?;
    tx.query_row(
        "SELECT id FROM triple_tags WHERE namespace = ?1 AND name = ?2 AND value = ?3",
        params![tag.namespace, tag.name, tag.value],
        |row| row.get(0),
    )
}

fn table_of(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Run => "runs",
        EntityKind::File => "files",
        EntityKind::Duty => "duties",
        EntityKind::SampleSheet => "sample_sheets",
        EntityKind::Sample => "samples",
    }
}

impl Store {
    /// Whether the record `entity` points at exists.
    pub fn entity_exists(&self, entity: EntityRef) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table_of(entity.kind));
        self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, [entity.id], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    /// Attach plain tag `name` to `entity`. Tagging twice is a no-op.
    pub fn tag(&self, entity: EntityRef, name: &str) -> Result<()> {
        require_name("tag name", name)?;
        self.with_tx(|tx| {
            let id = tag_id(tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO tag_junctions (tag_id, entity_kind, entity_id)
                 VALUES (?1, ?2, ?3)",
                params![id, entity.kind.as_str(), entity.id],
            )?;
            Ok(())
        })
    }

    /// Detach plain tag `name` from `entity`. Returns whether it was attached.
    pub fn untag(&self, entity: EntityRef, name: &str) -> Result<bool> {
        let removed = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tag_junctions
                 WHERE entity_kind = ?1 AND entity_id = ?2
                   AND tag_id = (SELECT id FROM tags WHERE name = ?3)",
                params![entity.kind.as_str(), entity.id, name],
            )
        })?;
        Ok(removed > 0)
    }

    /// Attach structured tag `namespace:name=value` to `entity`.
    pub fn ttag(&self, entity: EntityRef, tag: &TripleTag) -> Result<()> {
        require_name("tag namespace", &tag.namespace)?;
        require_name("tag name", &tag.name)?;
        self.with_tx(|tx| {
            let id = triple_tag_id(tx, tag)?;
            tx.execute(
                "INSERT OR IGNORE INTO ttag_junctions (ttag_id, entity_kind, entity_id)
                 VALUES (?1, ?2, ?3)",
                params![id, entity.kind.as_str(), entity.id],
            )?;
            Ok(())
        })
    }

    /// Detach every `namespace:name` structured tag from `entity`, whatever
    /// its value. Returns how many were removed.
    pub fn unttag(&self, entity: EntityRef, namespace: &str, name: &str) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM ttag_junctions
                 WHERE entity_kind = ?1 AND entity_id = ?2
                   AND ttag_id IN (SELECT id FROM triple_tags WHERE namespace = ?3 AND name = ?4)",
                params![entity.kind.as_str(), entity.id, namespace, name],
            )
        })
    }

    /// Everything attached to `entity`, each list sorted.
    pub fn tags_of(&self, entity: EntityRef) -> Result<TagSet> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name FROM tags t
                 JOIN tag_junctions j ON j.tag_id = t.id
                 WHERE j.entity_kind = ?1 AND j.entity_id = ?2
                 ORDER BY t.name",
            )?;
            let tags = stmt
                .query_map(params![entity.kind.as_str(), entity.id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            let mut stmt = conn.prepare(
                "SELECT t.namespace, t.name, t.value FROM triple_tags t
                 JOIN ttag_junctions j ON j.ttag_id = t.id
                 WHERE j.entity_kind = ?1 AND j.entity_id = ?2
                 ORDER BY t.namespace, t.name, t.value",
            )?;
            let triple_tags = stmt
                .query_map(params![entity.kind.as_str(), entity.id], |row| {
                    Ok(TripleTag {
                        namespace: row.get(0)?,
                        name: row.get(1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(TagSet { tags, triple_tags })
        })
    }
}
