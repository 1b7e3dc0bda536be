// src/store/runs.rs

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{path_to_sql, placeholders, Store};
use crate::errors::{Result, RunwardenError};
use crate::model::{Run, RunId};
use crate::names::random_alias;
use crate::types::Status;

const RUN_SELECT: &str = "
    SELECT r.id, r.name, r.alt_name, r.library_id, r.flowcell, r.path,
           r.started, r.ended, r.status, s.id, r.basecalling_model
    FROM runs r
    LEFT JOIN sample_sheets s ON s.run_id = r.id";

fn map_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        name: row.get(1)?,
        alt_name: row.get(2)?,
        library_id: row.get(3)?,
        flowcell: row.get(4)?,
        path: PathBuf::from(row.get::<_, String>(5)?),
        started: row.get(6)?,
        ended: row.get(7)?,
        status: row.get(8)?,
        sample_sheet: row.get(9)?,
        basecalling_model: row.get(10)?,
    })
}

pub(super) fn run_by_id(conn: &Connection, id: RunId) -> rusqlite::Result<Option<Run>> {
    conn.query_row(&format!("{RUN_SELECT} WHERE r.id = ?1"), [id], map_run)
        .optional()
}

fn runs_where(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Run>> {
    let mut stmt = conn.prepare(&format!("{RUN_SELECT} {clause} ORDER BY r.id"))?;
    let rows = stmt.query_map(params, map_run)?;
    rows.collect()
}

/// Pick an alias nobody else uses yet.
fn unused_alias(conn: &Connection) -> rusqlite::Result<String> {
    let taken = |alias: &str| -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE alt_name = ?1",
            [alias],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
    };

    let mut alias = random_alias();
    for _ in 0..16 {
        if !taken(&alias)? {
            return Ok(alias);
        }
        alias = random_alias();
    }

    let mut suffix = 2;
    while taken(&format!("{alias}_{suffix}"))? {
        suffix += 1;
    }
    Ok(format!("{alias}_{suffix}"))
}

impl Store {
    /// Look up a run by canonical path, creating it (status RUNNING) if absent.
    ///
    /// Returns the run and whether it was newly created.
    pub fn get_or_create_run(
        &self,
        path: &Path,
        name: &str,
        started: DateTime<Utc>,
    ) -> Result<(Run, bool)> {
        let key = path_to_sql(path);
        self.with_tx(|tx| {
            let existing = tx
                .query_row(&format!("{RUN_SELECT} WHERE r.path = ?1"), [&key], map_run)
                .optional()?;
            if let Some(run) = existing {
                return Ok((run, false));
            }

            let alias = unused_alias(tx)?;
            tx.execute(
                "INSERT INTO runs (name, alt_name, path, started, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, alias, key, started, Status::Running],
            )?;
            let run = run_by_id(tx, tx.last_insert_rowid())?
                .ok_or_else(|| RunwardenError::NotFound(format!("run at {key}")))?;
            Ok((run, true))
        })
    }

    pub fn run(&self, id: RunId) -> Result<Option<Run>> {
        self.with_conn(|conn| run_by_id(conn, id))
    }

    /// First run (lowest id) with this structural name.
    pub fn run_by_name(&self, name: &str) -> Result<Option<Run>> {
        self.with_conn(|conn| Ok(runs_where(conn, "WHERE r.name = ?1", [name])?.into_iter().next()))
    }

    pub fn run_by_alias(&self, alias: &str) -> Result<Option<Run>> {
        self.with_conn(|conn| {
            Ok(runs_where(conn, "WHERE r.alt_name = ?1", [alias])?
                .into_iter()
                .next())
        })
    }

    pub fn runs_with_status(&self, status: Status) -> Result<Vec<Run>> {
        self.with_conn(|conn| runs_where(conn, "WHERE r.status = ?1", [status]))
    }

    pub fn all_runs(&self) -> Result<Vec<Run>> {
        self.with_conn(|conn| runs_where(conn, "", []))
    }

    /// Runs that have not ended yet.
    pub fn active_runs(&self) -> Result<Vec<Run>> {
        self.with_conn(|conn| runs_where(conn, "WHERE r.ended IS NULL", []))
    }

    /// Runs carrying any of `tags`, either as a plain tag or as the value of a
    /// structured tag.
    pub fn runs_by_tags(&self, tags: &[String]) -> Result<Vec<Run>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let marks = placeholders(tags.len());
        let clause = format!(
            "WHERE r.id IN (
                 SELECT tj.entity_id FROM tag_junctions tj
                 JOIN tags t ON t.id = tj.tag_id
                 WHERE tj.entity_kind = 'run' AND t.name IN ({marks}))
             OR r.id IN (
                 SELECT tj.entity_id FROM ttag_junctions tj
                 JOIN triple_tags t ON t.id = tj.ttag_id
                 WHERE tj.entity_kind = 'run' AND t.value IN ({marks}))"
        );
        let params = tags.iter().chain(tags.iter());
        self.with_conn(|conn| runs_where(conn, &clause, params_from_iter(params)))
    }

    /// RUNNING runs that have no sample sheet attached yet.
    pub fn runs_without_sheet(&self) -> Result<Vec<Run>> {
        self.with_conn(|conn| {
            runs_where(
                conn,
                "WHERE r.status = ?1 AND s.id IS NULL",
                [Status::Running],
            )
        })
    }

    /// Close a run: set `ended` and a terminal status in one update.
    pub fn finish_run(&self, id: RunId, ended: DateTime<Utc>, status: Status) -> Result<()> {
        if !status.is_terminal() {
            return Err(RunwardenError::Other(anyhow::anyhow!(
                "finish_run needs a terminal status, got {status}"
            )));
        }
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE runs SET ended = ?1, status = ?2 WHERE id = ?3",
                params![ended, status, id],
            )
        })?;
        if changed == 0 {
            return Err(RunwardenError::NotFound(format!("run id {id}")));
        }
        Ok(())
    }

    pub fn set_run_flowcell(&self, id: RunId, flowcell: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE runs SET flowcell = ?1 WHERE id = ?2",
                params![flowcell, id],
            )
        })?;
        Ok(())
    }

    pub fn set_basecalling_model(&self, id: RunId, model: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE runs SET basecalling_model = ?1 WHERE id = ?2",
                params![model, id],
            )
        })?;
        Ok(())
    }
}
