// src/store/duties.rs

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{opt_path, path_to_sql, placeholders, Store};
use crate::errors::{Result, RunwardenError};
use crate::model::{Duty, DutyId, DutyOwner};
use crate::types::Status;

const DUTY_SELECT: &str = "SELECT id, job_class, status, datadir, remotedir, job_handle,
    run_id, file_id, attempts, created FROM duties";

fn map_duty(row: &Row<'_>) -> rusqlite::Result<Duty> {
    let run: Option<i64> = row.get(6)?;
    let file: Option<i64> = row.get(7)?;
    // The schema guarantees exactly one of the two is set.
    let owner = match (run, file) {
        (Some(run), _) => DutyOwner::Run(run),
        (None, Some(file)) => DutyOwner::File(file),
        (None, None) => {
            return Err(rusqlite::Error::InvalidColumnType(
                6,
                "run_id".into(),
                rusqlite::types::Type::Null,
            ));
        }
    };
    Ok(Duty {
        id: row.get(0)?,
        job_class: row.get(1)?,
        status: row.get(2)?,
        datadir: opt_path(row.get(3)?),
        remotedir: opt_path(row.get(4)?),
        job_handle: row.get(5)?,
        owner,
        attempts: row.get(8)?,
        created: row.get(9)?,
    })
}

fn duty_by_id(conn: &Connection, id: DutyId) -> rusqlite::Result<Option<Duty>> {
    conn.query_row(&format!("{DUTY_SELECT} WHERE id = ?1"), [id], map_duty)
        .optional()
}

impl Store {
    /// Spawn a READY duty for `job_class` against `owner`.
    pub fn create_duty(
        &self,
        job_class: &str,
        owner: DutyOwner,
        created: DateTime<Utc>,
    ) -> Result<Duty> {
        let (run, file) = match owner {
            DutyOwner::Run(id) => (Some(id), None),
            DutyOwner::File(id) => (None, Some(id)),
        };
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO duties (job_class, status, run_id, file_id, created)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![job_class, Status::Ready, run, file, created],
            )?;
            duty_by_id(tx, tx.last_insert_rowid())?
                .ok_or_else(|| RunwardenError::NotFound("freshly inserted duty".into()))
        })
    }

    pub fn duty(&self, id: DutyId) -> Result<Option<Duty>> {
        self.with_conn(|conn| duty_by_id(conn, id))
    }

    /// Duties whose status is any of `statuses`, oldest first.
    pub fn duties_with_status(&self, statuses: &[Status]) -> Result<Vec<Duty>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{DUTY_SELECT} WHERE status IN ({}) ORDER BY id",
            placeholders(statuses.len())
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(statuses.iter()), map_duty)?;
            rows.collect()
        })
    }

    pub fn duties_for_owner(&self, owner: DutyOwner) -> Result<Vec<Duty>> {
        let (column, id) = match owner {
            DutyOwner::Run(id) => ("run_id", id),
            DutyOwner::File(id) => ("file_id", id),
        };
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{DUTY_SELECT} WHERE {column} = ?1 ORDER BY id"))?;
            let rows = stmt.query_map([id], map_duty)?;
            rows.collect()
        })
    }

    /// Write back the mutable columns of `duty`.
    pub fn save_duty(&self, duty: &Duty) -> Result<()> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE duties
                 SET status = ?1, datadir = ?2, remotedir = ?3, job_handle = ?4, attempts = ?5
                 WHERE id = ?6",
                params![
                    duty.status,
                    duty.datadir.as_deref().map(path_to_sql),
                    duty.remotedir.as_deref().map(path_to_sql),
                    duty.job_handle,
                    duty.attempts,
                    duty.id,
                ],
            )
        })?;
        if changed == 0 {
            return Err(RunwardenError::NotFound(format!("duty id {}", duty.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;

    #[test]
    fn spawned_duty_is_ready_and_round_trips_state() {
        let store = Store::in_memory().unwrap();
        let (run, _) = store
            .get_or_create_run(Path::new("/data/E/S/R"), "R", Utc::now())
            .unwrap();

        let mut duty = store
            .create_duty("basecall", DutyOwner::Run(run.id), Utc::now())
            .unwrap();
        assert_eq!(duty.status, Status::Ready);
        assert_eq!(duty.attempts, 0);
        assert_eq!(duty.owner, DutyOwner::Run(run.id));

        duty.status = Status::Queued;
        duty.datadir = Some(PathBuf::from("/tmp/duty-1"));
        duty.job_handle = Some("42".into());
        duty.attempts = 2;
        store.save_duty(&duty).unwrap();

        assert_eq!(store.duty(duty.id).unwrap().unwrap(), duty);
        assert!(store.duties_with_status(&[Status::Ready]).unwrap().is_empty());
        assert_eq!(
            store
                .duties_with_status(&[Status::Queued, Status::Running])
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.duties_for_owner(DutyOwner::Run(run.id)).unwrap().len(), 1);
    }
}
