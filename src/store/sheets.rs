// src/store/sheets.rs

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{opt_path, path_to_sql, Store};
use crate::errors::{Result, RunwardenError};
use crate::model::{RunId, Sample, SampleSheet, SheetId};
use crate::samplesheet::ParsedSampleSheet;

const SHEET_SELECT: &str = "SELECT id, run_id, path, version, date, library_id,
    sequencing_kit, barcode_kit FROM sample_sheets";

fn map_sheet(row: &Row<'_>) -> rusqlite::Result<SampleSheet> {
    let kits: String = row.get(7)?;
    let barcode_kit = serde_json::from_str(&kits).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SampleSheet {
        id: row.get(0)?,
        run: row.get(1)?,
        path: opt_path(row.get(2)?),
        version: row.get(3)?,
        date: row.get(4)?,
        library_id: row.get(5)?,
        sequencing_kit: row.get(6)?,
        barcode_kit,
        samples: Vec::new(),
    })
}

fn load_samples(conn: &Connection, sheet: &mut SampleSheet) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, sample_id, accession, barcode_id, organism, extraction_kit, comment, user
         FROM samples WHERE sample_sheet_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([sheet.id], |row| {
        Ok(Sample {
            id: row.get(0)?,
            sample_id: row.get(1)?,
            accession: row.get(2)?,
            barcode_id: row.get(3)?,
            organism: row.get(4)?,
            extraction_kit: row.get(5)?,
            comment: row.get(6)?,
            user: row.get(7)?,
        })
    })?;
    sheet.samples = rows.collect::<rusqlite::Result<_>>()?;
    Ok(())
}

fn sheets_where(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<SampleSheet>> {
    let mut stmt = conn.prepare(&format!("{SHEET_SELECT} {clause} ORDER BY id"))?;
    let mut sheets = stmt
        .query_map(params, map_sheet)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for sheet in &mut sheets {
        load_samples(conn, sheet)?;
    }
    Ok(sheets)
}

fn insert_sheet(conn: &Connection, parsed: &ParsedSampleSheet, path: Option<&Path>) -> Result<SheetId> {
    let kits = serde_json::to_string(&parsed.barcode_kit)
        .map_err(|e| RunwardenError::Other(e.into()))?;
    conn.execute(
        "INSERT INTO sample_sheets (path, version, date, library_id, sequencing_kit, barcode_kit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            path.map(path_to_sql),
            parsed.version,
            parsed.date,
            parsed.library_id,
            parsed.sequencing_kit,
            kits,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let mut insert = conn.prepare(
        "INSERT INTO samples (sample_sheet_id, position, sample_id, accession, barcode_id,
             organism, extraction_kit, comment, user)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for (position, sample) in parsed.samples.iter().enumerate() {
        insert.execute(params![
            id,
            position as i64,
            sample.sample_id,
            sample.accession,
            sample.barcode_id,
            sample.organism,
            sample.extraction_kit,
            sample.comment,
            sample.user,
        ])?;
    }
    Ok(id)
}

fn bind_sheet(conn: &Connection, sheet: SheetId, run: RunId) -> Result<()> {
    let owner: Option<Option<RunId>> = conn
        .query_row(
            "SELECT run_id FROM sample_sheets WHERE id = ?1",
            [sheet],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => return Err(RunwardenError::NotFound(format!("sample sheet id {sheet}"))),
        Some(Some(other)) => {
            return Err(RunwardenError::Conflict(format!(
                "sample sheet {sheet} is already attached to run {other}"
            )));
        }
        Some(None) => {}
    }

    let existing: Option<Option<SheetId>> = conn
        .query_row(
            "SELECT s.id FROM runs r LEFT JOIN sample_sheets s ON s.run_id = r.id
             WHERE r.id = ?1",
            [run],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        None => return Err(RunwardenError::NotFound(format!("run id {run}"))),
        Some(Some(other)) => {
            return Err(RunwardenError::Conflict(format!(
                "run {run} already has sample sheet {other}"
            )));
        }
        Some(None) => {}
    }

    conn.execute(
        "UPDATE sample_sheets SET run_id = ?1 WHERE id = ?2",
        params![run, sheet],
    )?;
    conn.execute(
        "UPDATE runs SET library_id =
             (SELECT library_id FROM sample_sheets WHERE id = ?1)
         WHERE id = ?2",
        params![sheet, run],
    )?;
    Ok(())
}

impl Store {
    /// Persist a parsed sheet, unattached.
    pub fn insert_sample_sheet(
        &self,
        parsed: &ParsedSampleSheet,
        path: Option<&Path>,
    ) -> Result<SampleSheet> {
        let id = self.with_tx(|tx| insert_sheet(tx, parsed, path))?;
        self.sample_sheet(id)?
            .ok_or_else(|| RunwardenError::NotFound(format!("sample sheet id {id}")))
    }

    /// Persist a parsed sheet already bound to `run`.
    ///
    /// Nothing is stored if the run is missing or already has a sheet.
    pub fn insert_attached_sheet(
        &self,
        parsed: &ParsedSampleSheet,
        path: Option<&Path>,
        run: RunId,
    ) -> Result<SampleSheet> {
        let id = self.with_tx(|tx| {
            let id = insert_sheet(tx, parsed, path)?;
            bind_sheet(tx, id, run)?;
            Ok(id)
        })?;
        self.sample_sheet(id)?
            .ok_or_else(|| RunwardenError::NotFound(format!("sample sheet id {id}")))
    }

    pub fn sample_sheet(&self, id: SheetId) -> Result<Option<SampleSheet>> {
        self.with_conn(|conn| Ok(sheets_where(conn, "WHERE id = ?1", [id])?.into_iter().next()))
    }

    pub fn sheet_for_run(&self, run: RunId) -> Result<Option<SampleSheet>> {
        self.with_conn(|conn| {
            Ok(sheets_where(conn, "WHERE run_id = ?1", [run])?
                .into_iter()
                .next())
        })
    }

    pub fn unattached_sheets(&self) -> Result<Vec<SampleSheet>> {
        self.with_conn(|conn| sheets_where(conn, "WHERE run_id IS NULL", []))
    }

    /// Bind `sheet` to `run` and copy the sheet's library id onto the run.
    ///
    /// Both sides are set at most once; re-attaching either is a conflict.
    pub fn attach_sheet(&self, sheet: SheetId, run: RunId) -> Result<()> {
        self.with_tx(|tx| bind_sheet(tx, sheet, run))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::samplesheet::ParsedSample;

    fn parsed() -> ParsedSampleSheet {
        ParsedSampleSheet {
            version: "1.0.1".into(),
            date: Utc::now(),
            library_id: "LIB7".into(),
            sequencing_kit: "SQK".into(),
            barcode_kit: vec!["EXP-NBD104".into()],
            samples: vec![
                ParsedSample {
                    sample_id: "S1".into(),
                    ..Default::default()
                },
                ParsedSample {
                    sample_id: "S2".into(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn attach_copies_library_id_and_is_set_once() {
        let store = Store::in_memory().unwrap();
        let (run, _) = store
            .get_or_create_run(Path::new("/data/E/S/R"), "R", Utc::now())
            .unwrap();
        let sheet = store.insert_sample_sheet(&parsed(), None).unwrap();
        assert_eq!(sheet.samples.len(), 2);
        assert_eq!(sheet.samples[1].sample_id, "S2");
        assert_eq!(store.unattached_sheets().unwrap().len(), 1);

        store.attach_sheet(sheet.id, run.id).unwrap();
        let run = store.run(run.id).unwrap().unwrap();
        assert_eq!(run.sample_sheet, Some(sheet.id));
        assert_eq!(run.library_id, "LIB7");
        assert!(store.unattached_sheets().unwrap().is_empty());

        let second = store.insert_sample_sheet(&parsed(), None).unwrap();
        assert!(matches!(
            store.attach_sheet(second.id, run.id),
            Err(RunwardenError::Conflict(_))
        ));
        assert!(matches!(
            store.attach_sheet(sheet.id, run.id),
            Err(RunwardenError::Conflict(_))
        ));
    }

    #[test]
    fn attached_insert_rolls_back_on_conflict() {
        let store = Store::in_memory().unwrap();
        let (run, _) = store
            .get_or_create_run(Path::new("/data/E/S/R"), "R", Utc::now())
            .unwrap();
        let first = store.insert_attached_sheet(&parsed(), None, run.id).unwrap();
        assert_eq!(first.run, Some(run.id));

        let err = store.insert_attached_sheet(&parsed(), None, run.id).unwrap_err();
        assert!(matches!(err, RunwardenError::Conflict(_)));
        assert!(store.unattached_sheets().unwrap().is_empty());
        assert!(store.sample_sheet(first.id + 1).unwrap().is_none());
    }
}
