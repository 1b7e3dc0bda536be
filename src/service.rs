// src/service.rs

//! Operator-facing operations over the entity store.
//!
//! These are the calls an RPC layer or CLI would make: look up and list
//! runs, attach sample sheets and manage tags. None of them touch the
//! pollers.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::{Result, RunwardenError};
use crate::model::{EntityRef, Run, SampleSheet, TagSet, TripleTag};
use crate::samplesheet::ParsedSampleSheet;
use crate::store::Store;
use crate::system::System;

#[derive(Debug, Clone)]
pub struct RunService {
    system: Arc<System>,
}

impl RunService {
    pub fn new(system: Arc<System>) -> Self {
        Self { system }
    }

    fn store(&self) -> &Store {
        &self.system.store
    }

    /// Resolve `reference` as a numeric id, then a run name, then an alias.
    pub fn get_run(&self, reference: &str) -> Result<Run> {
        let reference = reference.trim();
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(run) = self.store().run(id)? {
                return Ok(run);
            }
        }
        if let Some(run) = self.store().run_by_name(reference)? {
            return Ok(run);
        }
        if let Some(run) = self.store().run_by_alias(reference)? {
            return Ok(run);
        }
        Err(RunwardenError::NotFound(format!("run '{reference}'")))
    }

    /// In-progress runs by default; every run with `include_all`.
    ///
    /// A non-empty `tags` filter implies `include_all`.
    pub fn list_runs(&self, include_all: bool, tags: &[String]) -> Result<Vec<Run>> {
        if !tags.is_empty() {
            return self.store().runs_by_tags(tags);
        }
        if include_all {
            self.store().all_runs()
        } else {
            self.store().active_runs()
        }
    }

    /// Store `parsed` and attach it to a run.
    ///
    /// With `run_ref` the sheet goes to that run. Without it the sheet is
    /// attached only if exactly one RUNNING run lacks a sheet; otherwise it
    /// is stored unattached and `Ambiguous` is returned.
    pub fn attach_sample_sheet(
        &self,
        parsed: &ParsedSampleSheet,
        path: Option<&Path>,
        run_ref: Option<&str>,
    ) -> Result<SampleSheet> {
        let run = match run_ref {
            Some(reference) => self.get_run(reference)?,
            None => {
                let mut waiting = self.store().runs_without_sheet()?;
                let candidates = waiting.len();
                match waiting.pop() {
                    Some(run) if candidates == 1 => run,
                    _ => {
                        let sheet = self.store().insert_sample_sheet(parsed, path)?;
                        warn!(sheet = sheet.id, candidates, "sample sheet left unattached");
                        return Err(RunwardenError::Ambiguous(format!(
                            "{candidates} runs are waiting for a sample sheet; specify a run"
                        )));
                    }
                }
            }
        };

        let sheet = self.store().insert_attached_sheet(parsed, path, run.id)?;
        info!(sheet = sheet.id, run = %run.name, library = %sheet.library_id, "sample sheet attached");
        Ok(sheet)
    }

    pub fn tag(&self, entity: EntityRef, name: &str) -> Result<()> {
        self.require(entity)?;
        self.store().tag(entity, name)
    }

    pub fn untag(&self, entity: EntityRef, name: &str) -> Result<bool> {
        self.require(entity)?;
        self.store().untag(entity, name)
    }

    pub fn ttag(&self, entity: EntityRef, tag: &TripleTag) -> Result<()> {
        self.require(entity)?;
        self.store().ttag(entity, tag)
    }

    pub fn unttag(&self, entity: EntityRef, namespace: &str, name: &str) -> Result<usize> {
        self.require(entity)?;
        self.store().unttag(entity, namespace, name)
    }

    pub fn tags_of(&self, entity: EntityRef) -> Result<TagSet> {
        self.require(entity)?;
        self.store().tags_of(entity)
    }

    fn require(&self, entity: EntityRef) -> Result<()> {
        if self.store().entity_exists(entity)? {
            Ok(())
        } else {
            Err(RunwardenError::NotFound(entity.to_string()))
        }
    }
}
