// src/engine/poller.rs

//! Run / file finalization poller.
//!
//! Each tick looks at every RUNNING run. A file that has not been written
//! for longer than the staleness threshold is finalized on its own
//! (checksummed, file-level jobs spawned). A run whose files are *all*
//! stale is finished: marked DONE, tagged `finished`, notifiers fired and
//! run-level jobs spawned. A run with no files is never finished here.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::{Result, RunwardenError};
use crate::fs::compute_checksum;
use crate::model::{DutyOwner, EntityRef, FileRecord, Run};
use crate::notifiers::notify_all;
use crate::system::System;
use crate::types::{JobScope, Status};

/// Tag added to a run when it is finalized.
pub const FINISHED_TAG: &str = "finished";

#[derive(Debug, Clone)]
pub struct RunPoller {
    system: Arc<System>,
}

impl RunPoller {
    pub fn new(system: Arc<System>) -> Self {
        Self { system }
    }

    /// One tick at the current time. Returns the number of runs examined.
    pub async fn poll_runs(&self) -> Result<usize> {
        self.poll_runs_at(Utc::now()).await
    }

    pub async fn poll_runs_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let runs = self.system.store.runs_with_status(Status::Running)?;
        let threshold = self.system.service.staleness_threshold();
        let mut finished = 0;

        for run in &runs {
            match self.poll_run(run, now, threshold).await {
                Ok(true) => finished += 1,
                Ok(false) => {}
                Err(err) => warn!(run = %run.name, error = %err, "failed to poll run"),
            }
        }

        info!(polled = runs.len(), finished, "run poll complete");
        Ok(runs.len())
    }

    async fn poll_run(
        &self,
        run: &Run,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Result<bool> {
        let files = self.system.store.files_for_run(run.id)?;
        let mut all_stale = !files.is_empty();

        for file in &files {
            if !file.is_stale(now, threshold) {
                all_stale = false;
                continue;
            }
            if file.checksum.is_none() {
                if let Err(err) = self.finalize_file(file, now).await {
                    warn!(path = ?file.path, error = %err, "failed to finalize file");
                }
            }
        }

        if all_stale {
            self.finish_run(run, now).await?;
        }
        Ok(all_stale)
    }

    /// Checksum a stale file and spawn file-level jobs, once per file.
    async fn finalize_file(&self, file: &FileRecord, now: DateTime<Utc>) -> Result<()> {
        let fs = Arc::clone(&self.system.fs);
        let path = file.path.clone();
        let checksum = tokio::task::spawn_blocking(move || compute_checksum(fs.as_ref(), &path))
            .await
            .map_err(|e| RunwardenError::Other(anyhow!("checksum task panicked: {e}")))??;

        if !self.system.store.set_file_checksum(file.id, &checksum)? {
            debug!(path = ?file.path, "file already finalized");
            return Ok(());
        }
        info!(path = ?file.path, checksum = %checksum, "no recent writes; file finalized");

        for job in self.system.jobs_for(JobScope::File) {
            let duty = self
                .system
                .store
                .create_duty(&job.name, DutyOwner::File(file.id), now)?;
            info!(job = %job.name, duty = duty.id, path = ?file.path, "spawned file duty");
        }
        Ok(())
    }

    /// Close `run`: DONE, `ended = now`, tag `finished`, notify, spawn duties.
    ///
    /// Tags are only ever added, so anything already on the run survives.
    pub async fn finish_run(&self, run: &Run, now: DateTime<Utc>) -> Result<()> {
        let store = &self.system.store;
        store.finish_run(run.id, now, Status::Done)?;
        store.tag(EntityRef::run(run.id), FINISHED_TAG)?;
        let run = store
            .run(run.id)?
            .ok_or_else(|| RunwardenError::NotFound(format!("run id {}", run.id)))?;
        info!(run = %run.name, alias = %run.alt_name, "run ended; no recent file writes");

        notify_all(self.system.notifiers(), &run, "Run finished").await;

        for job in self.system.jobs_for(JobScope::Run) {
            let duty = store.create_duty(&job.name, DutyOwner::Run(run.id), now)?;
            info!(job = %job.name, duty = duty.id, run = %run.name, "spawned run duty");
        }
        Ok(())
    }

    /// Refresh `last_modified` of every file in a RUNNING run from disk.
    ///
    /// Used at startup so writes that happened while the service was down
    /// are not mistaken for staleness. Returns the number of files updated.
    pub async fn refresh_from_disk(&self) -> Result<usize> {
        let store = &self.system.store;
        let mut updated = 0;
        for run in store.runs_with_status(Status::Running)? {
            debug!(run = %run.name, "checking in-progress run for modifications");
            for file in store.files_for_run(run.id)? {
                if !self.system.fs.exists(&file.path) {
                    debug!(path = ?file.path, "file no longer on disk");
                    continue;
                }
                match self.system.fs.modified(&file.path) {
                    Ok(mtime) => {
                        store.touch_file(file.id, mtime)?;
                        updated += 1;
                    }
                    Err(err) => warn!(path = ?file.path, error = %err, "cannot read mtime"),
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(updated)
    }
}
