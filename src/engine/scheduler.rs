// src/engine/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{normalize_command, Submitter};
use crate::jobs::{JobCommand, JobContext, JobSteps, StepOutcome};
use crate::model::{Duty, DutyId, DutyOwner};
use crate::system::{ConfiguredJob, System};
use crate::types::Status;

/// Counts reported by one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DutyTally {
    /// QUEUED/RUNNING duties whose backend state was checked.
    pub polled: usize,
    /// READY duties whose first command was accepted by a backend.
    pub submitted: usize,
    /// Duties that reached DONE or FAILED during this pass.
    pub collected: usize,
}

/// In-memory progress of one active duty.
#[derive(Debug)]
struct DutyCursor {
    steps: Box<dyn JobSteps>,
    /// A command the job produced but the backend has not accepted yet.
    pending: Option<JobCommand>,
}

enum Advance {
    Active,
    Finished,
}

/// Drives duties through `READY -> QUEUED -> RUNNING -> DONE | FAILED`.
///
/// Every backend call (begin, poll, closeout) counts against the duty's
/// attempt counter when it fails; a success resets the counter. Once the
/// counter exceeds `max_attempts` the duty is FAILED. Failures never leave
/// the duty they belong to.
#[derive(Debug)]
pub struct DutyScheduler {
    system: Arc<System>,
    cursors: Mutex<HashMap<DutyId, DutyCursor>>,
}

impl DutyScheduler {
    pub fn new(system: Arc<System>) -> Self {
        Self {
            system,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn lock_cursors(&self) -> MutexGuard<'_, HashMap<DutyId, DutyCursor>> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One scheduling pass: submit READY duties and poll active ones.
    ///
    /// Both batches run concurrently; within a batch each duty is its own
    /// future.
    pub async fn poll_duties(&self) -> Result<DutyTally> {
        let store = &self.system.store;
        let ready = store.duties_with_status(&[Status::Ready])?;
        let active = store.duties_with_status(&[Status::Queued, Status::Running])?;
        let polled = active.len();

        let submissions = join_all(ready.into_iter().map(|duty| self.submit_duty(duty)));
        let polls = join_all(active.into_iter().map(|duty| self.poll_duty(duty)));
        let (submitted, collected) = tokio::join!(submissions, polls);

        let tally = DutyTally {
            polled,
            submitted: submitted.into_iter().filter(|ok| *ok).count(),
            collected: collected.into_iter().filter(|done| *done).count(),
        };
        info!(
            polled = tally.polled,
            submitted = tally.submitted,
            collected = tally.collected,
            "duty poll complete"
        );
        Ok(tally)
    }

    /// Reset active duties that have no in-memory cursor back to READY.
    ///
    /// After a restart the multi-step position of a duty is gone, so the
    /// whole job is planned again from its first command.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let known: HashSet<DutyId> = self.lock_cursors().keys().copied().collect();
        let mut reset = 0;
        for mut duty in self
            .system
            .store
            .duties_with_status(&[Status::Queued, Status::Running])?
        {
            if known.contains(&duty.id) {
                continue;
            }
            warn!(duty = duty.id, job = %duty.job_class, handle = ?duty.job_handle, "interrupted duty reset to READY");
            duty.status = Status::Ready;
            duty.job_handle = None;
            self.system.store.save_duty(&duty)?;
            reset += 1;
        }
        Ok(reset)
    }

    async fn submit_duty(&self, mut duty: Duty) -> bool {
        match self.try_submit(&mut duty).await {
            Ok(submitted) => submitted,
            Err(err) => {
                self.record_failure(&mut duty, &err);
                false
            }
        }
    }

    async fn poll_duty(&self, mut duty: Duty) -> bool {
        let cursor = self.lock_cursors().remove(&duty.id);
        let Some(mut cursor) = cursor else {
            warn!(duty = duty.id, "active duty has no cursor; resubmitting");
            duty.status = Status::Ready;
            duty.job_handle = None;
            if let Err(err) = self.system.store.save_duty(&duty) {
                error!(duty = duty.id, error = %err, "failed to reset duty");
            }
            return false;
        };

        match self.advance(&mut duty, &mut cursor).await {
            Ok(Advance::Finished) => true,
            Ok(Advance::Active) => {
                self.lock_cursors().insert(duty.id, cursor);
                false
            }
            Err(err) => {
                self.lock_cursors().insert(duty.id, cursor);
                self.record_failure(&mut duty, &err);
                duty.status.is_terminal()
            }
        }
    }

    /// Plan the duty and begin its first command.
    ///
    /// Returns `false` when the job had nothing to run, in which case the
    /// duty is DONE straight away.
    async fn try_submit(&self, duty: &mut Duty) -> anyhow::Result<bool> {
        let (job, submitter) = self.resolve(duty)?;
        let (local, remote) = self.scratch_dirs(duty, submitter.as_ref())?;
        let ctx = self.context(duty, local.clone(), remote.clone())?;

        let mut steps = job
            .job
            .plan(&ctx)
            .with_context(|| format!("planning job '{}'", job.name))?;

        let Some(command) = steps.next_command(None)? else {
            duty.status = Status::Done;
            duty.attempts = 0;
            self.system.store.save_duty(duty)?;
            info!(duty = duty.id, job = %job.name, "job had no commands; duty done");
            return Ok(false);
        };

        let handle = begin(submitter.as_ref(), &command, &local, &remote).await?;
        info!(duty = duty.id, job = %job.name, handle = %handle, submitter = submitter.class(), "duty submitted");

        duty.status = Status::Queued;
        duty.job_handle = Some(handle);
        duty.attempts = 0;
        self.system.store.save_duty(duty)?;
        self.lock_cursors().insert(
            duty.id,
            DutyCursor {
                steps,
                pending: None,
            },
        );
        Ok(true)
    }

    /// Move an active duty one step: begin a pending command, or poll the
    /// current one and, once it is terminal, feed the outcome to the job.
    async fn advance(&self, duty: &mut Duty, cursor: &mut DutyCursor) -> anyhow::Result<Advance> {
        let (job, submitter) = self.resolve(duty)?;
        let local = duty
            .datadir
            .clone()
            .ok_or_else(|| anyhow!("active duty {} has no scratch directory", duty.id))?;
        let remote = duty
            .remotedir
            .clone()
            .unwrap_or_else(|| submitter.reroot_path(&local));

        if let Some(command) = cursor.pending.take() {
            return self
                .begin_next(duty, cursor, submitter.as_ref(), command, &local, &remote)
                .await;
        }

        let handle = duty
            .job_handle
            .clone()
            .ok_or_else(|| anyhow!("active duty {} has no job handle", duty.id))?;
        let status = submitter
            .poll_job(&handle)
            .await
            .with_context(|| format!("polling job '{handle}'"))?;
        duty.attempts = 0;

        if !status.is_terminal() {
            if duty.status != status.as_status() {
                debug!(duty = duty.id, from = %duty.status, to = %status, "duty status changed");
            }
            duty.status = status.as_status();
            self.system.store.save_duty(duty)?;
            return Ok(Advance::Active);
        }

        submitter
            .closeout_job(&handle, &local, &remote)
            .await
            .with_context(|| format!("closing out job '{handle}'"))?;
        let outcome = StepOutcome { handle, status };
        info!(duty = duty.id, job = %job.name, handle = %outcome.handle, status = %outcome.status, "step finished");

        match cursor.steps.next_command(Some(&outcome))? {
            Some(command) => {
                self.begin_next(duty, cursor, submitter.as_ref(), command, &local, &remote)
                    .await
            }
            None => {
                duty.status = if outcome.succeeded() {
                    Status::Done
                } else {
                    Status::Failed
                };
                self.system.store.save_duty(duty)?;
                info!(duty = duty.id, job = %job.name, status = %duty.status, "duty finished");
                Ok(Advance::Finished)
            }
        }
    }

    async fn begin_next(
        &self,
        duty: &mut Duty,
        cursor: &mut DutyCursor,
        submitter: &dyn Submitter,
        command: JobCommand,
        local: &Path,
        remote: &Path,
    ) -> anyhow::Result<Advance> {
        match begin(submitter, &command, local, remote).await {
            Ok(handle) => {
                debug!(duty = duty.id, handle = %handle, "next step submitted");
                duty.status = Status::Queued;
                duty.job_handle = Some(handle);
                duty.attempts = 0;
                self.system.store.save_duty(duty)?;
                Ok(Advance::Active)
            }
            Err(err) => {
                cursor.pending = Some(command);
                Err(err)
            }
        }
    }

    fn record_failure(&self, duty: &mut Duty, err: &anyhow::Error) {
        duty.attempts += 1;
        let max = self.system.service.max_attempts;
        if duty.attempts > max {
            duty.status = Status::Failed;
            self.lock_cursors().remove(&duty.id);
            error!(
                duty = duty.id,
                job = %duty.job_class,
                attempts = duty.attempts,
                error = %format!("{err:#}"),
                "duty failed; attempts exhausted"
            );
        } else {
            warn!(
                duty = duty.id,
                job = %duty.job_class,
                attempts = duty.attempts,
                max_attempts = max,
                error = %format!("{err:#}"),
                "duty attempt failed; will retry next pass"
            );
        }
        if let Err(err) = self.system.store.save_duty(duty) {
            error!(duty = duty.id, error = %err, "failed to record duty failure");
        }
    }

    fn resolve(&self, duty: &Duty) -> anyhow::Result<(ConfiguredJob, Arc<dyn Submitter>)> {
        let job = self
            .system
            .job(&duty.job_class)
            .ok_or_else(|| anyhow!("no configured job named '{}'", duty.job_class))?
            .clone();
        let submitter = self
            .system
            .submitter(&job.submitter)
            .ok_or_else(|| anyhow!("no configured submitter named '{}'", job.submitter))?
            .clone();
        Ok((job, submitter))
    }

    /// Reuse the duty's scratch directories or create fresh ones.
    fn scratch_dirs(
        &self,
        duty: &mut Duty,
        submitter: &dyn Submitter,
    ) -> anyhow::Result<(PathBuf, PathBuf)> {
        let local = match &duty.datadir {
            Some(dir) => dir.clone(),
            None => {
                let root = self.system.service.scratch_root();
                std::fs::create_dir_all(&root)
                    .with_context(|| format!("creating scratch root {}", root.display()))?;
                tempfile::Builder::new()
                    .prefix(&format!("duty-{}-", duty.id))
                    .tempdir_in(&root)
                    .with_context(|| format!("creating scratch dir under {}", root.display()))?
                    .keep()
            }
        };
        let remote = match &duty.remotedir {
            Some(dir) => dir.clone(),
            None => submitter.reroot_path(&local),
        };
        duty.datadir = Some(local.clone());
        duty.remotedir = Some(remote.clone());
        Ok((local, remote))
    }

    fn context(&self, duty: &Duty, datadir: PathBuf, remotedir: PathBuf) -> anyhow::Result<JobContext> {
        let store = &self.system.store;
        let (run_id, file) = match duty.owner {
            DutyOwner::Run(id) => (id, None),
            DutyOwner::File(id) => {
                let file = store
                    .file(id)?
                    .ok_or_else(|| anyhow!("file {id} no longer exists"))?;
                let run = file
                    .run
                    .ok_or_else(|| anyhow!("file {id} does not belong to a run"))?;
                (run, Some(file))
            }
        };
        let run = store
            .run(run_id)?
            .ok_or_else(|| anyhow!("run {run_id} no longer exists"))?;
        let sample_sheet = store.sheet_for_run(run.id)?;

        Ok(JobContext {
            duty: duty.id,
            run,
            file,
            sample_sheet,
            datadir,
            remotedir,
            fs: Arc::clone(&self.system.fs),
        })
    }
}

async fn begin(
    submitter: &dyn Submitter,
    command: &JobCommand,
    local: &Path,
    remote: &Path,
) -> anyhow::Result<String> {
    let normalized = normalize_command(&command.command);
    if normalized.is_empty() {
        bail!("job produced an empty command");
    }
    submitter
        .begin_job(&normalized, local, remote, &command.hints)
        .await
        .with_context(|| format!("{} failed to begin `{normalized}`", submitter.class()))
}
