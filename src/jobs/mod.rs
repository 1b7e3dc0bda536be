// src/jobs/mod.rs

//! Job definitions.
//!
//! A [`Job`] is configured once at startup and describes *what* a duty
//! executes. For each duty the job produces a [`JobSteps`] cursor, and the
//! scheduler drives it: ask for the next command, run it on the submitter,
//! hand the outcome back, repeat until the cursor returns `None`. A job thus
//! decides the shape of its own pipeline while the submitter only ever sees
//! one command at a time.

pub mod barcoder;
pub mod export;
pub mod generic;
pub mod pipeline;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::exec::{Hints, JobStatus};
use crate::fs::FileSystem;
use crate::model::{DutyId, FileRecord, Run, SampleSheet};
use crate::types::JobScope;

pub use barcoder::BarcoderJob;
pub use export::SampleSheetExportJob;
pub use generic::{GenericFileJob, GenericRunJob};
pub use pipeline::PipelineRunJob;

/// Everything a job may look at while planning a duty.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub duty: DutyId,
    pub run: Run,
    /// Set for file-scoped duties.
    pub file: Option<FileRecord>,
    pub sample_sheet: Option<SampleSheet>,
    /// Private scratch directory on this host.
    pub datadir: PathBuf,
    /// `datadir` as the submitter's backend sees it.
    pub remotedir: PathBuf,
    pub fs: Arc<dyn FileSystem>,
}

/// One command a job wants executed, plus its hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub command: String,
    pub hints: Hints,
}

impl JobCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            hints: Hints::new(),
        }
    }

    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }
}

/// Result of one executed command, fed back into the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub handle: String,
    pub status: JobStatus,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Done
    }
}

/// Per-duty cursor over a job's commands.
pub trait JobSteps: Send + Debug {
    /// `previous` is `None` on the first call and the outcome of the last
    /// command afterwards. `Ok(None)` ends the duty.
    fn next_command(&mut self, previous: Option<&StepOutcome>) -> Result<Option<JobCommand>>;
}

/// A configured, named unit of work.
pub trait Job: Send + Sync + Debug {
    fn class(&self) -> &'static str;

    /// Whether duties are spawned per finished run or per finished file.
    fn scope(&self) -> JobScope;

    /// Prepare a duty's scratch area and return its command cursor.
    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>>;
}

/// Cursor for jobs that run exactly one command.
#[derive(Debug)]
pub struct SingleStep(Option<JobCommand>);

impl SingleStep {
    pub fn new(command: JobCommand) -> Self {
        Self(Some(command))
    }
}

impl JobSteps for SingleStep {
    fn next_command(&mut self, _previous: Option<&StepOutcome>) -> Result<Option<JobCommand>> {
        Ok(self.0.take())
    }
}

/// Expand `{placeholder}`s in a command template.
///
/// Known placeholders: `{run_name}`, `{run_alias}`, `{run_path}`,
/// `{file_path}`, `{datadir}`, `{remotedir}`, `{previous_handle}`.
/// Anything else is left verbatim.
pub fn render_template(template: &str, ctx: &JobContext, previous: Option<&StepOutcome>) -> String {
    let file_path = ctx
        .file
        .as_ref()
        .map(|f| f.path.display().to_string())
        .unwrap_or_default();
    let previous_handle = previous.map(|p| p.handle.as_str()).unwrap_or_default();

    template
        .replace("{run_name}", &ctx.run.name)
        .replace("{run_alias}", &ctx.run.alt_name)
        .replace("{run_path}", &ctx.run.path.display().to_string())
        .replace("{file_path}", &file_path)
        .replace("{datadir}", &ctx.datadir.display().to_string())
        .replace("{remotedir}", &ctx.remotedir.display().to_string())
        .replace("{previous_handle}", previous_handle)
}
