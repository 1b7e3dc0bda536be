// src/jobs/generic.rs

//! Single templated command jobs.

use anyhow::{bail, Result};
use serde::Deserialize;

use super::{render_template, Job, JobCommand, JobContext, JobSteps, SingleStep};
use crate::exec::Hints;
use crate::types::JobScope;

/// Runs one command per finished run.
///
/// ```toml
/// [[submitters.jobs]]
/// class = "GenericRunJob"
/// name = "archive"
/// config = { command = "tar czf {remotedir}/{run_alias}.tgz {run_path}" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericRunJob {
    pub command: String,
    #[serde(default)]
    pub hints: Hints,
}

impl Job for GenericRunJob {
    fn class(&self) -> &'static str {
        "GenericRunJob"
    }

    fn scope(&self) -> JobScope {
        JobScope::Run
    }

    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>> {
        let command = render_template(&self.command, ctx, None);
        Ok(Box::new(SingleStep::new(
            JobCommand::new(command).with_hints(self.hints.clone()),
        )))
    }
}

/// Runs one command per finalized file; `{file_path}` is the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericFileJob {
    pub command: String,
    #[serde(default)]
    pub hints: Hints,
}

impl Job for GenericFileJob {
    fn class(&self) -> &'static str {
        "GenericFileJob"
    }

    fn scope(&self) -> JobScope {
        JobScope::File
    }

    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>> {
        if ctx.file.is_none() {
            bail!("GenericFileJob planned for duty {} without a file", ctx.duty);
        }
        let command = render_template(&self.command, ctx, None);
        Ok(Box::new(SingleStep::new(
            JobCommand::new(command).with_hints(self.hints.clone()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::jobs::tests::context;
    use crate::model::FileRecord;

    #[test]
    fn file_job_renders_file_path_and_keeps_hints() {
        let mut ctx = context();
        ctx.file = Some(FileRecord {
            id: 3,
            path: PathBuf::from("/data/EXP1/SAMP1/RUN1/fastq_pass/a.fastq"),
            run: Some(7),
            sample: None,
            checksum: None,
            last_modified: Utc::now(),
            exported: 0,
        });
        let job: GenericFileJob = toml::from_str(
            "command = \"gzip -k {file_path}\"\nhints = { NUM_THREADS = \"2\" }",
        )
        .unwrap();

        let mut steps = job.plan(&ctx).unwrap();
        let cmd = steps.next_command(None).unwrap().unwrap();
        assert_eq!(cmd.command, "gzip -k /data/EXP1/SAMP1/RUN1/fastq_pass/a.fastq");
        assert_eq!(cmd.hints.get("NUM_THREADS").map(String::as_str), Some("2"));
    }

    #[test]
    fn file_job_needs_a_file() {
        let job = GenericFileJob {
            command: "true".into(),
            hints: Hints::new(),
        };
        assert!(job.plan(&context()).is_err());
    }
}
