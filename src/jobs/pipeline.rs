// src/jobs/pipeline.rs

use anyhow::{ensure, Result};
use serde::Deserialize;

use super::{render_template, Job, JobCommand, JobContext, JobSteps, StepOutcome};
use crate::exec::Hints;
use crate::types::JobScope;

/// Run-level job made of several commands run one after another.
///
/// Each step may refer to `{previous_handle}`. The pipeline stops at the
/// first step that does not finish `Done`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineRunJob {
    pub steps: Vec<String>,
    #[serde(default)]
    pub hints: Hints,
}

#[derive(Debug)]
struct PipelineSteps {
    ctx: JobContext,
    templates: Vec<String>,
    hints: Hints,
    next: usize,
}

impl Job for PipelineRunJob {
    fn class(&self) -> &'static str {
        "PipelineRunJob"
    }

    fn scope(&self) -> JobScope {
        JobScope::Run
    }

    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>> {
        ensure!(!self.steps.is_empty(), "PipelineRunJob needs at least one step");
        Ok(Box::new(PipelineSteps {
            ctx: ctx.clone(),
            templates: self.steps.clone(),
            hints: self.hints.clone(),
            next: 0,
        }))
    }
}

impl JobSteps for PipelineSteps {
    fn next_command(&mut self, previous: Option<&StepOutcome>) -> Result<Option<JobCommand>> {
        if previous.is_some_and(|p| !p.succeeded()) {
            return Ok(None);
        }
        let Some(template) = self.templates.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let command = render_template(template, &self.ctx, previous);
        Ok(Some(JobCommand::new(command).with_hints(self.hints.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::JobStatus;
    use crate::jobs::tests::context;

    fn outcome(handle: &str, status: JobStatus) -> StepOutcome {
        StepOutcome {
            handle: handle.into(),
            status,
        }
    }

    #[test]
    fn steps_chain_previous_handle() {
        let job = PipelineRunJob {
            steps: vec!["align {run_path}".into(), "report {previous_handle}".into()],
            hints: Hints::new(),
        };
        let mut steps = job.plan(&context()).unwrap();

        let first = steps.next_command(None).unwrap().unwrap();
        assert_eq!(first.command, "align /data/EXP1/SAMP1/RUN1");
        let second = steps
            .next_command(Some(&outcome("101", JobStatus::Done)))
            .unwrap()
            .unwrap();
        assert_eq!(second.command, "report 101");
        assert!(steps
            .next_command(Some(&outcome("102", JobStatus::Done)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn failed_step_stops_the_pipeline() {
        let job = PipelineRunJob {
            steps: vec!["a".into(), "b".into()],
            hints: Hints::new(),
        };
        let mut steps = job.plan(&context()).unwrap();
        steps.next_command(None).unwrap();
        assert!(steps
            .next_command(Some(&outcome("1", JobStatus::Failed)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let job = PipelineRunJob {
            steps: Vec::new(),
            hints: Hints::new(),
        };
        assert!(job.plan(&context()).is_err());
    }
}
