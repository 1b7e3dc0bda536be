// src/jobs/barcoder.rs

use anyhow::Result;
use serde::Deserialize;

use super::{Job, JobCommand, JobContext, JobSteps, SingleStep};
use crate::exec::Hints;
use crate::types::JobScope;

fn default_num_cores() -> u32 {
    4
}

fn default_executable() -> String {
    "guppy_barcoder".to_string()
}

/// Demultiplexes a finished run's reads by barcode.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BarcoderJob {
    #[serde(default = "default_num_cores")]
    pub num_cores: u32,
    #[serde(default = "default_executable")]
    pub executable: String,
}

impl Job for BarcoderJob {
    fn class(&self) -> &'static str {
        "BarcoderJob"
    }

    fn scope(&self) -> JobScope {
        JobScope::Run
    }

    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>> {
        let remotedir = ctx.remotedir.display();
        let command = format!(
            "{exe} -t {cores}
                --verbose_logs
                --compress_fastq
                -i {run}
                -s {remotedir}/output
                --trim_barcodes",
            exe = self.executable,
            cores = self.num_cores,
            run = ctx.run.path.display(),
        );
        let mut hints = Hints::new();
        hints.insert("NUM_THREADS".to_string(), self.num_cores.to_string());
        Ok(Box::new(SingleStep::new(JobCommand::new(command).with_hints(hints))))
    }
}
