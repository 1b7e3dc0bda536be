// src/jobs/export.rs

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::{render_template, Job, JobCommand, JobContext, JobSteps, SingleStep};
use crate::model::Sample;
use crate::types::JobScope;

pub const EXPORT_FILE_NAME: &str = "samplesheet.json";

/// Writes the run's sample sheet as JSON into the scratch directory, then
/// runs `command` (typically an importer that reads it).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleSheetExportJob {
    pub command: String,
    #[serde(default)]
    pub closure_status_recipients: Vec<String>,
    #[serde(default)]
    pub import_ready_recipients: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Notifications<'a> {
    genome_closure_status: &'a [String],
    import_ready: &'a [String],
}

#[derive(Debug, Serialize)]
struct ExportedSheet<'a> {
    version: &'a str,
    library_id: &'a str,
    sequencing_kit: &'a str,
    barcode_kit: &'a [String],
    flowcell: Option<&'a str>,
    sequencer: String,
    relative_location: String,
    run_year: i32,
    run_month: u32,
    run_day: u32,
    notifications: Notifications<'a>,
    samples: &'a [Sample],
}

impl Job for SampleSheetExportJob {
    fn class(&self) -> &'static str {
        "SampleSheetExportJob"
    }

    fn scope(&self) -> JobScope {
        JobScope::Run
    }

    fn plan(&self, ctx: &JobContext) -> Result<Box<dyn JobSteps>> {
        let sheet = ctx
            .sample_sheet
            .as_ref()
            .with_context(|| format!("run '{}' has no sample sheet to export", ctx.run.name))?;

        let exported = ExportedSheet {
            version: &sheet.version,
            library_id: &sheet.library_id,
            sequencing_kit: &sheet.sequencing_kit,
            barcode_kit: &sheet.barcode_kit,
            flowcell: ctx.run.flowcell.as_deref(),
            sequencer: std::env::var("HOSTNAME").unwrap_or_default(),
            relative_location: ctx.run.path.display().to_string(),
            run_year: ctx.run.started.year(),
            run_month: ctx.run.started.month(),
            run_day: ctx.run.started.day(),
            notifications: Notifications {
                genome_closure_status: &self.closure_status_recipients,
                import_ready: &self.import_ready_recipients,
            },
            samples: &sheet.samples,
        };
        let json = serde_json::to_vec_pretty(&exported).context("serializing sample sheet")?;
        ctx.fs.write(&ctx.datadir.join(EXPORT_FILE_NAME), &json)?;

        let command = render_template(&self.command, ctx, None);
        Ok(Box::new(SingleStep::new(JobCommand::new(command))))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::Utc;

    use super::*;
    use crate::jobs::tests::context;
    use crate::model::SampleSheet;

    #[test]
    fn writes_json_before_yielding_command() {
        let mut ctx = context();
        ctx.sample_sheet = Some(SampleSheet {
            id: 1,
            run: Some(7),
            path: None,
            version: "1.0.1".into(),
            date: Utc::now(),
            library_id: "LIB".into(),
            sequencing_kit: "SQK".into(),
            barcode_kit: vec!["EXP-NBD104".into()],
            samples: vec![Sample {
                id: 1,
                sample_id: "S1".into(),
                accession: "A1".into(),
                barcode_id: "01".into(),
                organism: "E. coli".into(),
                extraction_kit: String::new(),
                comment: String::new(),
                user: "jdoe".into(),
            }],
        });
        let job = SampleSheetExportJob {
            command: "import {datadir}/samplesheet.json".into(),
            closure_status_recipients: vec!["a@example.org".into()],
            import_ready_recipients: Vec::new(),
        };

        let cmd = job.plan(&ctx).unwrap().next_command(None).unwrap().unwrap();
        assert_eq!(cmd.command, "import /scratch/duty-1/samplesheet.json");

        let mut text = String::new();
        ctx.fs
            .open_read(&ctx.datadir.join(EXPORT_FILE_NAME))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["library_id"], "LIB");
        assert_eq!(value["flowcell"], "FAK123");
        assert_eq!(value["samples"][0]["sample_id"], "S1");
        assert_eq!(value["notifications"]["genome_closure_status"][0], "a@example.org");
    }

    #[test]
    fn missing_sheet_fails_planning() {
        let job = SampleSheetExportJob {
            command: "true".into(),
            closure_status_recipients: Vec::new(),
            import_ready_recipients: Vec::new(),
        };
        assert!(job.plan(&context()).is_err());
    }
}
