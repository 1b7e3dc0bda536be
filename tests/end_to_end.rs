// tests/end_to_end.rs

use std::sync::Arc;

use chrono::{Duration, Utc};

use runwarden::engine::{run_service, DutyScheduler, RunPoller, FINISHED_TAG};
use runwarden::errors::RunwardenError;
use runwarden::exec::Hints;
use runwarden::jobs::{GenericFileJob, GenericRunJob, SampleSheetExportJob};
use runwarden::model::{DutyOwner, EntityRef};
use runwarden::samplesheet;
use runwarden::service::RunService;
use runwarden::types::{FsEvent, Status};
use runwarden::watch::{Classification, EventClassifier};
use runwarden_test_utils::{
    init_tracing, with_timeout, FakeSubmitter, RecordingNotifier, TestSystem, TestSystemBuilder,
};
use tokio_util::sync::CancellationToken;

const SHEET: &str = "\
porerefiner_ver,1.0.0
library_id,LIB07
sequencing_kit,SQK-RAD004
sample_id,accession,barcode_id,organism,extraction_kit,comment,user
S1,ACC1,BC01,E. coli,kit,,jdoe
";

fn system(submitter: Arc<FakeSubmitter>, notifier: Arc<RecordingNotifier>) -> TestSystem {
    init_tracing();
    TestSystemBuilder::new("/data")
        .submitter("fake", submitter)
        .job(
            "summary",
            "fake",
            Arc::new(GenericRunJob {
                command: "summarise {run_path} > {remotedir}/summary.txt".into(),
                hints: Hints::new(),
            }),
        )
        .job(
            "export",
            "fake",
            Arc::new(SampleSheetExportJob {
                command: "import {datadir}/samplesheet.json".into(),
                closure_status_recipients: vec![],
                import_ready_recipients: vec!["lab@example.org".into()],
            }),
        )
        .job(
            "index",
            "fake",
            Arc::new(GenericFileJob {
                command: "index {file_path}".into(),
                hints: Hints::new(),
            }),
        )
        .notifier(notifier)
        .build()
}

#[tokio::test]
async fn run_is_tracked_finished_and_processed() {
    let submitter = Arc::new(FakeSubmitter::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let ts = system(submitter.clone(), notifier.clone());
    let classifier = EventClassifier::new(ts.system.clone());
    let service = RunService::new(ts.system.clone());
    let t0 = Utc::now();

    // The sheet arrives before the run and waits.
    let sheet = samplesheet::parse(SHEET, ',', t0).unwrap();
    assert!(matches!(
        service.attach_sample_sheet(&sheet, None, None),
        Err(RunwardenError::Ambiguous(_))
    ));

    let outcome = classifier
        .classify_at(&FsEvent::created("/data/EXP1/SAMP1/RUN1", true), t0)
        .unwrap();
    let Classification::Run { run, created: true } = outcome else {
        panic!("expected a new run, got {outcome:?}");
    };
    let record = service.get_run("RUN1").unwrap();
    assert_eq!(record.id, run);
    let tags = ts.store().tags_of(EntityRef::run(run)).unwrap();
    assert!(tags.contains("EXP1") && tags.contains("SAMP1"));
    assert_eq!(record.library_id, "LIB07");

    let fastq = "/data/EXP1/SAMP1/RUN1/fastq_pass/a.fastq";
    ts.fs.add_file_at(fastq, "@read1\nACGT\n+\n!!!!\n", t0);
    let outcome = classifier
        .classify_at(&FsEvent::created(fastq, false), t0)
        .unwrap();
    let Classification::File { file, created: true, .. } = outcome else {
        panic!("expected a new file, got {outcome:?}");
    };
    assert_eq!(ts.store().files_for_run(run).unwrap().len(), 1);
    assert!(ts
        .store()
        .tags_of(EntityRef::file(file))
        .unwrap()
        .contains("fastq_pass"));

    // Nothing is written for longer than the staleness threshold.
    let later = t0 + Duration::minutes(61);
    let examined = RunPoller::new(ts.system.clone())
        .poll_runs_at(later)
        .await
        .unwrap();
    assert_eq!(examined, 1);

    let record = ts.store().run(run).unwrap().unwrap();
    assert_eq!(record.status, Status::Done);
    assert_eq!(record.ended, Some(later));
    assert!(ts.store().tags_of(EntityRef::run(run)).unwrap().contains(FINISHED_TAG));
    assert_eq!(notifier.delivered(), vec![("RUN1".to_string(), "Run finished".to_string())]);

    let mut run_duties: Vec<_> = ts
        .store()
        .duties_for_owner(DutyOwner::Run(run))
        .unwrap()
        .into_iter()
        .map(|d| d.job_class)
        .collect();
    run_duties.sort();
    assert_eq!(run_duties, vec!["export", "summary"]);
    assert_eq!(ts.store().duties_for_owner(DutyOwner::File(file)).unwrap().len(), 1);

    // Drive every duty to completion.
    let scheduler = DutyScheduler::new(ts.system.clone());
    let first = scheduler.poll_duties().await.unwrap();
    assert_eq!(first.submitted, 3);
    let second = scheduler.poll_duties().await.unwrap();
    assert_eq!((second.polled, second.collected), (3, 3));

    let done = ts.store().duties_with_status(&[Status::Done]).unwrap();
    assert_eq!(done.len(), 3);

    let export = done.iter().find(|d| d.job_class == "export").unwrap();
    let exported = export.datadir.as_ref().unwrap().join("samplesheet.json");
    let json = String::from_utf8(ts.fs.contents(&exported).unwrap()).unwrap();
    assert!(json.contains("\"library_id\": \"LIB07\""));
    assert!(json.contains("lab@example.org"));
    assert!(submitter
        .commands()
        .contains(&format!("index {fastq}")));
}

#[tokio::test]
async fn single_pass_service_runs_both_pollers() {
    let submitter = Arc::new(FakeSubmitter::new());
    let ts = system(submitter.clone(), Arc::new(RecordingNotifier::new()));
    let t0 = Utc::now() - Duration::hours(2);
    let classifier = EventClassifier::new(ts.system.clone());
    classifier
        .classify_at(&FsEvent::created("/data/E/S/R1", true), t0)
        .unwrap();
    let fastq = "/data/E/S/R1/fastq_pass/a.fastq";
    ts.fs.add_file_at(fastq, "ACGT", t0);
    classifier
        .classify_at(&FsEvent::created(fastq, false), t0)
        .unwrap();

    with_timeout(run_service(ts.system.clone(), true, CancellationToken::new()))
        .await
        .unwrap();

    let run = RunService::new(ts.system.clone()).get_run("R1").unwrap();
    assert_eq!(run.status, Status::Done);
    // "export" fails to plan without a sheet; the others were submitted.
    assert_eq!(submitter.commands().len(), 2);
}

#[tokio::test]
async fn failing_startup_check_aborts_the_service() {
    let submitter = Arc::new(FakeSubmitter::new().failing_noop());
    let ts = system(submitter.clone(), Arc::new(RecordingNotifier::new()));

    let err = run_service(ts.system.clone(), true, CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        RunwardenError::ConfigError(msg) => assert!(msg.contains("fake")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}
