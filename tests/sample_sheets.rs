// tests/sample_sheets.rs

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use tempfile::NamedTempFile;

use runwarden::errors::RunwardenError;
use runwarden::samplesheet::{self, ParsedSampleSheet};
use runwarden::service::RunService;
use runwarden::types::{FsEvent, Status};
use runwarden::watch::EventClassifier;
use runwarden_test_utils::{init_tracing, TestSystem, TestSystemBuilder};

const SHEET: &str = "\
porerefiner_ver,1.0.1
library_id,LIB01
sequencing_kit,SQK-LSK109
barcode_kit,EXP-NBD104,EXP-NBD114
sample_id,accession,barcode_id,organism,extraction_kit,comment,user
S1,ACC1,BC01,E. coli,kit,,jdoe
S2,ACC2,BC02,\"S. enterica, LT2\",kit,retest,jdoe
";

fn parsed() -> ParsedSampleSheet {
    samplesheet::parse(SHEET, ',', Utc::now()).unwrap()
}

fn setup(runs: &[&str]) -> (TestSystem, RunService) {
    init_tracing();
    let ts = TestSystemBuilder::new("/data").build();
    for name in runs {
        ts.store()
            .get_or_create_run(Path::new(&format!("/data/E/S/{name}")), name, Utc::now())
            .unwrap();
    }
    let service = RunService::new(ts.system.clone());
    (ts, service)
}

#[test]
fn no_waiting_run_leaves_sheet_unattached() {
    let (ts, service) = setup(&[]);
    let err = service.attach_sample_sheet(&parsed(), None, None).unwrap_err();
    assert!(matches!(err, RunwardenError::Ambiguous(_)));
    assert_eq!(ts.store().unattached_sheets().unwrap().len(), 1);
}

#[test]
fn single_waiting_run_gets_the_sheet() {
    let (ts, service) = setup(&["RUN1"]);
    let sheet = service.attach_sample_sheet(&parsed(), None, None).unwrap();

    let run = service.get_run("RUN1").unwrap();
    assert_eq!(sheet.run, Some(run.id));
    assert_eq!(run.sample_sheet, Some(sheet.id));
    assert_eq!(run.library_id, "LIB01");
    assert_eq!(sheet.samples.len(), 2);
    assert_eq!(sheet.samples[1].organism, "S. enterica, LT2");
    assert!(ts.store().unattached_sheets().unwrap().is_empty());
}

#[test]
fn two_waiting_runs_are_ambiguous() {
    let (ts, service) = setup(&["RUN1", "RUN2"]);
    let err = service.attach_sample_sheet(&parsed(), None, None).unwrap_err();
    assert!(matches!(err, RunwardenError::Ambiguous(_)));
    assert_eq!(ts.store().unattached_sheets().unwrap().len(), 1);
    assert_eq!(ts.store().runs_without_sheet().unwrap().len(), 2);
}

#[test]
fn finished_runs_do_not_wait_for_sheets() {
    let (ts, service) = setup(&["OLD", "NEW"]);
    let old = service.get_run("OLD").unwrap();
    ts.store().finish_run(old.id, Utc::now(), Status::Done).unwrap();

    let sheet = service.attach_sample_sheet(&parsed(), None, None).unwrap();
    assert_eq!(sheet.run, Some(service.get_run("NEW").unwrap().id));
}

#[test]
fn new_run_picks_up_a_lone_waiting_sheet() {
    let (ts, service) = setup(&[]);
    let _ = service.attach_sample_sheet(&parsed(), None, None);

    EventClassifier::new(ts.system.clone())
        .classify(&FsEvent::created("/data/E/S/RUN9", true))
        .unwrap();

    let run = service.get_run("RUN9").unwrap();
    assert!(run.sample_sheet.is_some());
    assert_eq!(run.library_id, "LIB01");
}

#[test]
fn rejected_attach_leaves_no_stray_sheet() {
    let (ts, service) = setup(&["RUN1"]);
    service.attach_sample_sheet(&parsed(), None, Some("RUN1")).unwrap();

    let err = service
        .attach_sample_sheet(&parsed(), None, Some("RUN1"))
        .unwrap_err();
    assert!(matches!(err, RunwardenError::Conflict(_)));
    assert!(ts.store().unattached_sheets().unwrap().is_empty());

    // A later run must not inherit the rejected sheet.
    EventClassifier::new(ts.system.clone())
        .classify(&FsEvent::created("/data/E/S/RUN2", true))
        .unwrap();
    let run = service.get_run("RUN2").unwrap();
    assert_eq!(run.sample_sheet, None);
    assert_eq!(run.library_id, "");
}

#[test]
fn sheets_load_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{SHEET}").unwrap();

    let sheet = samplesheet::load_from_path(file.path()).unwrap();
    assert_eq!(sheet.version, "1.0.1");
    assert_eq!(sheet.barcode_kit, vec!["EXP-NBD104", "EXP-NBD114"]);
    assert_eq!(sheet.samples[1].comment, "retest");
}
