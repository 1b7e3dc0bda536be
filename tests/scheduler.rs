// tests/scheduler.rs

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use runwarden::engine::{DutyScheduler, DutyTally};
use runwarden::exec::{Hints, JobStatus};
use runwarden::jobs::{GenericRunJob, Job, PipelineRunJob};
use runwarden::model::{Duty, DutyOwner};
use runwarden::types::Status;
use runwarden_test_utils::{init_tracing, FakeSubmitter, TestSystem, TestSystemBuilder};

fn generic(command: &str) -> Arc<dyn Job> {
    Arc::new(GenericRunJob {
        command: command.into(),
        hints: Hints::from([("NUM_THREADS".to_string(), "2".to_string())]),
    })
}

fn system(submitter: Arc<FakeSubmitter>, job: Arc<dyn Job>) -> TestSystem {
    init_tracing();
    TestSystemBuilder::new("/data")
        .submitter("fake", submitter)
        .job("work", "fake", job)
        .build()
}

fn spawn_duty(ts: &TestSystem) -> Duty {
    let now = Utc::now();
    let (run, _) = ts
        .store()
        .get_or_create_run(Path::new("/data/E/S/RUN1"), "RUN1", now)
        .unwrap();
    ts.store().finish_run(run.id, now, Status::Done).unwrap();
    ts.store()
        .create_duty("work", DutyOwner::Run(run.id), now)
        .unwrap()
}

fn reload(ts: &TestSystem, duty: &Duty) -> Duty {
    ts.store().duty(duty.id).unwrap().unwrap()
}

#[tokio::test]
async fn three_failed_submissions_leave_the_duty_ready() {
    let submitter = Arc::new(FakeSubmitter::new().failing_begins(3));
    let ts = system(submitter.clone(), generic("work {run_name}"));
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    for _ in 0..3 {
        let tally = scheduler.poll_duties().await.unwrap();
        assert_eq!(tally.submitted, 0);
    }
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Ready);
    assert_eq!(after.attempts, 3);

    // The fourth attempt goes through and clears the counter.
    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!(tally.submitted, 1);
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Queued);
    assert_eq!(after.attempts, 0);
    assert_eq!(submitter.commands(), vec!["work RUN1".to_string()]);
}

#[tokio::test]
async fn four_failed_submissions_fail_the_duty() {
    let submitter = Arc::new(FakeSubmitter::new().failing_begins(4));
    let ts = system(submitter.clone(), generic("work"));
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    for _ in 0..4 {
        scheduler.poll_duties().await.unwrap();
    }
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Failed);
    assert_eq!(after.attempts, 4);

    // FAILED duties are left alone.
    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!(tally, DutyTally::default());
    assert!(submitter.commands().is_empty());
}

#[tokio::test]
async fn failed_polls_count_against_the_duty() {
    let submitter = Arc::new(FakeSubmitter::new().failing_polls(4));
    let ts = system(submitter.clone(), generic("work"));
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    scheduler.poll_duties().await.unwrap();
    for _ in 0..3 {
        scheduler.poll_duties().await.unwrap();
    }
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Queued);
    assert_eq!(after.attempts, 3);

    scheduler.poll_duties().await.unwrap();
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Failed);
    assert_eq!(after.attempts, 4);
    assert!(submitter.closed().is_empty());
}

#[tokio::test]
async fn successful_poll_clears_earlier_failures() {
    let submitter = Arc::new(
        FakeSubmitter::new()
            .failing_polls(3)
            .with_polls([JobStatus::Running]),
    );
    let ts = system(submitter.clone(), generic("work"));
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    for _ in 0..4 {
        scheduler.poll_duties().await.unwrap();
    }
    assert_eq!(reload(&ts, &duty).attempts, 3);

    scheduler.poll_duties().await.unwrap();
    let after = reload(&ts, &duty);
    assert_eq!(after.status, Status::Running);
    assert_eq!(after.attempts, 0);
}

#[tokio::test]
async fn failed_closeout_is_retried_without_skipping_a_step() {
    let submitter = Arc::new(FakeSubmitter::new().failing_closeouts(1));
    let pipeline = Arc::new(PipelineRunJob {
        steps: vec![
            "align {run_name}".into(),
            "report --from {previous_handle}".into(),
        ],
        hints: Hints::new(),
    });
    let ts = system(submitter.clone(), pipeline);
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    scheduler.poll_duties().await.unwrap();
    scheduler.poll_duties().await.unwrap();
    let stuck = reload(&ts, &duty);
    assert_eq!(stuck.attempts, 1);
    assert_eq!(stuck.job_handle.as_deref(), Some("fake-1"));
    assert!(submitter.closed().is_empty());

    scheduler.poll_duties().await.unwrap();
    let moved = reload(&ts, &duty);
    assert_eq!(moved.attempts, 0);
    assert_eq!(moved.job_handle.as_deref(), Some("fake-2"));

    scheduler.poll_duties().await.unwrap();
    assert_eq!(reload(&ts, &duty).status, Status::Done);
    assert_eq!(
        submitter.commands(),
        vec!["align RUN1".to_string(), "report --from fake-1".to_string()]
    );
    assert_eq!(submitter.closed(), vec!["fake-1".to_string(), "fake-2".to_string()]);
}

#[tokio::test]
async fn single_step_duty_walks_to_done() {
    let submitter = Arc::new(FakeSubmitter::new().with_polls([JobStatus::Running, JobStatus::Done]));
    let ts = system(submitter.clone(), generic("work\n    --in {run_path}\n    --out {remotedir}"));
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!((tally.polled, tally.submitted), (0, 1));
    let queued = reload(&ts, &duty);
    assert_eq!(queued.status, Status::Queued);
    assert_eq!(queued.job_handle.as_deref(), Some("fake-1"));

    let datadir = queued.datadir.clone().unwrap();
    assert!(datadir.starts_with(ts.scratch.path()));
    assert!(datadir.is_dir());
    let remotedir = queued.remotedir.clone().unwrap();
    assert_eq!(remotedir, Path::new("/remote").join(datadir.file_name().unwrap()));
    assert_eq!(
        submitter.commands(),
        vec![format!("work --in /data/E/S/RUN1 --out {}", remotedir.display())]
    );
    assert_eq!(
        submitter.hints(0).unwrap().get("NUM_THREADS").map(String::as_str),
        Some("2")
    );

    scheduler.poll_duties().await.unwrap();
    assert_eq!(reload(&ts, &duty).status, Status::Running);

    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!((tally.polled, tally.collected), (1, 1));
    assert_eq!(reload(&ts, &duty).status, Status::Done);
    assert_eq!(submitter.closed(), vec!["fake-1".to_string()]);
}

#[tokio::test]
async fn pipeline_feeds_each_result_into_the_next_step() {
    let submitter = Arc::new(FakeSubmitter::new());
    let pipeline = Arc::new(PipelineRunJob {
        steps: vec![
            "align {run_name}".into(),
            "report --from {previous_handle}".into(),
        ],
        hints: Hints::new(),
    });
    let ts = system(submitter.clone(), pipeline);
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    scheduler.poll_duties().await.unwrap();
    scheduler.poll_duties().await.unwrap();
    let middle = reload(&ts, &duty);
    assert_eq!(middle.status, Status::Queued);
    assert_eq!(middle.job_handle.as_deref(), Some("fake-2"));

    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!(tally.collected, 1);
    assert_eq!(reload(&ts, &duty).status, Status::Done);
    assert_eq!(
        submitter.commands(),
        vec!["align RUN1".to_string(), "report --from fake-1".to_string()]
    );
    assert_eq!(submitter.closed(), vec!["fake-1".to_string(), "fake-2".to_string()]);
}

#[tokio::test]
async fn failed_step_fails_the_duty() {
    let submitter = Arc::new(FakeSubmitter::new().with_polls([JobStatus::Failed]));
    let pipeline = Arc::new(PipelineRunJob {
        steps: vec!["first".into(), "never".into()],
        hints: Hints::new(),
    });
    let ts = system(submitter.clone(), pipeline);
    let duty = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    scheduler.poll_duties().await.unwrap();
    scheduler.poll_duties().await.unwrap();

    assert_eq!(reload(&ts, &duty).status, Status::Failed);
    assert_eq!(submitter.commands(), vec!["first".to_string()]);
}

#[tokio::test]
async fn unknown_job_class_counts_as_a_failed_attempt() {
    let ts = system(Arc::new(FakeSubmitter::new()), generic("work"));
    let (run, _) = ts
        .store()
        .get_or_create_run(Path::new("/data/E/S/R"), "R", Utc::now())
        .unwrap();
    let orphan = ts
        .store()
        .create_duty("retired", DutyOwner::Run(run.id), Utc::now())
        .unwrap();
    let healthy = spawn_duty(&ts);
    let scheduler = DutyScheduler::new(ts.system.clone());

    let tally = scheduler.poll_duties().await.unwrap();
    assert_eq!(tally.submitted, 1);
    assert_eq!(reload(&ts, &orphan).attempts, 1);
    assert_eq!(reload(&ts, &healthy).status, Status::Queued);
}

#[tokio::test]
async fn interrupted_duties_restart_from_ready() {
    let submitter = Arc::new(FakeSubmitter::new());
    let ts = system(submitter.clone(), generic("work"));
    let duty = spawn_duty(&ts);

    DutyScheduler::new(ts.system.clone())
        .poll_duties()
        .await
        .unwrap();
    assert_eq!(reload(&ts, &duty).status, Status::Queued);

    // A fresh scheduler has no cursor for the queued duty.
    let restarted = DutyScheduler::new(ts.system.clone());
    assert_eq!(restarted.recover_interrupted().unwrap(), 1);
    let reset = reload(&ts, &duty);
    assert_eq!(reset.status, Status::Ready);
    assert!(reset.job_handle.is_none());
    assert!(reset.datadir.is_some());

    restarted.poll_duties().await.unwrap();
    assert_eq!(submitter.commands().len(), 2);
    assert_eq!(reload(&ts, &duty).datadir, reset.datadir);
}
