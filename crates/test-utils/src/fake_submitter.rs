use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;
use runwarden::exec::{Hints, JobStatus, SubmitFuture, Submitter};

/// A scripted submitter.
///
/// - `begin_job` fails while `failing_begins` is non-zero (each call uses
///   one), otherwise records the command and hands out `fake-N` handles.
/// - `poll_job` fails while `failing_polls` is non-zero, then pops the next
///   scripted status, or reports `Done` once the script is empty.
/// - `closeout_job` fails while `failing_closeouts` is non-zero; only
///   successful closeouts are recorded.
/// - `reroot_path` maps a scratch dir to `/remote/<dir name>`.
#[derive(Debug, Default)]
pub struct FakeSubmitter {
    failing_begins: Mutex<usize>,
    failing_polls: Mutex<usize>,
    failing_closeouts: Mutex<usize>,
    fail_noop: bool,
    polls: Mutex<VecDeque<JobStatus>>,
    begun: Mutex<Vec<(String, Hints)>>,
    closed: Mutex<Vec<String>>,
    next_handle: Mutex<u64>,
}

impl FakeSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `begin_job` fail.
    pub fn failing_begins(self, n: usize) -> Self {
        *self.failing_begins.lock().unwrap() = n;
        self
    }

    /// The next `n` calls to `poll_job` fail.
    pub fn failing_polls(self, n: usize) -> Self {
        *self.failing_polls.lock().unwrap() = n;
        self
    }

    /// The next `n` calls to `closeout_job` fail.
    pub fn failing_closeouts(self, n: usize) -> Self {
        *self.failing_closeouts.lock().unwrap() = n;
        self
    }

    /// `test_noop` fails.
    pub fn failing_noop(mut self) -> Self {
        self.fail_noop = true;
        self
    }

    /// Statuses returned by successive `poll_job` calls.
    pub fn with_polls(self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.polls.lock().unwrap().extend(statuses);
        self
    }

    /// Commands passed to `begin_job`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.begun
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    /// Hints passed with the `i`-th accepted command.
    pub fn hints(&self, i: usize) -> Option<Hints> {
        self.begun.lock().unwrap().get(i).map(|(_, h)| h.clone())
    }

    /// Handles that have been closed out, in order.
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl Submitter for FakeSubmitter {
    fn class(&self) -> &'static str {
        "FakeSubmitter"
    }

    fn test_noop(&self) -> SubmitFuture<'_, ()> {
        let fail = self.fail_noop;
        Box::pin(async move {
            if fail {
                Err(anyhow!("backend unreachable"))
            } else {
                Ok(())
            }
        })
    }

    fn reroot_path(&self, local: &Path) -> PathBuf {
        let name = local.file_name().map(PathBuf::from).unwrap_or_default();
        Path::new("/remote").join(name)
    }

    fn begin_job<'a>(
        &'a self,
        command: &'a str,
        _local_dir: &'a Path,
        _remote_dir: &'a Path,
        hints: &'a Hints,
    ) -> SubmitFuture<'a, String> {
        Box::pin(async move {
            if use_failure(&self.failing_begins) {
                return Err(anyhow!("submission refused"));
            }
            self.begun
                .lock()
                .unwrap()
                .push((command.to_string(), hints.clone()));
            let mut next = self.next_handle.lock().unwrap();
            *next += 1;
            Ok(format!("fake-{}", *next))
        })
    }

    fn poll_job<'a>(&'a self, _handle: &'a str) -> SubmitFuture<'a, JobStatus> {
        Box::pin(async move {
            if use_failure(&self.failing_polls) {
                return Err(anyhow!("queue status unavailable"));
            }
            Ok(self
                .polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(JobStatus::Done))
        })
    }

    fn closeout_job<'a>(
        &'a self,
        handle: &'a str,
        _local_dir: &'a Path,
        _remote_dir: &'a Path,
    ) -> SubmitFuture<'a, ()> {
        Box::pin(async move {
            if use_failure(&self.failing_closeouts) {
                return Err(anyhow!("results not retrievable"));
            }
            self.closed.lock().unwrap().push(handle.to_string());
            Ok(())
        })
    }
}

/// Consume one scripted failure, if any are left.
fn use_failure(remaining: &Mutex<usize>) -> bool {
    let mut remaining = remaining.lock().unwrap();
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}
