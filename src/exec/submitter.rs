// src/exec/submitter.rs

//! Pluggable execution backend abstraction.
//!
//! The duty scheduler never runs commands itself. It talks to a
//! [`Submitter`], which knows how to start one shell command somewhere
//! (local process, remote queue, cloud API) and how to check on it later.
//!
//! - [`LocalSubmitter`](super::local::LocalSubmitter) runs `sh -c` children.
//! - [`RemoteQueueSubmitter`](super::remote::RemoteQueueSubmitter) drives a
//!   batch queue over `ssh`.
//! - [`CloudApiSubmitter`](super::cloud::CloudApiSubmitter) posts to an HTTP API.
//!
//! Tests provide their own implementation that scripts the outcomes.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::Result;

use crate::types::Status;

/// Backend-specific execution hints, usually environment variables.
pub type Hints = BTreeMap<String, String>;

/// Future returned by every asynchronous [`Submitter`] method.
pub type SubmitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What a backend reports about one started command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Matching duty status.
    pub fn as_status(&self) -> Status {
        match self {
            JobStatus::Queued => Status::Queued,
            JobStatus::Running => Status::Running,
            JobStatus::Done => Status::Done,
            JobStatus::Failed => Status::Failed,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_status(), f)
    }
}

/// An execution backend.
///
/// Backend calls do not retry internally; the scheduler's attempt counter
/// is the only retry policy.
pub trait Submitter: Send + Sync + Debug {
    /// Short class label used in logs.
    fn class(&self) -> &'static str;

    /// Cheap connectivity / credential check, run once at startup.
    fn test_noop(&self) -> SubmitFuture<'_, ()>;

    /// Map a local scratch directory into the backend's path space.
    fn reroot_path(&self, local: &Path) -> PathBuf;

    /// Start `command` and return an opaque handle for it.
    fn begin_job<'a>(
        &'a self,
        command: &'a str,
        local_dir: &'a Path,
        remote_dir: &'a Path,
        hints: &'a Hints,
    ) -> SubmitFuture<'a, String>;

    /// Current state of the command behind `handle`.
    fn poll_job<'a>(&'a self, handle: &'a str) -> SubmitFuture<'a, JobStatus>;

    /// Collect results and release resources once `handle` is terminal.
    fn closeout_job<'a>(
        &'a self,
        handle: &'a str,
        local_dir: &'a Path,
        remote_dir: &'a Path,
    ) -> SubmitFuture<'a, ()>;
}

/// Collapse every run of whitespace (including newlines) into one space.
///
/// Job commands are often written as multi-line templates.
pub fn normalize_command(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_newlines_and_tabs() {
        let cmd = "guppy_barcoder -t 4\n        --verbose_logs\t-i /in\n";
        assert_eq!(normalize_command(cmd), "guppy_barcoder -t 4 --verbose_logs -i /in");
        assert_eq!(normalize_command("   "), "");
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert_eq!(JobStatus::Failed.as_status(), Status::Failed);
    }

    #[test]
    fn displays_as_duty_status() {
        assert_eq!(JobStatus::Running.to_string(), "RUNNING");
        assert_eq!(format!("{}", JobStatus::Done), "DONE");
    }
}
