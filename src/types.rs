use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by Runs and Duties.
///
/// Runs only ever use `Running`, `Done` and `Failed`. Duties walk
/// `Ready -> Queued -> Running -> {Done | Failed}`. `Stopping` is accepted and
/// persisted but nothing acts on it: no scheduler pass selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ready,
    Queued,
    Running,
    Stopping,
    Done,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "READY",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Stopping => "STOPPING",
            Status::Done => "DONE",
            Status::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READY" => Ok(Status::Ready),
            "QUEUED" => Ok(Status::Queued),
            "RUNNING" => Ok(Status::Running),
            "STOPPING" => Ok(Status::Stopping),
            "DONE" => Ok(Status::Done),
            "FAILED" => Ok(Status::Failed),
            other => Err(format!("invalid status: {other}")),
        }
    }
}

/// What happened to a path, as reported by the watch backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
}

/// A single filesystem event, already reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub is_dir: bool,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn created(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
            kind: FsEventKind::Created,
        }
    }

    pub fn modified(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
            kind: FsEventKind::Modified,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
            kind: FsEventKind::Deleted,
        }
    }
}

/// Whether a Job runs once per finished Run or once per finished File.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobScope {
    Run,
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [
            Status::Ready,
            Status::Queued,
            Status::Running,
            Status::Stopping,
            Status::Done,
            Status::Failed,
        ] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert!("paused".parse::<Status>().is_err());
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(!Status::Stopping.is_terminal());
        assert!(!Status::Running.is_terminal());
    }
}
