// src/exec/local.rs

//! Local process submitter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::submitter::{Hints, JobStatus, SubmitFuture, Submitter};

pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSubmitterConfig {
    /// Shell used to interpret commands.
    #[serde(default)]
    pub shell: Option<String>,
}

/// Runs each command as a `sh -c` child of the service.
///
/// Children are tracked by scratch directory, which doubles as the job
/// handle. Hints are exported as environment variables and output goes to
/// `stdout.log` / `stderr.log` inside the scratch directory.
#[derive(Debug)]
pub struct LocalSubmitter {
    shell: String,
    children: Mutex<HashMap<String, Child>>,
}

impl LocalSubmitter {
    pub fn new(config: LocalSubmitterConfig) -> Self {
        Self {
            shell: config.shell.unwrap_or_else(|| "sh".to_string()),
            children: Mutex::new(HashMap::new()),
        }
    }

    fn children(&self) -> MutexGuard<'_, HashMap<String, Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin(&self, command: &str, local_dir: &Path, hints: &Hints) -> Result<String> {
        let handle = local_dir.display().to_string();
        let stdout = open_log(local_dir, STDOUT_LOG).await?;
        let stderr = open_log(local_dir, STDERR_LOG).await?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(local_dir)
            .envs(hints)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning local job in {:?}", local_dir))?;
        info!(handle = %handle, pid = ?child.id(), cmd = %command, "started local job");

        self.children().insert(handle.clone(), child);
        Ok(handle)
    }

    fn poll(&self, handle: &str) -> Result<JobStatus> {
        let mut children = self.children();
        let child = children
            .get_mut(handle)
            .ok_or_else(|| anyhow!("no local job with handle {handle}"))?;
        let status = match child
            .try_wait()
            .with_context(|| format!("checking local job {handle}"))?
        {
            None => JobStatus::Running,
            Some(exit) if exit.success() => JobStatus::Done,
            Some(exit) => {
                debug!(handle, exit_code = ?exit.code(), "local job failed");
                JobStatus::Failed
            }
        };
        Ok(status)
    }
}

/// Open a log in append mode so every step of a job keeps its output.
async fn open_log(local_dir: &Path, name: &str) -> Result<std::fs::File> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(local_dir.join(name))
        .await
        .with_context(|| format!("opening {name} in {:?}", local_dir))?;
    Ok(file.into_std().await)
}

impl Submitter for LocalSubmitter {
    fn class(&self) -> &'static str {
        "LocalSubmitter"
    }

    fn test_noop(&self) -> SubmitFuture<'_, ()> {
        Box::pin(async move {
            let status = Command::new(&self.shell)
                .arg("-c")
                .arg("true")
                .status()
                .await
                .with_context(|| format!("running {} for startup check", self.shell))?;
            if !status.success() {
                bail!("{} -c true exited with {status}", self.shell);
            }
            Ok(())
        })
    }

    fn reroot_path(&self, local: &Path) -> PathBuf {
        local.to_path_buf()
    }

    fn begin_job<'a>(
        &'a self,
        command: &'a str,
        local_dir: &'a Path,
        _remote_dir: &'a Path,
        hints: &'a Hints,
    ) -> SubmitFuture<'a, String> {
        Box::pin(self.begin(command, local_dir, hints))
    }

    fn poll_job<'a>(&'a self, handle: &'a str) -> SubmitFuture<'a, JobStatus> {
        Box::pin(async move { self.poll(handle) })
    }

    fn closeout_job<'a>(
        &'a self,
        handle: &'a str,
        _local_dir: &'a Path,
        _remote_dir: &'a Path,
    ) -> SubmitFuture<'a, ()> {
        Box::pin(async move {
            self.children().remove(handle);
            debug!(handle, "closed out local job");
            Ok(())
        })
    }
}
