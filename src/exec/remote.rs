// src/exec/remote.rs

//! Batch-queue submitter reached over `ssh`.
//!
//! Scratch directories are pushed to the login host with `rsync`, jobs are
//! submitted with `qsub -terse`, tracked through `qstat` while they are in
//! the queue and `qacct` once they have left it, and results are pulled
//! back on closeout.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::submitter::{Hints, JobStatus, SubmitFuture, Submitter};

fn default_queue() -> String {
    "long.q".to_string()
}

fn default_remote_root() -> PathBuf {
    PathBuf::from("/tmp")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteQueueConfig {
    pub login_host: String,
    pub username: String,
    pub private_key_path: PathBuf,
    pub known_hosts_path: PathBuf,
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Directory on the remote side that scratch dirs are mirrored into.
    #[serde(default = "default_remote_root")]
    pub remote_root: PathBuf,
}

#[derive(Debug)]
pub struct RemoteQueueSubmitter {
    config: RemoteQueueConfig,
}

/// Quote `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render hints as `KEY=value` assignments prefixed to a command.
fn hint_prefix(hints: &Hints) -> String {
    hints
        .iter()
        .map(|(k, v)| format!("{k}={} ", shell_quote(v)))
        .collect()
}

/// Find `handle` in `qstat` output and map its state column.
pub(crate) fn parse_qstat(output: &str, handle: &str) -> Option<JobStatus> {
    output.lines().find_map(|line| {
        let mut cols = line.split_whitespace();
        if cols.next()? != handle {
            return None;
        }
        // job-ID prior name user state ...
        let state = cols.nth(3)?;
        Some(if state.contains('r') || state.contains('t') {
            JobStatus::Running
        } else {
            JobStatus::Queued
        })
    })
}

/// Read the final status out of a `qacct -j` record.
pub(crate) fn parse_qacct(output: &str) -> Option<JobStatus> {
    let field = |name: &str| {
        output.lines().find_map(|line| {
            let (key, value) = line.trim().split_once(char::is_whitespace)?;
            (key == name).then(|| value.trim().to_string())
        })
    };
    let exit_status = field("exit_status")?;
    let failed = field("failed").unwrap_or_else(|| "0".to_string());
    let failed_code = failed.split_whitespace().next().unwrap_or("0");
    Some(if exit_status == "0" && failed_code == "0" {
        JobStatus::Done
    } else {
        JobStatus::Failed
    })
}

impl RemoteQueueSubmitter {
    pub fn new(config: RemoteQueueConfig) -> Self {
        Self { config }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.username, self.config.login_host)
    }

    fn ssh_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.config.private_key_path.display().to_string(),
            "-o".to_string(),
            format!("UserKnownHostsFile={}", self.config.known_hosts_path.display()),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ]
    }

    async fn ssh_raw(&self, remote_cmd: &str) -> Result<Output> {
        debug!(host = %self.config.login_host, cmd = %remote_cmd, "ssh");
        Command::new("ssh")
            .args(self.ssh_options())
            .arg(self.destination())
            .arg(remote_cmd)
            .output()
            .await
            .with_context(|| format!("running ssh to {}", self.config.login_host))
    }

    async fn ssh(&self, remote_cmd: &str) -> Result<String> {
        let output = self.ssh_raw(remote_cmd).await?;
        if !output.status.success() {
            bail!(
                "remote command `{remote_cmd}` failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn rsync(&self, from: &str, to: &str) -> Result<()> {
        let transport = format!("ssh {}", self.ssh_options().join(" "));
        let status = Command::new("rsync")
            .arg("-az")
            .arg("-e")
            .arg(transport)
            .arg(from)
            .arg(to)
            .status()
            .await
            .context("running rsync")?;
        if !status.success() {
            bail!("rsync {from} -> {to} exited with {status}");
        }
        Ok(())
    }

    async fn begin(&self, command: &str, local_dir: &Path, remote_dir: &Path, hints: &Hints) -> Result<String> {
        let remote = remote_dir.display().to_string();
        self.ssh(&format!("mkdir -p {}", shell_quote(&remote))).await?;
        self.rsync(
            &format!("{}/", local_dir.display()),
            &format!("{}:{}/", self.destination(), remote),
        )
        .await?;

        let script = format!("{}{}", hint_prefix(hints), command);
        let submit = format!(
            "cd {dir} && echo {script} | qsub -terse -cwd -q {queue} -o {dir}/stdout.log -e {dir}/stderr.log",
            dir = shell_quote(&remote),
            script = shell_quote(&script),
            queue = shell_quote(&self.config.queue),
        );
        let out = self.ssh(&submit).await?;
        let handle = out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .context("qsub printed no job id")?
            .to_string();
        info!(handle = %handle, queue = %self.config.queue, "submitted remote job");
        Ok(handle)
    }

    async fn poll(&self, handle: &str) -> Result<JobStatus> {
        let queued = self
            .ssh(&format!("qstat -u {}", shell_quote(&self.config.username)))
            .await?;
        if let Some(status) = parse_qstat(&queued, handle) {
            return Ok(status);
        }
        // Not in the queue any more: accounting knows how it ended. It can
        // lag a little behind qstat, in which case report it as running.
        let acct = self.ssh_raw(&format!("qacct -j {}", shell_quote(handle))).await?;
        if !acct.status.success() {
            return Ok(JobStatus::Running);
        }
        Ok(parse_qacct(&String::from_utf8_lossy(&acct.stdout)).unwrap_or(JobStatus::Running))
    }
}

impl Submitter for RemoteQueueSubmitter {
    fn class(&self) -> &'static str {
        "RemoteQueueSubmitter"
    }

    fn test_noop(&self) -> SubmitFuture<'_, ()> {
        Box::pin(async move {
            let status = Command::new("rsync")
                .arg("--version")
                .stdout(std::process::Stdio::null())
                .status()
                .await
                .context("rsync is required by RemoteQueueSubmitter")?;
            if !status.success() {
                bail!("rsync --version exited with {status}");
            }
            self.ssh("true").await?;
            Ok(())
        })
    }

    fn reroot_path(&self, local: &Path) -> PathBuf {
        match local.file_name() {
            Some(name) => self.config.remote_root.join(name),
            None => self.config.remote_root.clone(),
        }
    }

    fn begin_job<'a>(
        &'a self,
        command: &'a str,
        local_dir: &'a Path,
        remote_dir: &'a Path,
        hints: &'a Hints,
    ) -> SubmitFuture<'a, String> {
        Box::pin(self.begin(command, local_dir, remote_dir, hints))
    }

    fn poll_job<'a>(&'a self, handle: &'a str) -> SubmitFuture<'a, JobStatus> {
        Box::pin(self.poll(handle))
    }

    fn closeout_job<'a>(
        &'a self,
        handle: &'a str,
        local_dir: &'a Path,
        remote_dir: &'a Path,
    ) -> SubmitFuture<'a, ()> {
        Box::pin(async move {
            self.rsync(
                &format!("{}:{}/", self.destination(), remote_dir.display()),
                &format!("{}/", local_dir.display()),
            )
            .await?;
            debug!(handle, "pulled remote job results");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter() -> RemoteQueueSubmitter {
        RemoteQueueSubmitter::new(RemoteQueueConfig {
            login_host: "hpc.example.org".into(),
            username: "svc".into(),
            private_key_path: "/keys/id".into(),
            known_hosts_path: "/keys/known_hosts".into(),
            queue: default_queue(),
            remote_root: "/scratch/svc".into(),
        })
    }

    #[test]
    fn reroot_keeps_scratch_dir_name() {
        assert_eq!(
            submitter().reroot_path(Path::new("/tmp/duty-4-abc")),
            PathBuf::from("/scratch/svc/duty-4-abc")
        );
    }

    #[test]
    fn qstat_state_maps_to_status() {
        let out = "job-ID  prior   name  user  state submit/start at     queue\n\
-----------------------------------------------------------------\n\
 4711 0.55500 STDIN svc   r     01/01/2024 10:00:00 long.q@n1\n\
 4712 0.00000 STDIN svc   qw    01/01/2024 10:01:00\n";
        assert_eq!(parse_qstat(out, "4711"), Some(JobStatus::Running));
        assert_eq!(parse_qstat(out, "4712"), Some(JobStatus::Queued));
        assert_eq!(parse_qstat(out, "4713"), None);
    }

    #[test]
    fn qacct_exit_codes_map_to_terminal_status() {
        let ok = "qname        long.q\nfailed       0\nexit_status  0\n";
        let bad = "qname        long.q\nfailed       0\nexit_status  2\n";
        let killed = "failed       100 : assumedly after job\nexit_status  0\n";
        assert_eq!(parse_qacct(ok), Some(JobStatus::Done));
        assert_eq!(parse_qacct(bad), Some(JobStatus::Failed));
        assert_eq!(parse_qacct(killed), Some(JobStatus::Failed));
        assert_eq!(parse_qacct("error: job id 1 not found"), None);
    }

    #[test]
    fn hints_are_quoted_assignments() {
        let mut hints = Hints::new();
        hints.insert("NUM_THREADS".into(), "4".into());
        assert_eq!(hint_prefix(&hints), "NUM_THREADS='4' ");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
