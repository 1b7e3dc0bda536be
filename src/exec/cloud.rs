// src/exec/cloud.rs

//! Submitter for a hosted analysis API.
//!
//! The API is expected to expose:
//! - `GET  {base_url}/health`
//! - `POST {base_url}/jobs` with `{command, workdir, hints}` returning `{id}`
//! - `GET  {base_url}/jobs/{id}` returning `{status}`
//!
//! all authenticated with a bearer API key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::submitter::{Hints, JobStatus, SubmitFuture, Submitter};

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudApiConfig {
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct NewJob<'a> {
    command: &'a str,
    workdir: String,
    hints: &'a Hints,
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobState {
    status: String,
}

/// Map the API's status word onto [`JobStatus`].
fn parse_status(word: &str) -> Result<JobStatus> {
    Ok(match word.to_ascii_uppercase().as_str() {
        "QUEUED" | "PENDING" => JobStatus::Queued,
        "RUNNING" => JobStatus::Running,
        "DONE" | "COMPLETED" | "SUCCEEDED" => JobStatus::Done,
        "FAILED" | "ERROR" | "CANCELLED" => JobStatus::Failed,
        other => bail!("unrecognised job status '{other}'"),
    })
}

#[derive(Debug)]
pub struct CloudApiSubmitter {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl CloudApiSubmitter {
    pub fn new(config: CloudApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn begin(&self, command: &str, remote_dir: &Path, hints: &Hints) -> Result<String> {
        let body = NewJob {
            command,
            workdir: remote_dir.display().to_string(),
            hints,
        };
        let created: JobCreated = self
            .client
            .post(self.url("jobs"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("submitting job to cloud API")?
            .error_for_status()
            .context("cloud API rejected job")?
            .json()
            .await
            .context("decoding cloud API job id")?;
        info!(handle = %created.id, "submitted cloud job");
        Ok(created.id)
    }

    async fn poll(&self, handle: &str) -> Result<JobStatus> {
        let state: JobState = self
            .client
            .get(self.url(&format!("jobs/{handle}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("polling cloud job {handle}"))?
            .error_for_status()
            .with_context(|| format!("cloud API refused status of job {handle}"))?
            .json()
            .await
            .context("decoding cloud job status")?;
        parse_status(&state.status)
    }
}

impl Submitter for CloudApiSubmitter {
    fn class(&self) -> &'static str {
        "CloudApiSubmitter"
    }

    fn test_noop(&self) -> SubmitFuture<'_, ()> {
        Box::pin(async move {
            self.client
                .get(self.url("health"))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .context("reaching cloud API")?
                .error_for_status()
                .context("cloud API health check failed")?;
            Ok(())
        })
    }

    fn reroot_path(&self, local: &Path) -> PathBuf {
        local.to_path_buf()
    }

    fn begin_job<'a>(
        &'a self,
        command: &'a str,
        _local_dir: &'a Path,
        remote_dir: &'a Path,
        hints: &'a Hints,
    ) -> SubmitFuture<'a, String> {
        Box::pin(self.begin(command, remote_dir, hints))
    }

    fn poll_job<'a>(&'a self, handle: &'a str) -> SubmitFuture<'a, JobStatus> {
        Box::pin(self.poll(handle))
    }

    fn closeout_job<'a>(
        &'a self,
        handle: &'a str,
        _local_dir: &'a Path,
        _remote_dir: &'a Path,
    ) -> SubmitFuture<'a, ()> {
        Box::pin(async move {
            debug!(handle, "cloud job closed out; results stay with the provider");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_words_are_case_insensitive() {
        assert_eq!(parse_status("queued").unwrap(), JobStatus::Queued);
        assert_eq!(parse_status("Running").unwrap(), JobStatus::Running);
        assert_eq!(parse_status("COMPLETED").unwrap(), JobStatus::Done);
        assert_eq!(parse_status("error").unwrap(), JobStatus::Failed);
        assert!(parse_status("paused").is_err());
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let submitter = CloudApiSubmitter::new(CloudApiConfig {
            api_key: "k".into(),
            base_url: "https://api.example.org/v1/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(submitter.url("/jobs"), "https://api.example.org/v1/jobs");
        assert_eq!(submitter.reroot_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
