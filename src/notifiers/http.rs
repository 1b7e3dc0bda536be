// src/notifiers/http.rs

//! HTTP callback notifier.
//!
//! POSTs a small JSON document to a configured URL:
//!
//! ```json
//! { "run": "RUN1", "alias": "brave_turing", "state": "DONE", "message": "..." }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Notifier;
use crate::model::Run;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpCallbackConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct CallbackBody<'a> {
    run: &'a str,
    alias: &'a str,
    state: &'a str,
    message: &'a str,
}

#[derive(Debug)]
pub struct HttpCallbackNotifier {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(name: impl Into<String>, config: HttpCallbackConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            name: name.into(),
            url: config.url,
            client,
        })
    }
}

#[async_trait]
impl Notifier for HttpCallbackNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, run: &Run, message: &str) -> Result<()> {
        let body = CallbackBody {
            run: &run.name,
            alias: &run.alt_name,
            state: run.status.as_str(),
            message,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("posting notification to {}", self.url))?;
        debug!(url = %self.url, status = %response.status(), "callback answered");
        response
            .error_for_status()
            .with_context(|| format!("callback {} rejected notification", self.url))?;
        Ok(())
    }
}
