// src/notifiers/log.rs

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::Notifier;
use crate::model::Run;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogNotifierConfig {}

/// Writes notifications to the service log.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    name: String,
}

impl LogNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, run: &Run, message: &str) -> Result<()> {
        info!(
            notifier = %self.name,
            run = %run.name,
            alias = %run.alt_name,
            status = %run.status,
            "{message}"
        );
        Ok(())
    }
}
