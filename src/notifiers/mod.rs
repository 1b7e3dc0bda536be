// src/notifiers/mod.rs

//! Run-completion notifications.
//!
//! Notifiers are fire-and-forget: [`notify_all`] delivers to every
//! configured channel, logs failures, and never lets one channel's error
//! affect another or the caller.

pub mod http;
pub mod log;

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::model::Run;

pub use http::HttpCallbackNotifier;
pub use log::LogNotifier;

#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    /// Name used in logs; usually the configured name.
    fn name(&self) -> &str;

    async fn notify(&self, run: &Run, message: &str) -> Result<()>;
}

/// Deliver `message` about `run` to every notifier. Returns how many failed.
pub async fn notify_all(notifiers: &[Arc<dyn Notifier>], run: &Run, message: &str) -> usize {
    let mut failures = 0;
    for notifier in notifiers {
        match notifier.notify(run, message).await {
            Ok(()) => info!(notifier = notifier.name(), run = %run.name, "notification delivered"),
            Err(err) => {
                failures += 1;
                warn!(
                    notifier = notifier.name(),
                    run = %run.name,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
    failures
}
