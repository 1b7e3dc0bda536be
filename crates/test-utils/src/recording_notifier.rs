use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use runwarden::model::Run;
use runwarden::notifiers::Notifier;

/// Records every `(run name, message)` it is asked to deliver.
///
/// With `failing()` it still records, then returns an error.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    delivered: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, run: &Run, message: &str) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((run.name.clone(), message.to_string()));
        if self.fail {
            return Err(anyhow!("channel down"));
        }
        Ok(())
    }
}
