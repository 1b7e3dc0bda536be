//! Shared fixtures for runwarden's integration tests.

pub mod builders;
pub mod fake_submitter;
pub mod recording_notifier;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

pub use builders::{ConfigFileBuilder, SubmitterConfigBuilder, TestSystem, TestSystemBuilder};
pub use fake_submitter::FakeSubmitter;
pub use recording_notifier::RecordingNotifier;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's captured writer.
///
/// Filter with `RUNWARDEN_LOG` (default `warn`); output only shows for
/// failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = std::env::var("RUNWARDEN_LOG")
            .ok()
            .and_then(|s| EnvFilter::try_new(s).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test if `f` takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("test timed out after 5 seconds")
}
