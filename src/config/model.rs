// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Upper bound for any `[service]` interval or threshold, in seconds (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [service]
/// watch_root = "/data"
/// database = "/var/lib/runwarden/runwarden.db"
/// run_polling_interval = 600
/// job_polling_interval = 1800
///
/// [[notifiers]]
/// class = "LogNotifier"
/// name = "operator log"
///
/// [[submitters]]
/// class = "LocalSubmitter"
///
/// [[submitters.jobs]]
/// class = "GenericRunJob"
/// name = "summary"
/// config = { command = "summarise {run_path} > {datadir}/summary.txt" }
/// ```
///
/// This is the unvalidated shape; see [`ConfigFile`] for the checked one.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub service: ServiceSection,

    #[serde(default)]
    pub notifiers: Vec<PluginConfig>,

    #[serde(default)]
    pub submitters: Vec<SubmitterConfig>,
}

/// `[service]` section: paths, polling cadence and staleness.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Instrument output directory. Runs live three levels below it.
    pub watch_root: PathBuf,

    /// SQLite database file backing the entity store.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Where private duty scratch directories are created.
    ///
    /// If `None`, the system temporary directory is used.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Seconds between run/file finalization passes.
    #[serde(default = "default_run_polling_interval")]
    pub run_polling_interval: u64,

    /// Seconds between duty scheduling passes.
    #[serde(default = "default_job_polling_interval")]
    pub job_polling_interval: u64,

    /// Seconds without writes after which a file counts as stale.
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold: u64,

    /// Any path segment containing this marker is never classified.
    #[serde(default = "default_ignore_marker")]
    pub ignore_marker: String,

    /// Consecutive backend failures tolerated before a duty is FAILED.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_database() -> PathBuf {
    PathBuf::from("runwarden.db")
}

fn default_run_polling_interval() -> u64 {
    600
}

fn default_job_polling_interval() -> u64 {
    1800
}

fn default_staleness_threshold() -> u64 {
    3600
}

fn default_ignore_marker() -> String {
    "_runwarden".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

impl ServiceSection {
    /// Section with every default applied, rooted at `watch_root`.
    pub fn with_watch_root(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            database: default_database(),
            scratch_root: None,
            run_polling_interval: default_run_polling_interval(),
            job_polling_interval: default_job_polling_interval(),
            staleness_threshold: default_staleness_threshold(),
            ignore_marker: default_ignore_marker(),
            max_attempts: default_max_attempts(),
        }
    }

    pub fn run_polling_interval(&self) -> Duration {
        Duration::from_secs(self.run_polling_interval)
    }

    pub fn job_polling_interval(&self) -> Duration {
        Duration::from_secs(self.job_polling_interval)
    }

    pub fn staleness_threshold(&self) -> chrono::Duration {
        let secs = self.staleness_threshold.min(MAX_INTERVAL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }
}

/// A class name plus its free-form configuration table.
///
/// Used for `[[notifiers]]` and `[[submitters.jobs]]` entries; the class is
/// resolved against the registry when the `System` is built.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub class: String,

    /// Display/lookup name; defaults to the class name.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub config: toml::Table,
}

impl PluginConfig {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: None,
            config: toml::Table::new(),
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class)
    }
}

/// `[[submitters]]` entry, owning the jobs it executes.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitterConfig {
    pub class: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub config: toml::Table,

    #[serde(default)]
    pub jobs: Vec<PluginConfig>,
}

impl SubmitterConfig {
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class)
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub service: ServiceSection,
    pub notifiers: Vec<PluginConfig>,
    pub submitters: Vec<SubmitterConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        service: ServiceSection,
        notifiers: Vec<PluginConfig>,
        submitters: Vec<SubmitterConfig>,
    ) -> Self {
        Self {
            service,
            notifiers,
            submitters,
        }
    }

    /// All configured jobs paired with the name of their submitter.
    pub fn jobs(&self) -> impl Iterator<Item = (&SubmitterConfig, &PluginConfig)> {
        self.submitters
            .iter()
            .flat_map(|s| s.jobs.iter().map(move |j| (s, j)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_threshold_saturates_instead_of_wrapping() {
        let mut svc = ServiceSection::with_watch_root("/data");
        svc.staleness_threshold = u64::MAX;
        assert_eq!(
            svc.staleness_threshold(),
            chrono::Duration::seconds(MAX_INTERVAL_SECS as i64)
        );
    }
}
