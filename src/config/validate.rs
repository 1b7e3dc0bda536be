// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile, MAX_INTERVAL_SECS};
use crate::errors::{Result, RunwardenError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunwardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.service,
            raw.notifiers,
            raw.submitters,
        ))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_service(cfg)?;
    validate_submitter_names(cfg)?;
    validate_job_names(cfg)?;
    Ok(())
}

fn validate_service(cfg: &RawConfigFile) -> Result<()> {
    let svc = &cfg.service;

    if svc.watch_root.as_os_str().is_empty() {
        return Err(RunwardenError::ConfigError(
            "[service].watch_root must not be empty".to_string(),
        ));
    }

    for (key, value) in [
        ("run_polling_interval", svc.run_polling_interval),
        ("job_polling_interval", svc.job_polling_interval),
        ("staleness_threshold", svc.staleness_threshold),
    ] {
        if value == 0 {
            return Err(RunwardenError::ConfigError(format!(
                "[service].{key} must be >= 1 (got 0)"
            )));
        }
        if value > MAX_INTERVAL_SECS {
            return Err(RunwardenError::ConfigError(format!(
                "[service].{key} must be <= {MAX_INTERVAL_SECS} seconds (got {value})"
            )));
        }
    }

    if svc.max_attempts == 0 {
        return Err(RunwardenError::ConfigError(
            "[service].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if svc.ignore_marker.trim().is_empty() {
        return Err(RunwardenError::ConfigError(
            "[service].ignore_marker must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_submitter_names(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for submitter in &cfg.submitters {
        let name = submitter.effective_name();
        if name.trim().is_empty() {
            return Err(RunwardenError::ConfigError(
                "submitter class/name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(RunwardenError::ConfigError(format!(
                "submitter '{name}' is configured more than once; give each a distinct `name`"
            )));
        }
    }
    Ok(())
}

fn validate_job_names(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for submitter in &cfg.submitters {
        for job in &submitter.jobs {
            let name = job.effective_name();
            if name.trim().is_empty() {
                return Err(RunwardenError::ConfigError(format!(
                    "job under submitter '{}' has an empty class/name",
                    submitter.effective_name()
                )));
            }
            if !seen.insert(name) {
                return Err(RunwardenError::ConfigError(format!(
                    "job '{name}' is configured more than once; duties refer to jobs by name"
                )));
            }
        }
    }
    Ok(())
}
