// src/system.rs

//! The assembled service: store, configured components and settings.
//!
//! Built once at startup (from a validated [`ConfigFile`] or by hand in
//! tests) and shared by reference with the classifier and both pollers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigFile, ServiceSection};
use crate::errors::{Result, RunwardenError};
use crate::exec::Submitter;
use crate::fs::{FileSystem, RealFileSystem};
use crate::jobs::Job;
use crate::notifiers::Notifier;
use crate::registry::Registry;
use crate::store::Store;
use crate::types::JobScope;

/// A job definition bound to the submitter that executes it.
#[derive(Debug, Clone)]
pub struct ConfiguredJob {
    pub name: String,
    pub submitter: String,
    pub job: Arc<dyn Job>,
}

impl ConfiguredJob {
    pub fn scope(&self) -> JobScope {
        self.job.scope()
    }
}

pub struct System {
    pub store: Store,
    pub service: ServiceSection,
    pub fs: Arc<dyn FileSystem>,
    submitters: BTreeMap<String, Arc<dyn Submitter>>,
    jobs: Vec<ConfiguredJob>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("service", &self.service)
            .field("submitters", &self.submitters.keys().collect::<Vec<_>>())
            .field(
                "jobs",
                &self.jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(),
            )
            .field("notifiers", &self.notifiers.len())
            .finish_non_exhaustive()
    }
}

impl System {
    pub fn builder(store: Store, service: ServiceSection) -> SystemBuilder {
        SystemBuilder {
            store,
            service,
            fs: Arc::new(RealFileSystem),
            submitters: BTreeMap::new(),
            jobs: Vec::new(),
            notifiers: Vec::new(),
        }
    }

    /// Instantiate every configured component through `registry`.
    pub fn from_config(cfg: &ConfigFile, store: Store, registry: &Registry) -> Result<Self> {
        let mut builder = Self::builder(store, cfg.service.clone());

        for sub in &cfg.submitters {
            let name = sub.effective_name();
            builder = builder.submitter(name, registry.build_submitter(&sub.class, name, &sub.config)?);
            for job in &sub.jobs {
                let job_name = job.effective_name();
                builder = builder.job(
                    job_name,
                    name,
                    registry.build_job(&job.class, job_name, &job.config)?,
                );
            }
        }
        for notifier in &cfg.notifiers {
            let name = notifier.effective_name();
            builder = builder.notifier(registry.build_notifier(&notifier.class, name, &notifier.config)?);
        }

        builder.build()
    }

    pub fn submitter(&self, name: &str) -> Option<&Arc<dyn Submitter>> {
        self.submitters.get(name)
    }

    pub fn submitters(&self) -> impl Iterator<Item = (&str, &Arc<dyn Submitter>)> {
        self.submitters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn job(&self, name: &str) -> Option<&ConfiguredJob> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn jobs(&self) -> &[ConfiguredJob] {
        &self.jobs
    }

    /// Jobs spawned when an entity of `scope` finishes.
    pub fn jobs_for(&self, scope: JobScope) -> impl Iterator<Item = &ConfiguredJob> {
        self.jobs.iter().filter(move |j| j.scope() == scope)
    }

    pub fn notifiers(&self) -> &[Arc<dyn Notifier>] {
        &self.notifiers
    }

    /// Run every submitter's startup check; the first failure aborts.
    pub async fn test_submitters(&self) -> Result<()> {
        for (name, submitter) in &self.submitters {
            submitter.test_noop().await.map_err(|err| {
                RunwardenError::ConfigError(format!(
                    "submitter '{name}' ({}) failed its startup check: {err:#}",
                    submitter.class()
                ))
            })?;
            info!(submitter = %name, class = submitter.class(), "submitter ready");
        }
        Ok(())
    }
}

pub struct SystemBuilder {
    store: Store,
    service: ServiceSection,
    fs: Arc<dyn FileSystem>,
    submitters: BTreeMap<String, Arc<dyn Submitter>>,
    jobs: Vec<ConfiguredJob>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl SystemBuilder {
    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn submitter(mut self, name: impl Into<String>, submitter: Arc<dyn Submitter>) -> Self {
        self.submitters.insert(name.into(), submitter);
        self
    }

    pub fn job(
        mut self,
        name: impl Into<String>,
        submitter: impl Into<String>,
        job: Arc<dyn Job>,
    ) -> Self {
        self.jobs.push(ConfiguredJob {
            name: name.into(),
            submitter: submitter.into(),
            job,
        });
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn build(self) -> Result<System> {
        for job in &self.jobs {
            if !self.submitters.contains_key(&job.submitter) {
                return Err(RunwardenError::ConfigError(format!(
                    "job '{}' refers to unknown submitter '{}'",
                    job.name, job.submitter
                )));
            }
            if self.jobs.iter().filter(|j| j.name == job.name).count() > 1 {
                return Err(RunwardenError::ConfigError(format!(
                    "job '{}' is configured more than once",
                    job.name
                )));
            }
        }
        Ok(System {
            store: self.store,
            service: self.service,
            fs: self.fs,
            submitters: self.submitters,
            jobs: self.jobs,
            notifiers: self.notifiers,
        })
    }
}
