// src/registry.rs

//! Class-name registry for configurable components.
//!
//! Configuration refers to submitters, jobs and notifiers by class name
//! (`class = "LocalSubmitter"`). The registry maps each name to a factory
//! that turns the entry's `config` table into a live component. The
//! built-in table is populated by [`Registry::builtin`]; tests and
//! embedders can register extra classes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::errors::{Result, RunwardenError};
use crate::exec::{
    CloudApiConfig, CloudApiSubmitter, LocalSubmitter, LocalSubmitterConfig, RemoteQueueConfig,
    RemoteQueueSubmitter, Submitter,
};
use crate::jobs::{
    BarcoderJob, GenericFileJob, GenericRunJob, Job, PipelineRunJob, SampleSheetExportJob,
};
use crate::notifiers::http::HttpCallbackConfig;
use crate::notifiers::log::LogNotifierConfig;
use crate::notifiers::{HttpCallbackNotifier, LogNotifier, Notifier};

pub type SubmitterFactory =
    Box<dyn Fn(&str, &toml::Table) -> anyhow::Result<Arc<dyn Submitter>> + Send + Sync>;
pub type JobFactory = Box<dyn Fn(&toml::Table) -> anyhow::Result<Arc<dyn Job>> + Send + Sync>;
pub type NotifierFactory =
    Box<dyn Fn(&str, &toml::Table) -> anyhow::Result<Arc<dyn Notifier>> + Send + Sync>;

/// Deserialize a component's `config` table into its typed settings.
pub fn from_table<T: DeserializeOwned>(table: &toml::Table) -> anyhow::Result<T> {
    let settings = toml::Value::Table(table.clone()).try_into()?;
    Ok(settings)
}

#[derive(Default)]
pub struct Registry {
    submitters: BTreeMap<String, SubmitterFactory>,
    jobs: BTreeMap<String, JobFactory>,
    notifiers: BTreeMap<String, NotifierFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("submitters", &self.submitters.keys().collect::<Vec<_>>())
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .field("notifiers", &self.notifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Registry with every built-in class.
    pub fn builtin() -> Self {
        let mut registry = Self::default();

        registry.register_submitter("LocalSubmitter", |_, table| {
            let config: LocalSubmitterConfig = from_table(table)?;
            Ok(Arc::new(LocalSubmitter::new(config)))
        });
        registry.register_submitter("RemoteQueueSubmitter", |_, table| {
            let config: RemoteQueueConfig = from_table(table)?;
            Ok(Arc::new(RemoteQueueSubmitter::new(config)))
        });
        registry.register_submitter("CloudApiSubmitter", |_, table| {
            let config: CloudApiConfig = from_table(table)?;
            Ok(Arc::new(CloudApiSubmitter::new(config)?))
        });

        registry.register_job("GenericRunJob", |table| {
            Ok(Arc::new(from_table::<GenericRunJob>(table)?))
        });
        registry.register_job("GenericFileJob", |table| {
            Ok(Arc::new(from_table::<GenericFileJob>(table)?))
        });
        registry.register_job("BarcoderJob", |table| {
            Ok(Arc::new(from_table::<BarcoderJob>(table)?))
        });
        registry.register_job("PipelineRunJob", |table| {
            Ok(Arc::new(from_table::<PipelineRunJob>(table)?))
        });
        registry.register_job("SampleSheetExportJob", |table| {
            Ok(Arc::new(from_table::<SampleSheetExportJob>(table)?))
        });

        registry.register_notifier("LogNotifier", |name, table| {
            let _: LogNotifierConfig = from_table(table)?;
            Ok(Arc::new(LogNotifier::new(name)))
        });
        registry.register_notifier("HttpCallbackNotifier", |name, table| {
            let config: HttpCallbackConfig = from_table(table)?;
            Ok(Arc::new(HttpCallbackNotifier::new(name, config)?))
        });

        registry
    }

    pub fn register_submitter<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&str, &toml::Table) -> anyhow::Result<Arc<dyn Submitter>> + Send + Sync + 'static,
    {
        self.submitters.insert(class.into(), Box::new(factory));
    }

    pub fn register_job<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> anyhow::Result<Arc<dyn Job>> + Send + Sync + 'static,
    {
        self.jobs.insert(class.into(), Box::new(factory));
    }

    pub fn register_notifier<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&str, &toml::Table) -> anyhow::Result<Arc<dyn Notifier>> + Send + Sync + 'static,
    {
        self.notifiers.insert(class.into(), Box::new(factory));
    }

    pub fn build_submitter(
        &self,
        class: &str,
        name: &str,
        table: &toml::Table,
    ) -> Result<Arc<dyn Submitter>> {
        let factory = self.submitters.get(class).ok_or_else(|| RunwardenError::UnknownClass {
            kind: "submitter",
            name: class.to_string(),
        })?;
        let submitter = factory(name, table)
            .with_context(|| format!("configuring submitter '{name}' ({class})"))?;
        Ok(submitter)
    }

    pub fn build_job(&self, class: &str, name: &str, table: &toml::Table) -> Result<Arc<dyn Job>> {
        let factory = self.jobs.get(class).ok_or_else(|| RunwardenError::UnknownClass {
            kind: "job",
            name: class.to_string(),
        })?;
        let job = factory(table).with_context(|| format!("configuring job '{name}' ({class})"))?;
        Ok(job)
    }

    pub fn build_notifier(
        &self,
        class: &str,
        name: &str,
        table: &toml::Table,
    ) -> Result<Arc<dyn Notifier>> {
        let factory = self.notifiers.get(class).ok_or_else(|| RunwardenError::UnknownClass {
            kind: "notifier",
            name: class.to_string(),
        })?;
        let notifier = factory(name, table)
            .with_context(|| format!("configuring notifier '{name}' ({class})"))?;
        Ok(notifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobScope;

    #[test]
    fn builds_builtin_job_from_table() {
        let registry = Registry::builtin();
        let table: toml::Table = toml::from_str("command = \"echo {run_name}\"").unwrap();
        let job = registry.build_job("GenericRunJob", "echo", &table).unwrap();
        assert_eq!(job.scope(), JobScope::Run);
        assert_eq!(job.class(), "GenericRunJob");
    }

    #[test]
    fn unknown_class_is_typed_error() {
        let registry = Registry::builtin();
        let err = registry
            .build_submitter("SlurmSubmitter", "slurm", &toml::Table::new())
            .unwrap_err();
        assert!(matches!(
            err,
            RunwardenError::UnknownClass { kind: "submitter", ref name } if name == "SlurmSubmitter"
        ));
    }

    #[test]
    fn bad_component_config_names_the_component() {
        let registry = Registry::builtin();
        let table: toml::Table = toml::from_str("cmd = \"typo\"").unwrap();
        let err = registry.build_job("GenericRunJob", "broken", &table).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
