#![allow(dead_code)]

use std::sync::Arc;

use runwarden::config::{ConfigFile, PluginConfig, RawConfigFile, ServiceSection, SubmitterConfig};
use runwarden::exec::Submitter;
use runwarden::fs::mock::MockFileSystem;
use runwarden::fs::FileSystem;
use runwarden::jobs::Job;
use runwarden::notifiers::Notifier;
use runwarden::store::Store;
use runwarden::system::System;
use tempfile::TempDir;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(watch_root: &str) -> Self {
        Self {
            config: RawConfigFile {
                service: ServiceSection::with_watch_root(watch_root),
                notifiers: vec![],
                submitters: vec![],
            },
        }
    }

    pub fn service(mut self, f: impl FnOnce(&mut ServiceSection)) -> Self {
        f(&mut self.config.service);
        self
    }

    pub fn with_submitter(mut self, submitter: SubmitterConfig) -> Self {
        self.config.submitters.push(submitter);
        self
    }

    pub fn with_notifier(mut self, class: &str, name: &str) -> Self {
        let mut notifier = PluginConfig::new(class);
        notifier.name = Some(name.to_string());
        self.config.notifiers.push(notifier);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for one `[[submitters]]` entry and its jobs.
pub struct SubmitterConfigBuilder {
    submitter: SubmitterConfig,
}

impl SubmitterConfigBuilder {
    pub fn new(class: &str) -> Self {
        Self {
            submitter: SubmitterConfig {
                class: class.to_string(),
                name: None,
                config: toml::Table::new(),
                jobs: vec![],
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.submitter.name = Some(name.to_string());
        self
    }

    pub fn config(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.submitter.config.insert(key.to_string(), value.into());
        self
    }

    /// Add a job whose table has a single `command` entry.
    pub fn job(mut self, class: &str, name: &str, command: &str) -> Self {
        let mut job = PluginConfig::new(class);
        job.name = Some(name.to_string());
        job.config
            .insert("command".to_string(), toml::Value::String(command.to_string()));
        self.submitter.jobs.push(job);
        self
    }

    pub fn build(self) -> SubmitterConfig {
        self.submitter
    }
}

/// A `System` over an in-memory store and a mock filesystem.
///
/// `scratch` backs `service.scratch_root` and is removed on drop.
pub struct TestSystem {
    pub system: Arc<System>,
    pub fs: Arc<MockFileSystem>,
    pub scratch: TempDir,
}

impl TestSystem {
    pub fn store(&self) -> &Store {
        &self.system.store
    }
}

/// Builder for [`TestSystem`].
pub struct TestSystemBuilder {
    service: ServiceSection,
    submitters: Vec<(String, Arc<dyn Submitter>)>,
    jobs: Vec<(String, String, Arc<dyn Job>)>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl TestSystemBuilder {
    pub fn new(watch_root: &str) -> Self {
        Self {
            service: ServiceSection::with_watch_root(watch_root),
            submitters: vec![],
            jobs: vec![],
            notifiers: vec![],
        }
    }

    pub fn service(mut self, f: impl FnOnce(&mut ServiceSection)) -> Self {
        f(&mut self.service);
        self
    }

    pub fn submitter(mut self, name: &str, submitter: Arc<dyn Submitter>) -> Self {
        self.submitters.push((name.to_string(), submitter));
        self
    }

    pub fn job(mut self, name: &str, submitter: &str, job: Arc<dyn Job>) -> Self {
        self.jobs
            .push((name.to_string(), submitter.to_string(), job));
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn build(mut self) -> TestSystem {
        let scratch = tempfile::tempdir().expect("create scratch dir");
        self.service.scratch_root = Some(scratch.path().to_path_buf());

        let fs = Arc::new(MockFileSystem::new());
        let store = Store::in_memory().expect("open in-memory store");
        let mut builder =
            System::builder(store, self.service).fs(Arc::clone(&fs) as Arc<dyn FileSystem>);
        for (name, submitter) in self.submitters {
            builder = builder.submitter(name, submitter);
        }
        for (name, submitter, job) in self.jobs {
            builder = builder.job(name, submitter, job);
        }
        for notifier in self.notifiers {
            builder = builder.notifier(notifier);
        }

        TestSystem {
            system: Arc::new(builder.build().expect("valid test system")),
            fs,
            scratch,
        }
    }
}
