// src/watch/classifier.rs

//! Filesystem event classification.
//!
//! The watch root is an instrument's output directory laid out as
//!
//! ```text
//! <root>/<experiment>/<sample>/<run>/.../<file>
//! ```
//!
//! Depth 1 and 2 are containers and map to nothing. A directory at depth 3
//! is a Run. Any file at depth 4 or deeper belongs to the Run above it. The
//! decision is made purely from the path; file contents are never read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::model::{EntityRef, FileId, Run, RunId, TripleTag};
use crate::store::Store;
use crate::system::System;
use crate::types::{FsEvent, FsEventKind};
use crate::watch::path_utils::{contains_marker, relative_components};

/// Depth below the watch root at which Runs live.
pub const RUN_DEPTH: usize = 3;

/// Namespace of the structured tags parsed out of a run directory name.
pub const RUN_TAG_NAMESPACE: &str = "run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OutsideRoot,
    /// Path contains the service's own marker segment.
    Marker,
    /// Experiment or sample container (depth 1-2).
    Container,
    /// A plain file sitting where a run directory is expected.
    NotARunDirectory,
    Directory,
    Untracked,
    /// Deleted file still referenced by a duty; the record is kept.
    Referenced,
}

/// What an event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ignored(IgnoreReason),
    Run { run: RunId, created: bool },
    File { run: RunId, file: FileId, created: bool },
    Touched { file: FileId },
    Deleted { file: FileId },
}

/// `<start>_<device>_<flowcell>_<protocol>` pieces of a run directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNameParts {
    pub started: String,
    pub device: String,
    pub flowcell: String,
    pub protocol: String,
}

/// Split a run directory name into exactly four non-empty parts.
pub fn parse_run_name(name: &str) -> Option<RunNameParts> {
    let parts: Vec<&str> = name.split('_').collect();
    let [started, device, flowcell, protocol] = parts.as_slice() else {
        return None;
    };
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(RunNameParts {
        started: started.to_string(),
        device: device.to_string(),
        flowcell: flowcell.to_string(),
        protocol: protocol.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    system: Arc<System>,
    root: PathBuf,
}

impl EventClassifier {
    pub fn new(system: Arc<System>) -> Self {
        let root = system.service.watch_root.clone();
        Self { system, root }
    }

    fn store(&self) -> &Store {
        &self.system.store
    }

    pub fn classify(&self, event: &FsEvent) -> Result<Classification> {
        self.classify_at(event, Utc::now())
    }

    /// Classify `event` as if it was observed at `now`.
    pub fn classify_at(&self, event: &FsEvent, now: DateTime<Utc>) -> Result<Classification> {
        let Some(parts) = relative_components(&self.root, &event.path) else {
            debug!(path = ?event.path, root = ?self.root, "event outside watch root");
            return Ok(Classification::Ignored(IgnoreReason::OutsideRoot));
        };
        if contains_marker(&parts, &self.system.service.ignore_marker) {
            return Ok(Classification::Ignored(IgnoreReason::Marker));
        }

        let path = self.root.join(parts.iter().collect::<PathBuf>());
        match event.kind {
            FsEventKind::Created => self.on_created(&parts, &path, event.is_dir, now),
            FsEventKind::Modified => self.on_modified(&parts, &path, event.is_dir, now),
            FsEventKind::Deleted => self.on_deleted(&path, event.is_dir),
        }
    }

    fn on_created(
        &self,
        parts: &[String],
        path: &Path,
        is_dir: bool,
        now: DateTime<Utc>,
    ) -> Result<Classification> {
        if parts.len() < RUN_DEPTH {
            return Ok(Classification::Ignored(IgnoreReason::Container));
        }
        if parts.len() == RUN_DEPTH && !is_dir {
            return Ok(Classification::Ignored(IgnoreReason::NotARunDirectory));
        }

        let run_path = self.root.join(&parts[0]).join(&parts[1]).join(&parts[2]);
        let (run, run_created) = self.store().get_or_create_run(&run_path, &parts[2], now)?;
        if run_created {
            info!(run = %run.name, alias = %run.alt_name, path = ?run_path, "registered new run");
            self.register_new_run(&run, &parts[0], &parts[1])?;
        }

        if is_dir {
            return Ok(Classification::Run {
                run: run.id,
                created: run_created,
            });
        }

        let (file, created) = self.store().get_or_create_file(path, run.id, now)?;
        if created {
            let parent = &parts[parts.len() - 2];
            self.store().tag(EntityRef::file(file.id), parent)?;
            info!(run = %run.name, path = ?path, "registered new file");
        }
        Ok(Classification::File {
            run: run.id,
            file: file.id,
            created,
        })
    }

    fn on_modified(
        &self,
        parts: &[String],
        path: &Path,
        is_dir: bool,
        now: DateTime<Utc>,
    ) -> Result<Classification> {
        if is_dir {
            return Ok(Classification::Ignored(IgnoreReason::Directory));
        }
        match self.store().file_by_path(path)? {
            Some(file) => {
                self.store().touch_file(file.id, now)?;
                Ok(Classification::Touched { file: file.id })
            }
            // Some backends report the write before the create.
            None => self.on_created(parts, path, false, now),
        }
    }

    fn on_deleted(&self, path: &Path, is_dir: bool) -> Result<Classification> {
        if is_dir {
            debug!(path = ?path, "ignoring directory deletion");
            return Ok(Classification::Ignored(IgnoreReason::Directory));
        }
        let Some(file) = self.store().file_by_path(path)? else {
            return Ok(Classification::Ignored(IgnoreReason::Untracked));
        };
        if self.store().delete_file(file.id)? {
            info!(path = ?path, "file deleted; record removed");
            Ok(Classification::Deleted { file: file.id })
        } else {
            debug!(path = ?path, file = file.id, "deleted file still has duties; keeping record");
            Ok(Classification::Ignored(IgnoreReason::Referenced))
        }
    }

    /// Hook for runs seen for the first time.
    fn register_new_run(&self, run: &Run, experiment: &str, sample: &str) -> Result<()> {
        let store = self.store();
        let entity = EntityRef::run(run.id);
        store.tag(entity, experiment)?;
        store.tag(entity, sample)?;

        match parse_run_name(&run.name) {
            Some(meta) => {
                store.set_run_flowcell(run.id, &meta.flowcell)?;
                for (name, value) in [
                    ("started", meta.started),
                    ("device", meta.device),
                    ("protocol", meta.protocol),
                ] {
                    store.ttag(entity, &TripleTag::new(RUN_TAG_NAMESPACE, name, value))?;
                }
            }
            None => debug!(run = %run.name, "run name is not <start>_<device>_<flowcell>_<protocol>"),
        }

        let unattached = store.unattached_sheets()?;
        if let [sheet] = unattached.as_slice() {
            match store.attach_sheet(sheet.id, run.id) {
                Ok(()) => info!(run = %run.name, sheet = sheet.id, "attached waiting sample sheet"),
                Err(err) => warn!(run = %run.name, error = %err, "could not attach sample sheet"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_part_names_parse() {
        let parts = parse_run_name("20190911_GA10000_FAK80437_bceaf277").unwrap();
        assert_eq!(parts.started, "20190911");
        assert_eq!(parts.device, "GA10000");
        assert_eq!(parts.flowcell, "FAK80437");
        assert_eq!(parts.protocol, "bceaf277");
    }

    #[test]
    fn other_shapes_are_skipped() {
        assert!(parse_run_name("RUN1").is_none());
        assert!(parse_run_name("20190911_1923_GA10000_FAK80437_bceaf277").is_none());
        assert!(parse_run_name("a__c_d").is_none());
    }
}
