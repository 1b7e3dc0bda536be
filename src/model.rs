// src/model.rs

//! Plain data records held by the entity store.
//!
//! These are snapshots: mutating one does nothing until it is written back
//! through a [`Store`](crate::store::Store) method.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Status;

pub type RunId = i64;
pub type FileId = i64;
pub type DutyId = i64;
pub type SheetId = i64;
pub type SampleId = i64;

/// One logical acquisition: a depth-3 directory under the watch root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
    pub alt_name: String,
    pub library_id: String,
    pub flowcell: Option<String>,
    pub path: PathBuf,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub status: Status,
    pub sample_sheet: Option<SheetId>,
    pub basecalling_model: Option<String>,
}

impl Run {
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended.map(|ended| ended - self.started)
    }
}

/// A tracked artifact under a Run (or a Sample).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub run: Option<RunId>,
    pub sample: Option<SampleId>,
    pub checksum: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub exported: i64,
}

impl FileRecord {
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.last_modified > threshold
    }
}

/// The entity a Duty works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DutyOwner {
    Run(RunId),
    File(FileId),
}

/// One scheduled unit of post-processing work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duty {
    pub id: DutyId,
    /// Name of the configured Job this duty executes.
    pub job_class: String,
    pub status: Status,
    pub datadir: Option<PathBuf>,
    pub remotedir: Option<PathBuf>,
    /// Backend identifier of the step currently executing.
    pub job_handle: Option<String>,
    pub owner: DutyOwner,
    pub attempts: u32,
    pub created: DateTime<Utc>,
}

/// A parsed manifest, optionally attached to one Run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSheet {
    pub id: SheetId,
    pub run: Option<RunId>,
    pub path: Option<PathBuf>,
    pub version: String,
    pub date: DateTime<Utc>,
    pub library_id: String,
    pub sequencing_kit: String,
    pub barcode_kit: Vec<String>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub id: SampleId,
    pub sample_id: String,
    pub accession: String,
    pub barcode_id: String,
    pub organism: String,
    pub extraction_kit: String,
    pub comment: String,
    pub user: String,
}

/// Kinds of entity a tag junction can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Run,
    File,
    Duty,
    SampleSheet,
    Sample,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Run => "run",
            EntityKind::File => "file",
            EntityKind::Duty => "duty",
            EntityKind::SampleSheet => "samplesheet",
            EntityKind::Sample => "sample",
        }
    }
}

/// (kind, id) pair identifying exactly one taggable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn run(id: RunId) -> Self {
        Self { kind: EntityKind::Run, id }
    }

    pub fn file(id: FileId) -> Self {
        Self { kind: EntityKind::File, id }
    }

    pub fn duty(id: DutyId) -> Self {
        Self { kind: EntityKind::Duty, id }
    }

    pub fn sample_sheet(id: SheetId) -> Self {
        Self {
            kind: EntityKind::SampleSheet,
            id,
        }
    }

    pub fn sample(id: SampleId) -> Self {
        Self {
            kind: EntityKind::Sample,
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}

/// Structured `(namespace, name, value)` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TripleTag {
    pub namespace: String,
    pub name: String,
    pub value: String,
}

impl TripleTag {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Everything attached to one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSet {
    pub tags: Vec<String>,
    pub triple_tags: Vec<TripleTag>,
}

impl TagSet {
    pub fn contains(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }

    pub fn contains_triple(&self, namespace: &str, name: &str) -> bool {
        self.triple_tags
            .iter()
            .any(|t| t.namespace == namespace && t.name == name)
    }

    /// Value of the structured tag `namespace:name`, if present.
    pub fn value(&self, namespace: &str, name: &str) -> Option<&str> {
        self.triple_tags
            .iter()
            .find(|t| t.namespace == namespace && t.name == name)
            .map(|t| t.value.as_str())
    }
}
