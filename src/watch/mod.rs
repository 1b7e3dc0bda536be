// src/watch/mod.rs

//! File watching and event classification.
//!
//! - [`watcher`] wires up a cross-platform filesystem watcher (`notify`) and
//!   reduces its events to [`FsEvent`](crate::types::FsEvent)s.
//! - [`classifier`] turns those events into Run / File records.
//! - [`path_utils`] holds the path arithmetic both rely on.

pub mod classifier;
pub mod path_utils;
pub mod watcher;

pub use classifier::{
    parse_run_name, Classification, EventClassifier, IgnoreReason, RunNameParts, RUN_DEPTH,
};
pub use watcher::{spawn_watcher, translate_event, WatcherHandle};
