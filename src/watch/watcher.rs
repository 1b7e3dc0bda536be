// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::info;

use crate::types::FsEvent;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Reduce one `notify` event to the created / modified / deleted events
/// the classifier understands. Access and other noise map to nothing.
pub fn translate_event(event: &Event) -> Vec<FsEvent> {
    let is_dir_on_disk = |path: &PathBuf| path.is_dir();
    if let (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), [from, to]) =
        (&event.kind, event.paths.as_slice())
    {
        let is_dir = is_dir_on_disk(to);
        return vec![FsEvent::deleted(from, is_dir), FsEvent::created(to, is_dir)];
    }
    event
        .paths
        .iter()
        .filter_map(|path| {
            let fs_event = match event.kind {
                EventKind::Create(CreateKind::Folder) => FsEvent::created(path, true),
                EventKind::Create(CreateKind::File) => FsEvent::created(path, false),
                EventKind::Create(_) => FsEvent::created(path, is_dir_on_disk(path)),
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    FsEvent::deleted(path, false)
                }
                EventKind::Modify(ModifyKind::Name(_)) => {
                    FsEvent::created(path, is_dir_on_disk(path))
                }
                EventKind::Modify(_) => FsEvent::modified(path, is_dir_on_disk(path)),
                EventKind::Remove(RemoveKind::Folder) => FsEvent::deleted(path, true),
                EventKind::Remove(_) => FsEvent::deleted(path, false),
                EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
            };
            Some(fs_event)
        })
        .collect()
}

/// Spawn a filesystem watcher that observes `root` recursively and forwards
/// translated events, in arrival order, into `events_tx`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    events_tx: mpsc::UnboundedSender<FsEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();

    // Closure called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for fs_event in translate_event(&event) {
                    if events_tx.send(fs_event).is_err() {
                        // Receiver gone: the service is shutting down.
                        return;
                    }
                }
            }
            Err(err) => {
                eprintln!("runwarden: file watch error: {err}");
            }
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;

    info!("file watcher started on {:?}", root);

    Ok(WatcherHandle { _inner: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FsEventKind;

    #[test]
    fn create_and_remove_kinds_keep_directory_flag() {
        let event = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/data/E/S/R"));
        assert_eq!(translate_event(&event), vec![FsEvent::created("/data/E/S/R", true)]);

        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/data/E/S/R/a.fastq"));
        let out = translate_event(&event);
        assert_eq!(out[0].kind, FsEventKind::Deleted);
        assert!(!out[0].is_dir);
    }

    #[test]
    fn rename_pair_deletes_source_and_creates_target() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/data/E/S/R/pass/a.tmp"))
            .add_path(PathBuf::from("/data/E/S/R/pass/a.fastq"));
        assert_eq!(
            translate_event(&event),
            vec![
                FsEvent::deleted("/data/E/S/R/pass/a.tmp", false),
                FsEvent::created("/data/E/S/R/pass/a.fastq", false),
            ]
        );
    }

    #[test]
    fn rename_halves_map_to_delete_then_create() {
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/data/E/S/R/pass/a.tmp"));
        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/data/E/S/R/pass/a.fastq"));
        assert_eq!(translate_event(&from)[0].kind, FsEventKind::Deleted);
        assert_eq!(translate_event(&to)[0].kind, FsEventKind::Created);
    }

    #[test]
    fn access_events_are_dropped() {
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/data/x"));
        assert!(translate_event(&event).is_empty());
    }
}
