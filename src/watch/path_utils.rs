// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path};

/// Split `path` into its components relative to `root`.
///
/// A direct `strip_prefix(root)` is tried first. If that fails (symlinks,
/// `/private/var` style aliases) both paths are canonicalized and the strip
/// is retried. Returns `None` if the path is not under `root`.
pub fn relative_components(root: &Path, path: &Path) -> Option<Vec<String>> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(components(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(components(rel));
        }
    }

    None
}

fn components(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// True if any component contains `marker`.
pub fn contains_marker(parts: &[String], marker: &str) -> bool {
    parts.iter().any(|part| part.contains(marker))
}
