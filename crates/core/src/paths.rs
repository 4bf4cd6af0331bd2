//! Translating watcher-local paths into the scan targets the server expects.

use crate::config::PathMutation;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Ordered `from -> to` rewrites applied to every scan candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMutationTable {
    rules: Vec<PathMutation>,
}

impl PathMutationTable {
    pub fn new(rules: Vec<PathMutation>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[PathMutation] {
        &self.rules
    }

    /// One rewritten copy of `path` per rule, `from` replaced by `to`.
    pub fn rewrites<'a>(&'a self, path: &'a str) -> impl Iterator<Item = String> + 'a {
        self.rules.iter().map(move |r| path.replace(&r.from, &r.to))
    }
}

/// The directory a scan of `path` should cover: the path itself when it is
/// an existing directory, otherwise its parent.
pub fn closest_directory(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Expands changed paths into the list handed to the server's scan call.
///
/// The result holds the inputs, then the closest directory of each input,
/// then a rewritten copy of each of those per mutation rule. Rewrites add to
/// the list rather than replace, so the server may see both path forms.
/// Order is preserved and exact repeats are dropped. No input means a full
/// library scan, which is an empty list.
pub fn scan_targets(paths: &[PathBuf], mutations: &PathMutationTable) -> Vec<String> {
    let mut candidates: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    candidates.extend(
        paths
            .iter()
            .map(|p| closest_directory(p).to_string_lossy().into_owned()),
    );
    let rewritten: Vec<String> = candidates
        .iter()
        .flat_map(|c| mutations.rewrites(c).collect::<Vec<_>>())
        .collect();
    candidates.extend(rewritten);

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}
