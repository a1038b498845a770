//! Changed/added path extraction from unified diffs.
//!
//! The resolver reads the `--- ` before-markers rather than the `+++ `
//! after-markers: when a patch deletes a file only the before-marker still
//! names a path that exists in the baseline tree, so before-markers are the
//! reliable source for "this path is touched in the baseline". A before-
//! marker pointing at the null device means the file is new; the true name
//! is then recovered from the following after-marker line.

use std::collections::BTreeSet;

/// Paths touched by a patch series, split into pre-existing and new files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    /// Files that exist in the baseline tree and are modified or deleted.
    pub changed: BTreeSet<String>,

    /// Files introduced by the series.
    pub added: BTreeSet<String>,
}

impl FileSet {
    /// Extract the file set of a single unified-diff body.
    pub fn from_diff(diff: &str) -> Self {
        let mut set = FileSet::default();
        set.scan(diff);
        set
    }

    /// Union of the file sets of every diff in a series, in patch order.
    pub fn from_series_diffs<'a>(diffs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = FileSet::default();
        for diff in diffs {
            set.scan(diff);
        }
        set
    }

    fn scan(&mut self, diff: &str) {
        let mut lines = diff.lines().peekable();
        while let Some(line) = lines.next() {
            let Some(target) = line.strip_prefix("--- ") else {
                continue;
            };

            if target.contains("dev/null") {
                // New file: the after-marker names it.
                if let Some(after) = lines.peek().and_then(|l| l.strip_prefix("+++ ")) {
                    if let Some(path) = strip_diff_prefix(after) {
                        self.added.insert(path.to_string());
                    }
                }
                continue;
            }

            if let Some(path) = strip_diff_prefix(target) {
                self.changed.insert(path.to_string());
            }
        }
    }

    /// Paths to correlate diagnostics against.
    ///
    /// By default this is every touched path. A consumer diffing against a
    /// pre-series baseline opts into `ignore_new_files`: a file the series
    /// introduces cannot have baseline diagnostics to regress against, so
    /// new files are subtracted — including a path that a later patch of the
    /// same series modifies after an earlier one added it.
    pub fn correlation_paths(&self, ignore_new_files: bool) -> BTreeSet<String> {
        if ignore_new_files {
            self.changed.difference(&self.added).cloned().collect()
        } else {
            self.changed.union(&self.added).cloned().collect()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty()
    }
}

/// Strip the diff's one-component path prefix (`a/`, `b/`), tolerating bare
/// paths with no prefix.
fn strip_diff_prefix(marker: &str) -> Option<&str> {
    // Markers may carry a trailing timestamp separated by a tab.
    let path = marker.split('\t').next().unwrap_or(marker).trim();
    if path.is_empty() || path.contains("dev/null") {
        return None;
    }
    match path.split_once('/') {
        Some((_, rest)) if !rest.is_empty() => Some(rest),
        _ => Some(path),
    }
}
