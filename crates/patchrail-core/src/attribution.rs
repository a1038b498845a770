//! Build-output-to-file attribution.
//!
//! Turns the raw error stream of a build or analysis tool into buckets of
//! diagnostic lines keyed by source file, so a correlation step can pick out
//! the diagnostics that concern the files a series touches.
//!
//! Buckets are positional: a line appends to the last bucket when the
//! derived key matches and opens a new bucket otherwise. Concatenating every
//! bucket in creation order therefore reproduces the original non-blank line
//! sequence exactly, whatever the interleaving.

/// Marker an analyzer emits before diagnostics that concern an included
/// header rather than the translation unit itself.
const INCLUDE_NOTE: &str = "note: in included file";

/// Suffix identifying a compilable unit, the anchor for attribution.
const PRIMARY_SUFFIX: &str = ".c";

/// How lines that do not name a primary source file are attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Every line is stored under its own derived key. No continuation
    /// state: a header diagnostic keys its own bucket.
    StrictReset,

    /// An include-note marker folds the following lines into the current
    /// primary bucket until the next primary line, attributing header
    /// diagnostics to the translation unit that triggered them.
    Continuation,
}

/// One bucket of diagnostic lines. `key` is `None` for lines with no
/// derivable file key (no colon on the line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: Option<String>,
    pub lines: Vec<String>,
}

/// File-keyed diagnostic buckets, in creation order.
///
/// A file can own more than one bucket when its diagnostics are interleaved
/// with another file's; [`DiagnosticMap::lines_for`] gathers across them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticMap {
    buckets: Vec<Bucket>,
}

impl DiagnosticMap {
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// All lines attributed to `path`, in output order.
    pub fn lines_for(&self, path: &str) -> Vec<&str> {
        self.buckets
            .iter()
            .filter(|b| b.key.as_deref() == Some(path))
            .flat_map(|b| b.lines.iter().map(String::as_str))
            .collect()
    }

    /// Whether any line was attributed to `path`.
    pub fn mentions(&self, path: &str) -> bool {
        self.buckets.iter().any(|b| b.key.as_deref() == Some(path))
    }

    /// All lines in bucket-creation order, then within-bucket order.
    pub fn all_lines(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .flat_map(|b| b.lines.iter().map(String::as_str))
    }

    /// Append under `key`, reusing the last bucket when it matches.
    fn push(&mut self, key: Option<&str>, line: &str) {
        match self.buckets.last_mut() {
            Some(bucket) if bucket.key.as_deref() == key => bucket.lines.push(line.to_string()),
            _ => self.buckets.push(Bucket {
                key: key.map(str::to_string),
                lines: vec![line.to_string()],
            }),
        }
    }
}

/// Attribute raw diagnostic text to source files.
///
/// Returns `None` when the text has no non-blank lines, so callers can
/// distinguish "tool said nothing" from "tool said something irrelevant".
pub fn attribute(output: &str, policy: Policy) -> Option<DiagnosticMap> {
    let mut map = DiagnosticMap::default();
    // Continuation target: the primary key header diagnostics fold into.
    let mut current: Option<String> = None;
    let mut in_include = false;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let key = derive_key(line);
        let is_primary = key.map(|k| k.contains(PRIMARY_SUFFIX)).unwrap_or(false);

        if is_primary {
            in_include = false;
            current = key.map(str::to_string);
            map.push(key, line);
            if policy == Policy::Continuation && line.contains(INCLUDE_NOTE) {
                in_include = true;
            }
            continue;
        }

        if policy == Policy::Continuation {
            if in_include {
                map.push(current.as_deref(), line);
                continue;
            }
            if line.contains(INCLUDE_NOTE) {
                in_include = true;
                if current.is_none() {
                    // No primary seen yet: the marker line opens its own
                    // bucket and becomes the continuation target.
                    current = key.map(str::to_string);
                }
                map.push(current.as_deref(), line);
                continue;
            }
        }

        map.push(key, line);
    }

    if map.buckets.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Text before the first colon, or `None` when the line has no colon and
/// therefore no derivable file key.
fn derive_key(line: &str) -> Option<&str> {
    line.split_once(':').map(|(key, _)| key)
}
