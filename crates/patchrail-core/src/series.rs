//! Patch and series wire model.
//!
//! Field names follow the tracker's JSON: a series carries `name`, a
//! `submitter` object and a `web_url`; patches carry `name` (the mail
//! subject) and `msgid`. The series is fetched once per run and read-only
//! afterwards.

use serde::{Deserialize, Serialize};

/// One patch in a series.
///
/// The series endpoint returns patches without their diff body; the full
/// diff is fetched per patch on demand. `diff` therefore defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patch {
    pub id: u64,

    /// Mail subject of the patch.
    #[serde(rename = "name")]
    pub subject: String,

    /// Message-Id of the submission mail, used for reply threading.
    #[serde(rename = "msgid")]
    pub message_id: String,

    /// Unified-diff body. Empty until fetched from the tracker.
    #[serde(default)]
    pub diff: String,
}

/// Submitter identity attached to a series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submitter {
    pub email: String,
}

/// An ordered set of patches submitted together as one logical change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Series {
    pub id: u64,
    pub name: String,
    pub submitter: Submitter,
    pub patches: Vec<Patch>,
    pub web_url: String,
}

impl Series {
    /// The first patch of the series, used for series-wide check reporting
    /// and mail threading.
    pub fn first_patch(&self) -> Option<&Patch> {
        self.patches.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_deserializes_tracker_json() {
        let json = r#"{
            "id": 4242,
            "name": "core: rework queue handling",
            "submitter": {"email": "dev@example.org"},
            "web_url": "https://tracker.example.org/series/4242",
            "patches": [
                {"id": 1, "name": "[1/2] core: split queue", "msgid": "<m1@example>"},
                {"id": 2, "name": "[2/2] core: add limits", "msgid": "<m2@example>"}
            ]
        }"#;

        let series: Series = serde_json::from_str(json).unwrap();
        assert_eq!(series.patches.len(), 2);
        assert_eq!(series.first_patch().unwrap().subject, "[1/2] core: split queue");
        assert_eq!(series.patches[1].diff, "", "diff defaults to empty");
    }
}
