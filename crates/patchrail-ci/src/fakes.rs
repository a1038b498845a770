//! In-memory collaborator doubles for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use patchrail_core::{
    Error, Mailer, Message, Patch, PatchTracker, Result, Series, SourceRepo, Verdict,
};

/// A check the fake tracker recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCheck {
    pub patch_id: u64,
    pub check_name: String,
    pub verdict: Verdict,
    pub description: String,
}

/// Tracker double serving canned data and recording posted checks.
pub struct RecordingTracker {
    series: Series,
    patches: HashMap<u64, Patch>,
    mboxes: HashMap<u64, String>,
    checks: Mutex<Vec<RecordedCheck>>,
}

impl RecordingTracker {
    pub fn new(series: Series) -> Self {
        let patches = series
            .patches
            .iter()
            .map(|p| (p.id, p.clone()))
            .collect::<HashMap<_, _>>();
        let mboxes = series
            .patches
            .iter()
            .map(|p| (p.id, default_mbox(p)))
            .collect();
        Self {
            series,
            patches,
            mboxes,
            checks: Mutex::new(Vec::new()),
        }
    }

    /// Replace the mbox served for one patch.
    pub fn set_mbox(&mut self, patch_id: u64, mbox: impl Into<String>) {
        self.mboxes.insert(patch_id, mbox.into());
    }

    pub async fn checks(&self) -> Vec<RecordedCheck> {
        self.checks.lock().await.clone()
    }

    pub async fn checks_for(&self, check_name: &str) -> Vec<RecordedCheck> {
        self.checks
            .lock()
            .await
            .iter()
            .filter(|c| c.check_name == check_name)
            .cloned()
            .collect()
    }
}

/// Minimal mailbox rendering of a patch, applicable with `git am`.
fn default_mbox(patch: &Patch) -> String {
    format!(
        "From 0000000000000000000000000000000000000000 Mon Sep 17 00:00:00 2001\n\
         From: Dev <dev@example.org>\n\
         Date: Mon, 1 Jan 2024 00:00:00 +0000\n\
         Subject: {}\n\n\
         body\n---\n{}\n--\n2.43.0\n",
        patch.subject, patch.diff
    )
}

#[async_trait]
impl PatchTracker for RecordingTracker {
    async fn get_series(&self, series_id: u64) -> Result<Series> {
        if series_id == self.series.id {
            Ok(self.series.clone())
        } else {
            Err(Error::Tracker(format!("unknown series {series_id}")))
        }
    }

    async fn get_patch(&self, patch_id: u64) -> Result<Patch> {
        self.patches
            .get(&patch_id)
            .cloned()
            .ok_or_else(|| Error::Tracker(format!("unknown patch {patch_id}")))
    }

    async fn get_patch_mbox(&self, patch_id: u64) -> Result<String> {
        self.mboxes
            .get(&patch_id)
            .cloned()
            .ok_or_else(|| Error::Tracker(format!("unknown patch {patch_id}")))
    }

    async fn post_check(
        &self,
        patch_id: u64,
        check_name: &str,
        verdict: Verdict,
        description: &str,
        _target_url: Option<&str>,
    ) -> Result<()> {
        self.checks.lock().await.push(RecordedCheck {
            patch_id,
            check_name: check_name.to_string(),
            verdict,
            description: description.to_string(),
        });
        Ok(())
    }
}

/// Mailer double collecting composed messages.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Message>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Scripted repo double: every operation succeeds or fails by script, and
/// the call log is kept for pre/post-state contract assertions.
pub struct ScriptedRepo {
    work_dir: PathBuf,
    calls: Mutex<Vec<String>>,
    /// Patch files whose apply fails, by file name.
    failing_applies: Vec<String>,
}

impl ScriptedRepo {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            calls: Mutex::new(Vec::new()),
            failing_applies: Vec::new(),
        }
    }

    /// Make applying `file_name` fail.
    pub fn failing_apply(mut self, file_name: impl Into<String>) -> Self {
        self.failing_applies.push(file_name.into());
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl SourceRepo for ScriptedRepo {
    async fn checkout(&self, reference: &str, create_branch: bool) -> Result<()> {
        self.record(format!("checkout {reference} create={create_branch}"))
            .await;
        Ok(())
    }

    async fn apply_patch(&self, patch_file: &Path) -> Result<()> {
        let name = patch_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.record(format!("apply {name}")).await;
        if self.failing_applies.contains(&name) {
            Err(Error::Git(format!("patch {name} does not apply")))
        } else {
            Ok(())
        }
    }

    async fn apply_abort(&self) -> Result<()> {
        self.record("apply-abort".to_string()).await;
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        self.record("clean".to_string()).await;
        Ok(())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.record(format!("push {branch}")).await;
        Ok(())
    }

    async fn head_sha(&self) -> Result<String> {
        self.record("head-sha".to_string()).await;
        Ok("0".repeat(40))
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}
