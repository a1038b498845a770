//! Run-scoped context shared by every stage.
//!
//! Built once per invocation and passed by reference down the pipeline. The
//! series is fetched before construction and read-only afterwards; the only
//! state stages share beyond this struct is the working tree itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use patchrail_core::{
    Config, FileSet, Mailer, Patch, PatchTracker, Result, Series, SourceRepo, Space, StageStatus,
    Verdict,
};

pub struct StageContext {
    pub space: Space,
    pub config: Config,
    pub series: Series,
    pub dry_run: bool,

    /// Working tree of the space under test.
    pub src_dir: PathBuf,

    /// Scratch area for patch files and analyzer report trees.
    pub scratch_dir: PathBuf,

    pub tracker: Arc<dyn PatchTracker>,
    pub repo: Arc<dyn SourceRepo>,
    pub mailer: Arc<dyn Mailer>,
}

impl StageContext {
    /// The series' first patch: the anchor for series-wide check reporting
    /// and mail threading.
    pub fn first_patch(&self) -> Option<&Patch> {
        self.series.first_patch()
    }

    /// Post a check result for one patch, honouring dry-run. A reporting
    /// failure is logged and swallowed — it must never sink a stage.
    pub async fn report_check(
        &self,
        patch_id: u64,
        check_name: &str,
        verdict: Verdict,
        description: &str,
    ) {
        if self.dry_run {
            tracing::info!(check = check_name, %verdict, "dry-run: skip posting check");
            return;
        }
        if let Err(err) = self
            .tracker
            .post_check(patch_id, check_name, verdict, description, None)
            .await
        {
            warn!(check = check_name, %err, "failed to post check result");
        }
    }

    /// Post a stage's terminal verdict as a series-wide check on the first
    /// patch. Called by the pipeline, once per stage.
    pub async fn report_stage(&self, status: &StageStatus) {
        let Some(first) = self.first_patch() else {
            return;
        };
        let description = match status.output() {
            Some(output) if !status.verdict().is_pass() => output.to_string(),
            _ => format!("{} {}", status.name(), status.verdict()),
        };
        self.report_check(first.id, status.name(), status.verdict(), &description)
            .await;
    }

    /// Resolve the set of files the whole series touches, fetching each
    /// patch's diff from the tracker when the series copy lacks it.
    pub async fn series_file_set(&self) -> Result<FileSet> {
        let mut diffs = Vec::with_capacity(self.series.patches.len());
        for patch in &self.series.patches {
            if patch.diff.is_empty() {
                diffs.push(self.tracker.get_patch(patch.id).await?.diff);
            } else {
                diffs.push(patch.diff.clone());
            }
        }
        Ok(FileSet::from_series_diffs(diffs.iter().map(String::as_str)))
    }

    /// Materialize a patch's mailbox to the scratch directory and return
    /// the file path.
    pub async fn write_patch_mbox(&self, patch: &Patch) -> Result<PathBuf> {
        let mbox = self.tracker.get_patch_mbox(patch.id).await?;
        let path = self.scratch_dir.join(format!("{}.patch", patch.id));
        tokio::fs::write(&path, mbox).await?;
        Ok(path)
    }

    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }
}
