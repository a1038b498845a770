//! Integration tests for the stage pipeline with in-memory collaborator
//! doubles and, where patch application matters, a real scratch git tree.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use patchrail_ci::fakes::{RecordingMailer, RecordingTracker, ScriptedRepo};
use patchrail_ci::{
    build_stages, pipeline, BuildRunner, Cmd, IncrementalBuild, IncrementalTarget, Stage,
    StageContext,
};
use patchrail_core::{
    Config, GitRepo, Patch, Series, SourceRepo, Space, StageError, StageResult, StageStatus,
    Submitter, Verdict,
};

fn make_series(subjects: &[&str]) -> Series {
    Series {
        id: 7,
        name: "core: rework queue handling".to_string(),
        submitter: Submitter {
            email: "dev@example.org".to_string(),
        },
        patches: subjects
            .iter()
            .enumerate()
            .map(|(i, subject)| Patch {
                id: (i + 1) as u64,
                subject: subject.to_string(),
                message_id: format!("<m{}@example>", i + 1),
                diff: String::new(),
            })
            .collect(),
        web_url: "https://pw.example.org/series/7".to_string(),
    }
}

fn make_config(kernel: bool) -> Config {
    let json = if kernel {
        r#"{
            "tracker": {"url": "https://pw.example.org", "project": "core"},
            "email": {"from": "ci@example.org", "default_to": "list@example.org"},
            "baseline_branch": "main",
            "kernel": {
                "config_file": "/configs/ci.config",
                "targets": ["net/bluetooth/", "drivers/bluetooth/"],
                "subject_prefix": "Bluetooth: "
            }
        }"#
    } else {
        r#"{
            "tracker": {"url": "https://pw.example.org", "project": "core"},
            "email": {"from": "ci@example.org", "default_to": "list@example.org"},
            "baseline_branch": "main"
        }"#
    };
    serde_json::from_str(json).unwrap()
}

fn make_context(
    series: Series,
    tracker: Arc<RecordingTracker>,
    repo: Arc<dyn SourceRepo>,
    scratch: &Path,
    dry_run: bool,
) -> StageContext {
    let tracker: Arc<dyn patchrail_core::PatchTracker> = tracker;
    StageContext {
        space: Space::User,
        config: make_config(false),
        series,
        dry_run,
        src_dir: repo.work_dir().to_path_buf(),
        scratch_dir: scratch.to_path_buf(),
        tracker,
        repo,
        mailer: Arc::new(RecordingMailer::new()),
    }
}

// ---------------------------------------------------------------------------
// Incremental build driver
// ---------------------------------------------------------------------------

/// Build target that passes for the first `passes` invocations and fails
/// afterwards, via a counter file in the scratch directory.
fn counting_build(scratch: &Path, passes: usize) -> IncrementalTarget {
    let counter = scratch.join("builds");
    let script = format!(
        "n=$(cat {c} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {c}; \
         if [ $n -gt {passes} ]; then echo \"undefined reference\" >&2; exit 1; fi",
        c = counter.display(),
    );
    IncrementalTarget::User(BuildRunner::new(
        scratch,
        Cmd::new("sh", vec!["-c".to_string(), script]),
    ))
}

#[tokio::test]
async fn test_incremental_halts_at_first_build_failure() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/3] first", "[2/3] second", "[3/3] third"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker.clone(), repo.clone(), scratch.path(), false);

    // Patch 1 builds, patch 2 breaks the build.
    let mut stage = IncrementalBuild::new(counting_build(scratch.path(), 1), true);
    let mut status = StageStatus::new(stage.name(), stage.description());

    let result = stage.run(&ctx, &mut status).await;
    assert!(matches!(result, Err(StageError::Halt)));
    assert_eq!(status.verdict(), Verdict::Fail);
    assert!(
        status.output().unwrap().starts_with("[2/3] second"),
        "failure names the offending patch"
    );

    // Patch 1 passed, patch 2 failed, patch 3 never attempted.
    let checks = tracker.checks_for("IncrementalBuild").await;
    assert_eq!(checks.len(), 2);
    assert_eq!((checks[0].patch_id, checks[0].verdict), (1, Verdict::Pass));
    assert_eq!((checks[1].patch_id, checks[1].verdict), (2, Verdict::Fail));

    let applies = repo
        .calls()
        .await
        .into_iter()
        .filter(|c| c.starts_with("apply "))
        .count();
    assert_eq!(applies, 2, "patch 3 must never be applied");
}

#[tokio::test]
async fn test_incremental_apply_failure_retries_after_clean() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/2] first", "[2/2] second"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()).failing_apply("2.patch"));
    let ctx = make_context(series, tracker.clone(), repo.clone(), scratch.path(), false);

    let target = IncrementalTarget::User(BuildRunner::new(
        scratch.path(),
        Cmd::new("true", Vec::<String>::new()),
    ));
    let mut stage = IncrementalBuild::new(target, true);
    let mut status = StageStatus::new(stage.name(), stage.description());

    let result = stage.run(&ctx, &mut status).await;
    assert!(matches!(result, Err(StageError::Halt)));
    assert_eq!(status.verdict(), Verdict::Fail);
    assert!(status.output().unwrap().contains("does not apply"));

    let calls = repo.calls().await;
    let apply_attempts = calls.iter().filter(|c| *c == "apply 2.patch").count();
    assert_eq!(apply_attempts, 2, "one retry after cleaning");
    assert!(calls.iter().any(|c| c == "clean"));
}

#[tokio::test]
async fn test_incremental_apply_failure_without_retry() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/1] only"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()).failing_apply("1.patch"));
    let ctx = make_context(series, tracker.clone(), repo.clone(), scratch.path(), false);

    let target = IncrementalTarget::User(BuildRunner::new(
        scratch.path(),
        Cmd::new("true", Vec::<String>::new()),
    ));
    let mut stage = IncrementalBuild::new(target, false);
    let mut status = StageStatus::new(stage.name(), stage.description());

    assert!(stage.run(&ctx, &mut status).await.is_err());
    let calls = repo.calls().await;
    assert_eq!(calls.iter().filter(|c| *c == "apply 1.patch").count(), 1);
    assert!(!calls.iter().any(|c| c == "clean"));
}

#[tokio::test]
async fn test_incremental_against_real_git_tree() {
    let tree = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let git = |args: &[&str]| {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(tree.path())
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    };
    git(&["init", "-b", "main"]);
    git(&["config", "user.name", "test-user"]);
    git(&["config", "user.email", "test@example.com"]);
    std::fs::write(tree.path().join("file.c"), "line1\n").unwrap();
    git(&["add", "file.c"]);
    git(&["commit", "-m", "initial"]);

    let series = make_series(&["[1/2] append line2", "[2/2] broken"]);
    let mut tracker = RecordingTracker::new(series.clone());

    let good_diff = "\
diff --git a/file.c b/file.c
--- a/file.c
+++ b/file.c
@@ -1 +1,2 @@
 line1
+line2
";
    // Context that does not exist in the tree: the apply must fail.
    let bad_diff = "\
diff --git a/file.c b/file.c
--- a/file.c
+++ b/file.c
@@ -5 +5,2 @@
 missing context
+line9
";
    tracker.set_mbox(1, mbox("[1/2] append line2", good_diff));
    tracker.set_mbox(2, mbox("[2/2] broken", bad_diff));
    let tracker = Arc::new(tracker);

    let repo = Arc::new(GitRepo::new(tree.path()));
    let ctx = make_context(series, tracker.clone(), repo, scratch.path(), false);

    let target = IncrementalTarget::User(BuildRunner::new(
        tree.path(),
        Cmd::new("true", Vec::<String>::new()),
    ));
    let mut stage = IncrementalBuild::new(target, true);
    let mut status = StageStatus::new(stage.name(), stage.description());

    let result = stage.run(&ctx, &mut status).await;
    assert!(matches!(result, Err(StageError::Halt)));
    assert_eq!(status.verdict(), Verdict::Fail);

    // Patch 1 landed before patch 2 halted the stage.
    let content = std::fs::read_to_string(tree.path().join("file.c")).unwrap();
    assert_eq!(content, "line1\nline2\n");

    let checks = tracker.checks_for("IncrementalBuild").await;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].verdict, Verdict::Pass);
}

fn mbox(subject: &str, diff: &str) -> String {
    format!(
        "From 1234567890abcdef1234567890abcdef12345678 Mon Sep 17 00:00:00 2001\n\
         From: Dev <dev@example.org>\n\
         Date: Mon, 1 Jan 2024 00:00:00 +0000\n\
         Subject: [PATCH] {subject}\n\
         \n\
         commit body\n\
         ---\n\
         {diff}"
    )
}

// ---------------------------------------------------------------------------
// Pipeline orchestration
// ---------------------------------------------------------------------------

/// Scripted stage for orchestration tests.
struct ScriptedStage {
    name: String,
    behavior: Behavior,
    post_runs: Arc<AtomicUsize>,
}

enum Behavior {
    Pass,
    Fault,
    SkipHalt,
    Warn,
}

impl ScriptedStage {
    fn new(name: &str, behavior: Behavior, post_runs: Arc<AtomicUsize>) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            post_runs,
        }
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted stage"
    }

    async fn run(&mut self, _ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        match self.behavior {
            Behavior::Pass => {
                status.success();
                Ok(())
            }
            Behavior::Fault => Err(StageError::Fault(anyhow::anyhow!("boom"))),
            Behavior::SkipHalt => Err(status.skip("not applicable")),
            Behavior::Warn => {
                status.warning("advisory finding");
                Ok(())
            }
        }
    }

    async fn post_run(&mut self, _ctx: &StageContext, _status: &StageStatus) {
        self.post_runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_pipeline_survives_faults_and_runs_every_post_run() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/1] only"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker.clone(), repo, scratch.path(), false);

    let counters: Vec<Arc<AtomicUsize>> =
        (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(ScriptedStage::new("one", Behavior::Pass, counters[0].clone())),
        Box::new(ScriptedStage::new("two", Behavior::Fault, counters[1].clone())),
        Box::new(ScriptedStage::new("three", Behavior::Pass, counters[2].clone())),
        Box::new(ScriptedStage::new("four", Behavior::SkipHalt, counters[3].clone())),
        Box::new(ScriptedStage::new("five", Behavior::Warn, counters[4].clone())),
    ];

    let result = pipeline::run(&ctx, stages).await;

    assert_eq!(result.statuses.len(), 5, "every stage ran");
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 1, "post_run exactly once");
    }

    let verdicts: Vec<Verdict> = result.statuses.iter().map(|s| s.verdict()).collect();
    assert_eq!(
        verdicts,
        vec![
            Verdict::Pass,
            Verdict::Fail,
            Verdict::Pass,
            Verdict::Skip,
            Verdict::Warning
        ]
    );
    assert_eq!(result.failure_count(), 3);

    // The fault's description became the stage output.
    assert!(result.statuses[1].output().unwrap().contains("boom"));

    // One stage-level check per stage.
    assert_eq!(tracker.checks().await.len(), 5);
}

#[tokio::test]
async fn test_dry_run_suppresses_check_reporting() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/1] only"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker.clone(), repo, scratch.path(), true);

    let counter = Arc::new(AtomicUsize::new(0));
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(ScriptedStage::new(
        "one",
        Behavior::Pass,
        counter.clone(),
    ))];

    let result = pipeline::run(&ctx, stages).await;
    assert_eq!(result.failure_count(), 0);
    assert!(
        tracker.checks().await.is_empty(),
        "dry-run still evaluates stages but posts nothing"
    );
}

// ---------------------------------------------------------------------------
// Stage list composition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_user_space_stage_roster() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/1] only"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker, repo, scratch.path(), false);

    let stages = build_stages(&ctx).unwrap();
    let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            "CheckPatch",
            "CommitLint",
            "BuildTree",
            "UnitTests",
            "DistCheck",
            "IncrementalBuild",
            "RegressionScan"
        ]
    );
}

#[tokio::test]
async fn test_kernel_space_stage_roster() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/1] only"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let mut ctx = make_context(series, tracker, repo, scratch.path(), false);
    ctx.space = Space::Kernel;
    ctx.config = make_config(true);

    let stages = build_stages(&ctx).unwrap();
    let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            "CheckPatch",
            "CommitLint",
            "SubjectPrefix",
            "BuildKernel",
            "WarningScan",
            "SparseScan",
            "SmatchScan",
            "IncrementalBuild"
        ]
    );
}

// ---------------------------------------------------------------------------
// Per-patch lint accumulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_checkpatch_reports_every_failing_patch() {
    use std::os::unix::fs::PermissionsExt;

    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&["[1/3] good", "[2/3] bad style", "[3/3] also bad"]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker.clone(), repo, scratch.path(), false);

    // Checker that accepts patch 1 and flags everything else.
    let script = scratch.path().join("checkpatch.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\ncase \"$1\" in *1.patch) exit 0;; *) echo 'ERROR: trailing whitespace'; exit 1;; esac\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut stage = patchrail_ci::CheckPatch::new(script.to_string_lossy(), None);
    let mut status = StageStatus::new(stage.name(), stage.description());

    let result = stage.run(&ctx, &mut status).await;
    assert!(matches!(result, Err(StageError::Halt)));
    assert_eq!(status.verdict(), Verdict::Fail);

    let output = status.output().unwrap();
    assert!(output.contains("[2/3] bad style"));
    assert!(output.contains("[3/3] also bad"), "all failing patches reported together");

    let checks = tracker.checks_for("CheckPatch").await;
    assert_eq!(checks.len(), 3);
    assert_eq!(checks[0].verdict, Verdict::Pass);
    assert_eq!(checks[1].verdict, Verdict::Fail);
    assert_eq!(checks[2].verdict, Verdict::Fail);
}

#[tokio::test]
async fn test_subject_prefix_accumulates_failures() {
    let scratch = tempfile::tempdir().unwrap();
    let series = make_series(&[
        "Bluetooth: [1/3] tagged",
        "[2/3] untagged",
        "Bluetooth: [3/3] tagged",
    ]);
    let tracker = Arc::new(RecordingTracker::new(series.clone()));
    let repo = Arc::new(ScriptedRepo::new(scratch.path()));
    let ctx = make_context(series, tracker.clone(), repo, scratch.path(), false);

    let mut stage = patchrail_ci::SubjectPrefix::new("Bluetooth: ");
    let mut status = StageStatus::new(stage.name(), stage.description());

    assert!(matches!(
        stage.run(&ctx, &mut status).await,
        Err(StageError::Halt)
    ));
    assert_eq!(status.verdict(), Verdict::Fail);

    let checks = tracker.checks_for("SubjectPrefix").await;
    assert_eq!(checks.len(), 3);
    assert_eq!(checks[1].verdict, Verdict::Fail);
}
