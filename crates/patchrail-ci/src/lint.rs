//! Per-patch lint stages.
//!
//! These stages evaluate every patch of the series before concluding, so a
//! submitter sees all offending patches in one round instead of one per
//! resubmission. Failures accumulate on the status; the stage only halts
//! when the whole loop is done.

use async_trait::async_trait;

use patchrail_core::{run_command, StageResult, StageStatus, Verdict};
use tracing::debug;

use crate::context::StageContext;
use crate::stage::Stage;

/// Runs the patch style checker over each patch file.
pub struct CheckPatch {
    script: String,
    ignore: Option<String>,
}

impl CheckPatch {
    pub fn new(script: impl Into<String>, ignore: Option<String>) -> Self {
        Self {
            script: script.into(),
            ignore,
        }
    }
}

#[async_trait]
impl Stage for CheckPatch {
    fn name(&self) -> &str {
        "CheckPatch"
    }

    fn description(&self) -> &str {
        "Run the patch style checker on the series"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        for patch in &ctx.series.patches {
            debug!(patch = patch.id, "checking patch style");
            let patch_file = ctx.write_patch_mbox(patch).await?;

            let mut args: Vec<&str> = Vec::new();
            if let Some(ignore) = &self.ignore {
                args.push("--ignore");
                args.push(ignore);
            }
            let file = patch_file.to_string_lossy();
            args.push(file.as_ref());

            let outcome = run_command(&self.script, &args, ctx.src_dir()).await?;
            if outcome.success() {
                ctx.report_check(patch.id, self.name(), Verdict::Pass, "CheckPatch PASS")
                    .await;
                continue;
            }

            // The checker sends findings to stdout; keep both streams.
            let findings = format!("{}\n{}", outcome.stdout, outcome.stderr);
            let verdict = if findings.contains("WARNING:") && !findings.contains("ERROR:") {
                Verdict::Warning
            } else {
                Verdict::Fail
            };
            ctx.report_check(patch.id, self.name(), verdict, &findings).await;
            status.add_failure(format!("{}\n{}", patch.subject, findings));
        }

        status.conclude()
    }
}

/// Commit-message lint over each patch's mail.
pub struct CommitLint {
    config_file: String,
}

impl CommitLint {
    pub fn new(config_file: impl Into<String>) -> Self {
        Self {
            config_file: config_file.into(),
        }
    }
}

#[async_trait]
impl Stage for CommitLint {
    fn name(&self) -> &str {
        "CommitLint"
    }

    fn description(&self) -> &str {
        "Lint the commit messages of the series"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        for patch in &ctx.series.patches {
            debug!(patch = patch.id, "linting commit message");
            let msg_file = ctx.write_patch_mbox(patch).await?;
            let file = msg_file.to_string_lossy();

            let outcome = run_command(
                "gitlint",
                &["-C", &self.config_file, "--msg-filename", file.as_ref()],
                ctx.src_dir(),
            )
            .await?;

            if outcome.success() {
                ctx.report_check(patch.id, self.name(), Verdict::Pass, "CommitLint PASS")
                    .await;
                continue;
            }

            // gitlint reports violations on stderr.
            ctx.report_check(patch.id, self.name(), Verdict::Fail, &outcome.stderr)
                .await;
            status.add_failure(format!("{}\n{}", patch.subject, outcome.stderr));
        }

        status.conclude()
    }
}

/// Checks that every patch subject carries the configured subsystem tag.
pub struct SubjectPrefix {
    prefix: String,
}

impl SubjectPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Stage for SubjectPrefix {
    fn name(&self) -> &str {
        "SubjectPrefix"
    }

    fn description(&self) -> &str {
        "Check the subject prefix of every patch"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        for patch in &ctx.series.patches {
            if patch.subject.contains(&self.prefix) {
                ctx.report_check(patch.id, self.name(), Verdict::Pass, "SubjectPrefix PASS")
                    .await;
                continue;
            }

            let msg = format!("\"{}\" prefix is not specified in the subject", self.prefix);
            ctx.report_check(patch.id, self.name(), Verdict::Fail, &msg).await;
            status.add_failure(format!("{}\n{}", patch.subject, msg));
        }

        status.conclude()
    }
}
