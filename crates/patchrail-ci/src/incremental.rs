//! Incremental per-patch build driver.
//!
//! Applies the series one patch at a time on top of the baseline branch and
//! builds after every apply, so the report names the exact patch that first
//! breaks the build — something a single series-wide build cannot do. The
//! driver fails fast: once an apply or build fails at patch k, patches k+1..N
//! are never attempted, because results on a broken tree are meaningless.

use async_trait::async_trait;

use patchrail_core::{StageError, StageResult, StageStatus, Verdict};
use tracing::{debug, info, warn};

use crate::build::clean_user_tree;
use crate::context::StageContext;
use crate::kernel::KernelBuildRunner;
use crate::runner::BuildRunner;
use crate::stage::Stage;

/// The build executed after each successful apply.
pub enum IncrementalTarget {
    User(BuildRunner),
    Kernel(KernelBuildRunner),
}

impl IncrementalTarget {
    async fn build(&mut self, status: &mut StageStatus) -> StageResult {
        match self {
            IncrementalTarget::User(runner) => runner.run(status).await,
            IncrementalTarget::Kernel(runner) => runner.run(status).await,
        }
    }
}

pub struct IncrementalBuild {
    target: IncrementalTarget,
    retry_after_clean: bool,
}

impl IncrementalBuild {
    pub fn new(target: IncrementalTarget, retry_after_clean: bool) -> Self {
        Self {
            target,
            retry_after_clean,
        }
    }

    /// Apply one patch, honouring the clean-and-retry policy. Returns the
    /// apply failure text when the patch cannot be applied.
    async fn apply(&self, ctx: &StageContext, patch_file: &std::path::Path) -> Option<String> {
        let first = ctx.repo.apply_patch(patch_file).await;
        let Err(first_err) = first else {
            return None;
        };

        if !self.retry_after_clean {
            let _ = ctx.repo.apply_abort().await;
            return Some(first_err.output_text());
        }

        warn!("patch failed to apply, cleaning the tree and retrying");
        let _ = ctx.repo.apply_abort().await;
        if let Err(err) = ctx.repo.clean().await {
            warn!(%err, "failed to clean the tree before retry");
        }
        match ctx.repo.apply_patch(patch_file).await {
            Ok(()) => None,
            Err(second_err) => {
                let _ = ctx.repo.apply_abort().await;
                Some(second_err.output_text())
            }
        }
    }
}

#[async_trait]
impl Stage for IncrementalBuild {
    fn name(&self) -> &str {
        "IncrementalBuild"
    }

    fn description(&self) -> &str {
        "Apply and build every patch of the series in order"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        if let Err(err) = ctx
            .repo
            .checkout(&ctx.config.baseline_branch, false)
            .await
        {
            return Err(status.add_failure_and_abort(err.output_text()));
        }

        for patch in &ctx.series.patches {
            debug!(patch = patch.id, subject = %patch.subject, "applying patch");
            let patch_file = ctx.write_patch_mbox(patch).await?;

            if let Some(apply_err) = self.apply(ctx, &patch_file).await {
                info!(patch = patch.id, "patch does not apply, giving up");
                return Err(status.add_failure_and_abort(apply_err));
            }

            // Build into a scoped status so a failure can be re-labelled
            // with the offending patch's subject.
            let mut build_status = StageStatus::new(self.name(), self.description());
            build_status.start_timer();
            match self.target.build(&mut build_status).await {
                Ok(()) => {}
                Err(StageError::Halt) => {
                    let msg = format!(
                        "{}\n{}",
                        patch.subject,
                        build_status.output().unwrap_or_default()
                    );
                    ctx.report_check(patch.id, self.name(), Verdict::Fail, &msg).await;
                    return Err(status.add_failure_and_abort(msg));
                }
                Err(fault) => return Err(fault),
            }

            ctx.report_check(patch.id, self.name(), Verdict::Pass, "Incremental build PASS")
                .await;
            info!(patch = patch.id, "patch applied and built");
        }

        status.success();
        Ok(())
    }

    async fn post_run(&mut self, ctx: &StageContext, status: &StageStatus) {
        if !status.verdict().is_terminal() {
            debug!("no verdict, skip post-run cleaning");
            return;
        }
        match &self.target {
            IncrementalTarget::User(_) => clean_user_tree(ctx).await,
            IncrementalTarget::Kernel(runner) => runner.clean().await,
        }
    }
}
