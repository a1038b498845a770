//! Pipeline orchestration and verdict aggregation.

use patchrail_core::{Space, StageError, StageStatus};
use tracing::{error, info};

use crate::build::{BuildKernel, BuildTree, DistCheck, UnitTests};
use crate::context::StageContext;
use crate::incremental::{IncrementalBuild, IncrementalTarget};
use crate::kernel::KernelBuildRunner;
use crate::lint::{CheckPatch, CommitLint, SubjectPrefix};
use crate::regression::RegressionScan;
use crate::runner::{BuildRunner, Cmd};
use crate::scan::{SmatchScan, SparseScan, WarningScan};
use crate::stage::Stage;

/// Result of a complete pipeline execution.
pub struct PipelineResult {
    /// Per-stage statuses in execution order.
    pub statuses: Vec<StageStatus>,
}

impl PipelineResult {
    /// Number of stages that did not pass.
    pub fn failure_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| !s.verdict().is_pass())
            .count()
    }
}

/// Assemble the stage list for the context's space.
pub fn build_stages(ctx: &StageContext) -> patchrail_core::Result<Vec<Box<dyn Stage>>> {
    let lint = ctx.config.lint();

    let mut stages: Vec<Box<dyn Stage>> = vec![
        Box::new(CheckPatch::new(lint.checkpatch, lint.checkpatch_ignore)),
        Box::new(CommitLint::new(lint.gitlint_config)),
    ];

    match ctx.space {
        Space::User => {
            let user = ctx.config.user();
            stages.push(Box::new(BuildTree::new(ctx)));
            stages.push(Box::new(UnitTests));
            stages.push(Box::new(DistCheck::new(ctx)));

            let target = IncrementalTarget::User(
                BuildRunner::new(ctx.src_dir(), Cmd::new("make", ["-j2"])).with_configure(
                    Cmd::new("./bootstrap-configure", user.configure_args),
                ),
            );
            stages.push(Box::new(IncrementalBuild::new(
                target,
                ctx.config.retry_after_clean,
            )));
            stages.push(Box::new(RegressionScan::from_context(ctx)));
        }
        Space::Kernel => {
            let kernel = ctx.config.kernel()?;
            stages.push(Box::new(SubjectPrefix::new(kernel.subject_prefix.clone())));
            stages.push(Box::new(BuildKernel::from_context(ctx)?));
            stages.push(Box::new(WarningScan::from_context(ctx)?));
            stages.push(Box::new(SparseScan::from_context(ctx)?));
            stages.push(Box::new(SmatchScan::from_context(ctx)?));

            let target = IncrementalTarget::Kernel(KernelBuildRunner::new(
                ctx.src_dir(),
                kernel.config_file.clone(),
                kernel.targets.clone(),
            ));
            stages.push(Box::new(IncrementalBuild::new(
                target,
                ctx.config.retry_after_clean,
            )));
        }
    }

    Ok(stages)
}

/// Execute the stages in order and aggregate their verdicts.
///
/// A stage's halt is absorbed here and never travels further; an unexpected
/// fault maps to a `Fail` verdict with the fault's description as output.
/// Whatever happens, the stage's post-run hook executes before the next
/// stage begins, and the stage verdict is reported to the tracker.
pub async fn run(ctx: &StageContext, stages: Vec<Box<dyn Stage>>) -> PipelineResult {
    let mut statuses = Vec::with_capacity(stages.len());

    for mut stage in stages {
        info!(stage = stage.name(), "running stage");
        let mut status = StageStatus::new(stage.name(), stage.description());

        match stage.run(ctx, &mut status).await {
            Ok(()) => {}
            Err(StageError::Halt) => {
                error!(
                    stage = status.name(),
                    verdict = %status.verdict(),
                    "stage ended early"
                );
            }
            Err(StageError::Fault(fault)) => {
                error!(stage = status.name(), %fault, "stage raised an unexpected fault");
                status.fail_from_fault(fault.to_string());
            }
        }

        stage.post_run(ctx, &status).await;
        ctx.report_stage(&status).await;

        info!(
            stage = status.name(),
            verdict = %status.verdict(),
            elapsed_ms = status.elapsed().as_millis() as u64,
            "stage finished"
        );
        statuses.push(status);
    }

    let result = PipelineResult { statuses };
    info!(failures = result.failure_count(), "pipeline finished");
    result
}
