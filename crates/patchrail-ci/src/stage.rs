//! The stage contract.
//!
//! A stage's core routine computes a verdict onto its [`StageStatus`];
//! reporting that verdict to the tracker is the pipeline's business. The
//! post-run hook is guaranteed to run regardless of how the core routine
//! terminated.

use async_trait::async_trait;

use patchrail_core::{StageResult, StageStatus};

use crate::context::StageContext;

/// One verification step in the pipeline.
#[async_trait]
pub trait Stage: Send {
    /// Check name, also used as the tracker check context.
    fn name(&self) -> &str;

    /// One-line human description for the report.
    fn description(&self) -> &str;

    /// Evaluate the series. Implementations start the timer, mutate
    /// `status`, and propagate halts with `?`.
    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult;

    /// Cleanup executed after `run`, whatever its outcome. Failures here are
    /// logged, never escalated.
    async fn post_run(&mut self, _ctx: &StageContext, _status: &StageStatus) {}
}
