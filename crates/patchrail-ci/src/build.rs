//! Whole-tree build stages.

use async_trait::async_trait;

use patchrail_core::{run_command, StageResult, StageStatus};
use tracing::{debug, error};

use crate::context::StageContext;
use crate::kernel::KernelBuildRunner;
use crate::runner::{BuildRunner, Cmd};
use crate::stage::Stage;

/// Configure and build the userspace tree.
pub struct BuildTree {
    runner: BuildRunner,
}

impl BuildTree {
    pub fn new(ctx: &StageContext) -> Self {
        let user = ctx.config.user();
        let runner = BuildRunner::new(ctx.src_dir(), Cmd::new("make", ["-j2"])).with_configure(
            Cmd::new("./bootstrap-configure", user.configure_args.clone()),
        );
        Self { runner }
    }
}

#[async_trait]
impl Stage for BuildTree {
    fn name(&self) -> &str {
        "BuildTree"
    }

    fn description(&self) -> &str {
        "Configure and build the tree"
    }

    async fn run(&mut self, _ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        self.runner.run(status).await?;
        status.success();
        Ok(())
    }
}

/// Run the tree's unit test target. Assumes [`BuildTree`] already compiled
/// the sources.
pub struct UnitTests;

#[async_trait]
impl Stage for UnitTests {
    fn name(&self) -> &str {
        "UnitTests"
    }

    fn description(&self) -> &str {
        "Run the unit test target"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        let outcome = run_command("make", &["check"], ctx.src_dir()).await?;
        if !outcome.success() {
            return Err(status.add_failure_and_abort(outcome.stderr));
        }

        status.success();
        Ok(())
    }

    async fn post_run(&mut self, ctx: &StageContext, status: &StageStatus) {
        if !status.verdict().is_terminal() {
            debug!("no verdict, skip post-run cleaning");
            return;
        }
        clean_user_tree(ctx).await;
    }
}

/// Distribution check: configure a clean tree and run the dist target under
/// fakeroot.
pub struct DistCheck {
    runner: BuildRunner,
}

impl DistCheck {
    pub fn new(ctx: &StageContext) -> Self {
        let user = ctx.config.user();
        let runner = BuildRunner::new(
            ctx.src_dir(),
            Cmd::new("fakeroot", ["make", "-j2", "distcheck"]),
        )
        .with_configure(Cmd::new(
            "./bootstrap-configure",
            user.distcheck_configure_args.clone(),
        ));
        Self { runner }
    }
}

#[async_trait]
impl Stage for DistCheck {
    fn name(&self) -> &str {
        "DistCheck"
    }

    fn description(&self) -> &str {
        "Run the distribution check target"
    }

    async fn run(&mut self, _ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        self.runner.run(status).await?;
        status.success();
        Ok(())
    }

    async fn post_run(&mut self, ctx: &StageContext, status: &StageStatus) {
        if !status.verdict().is_terminal() {
            debug!("no verdict, skip post-run cleaning");
            return;
        }
        clean_user_tree(ctx).await;
    }
}

/// Build the kernel tree from the configured build config.
pub struct BuildKernel {
    runner: KernelBuildRunner,
}

impl BuildKernel {
    pub fn new(runner: KernelBuildRunner) -> Self {
        Self { runner }
    }

    pub fn from_context(ctx: &StageContext) -> patchrail_core::Result<Self> {
        let kernel = ctx.config.kernel()?;
        Ok(Self::new(KernelBuildRunner::new(
            ctx.src_dir(),
            kernel.config_file.clone(),
            kernel.targets.clone(),
        )))
    }
}

#[async_trait]
impl Stage for BuildKernel {
    fn name(&self) -> &str {
        "BuildKernel"
    }

    fn description(&self) -> &str {
        "Build the kernel subsystem targets"
    }

    async fn run(&mut self, _ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        self.runner.run(status).await?;
        status.success();
        Ok(())
    }

    async fn post_run(&mut self, _ctx: &StageContext, status: &StageStatus) {
        if !status.verdict().is_terminal() {
            debug!("no verdict, skip post-run cleaning");
            return;
        }
        self.runner.clean().await;
    }
}

/// Deep-clean the userspace tree after stages that dirty its build system.
pub(crate) async fn clean_user_tree(ctx: &StageContext) {
    match run_command("make", &["maintainer-clean"], ctx.src_dir()).await {
        Ok(outcome) if !outcome.success() => error!("failed to clean the source tree"),
        Err(err) => error!(%err, "failed to clean the source tree"),
        _ => {}
    }
}
