//! Static-analysis scan stages over the patched kernel tree.
//!
//! Each scan builds the tree with an analyzer hooked into make, attributes
//! the captured error stream to source files, and correlates the result
//! against the set of files the series touches. Hits downgrade the stage to
//! an advisory warning — an analyzer finding is never build-breaking.

use async_trait::async_trait;

use patchrail_core::{attribute, Policy, StageResult, StageStatus};
use tracing::{debug, info};

use crate::context::StageContext;
use crate::kernel::KernelBuildRunner;
use crate::stage::Stage;

/// Shared correlation step: join every attributed line that concerns a file
/// the series touches.
async fn correlate(
    ctx: &StageContext,
    stderr: &str,
    policy: Policy,
    ignore_new_files: bool,
) -> Result<Option<String>, patchrail_core::StageError> {
    let Some(map) = attribute(stderr, policy) else {
        debug!("analyzer produced no output");
        return Ok(None);
    };

    let file_set = ctx.series_file_set().await?;
    let mut hits = String::new();
    for path in file_set.correlation_paths(ignore_new_files) {
        for line in map.lines_for(&path) {
            hits.push_str(line);
            hits.push('\n');
        }
    }

    Ok(if hits.is_empty() { None } else { Some(hits) })
}

/// Build with all warnings enabled and report new-code warnings.
pub struct WarningScan {
    runner: KernelBuildRunner,
}

impl WarningScan {
    pub fn from_context(ctx: &StageContext) -> patchrail_core::Result<Self> {
        let kernel = ctx.config.kernel()?;
        let runner = KernelBuildRunner::new(
            ctx.src_dir(),
            kernel.config_file.clone(),
            kernel.targets.clone(),
        )
        .with_make_args(["W=1"]);
        Ok(Self { runner })
    }
}

#[async_trait]
impl Stage for WarningScan {
    fn name(&self) -> &str {
        "WarningScan"
    }

    fn description(&self) -> &str {
        "Build with all compiler warnings enabled"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        self.runner.run(status).await?;

        let stderr = self.runner.stderr().unwrap_or_default().to_string();
        // Compiler warnings name the owning file on every line, so no
        // include-note folding is wanted here.
        match correlate(ctx, &stderr, Policy::StrictReset, false).await? {
            Some(hits) => {
                info!("warnings touch files of the series");
                status.warning(hits);
            }
            None => status.success(),
        }
        Ok(())
    }

    async fn post_run(&mut self, _ctx: &StageContext, status: &StageStatus) {
        if status.verdict().is_terminal() {
            self.runner.clean().await;
        }
    }
}

/// Build with the sparse semantic checker attached.
pub struct SparseScan {
    runner: KernelBuildRunner,
}

impl SparseScan {
    pub fn from_context(ctx: &StageContext) -> patchrail_core::Result<Self> {
        let kernel = ctx.config.kernel()?;
        let runner = KernelBuildRunner::new(
            ctx.src_dir(),
            kernel.config_file.clone(),
            kernel.targets.clone(),
        )
        .with_make_args(["C=1"]);
        Ok(Self { runner })
    }
}

#[async_trait]
impl Stage for SparseScan {
    fn name(&self) -> &str {
        "SparseScan"
    }

    fn description(&self) -> &str {
        "Run the sparse semantic checker over the tree"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();
        self.runner.run(status).await?;

        let stderr = self.runner.stderr().unwrap_or_default().to_string();
        // Sparse reports header findings under an include-note, so fold
        // them into the translation unit that pulled the header in.
        match correlate(ctx, &stderr, Policy::Continuation, false).await? {
            Some(hits) => {
                info!("sparse findings touch files of the series");
                status.warning(hits);
            }
            None => status.success(),
        }
        Ok(())
    }

    async fn post_run(&mut self, _ctx: &StageContext, status: &StageStatus) {
        if status.verdict().is_terminal() {
            self.runner.clean().await;
        }
    }
}

/// Build with the smatch checker attached, when it is installed.
pub struct SmatchScan {
    runner: Option<KernelBuildRunner>,
}

impl SmatchScan {
    pub fn from_context(ctx: &StageContext) -> patchrail_core::Result<Self> {
        let kernel = ctx.config.kernel()?;
        let runner = kernel.smatch_dir.as_ref().map(|dir| {
            KernelBuildRunner::new(
                ctx.src_dir(),
                kernel.config_file.clone(),
                kernel.targets.clone(),
            )
            .with_make_args([format!("CHECK={dir}/smatch -p=kernel"), "C=1".to_string()])
        });
        Ok(Self { runner })
    }
}

#[async_trait]
impl Stage for SmatchScan {
    fn name(&self) -> &str {
        "SmatchScan"
    }

    fn description(&self) -> &str {
        "Run the smatch checker over the tree"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        let Some(runner) = self.runner.as_mut() else {
            return Err(status.skip("smatch is not installed"));
        };
        runner.run(status).await?;

        let stderr = runner.stderr().unwrap_or_default().to_string();
        // Baseline-relative correlation: a file the series introduces has no
        // pre-series diagnostics to compare against, so leave it out.
        match correlate(ctx, &stderr, Policy::Continuation, true).await? {
            Some(hits) => {
                info!("smatch findings touch files of the series");
                status.warning(hits);
            }
            None => status.success(),
        }
        Ok(())
    }

    async fn post_run(&mut self, _ctx: &StageContext, status: &StageStatus) {
        if let Some(runner) = &self.runner {
            if status.verdict().is_terminal() {
                runner.clean().await;
            }
        }
    }
}
