//! patchrail - patch series verification pipeline
//!
//! Fetches a patch series from the configured tracker, runs the selected
//! verification pipeline against the local source tree, posts per-stage
//! check results, and mails the summary report. The process exit code is
//! the number of stages that did not pass.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};

use patchrail_ci::{build_stages, compose_report, pipeline, render_summary, StageContext};
use patchrail_core::{init_tracing, Config, GitRepo, Mailer, PatchTracker, PatchworkClient, Sendmail, Space};

/// Exit codes above this are reserved for signal conventions.
const MAX_EXIT_FAILURES: usize = 101;

#[derive(Clone, Copy, ValueEnum)]
enum SpaceArg {
    /// Userspace pipeline: lint, tree build, tests, distcheck,
    /// incremental build, analyzer regression scan.
    User,
    /// Kernel pipeline: lint, subject prefix, kernel build, warning,
    /// sparse and smatch scans, incremental build.
    Kernel,
}

impl From<SpaceArg> for Space {
    fn from(arg: SpaceArg) -> Self {
        match arg {
            SpaceArg::User => Space::User,
            SpaceArg::Kernel => Space::Kernel,
        }
    }
}

#[derive(Parser)]
#[command(name = "patchrail")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate a patch series against a source tree", long_about = None)]
struct Cli {
    /// Which pipeline variant to run
    #[arg(value_enum)]
    space: SpaceArg,

    /// Series identifier on the patch tracker
    series_id: u64,

    /// Configuration file
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Userspace source tree
    #[arg(long)]
    src_dir: Option<PathBuf>,

    /// Kernel source tree (required for the kernel pipeline)
    #[arg(long)]
    kernel_dir: Option<PathBuf>,

    /// Evaluate every stage but post no checks and send no mail
    #[arg(short, long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// The working tree of the selected space.
    fn source_tree(&self) -> Result<PathBuf> {
        let dir = match self.space {
            SpaceArg::User => self.src_dir.clone(),
            SpaceArg::Kernel => self.kernel_dir.clone(),
        };
        let Some(dir) = dir else {
            bail!(
                "missing source tree: pass {} for the selected space",
                match self.space {
                    SpaceArg::User => "--src-dir",
                    SpaceArg::Kernel => "--kernel-dir",
                }
            );
        };
        if !dir.is_dir() {
            bail!("source tree {} does not exist", dir.display());
        }
        Ok(dir)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match run(cli).await {
        Ok(failures) => std::process::exit(failures.min(MAX_EXIT_FAILURES) as i32),
        Err(err) => {
            error!(%err, "run aborted");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<usize> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("load configuration {}", cli.config.display()))?;
    let src_dir = cli.source_tree()?;

    let tracker = Arc::new(PatchworkClient::new(
        config.tracker.url.clone(),
        std::env::var("PATCHWORK_TOKEN").ok(),
    ));
    let repo = Arc::new(GitRepo::new(&src_dir));
    let mailer = Arc::new(Sendmail::new());

    info!(series = cli.series_id, "fetching series from the tracker");
    let series = tracker
        .get_series(cli.series_id)
        .await
        .context("fetch series")?;
    if series.patches.is_empty() {
        bail!("series {} has no patches", cli.series_id);
    }
    info!(series = series.id, name = %series.name, patches = series.patches.len(), "series resolved");

    let scratch_dir = std::env::temp_dir().join(format!("patchrail-{}", series.id));
    std::fs::create_dir_all(&scratch_dir).context("create scratch directory")?;

    let ctx = StageContext {
        space: cli.space.into(),
        config,
        series,
        dry_run: cli.dry_run,
        src_dir,
        scratch_dir,
        tracker,
        repo,
        mailer: mailer.clone(),
    };

    let stages = build_stages(&ctx).context("assemble stage list")?;
    let result = pipeline::run(&ctx, stages).await;

    let summary = render_summary(&result.statuses);
    println!("{summary}");

    if ctx.dry_run {
        info!("dry-run is set, skip sending the report mail");
    } else {
        let message = compose_report(&ctx.config.email, &ctx.series, &summary);
        if let Err(err) = mailer.send(&message).await {
            error!(%err, "failed to send the report mail");
        }
    }

    Ok(result.failure_count())
}
