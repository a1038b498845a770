//! Kernel tree build execution.

use std::path::PathBuf;

use tracing::{error, info};

use patchrail_core::{run_command, StageError, StageResult, StageStatus};

/// Builds a kernel tree from a named build configuration.
///
/// The runner copies the configuration into the tree as `.config`, resolves
/// new defaults with `make olddefconfig`, then builds either the configured
/// subsystem directories (simple build) or the whole tree. The error stream
/// of the build step is retained on the instance — it is the input the
/// diagnostic attribution step works from.
#[derive(Debug, Clone)]
pub struct KernelBuildRunner {
    work_dir: PathBuf,
    config_file: PathBuf,

    /// Narrow the build to the subsystem target directories.
    simple_build: bool,
    targets: Vec<String>,

    /// Extra `make` variables such as `W=1` or `C=1`.
    make_args: Vec<String>,

    captured_stderr: Option<String>,
}

impl KernelBuildRunner {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        config_file: impl Into<PathBuf>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            config_file: config_file.into(),
            simple_build: true,
            targets,
            make_args: Vec::new(),
            captured_stderr: None,
        }
    }

    /// Build the full tree instead of the subsystem targets.
    pub fn full_build(mut self) -> Self {
        self.simple_build = false;
        self
    }

    pub fn with_make_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.make_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Error stream captured by the last successful build step.
    pub fn stderr(&self) -> Option<&str> {
        self.captured_stderr.as_deref()
    }

    pub async fn run(&mut self, status: &mut StageStatus) -> StageResult {
        info!(config = %self.config_file.display(), "applying build configuration");
        tokio::fs::copy(&self.config_file, self.work_dir.join(".config"))
            .await
            .map_err(|e| {
                StageError::Fault(anyhow::anyhow!(
                    "copy {} into tree: {e}",
                    self.config_file.display()
                ))
            })?;

        let outcome = run_command("make", &["olddefconfig"], &self.work_dir).await?;
        if !outcome.success() {
            error!("failed to resolve build configuration defaults");
            return Err(status.add_failure_and_abort(outcome.stderr));
        }

        let mut args: Vec<&str> = vec!["-j2"];
        args.extend(self.make_args.iter().map(String::as_str));
        if self.simple_build {
            args.extend(self.targets.iter().map(String::as_str));
        }

        let outcome = run_command("make", &args, &self.work_dir).await?;
        if !outcome.success() {
            error!(code = outcome.code, "kernel build failed");
            return Err(status.add_failure_and_abort(outcome.stderr));
        }

        self.captured_stderr = Some(outcome.stderr);
        Ok(())
    }

    /// Clean build artifacts out of the tree. Failures are logged only.
    pub async fn clean(&self) {
        match run_command("make", &["clean"], &self.work_dir).await {
            Ok(outcome) if !outcome.success() => error!("failed to clean the source tree"),
            Err(err) => error!(%err, "failed to clean the source tree"),
            _ => {}
        }
    }
}
