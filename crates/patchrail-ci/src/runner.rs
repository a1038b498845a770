//! Generic configure/build/install execution.

use std::path::PathBuf;

use tracing::error;

use patchrail_core::{run_command, StageResult, StageStatus};

/// One tool invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// Runs an application build: optional configure step, build step, optional
/// install step, each in order in the same working tree. The first step that
/// exits non-zero fails the stage with its captured error stream.
///
/// The working tree is left mutated — configuration output and build
/// artifacts stay behind for later stages.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    pub work_dir: PathBuf,
    pub configure: Option<Cmd>,
    pub build: Cmd,
    pub install: Option<Cmd>,
}

impl BuildRunner {
    pub fn new(work_dir: impl Into<PathBuf>, build: Cmd) -> Self {
        Self {
            work_dir: work_dir.into(),
            configure: None,
            build,
            install: None,
        }
    }

    pub fn with_configure(mut self, configure: Cmd) -> Self {
        self.configure = Some(configure);
        self
    }

    pub fn with_install(mut self, install: Cmd) -> Self {
        self.install = Some(install);
        self
    }

    /// Execute the steps. On failure the captured error stream lands on
    /// `status` and the stage halts.
    pub async fn run(&self, status: &mut StageStatus) -> StageResult {
        if let Some(configure) = &self.configure {
            let outcome =
                run_command(&configure.program, &configure.arg_refs(), &self.work_dir).await?;
            if !outcome.success() {
                error!(step = "configure", code = outcome.code, "build step failed");
                return Err(status.add_failure_and_abort(outcome.stderr));
            }
        }

        let outcome = run_command(&self.build.program, &self.build.arg_refs(), &self.work_dir).await?;
        if !outcome.success() {
            error!(step = "build", code = outcome.code, "build step failed");
            return Err(status.add_failure_and_abort(outcome.stderr));
        }

        if let Some(install) = &self.install {
            let outcome = run_command(&install.program, &install.arg_refs(), &self.work_dir).await?;
            if !outcome.success() {
                error!(step = "install", code = outcome.code, "build step failed");
                return Err(status.add_failure_and_abort(outcome.stderr));
            }
        }

        Ok(())
    }
}
