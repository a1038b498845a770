//! External command execution with captured output.
//!
//! Every external tool the pipeline touches goes through [`run_command`]:
//! stdio is piped, output is captured lossily, and the call blocks until the
//! process exits. No timeout is enforced — a hung tool stalls the pipeline.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Captured result of one tool invocation. Created fresh per invocation and
/// consumed immediately by the invoking stage.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Exit code (-1 when the process died to a signal).
    pub code: i32,

    /// Captured standard output.
    pub stdout: String,

    /// Captured error stream.
    pub stderr: String,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `program args...` in `cwd` and capture its output.
///
/// A non-zero exit is NOT an error here — callers decide what a failing
/// tool means for their stage. `Err` is reserved for spawn failures.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> Result<BuildOutcome> {
    info!(cmd = %render(program, args), cwd = %cwd.display(), "CMD");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            command: render(program, args),
            source,
        })?
        .wait_with_output()
        .await
        .map_err(|source| Error::Spawn {
            command: render(program, args),
            source,
        })?;

    let outcome = BuildOutcome {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    info!(cmd = %render(program, args), code = outcome.code, "RET");
    debug!(stdout = %outcome.stdout, stderr = %outcome.stderr, "captured output");

    Ok(outcome)
}

/// Run a command and turn a non-zero exit into [`Error::CommandFailed`]
/// carrying the captured error stream. For callers where failure is fatal.
pub async fn run_checked(program: &str, args: &[&str], cwd: &Path) -> Result<BuildOutcome> {
    let outcome = run_command(program, args, cwd).await?;
    if !outcome.success() {
        return Err(Error::CommandFailed {
            command: render(program, args),
            code: outcome.code,
            stderr: outcome.stderr,
        });
    }
    Ok(outcome)
}

fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
