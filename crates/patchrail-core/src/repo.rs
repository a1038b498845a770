//! Version-control collaborator contract and its git implementation.
//!
//! Stages depend on the [`SourceRepo`] trait so tests can substitute a
//! scripted double; production wiring uses [`GitRepo`], which shells out to
//! git in the configured working tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::exec::run_checked;

/// Primitive operations the pipeline needs from the source tree's version
/// control. Every failure carries the tool's captured error text.
#[async_trait]
pub trait SourceRepo: Send + Sync {
    /// Switch the working tree to `reference`, optionally creating it as a
    /// new branch first.
    async fn checkout(&self, reference: &str, create_branch: bool) -> Result<()>;

    /// Apply a mailbox-format patch file to the tree atomically.
    async fn apply_patch(&self, patch_file: &Path) -> Result<()>;

    /// Discard the state of a half-applied patch.
    async fn apply_abort(&self) -> Result<()>;

    /// Remove untracked files and reset tracked ones.
    async fn clean(&self) -> Result<()>;

    /// Push `branch` to the default remote.
    async fn push(&self, branch: &str) -> Result<()>;

    /// Resolve the current HEAD commit id.
    async fn head_sha(&self) -> Result<String>;

    /// The working tree root.
    fn work_dir(&self) -> &Path;
}

/// Git working tree rooted at `path`.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    remote: String,
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Run a git subcommand; a non-zero exit surfaces as
    /// [`Error::CommandFailed`] carrying the captured error stream.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let outcome = run_checked("git", args, &self.path).await?;
        Ok(outcome.stdout)
    }
}

#[async_trait]
impl SourceRepo for GitRepo {
    async fn checkout(&self, reference: &str, create_branch: bool) -> Result<()> {
        let mut args = vec!["checkout"];
        if create_branch {
            args.push("-b");
        }
        args.push(reference);
        self.git(&args).await.map(|_| ())
    }

    async fn apply_patch(&self, patch_file: &Path) -> Result<()> {
        let patch = patch_file.to_string_lossy();
        self.git(&["am", patch.as_ref()]).await.map(|_| ())
    }

    async fn apply_abort(&self) -> Result<()> {
        self.git(&["am", "--abort"]).await.map(|_| ())
    }

    async fn clean(&self) -> Result<()> {
        self.git(&["reset", "--hard"]).await?;
        self.git(&["clean", "-d", "-f", "-x"]).await.map(|_| ())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.git(&["push", self.remote.as_str(), branch])
            .await
            .map(|_| ())
    }

    async fn head_sha(&self) -> Result<String> {
        let stdout = self.git(&["rev-parse", "HEAD"]).await?;
        let sha = stdout.trim().to_string();
        if sha.is_empty() {
            return Err(Error::Git("rev-parse returned empty output".to_string()));
        }
        Ok(sha)
    }

    fn work_dir(&self) -> &Path {
        &self.path
    }
}
