//! Run configuration, loaded from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which pipeline variant a run executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    User,
    Kernel,
}

impl std::str::FromStr for Space {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Space::User),
            "kernel" => Ok(Space::Kernel),
            other => Err(format!("unknown space `{other}` (expected user|kernel)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Server root, e.g. `https://patchwork.example.org`.
    pub url: String,
    pub project: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub from: String,

    /// The mailing list the report replies to.
    pub default_to: String,

    #[serde(default)]
    pub maintainers: Vec<String>,

    /// Send only to the maintainers instead of list + submitter.
    #[serde(default)]
    pub only_maintainers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Patch style checker script.
    #[serde(default = "default_checkpatch")]
    pub checkpatch: String,

    /// Flags passed through to the style checker's ignore list.
    #[serde(default)]
    pub checkpatch_ignore: Option<String>,

    /// Commit-message lint configuration file.
    #[serde(default = "default_gitlint_config")]
    pub gitlint_config: String,
}

fn default_checkpatch() -> String {
    "/usr/bin/checkpatch.pl".to_string()
}

fn default_gitlint_config() -> String {
    "/etc/gitlint".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSpaceConfig {
    /// Extra arguments for the configure step of the plain tree build.
    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Extra configure arguments for the distribution check build.
    #[serde(default)]
    pub distcheck_configure_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpaceConfig {
    /// Build configuration copied into the tree as `.config`.
    pub config_file: PathBuf,

    /// Subsystem directories built in a narrow ("simple") build.
    pub targets: Vec<String>,

    /// Tag every patch subject must carry, e.g. `Bluetooth: `.
    pub subject_prefix: String,

    /// Directory holding the smatch checker, when installed. The smatch
    /// scan is skipped entirely when unset.
    #[serde(default)]
    pub smatch_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub email: EmailConfig,

    /// Branch the pre-series tree is checked out from.
    #[serde(default = "default_baseline_branch")]
    pub baseline_branch: String,

    #[serde(default)]
    pub lint: Option<LintConfig>,

    #[serde(default)]
    pub user: Option<UserSpaceConfig>,

    #[serde(default)]
    pub kernel: Option<KernelSpaceConfig>,

    /// Whether a failed patch apply is retried once after cleaning the tree.
    #[serde(default = "default_true")]
    pub retry_after_clean: bool,
}

fn default_baseline_branch() -> String {
    "origin/workflow".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn lint(&self) -> LintConfig {
        self.lint.clone().unwrap_or(LintConfig {
            checkpatch: default_checkpatch(),
            checkpatch_ignore: None,
            gitlint_config: default_gitlint_config(),
        })
    }

    /// The kernel section, required when running the kernel pipeline.
    pub fn kernel(&self) -> Result<&KernelSpaceConfig> {
        self.kernel
            .as_ref()
            .ok_or_else(|| Error::Config("missing `kernel` section".to_string()))
    }

    pub fn user(&self) -> UserSpaceConfig {
        self.user.clone().unwrap_or(UserSpaceConfig {
            configure_args: Vec::new(),
            distcheck_configure_args: Vec::new(),
        })
    }
}
