//! patchrail core library
//!
//! Domain model and collaborator contracts for the patch-series
//! verification pipeline:
//! - stage verdicts and the per-stage lifecycle state machine
//! - series/patch shapes as fetched from the tracker
//! - diagnostic attribution and changed-file resolution
//! - external collaborator traits (tracker, source repo, mailer) with their
//!   production implementations

pub mod attribution;
pub mod config;
pub mod error;
pub mod exec;
pub mod fileset;
pub mod mail;
pub mod repo;
pub mod series;
pub mod status;
pub mod telemetry;
pub mod tracker;
pub mod verdict;

pub use attribution::{attribute, DiagnosticMap, Policy};
pub use config::{Config, Space};
pub use error::{Error, Result};
pub use exec::{run_checked, run_command, BuildOutcome};
pub use fileset::FileSet;
pub use mail::{Mailer, Message, Sendmail};
pub use repo::{GitRepo, SourceRepo};
pub use series::{Patch, Series, Submitter};
pub use status::{StageError, StageResult, StageStatus};
pub use telemetry::init_tracing;
pub use tracker::{PatchTracker, PatchworkClient};
pub use verdict::Verdict;

/// patchrail core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
