//! patchrail CI - patch series verification pipeline
//!
//! Provides the verification stages and their orchestration:
//! - per-patch lint stages (style, commit message, subject prefix)
//! - whole-tree and kernel build stages
//! - analyzer scans correlated against the series' file set
//! - the incremental per-patch build driver
//! - the before/after analyzer regression scan
//! - the pipeline executor that aggregates verdicts into a report

pub mod build;
pub mod context;
pub mod fakes;
pub mod incremental;
pub mod kernel;
pub mod lint;
pub mod pipeline;
pub mod regression;
pub mod report;
pub mod runner;
pub mod scan;
pub mod stage;

// Re-export key types
pub use build::{BuildKernel, BuildTree, DistCheck, UnitTests};
pub use context::StageContext;
pub use incremental::{IncrementalBuild, IncrementalTarget};
pub use kernel::KernelBuildRunner;
pub use lint::{CheckPatch, CommitLint, SubjectPrefix};
pub use pipeline::{build_stages, run, PipelineResult};
pub use regression::RegressionScan;
pub use report::{compose_report, render_summary};
pub use runner::{BuildRunner, Cmd};
pub use scan::{SmatchScan, SparseScan, WarningScan};
pub use stage::Stage;
