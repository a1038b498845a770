//! Before/after static-analysis regression scan.
//!
//! Runs the analyzer build on the baseline tree and on the patched tree,
//! partitions each captured report into one block per source file, mirrors
//! the blocks into two scratch trees, and structurally diffs the trees. Only
//! content that is new or changed on the patched side is reported — and the
//! whole patched block is taken when a file differs, deliberately avoiding a
//! finer sub-file diff that analyzer output reordering would defeat.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use patchrail_core::{run_command, Result, StageResult, StageStatus};
use tracing::{debug, info};

use crate::context::StageContext;
use crate::runner::Cmd;
use crate::stage::Stage;

/// End-of-unit marker the analyzer prints after each file's findings.
const UNIT_TERMINATOR: &str = " generated.";

/// Qualifier prefix some blocks carry on their first line.
const INCLUDED_FROM: &str = "In file included from ";

/// Suffix for block files in the scratch trees.
const BLOCK_SUFFIX: &str = ".err";

/// Branch name used to return to the patched tree state.
const PATCHED_REF: &str = "patched";

/// Split an analyzer report into one text block per source file.
///
/// A block ends at the line containing the end-of-unit marker; its owning
/// file is derived from the block's first line. A trailing fragment with no
/// terminator is dropped, matching the analyzer's own framing. Blocks of the
/// same file concatenate in report order.
pub fn partition_report(report: &str) -> BTreeMap<String, String> {
    let mut blocks: BTreeMap<String, String> = BTreeMap::new();
    let mut pending = String::new();

    for line in report.lines() {
        pending.push_str(line);
        pending.push('\n');

        if !line.contains(UNIT_TERMINATOR) {
            continue;
        }

        let first = pending.lines().next().unwrap_or_default();
        let first = first.strip_prefix(INCLUDED_FROM).unwrap_or(first);
        let path = first.split(':').next().unwrap_or_default().trim();
        if !path.is_empty() && !path.contains(' ') {
            blocks.entry(path.to_string()).or_default().push_str(&pending);
        }
        pending.clear();
    }

    blocks
}

/// Mirror partitioned blocks into `out_dir`, one file per source file,
/// following the source tree's directory layout.
pub fn write_report_tree(blocks: &BTreeMap<String, String>, out_dir: &Path) -> Result<()> {
    for (path, content) in blocks {
        let target = out_dir.join(format!("{path}{BLOCK_SUFFIX}"));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        debug!(block = %target.display(), "report block written");
    }
    Ok(())
}

/// Structurally diff two report trees: files present only under `patched`
/// contribute their whole content; files present in both but differing
/// contribute the patched content. Files only in `base` (fixed findings)
/// are ignored.
pub fn diff_report_trees(base: &Path, patched: &Path) -> Result<String> {
    let mut regressions = String::new();
    for rel in collect_files(patched, Path::new(""))? {
        let patched_content = std::fs::read_to_string(patched.join(&rel))?;
        let base_file = base.join(&rel);
        if !base_file.exists() {
            regressions.push_str(&patched_content);
            continue;
        }
        if std::fs::read_to_string(&base_file)? != patched_content {
            regressions.push_str(&patched_content);
        }
    }
    Ok(regressions)
}

/// Relative paths of every file under `root`, sorted for determinism.
fn collect_files(root: &Path, rel: &Path) -> Result<Vec<PathBuf>> {
    let dir = root.join(rel);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut files = Vec::new();
    for entry in entries {
        let child = rel.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            files.extend(collect_files(root, &child)?);
        } else {
            files.push(child);
        }
    }
    Ok(files)
}

/// Analyzer regression scan over the baseline and patched trees.
pub struct RegressionScan {
    configure: Cmd,
    analyzer: Cmd,
}

impl RegressionScan {
    pub fn from_context(ctx: &StageContext) -> Self {
        let user = ctx.config.user();
        Self {
            configure: Cmd::new("./bootstrap-configure", user.configure_args.clone()),
            analyzer: Cmd::new("scan-build", ["make", "-j2"]),
        }
    }

    /// Configure and run the analyzer build, returning its error stream.
    async fn analyze(&self, ctx: &StageContext, status: &mut StageStatus, configure: bool) -> std::result::Result<String, patchrail_core::StageError> {
        if configure {
            let args: Vec<&str> = self.configure.args.iter().map(String::as_str).collect();
            let outcome = run_command(&self.configure.program, &args, ctx.src_dir()).await?;
            if !outcome.success() {
                return Err(status.add_failure_and_abort(outcome.stderr));
            }
        }

        let args: Vec<&str> = self.analyzer.args.iter().map(String::as_str).collect();
        let outcome = run_command(&self.analyzer.program, &args, ctx.src_dir()).await?;
        if !outcome.success() {
            return Err(status.add_failure_and_abort(outcome.stderr));
        }
        Ok(outcome.stderr)
    }
}

#[async_trait]
impl Stage for RegressionScan {
    fn name(&self) -> &str {
        "RegressionScan"
    }

    fn description(&self) -> &str {
        "Compare analyzer findings before and after the series"
    }

    async fn run(&mut self, ctx: &StageContext, status: &mut StageStatus) -> StageResult {
        status.start_timer();

        // Pin the patched state so the tree can be restored afterwards.
        if ctx.repo.checkout(PATCHED_REF, true).await.is_err() {
            return Err(status.add_failure_and_abort("Setup failed"));
        }

        if ctx.repo.checkout(&ctx.config.baseline_branch, false).await.is_err() {
            return Err(status.add_failure_and_abort("Setup failed"));
        }
        let base_report = self.analyze(ctx, status, true).await?;
        let base_dir = ctx.scratch_dir.join("scan_base");
        write_report_tree(&partition_report(&base_report), &base_dir)?;

        if ctx.repo.checkout(PATCHED_REF, false).await.is_err() {
            return Err(status.add_failure_and_abort("Setup failed"));
        }
        let patched_report = self.analyze(ctx, status, false).await?;
        let patched_dir = ctx.scratch_dir.join("scan_patched");
        write_report_tree(&partition_report(&patched_report), &patched_dir)?;

        let regressions = diff_report_trees(&base_dir, &patched_dir)?;
        if regressions.is_empty() {
            info!("no new analyzer findings");
            status.success();
        } else {
            info!("analyzer reports new findings on the patched tree");
            status.warning(regressions);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
src/adapter.c:100:2: warning: Value stored to 'err' is never read
        err = set_mode(adapter);
        ^
1 warning generated.
In file included from src/device.c:33:
src/device.h:12:1: warning: unused function 'dev_dbg'
1 warning generated.
";

    #[test]
    fn test_partition_keys_blocks_by_owning_file() {
        let blocks = partition_report(REPORT);
        assert_eq!(blocks.len(), 2);
        assert!(blocks["src/adapter.c"].contains("never read"));
        assert!(
            blocks["src/device.c"].contains("unused function"),
            "included-from qualifier resolves to the including unit"
        );
    }

    #[test]
    fn test_partition_drops_trailing_fragment() {
        let blocks = partition_report("src/a.c:1: warning: w\nno terminator here\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_partition_empty_report() {
        assert!(partition_report("").is_empty());
    }

    #[test]
    fn test_tree_diff_reports_new_and_changed_blocks() {
        let base = tempfile::tempdir().unwrap();
        let patched = tempfile::tempdir().unwrap();

        let mut base_blocks = BTreeMap::new();
        base_blocks.insert("src/adapter.c".to_string(), "old finding\n".to_string());
        base_blocks.insert("src/core.c".to_string(), "same finding\n".to_string());
        write_report_tree(&base_blocks, base.path()).unwrap();

        let mut patched_blocks = BTreeMap::new();
        patched_blocks.insert("src/adapter.c".to_string(), "old finding\nnew finding\n".to_string());
        patched_blocks.insert("src/core.c".to_string(), "same finding\n".to_string());
        patched_blocks.insert("src/device.c".to_string(), "fresh file finding\n".to_string());
        write_report_tree(&patched_blocks, patched.path()).unwrap();

        let diff = diff_report_trees(base.path(), patched.path()).unwrap();
        assert!(diff.contains("new finding"));
        assert!(diff.contains("fresh file finding"));
        assert!(!diff.contains("same finding"));
    }

    #[test]
    fn test_new_block_payload_is_exact() {
        let base = tempfile::tempdir().unwrap();
        let patched = tempfile::tempdir().unwrap();

        let mut base_blocks = BTreeMap::new();
        base_blocks.insert("src/core.c".to_string(), "same finding\n".to_string());
        write_report_tree(&base_blocks, base.path()).unwrap();

        let block = "src/device.c:5:1: warning: dead store\n1 warning generated.\n";
        let mut patched_blocks = base_blocks.clone();
        patched_blocks.insert("src/device.c".to_string(), block.to_string());
        write_report_tree(&patched_blocks, patched.path()).unwrap();

        let diff = diff_report_trees(base.path(), patched.path()).unwrap();
        assert_eq!(diff, block, "payload equals the new block's text");
    }

    #[test]
    fn test_tree_diff_identical_trees_is_empty() {
        let base = tempfile::tempdir().unwrap();
        let patched = tempfile::tempdir().unwrap();

        let mut blocks = BTreeMap::new();
        blocks.insert("src/core.c".to_string(), "finding\n".to_string());
        write_report_tree(&blocks, base.path()).unwrap();
        write_report_tree(&blocks, patched.path()).unwrap();

        assert!(diff_report_trees(base.path(), patched.path()).unwrap().is_empty());
    }

    #[test]
    fn test_tree_diff_ignores_fixed_findings() {
        let base = tempfile::tempdir().unwrap();
        let patched = tempfile::tempdir().unwrap();

        let mut blocks = BTreeMap::new();
        blocks.insert("src/gone.c".to_string(), "fixed finding\n".to_string());
        write_report_tree(&blocks, base.path()).unwrap();

        assert!(diff_report_trees(base.path(), patched.path()).unwrap().is_empty());
    }
}
