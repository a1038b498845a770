//! Stage verdict classification.

use serde::{Deserialize, Serialize};

/// Terminal classification of a stage's outcome.
///
/// `Pending` is the only initial state; every other value is terminal for a
/// given stage invocation. Only `Pass` counts as good — everything else adds
/// to the pipeline failure count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pending,
    Pass,
    Fail,
    Error,
    Skip,
    Warning,
}

impl Verdict {
    /// Whether this verdict counts as a passing outcome.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Whether a terminal verdict has been recorded.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Pending)
    }

    /// The patch tracker's check-state encoding for this verdict.
    ///
    /// Anything that is neither pass, warning nor fail reports as 0
    /// ("pending") so the tracker never shows a bogus conclusive state.
    pub fn tracker_state(&self) -> u8 {
        match self {
            Verdict::Pass => 1,
            Verdict::Warning => 2,
            Verdict::Fail => 3,
            _ => 0,
        }
    }

    /// Upper-case display name used in reports and check descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Pending => "PENDING",
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
            Verdict::Skip => "SKIP",
            Verdict::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
