//! Per-stage lifecycle: verdict, timer, and halt signalling.
//!
//! A stage mutates its [`StageStatus`] while it evaluates inputs and returns
//! `Result<(), StageError>` from its core routine. Early termination is an
//! explicit [`StageError::Halt`] value produced by the status methods, not an
//! unwinding signal — the pipeline absorbs it at the stage boundary and the
//! next stage still runs.

use std::time::{Duration, Instant};

use crate::verdict::Verdict;

/// Why a stage's core routine stopped early.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage recorded a terminal verdict and asked to stop. The verdict
    /// and output are already on the [`StageStatus`].
    #[error("stage halted")]
    Halt,

    /// Unexpected infrastructure fault. Mapped to a `Fail` verdict at the
    /// pipeline boundary.
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl From<crate::error::Error> for StageError {
    fn from(err: crate::error::Error) -> Self {
        StageError::Fault(err.into())
    }
}

/// Result of a stage's core routine.
pub type StageResult = std::result::Result<(), StageError>;

/// Verdict, output and timing for one stage invocation.
#[derive(Debug)]
pub struct StageStatus {
    name: String,
    description: String,
    verdict: Verdict,
    output: Option<String>,
    started: Option<Instant>,
    ended: Option<Instant>,
}

impl StageStatus {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            verdict: Verdict::Pending,
            output: None,
            started: None,
            ended: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Accumulated output, if any verdict-carrying call recorded some.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    fn stop_timer(&mut self) {
        if self.ended.is_none() {
            self.ended = Some(Instant::now());
        }
    }

    /// Elapsed wall time. When the stage never reached a terminal state the
    /// duration is computed against "now" without mutating the stored end.
    pub fn elapsed(&self) -> Duration {
        match self.started {
            None => Duration::ZERO,
            Some(started) => match self.ended {
                Some(ended) => ended.duration_since(started),
                None => started.elapsed(),
            },
        }
    }

    /// Record a passing verdict and stop the timer.
    ///
    /// Calling this after a terminal verdict is a programming fault; the
    /// terminal verdict is never downgraded.
    pub fn success(&mut self) {
        debug_assert!(
            !self.verdict.is_terminal(),
            "success() after terminal verdict {}",
            self.verdict
        );
        if self.verdict.is_terminal() {
            return;
        }
        self.verdict = Verdict::Pass;
        self.stop_timer();
    }

    /// Record an advisory warning. Terminal, but the caller may keep
    /// evaluating other inputs — no halt is produced.
    pub fn warning(&mut self, msg: impl Into<String>) {
        self.verdict = Verdict::Warning;
        self.output = Some(msg.into());
        self.stop_timer();
    }

    /// Record a failure for one input and keep going. The timer keeps
    /// running so the stage can accumulate failures across its inputs.
    pub fn add_failure(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        self.verdict = Verdict::Fail;
        match &mut self.output {
            None => self.output = Some(msg),
            Some(out) => {
                out.push('\n');
                out.push_str(&msg);
            }
        }
    }

    /// Record a failure and halt the stage.
    #[must_use = "return the halt to the pipeline boundary"]
    pub fn add_failure_and_abort(&mut self, msg: impl Into<String>) -> StageError {
        self.add_failure(msg);
        self.stop_timer();
        StageError::Halt
    }

    /// Record an error verdict and halt the stage.
    #[must_use = "return the halt to the pipeline boundary"]
    pub fn error(&mut self, msg: impl Into<String>) -> StageError {
        self.verdict = Verdict::Error;
        self.output = Some(msg.into());
        self.stop_timer();
        StageError::Halt
    }

    /// Record a skip verdict and halt the stage.
    #[must_use = "return the halt to the pipeline boundary"]
    pub fn skip(&mut self, msg: impl Into<String>) -> StageError {
        self.verdict = Verdict::Skip;
        self.output = Some(msg.into());
        self.stop_timer();
        StageError::Halt
    }

    /// Map an infrastructure fault to a `Fail` verdict. Used by the pipeline
    /// when a stage returns [`StageError::Fault`].
    pub fn fail_from_fault(&mut self, description: impl Into<String>) {
        self.add_failure(description);
        self.stop_timer();
    }

    /// Wrap up an accumulate-style loop: failures recorded along the way
    /// halt the stage now, anything else still pending becomes a pass.
    pub fn conclude(&mut self) -> StageResult {
        if self.verdict == Verdict::Fail {
            self.stop_timer();
            return Err(StageError::Halt);
        }
        if !self.verdict.is_terminal() {
            self.success();
        }
        Ok(())
    }
}
