//! The step abstraction and its result type.

use crate::error::Result;

/// Outcome classification of running (or skipping) a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// The step ran and its effect is now applied.
    Completed,

    /// The step's execution failed; the plan halts here.
    Failed,

    /// The step's effect was already present in the external system.
    Skipped,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
            ResultStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// The result of running a step.
///
/// `message` is an opaque payload for downstream consumers: a join token, a
/// machine id, rendered output, or an error detail. A skipped step that
/// produces a value other steps depend on must still populate `message` -
/// skip is a success variant, not an absence of data.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub status: ResultStatus,
    pub message: Option<String>,
}

impl StepResult {
    /// The step ran to completion with no payload.
    pub fn completed() -> Self {
        Self {
            status: ResultStatus::Completed,
            message: None,
        }
    }

    /// The step ran to completion and produced a payload.
    pub fn completed_with(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Completed,
            message: Some(message.into()),
        }
    }

    /// The step's effect was already applied.
    pub fn skipped() -> Self {
        Self {
            status: ResultStatus::Skipped,
            message: None,
        }
    }

    /// The step's effect was already applied; surface the previously
    /// computed value for downstream consumers.
    pub fn skipped_with(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Skipped,
            message: Some(message.into()),
        }
    }

    /// The step failed. The error detail is mandatory.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty(), "a failed result requires a detail");
        Self {
            status: ResultStatus::Failed,
            message: Some(message),
        }
    }

    /// Check whether this result halts the plan.
    pub fn is_failed(&self) -> bool {
        self.status == ResultStatus::Failed
    }

    /// The error detail of a failed result, or a placeholder.
    pub fn error_detail(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown error")
    }
}

/// A step is one logical unit of work carried out as part of a plan.
///
/// Steps perform exactly one externally-visible effect against a
/// collaborating system. They are constructed per invocation with the
/// collaborator handles and arguments they need, and hold no long-lived
/// resources. `is_skip` queries the external collaborator - never local
/// state - to decide whether the effect is already applied; it is the only
/// source of truth for idempotent re-invocation.
pub trait Step {
    /// Stable name, used as the key for cross-step result lookup.
    fn name(&self) -> &str;

    /// Human-readable description shown to the operator while executing.
    fn description(&self) -> &str;

    /// Whether the step gathers input from the operator before running.
    fn has_prompts(&self) -> bool {
        false
    }

    /// Gather input from the operator. Only called when [`Step::has_prompts`]
    /// returns true, before the skip check.
    fn prompt(&mut self) -> Result<()> {
        Ok(())
    }

    /// Determine whether the step's effect is already applied.
    ///
    /// Returns `Skipped` (optionally carrying the previously computed
    /// payload) to skip execution, `Completed` to proceed to [`Step::run`],
    /// or `Failed` when the collaborator state rules out proceeding at all.
    fn is_skip(&mut self) -> StepResult {
        StepResult::completed()
    }

    /// Run the step to completion.
    fn run(&mut self) -> StepResult;
}
