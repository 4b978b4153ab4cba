//! Plan/Step execution engine.
//!
//! This module provides the core workflow machinery:
//!
//! - [`Step`] - one idempotent unit of externally-effecting work
//! - [`StepResult`] / [`ResultStatus`] - the outcome of running a step
//! - [`Plan`] / [`PlanRunner`] / [`PlanResults`] - ordered, fail-fast
//!   execution of steps with cross-plan result threading
//! - [`PreflightCheck`] / [`run_preflight_checks`] - read-only environment
//!   validation run before any plan
//!
//! A lifecycle command composes preflight checks and a sequence of plans.
//! Plans run strictly in order; a plan boundary is a commit point after which
//! earlier effects are assumed durable in the collaborating systems. There is
//! no local journal: resumption after a partial failure relies entirely on
//! each step's own skip check re-querying the external collaborator.

pub mod plan;
pub mod preflight;
pub mod step;

pub use plan::{Plan, PlanResults, PlanRunner};
pub use preflight::{run_preflight_checks, PreflightCheck};
pub use step::{ResultStatus, Step, StepResult};
