//! Plan execution with skip and fail-fast semantics.

use tracing::debug;

use crate::error::{CairnError, Result};
use crate::ui::Ui;

use super::step::{ResultStatus, Step, StepResult};

/// An ordered sequence of steps representing one phase of a workflow.
///
/// Order is significant: later steps may depend on earlier steps' results,
/// and no reordering or parallel execution happens within a plan. A plan is
/// built fresh per invocation and discarded once run.
pub type Plan<'a> = Vec<Box<dyn Step + 'a>>;

/// Results accumulated while running a plan, keyed by step name.
///
/// Population order follows execution order. This mapping is the sole
/// channel for inter-step and inter-plan data flow; steps never share
/// mutable state.
#[derive(Debug, Default)]
pub struct PlanResults {
    entries: Vec<(String, StepResult)>,
}

impl PlanResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, name: &str, result: StepResult) {
        self.entries.push((name.to_string(), result));
    }

    /// Look up the result of a step by name.
    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// The payload of a step's result, if the step ran and produced one.
    pub fn message_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|r| r.message.as_deref())
    }

    /// The payload of a step's result, required for a downstream step.
    ///
    /// A missing entry or an empty payload means the producing step was
    /// skipped without surfacing its value, or the workflow composition is
    /// defective. Either way the caller must not proceed.
    pub fn require_message(&self, name: &str) -> Result<String> {
        match self.message_of(name) {
            Some(message) if !message.is_empty() => Ok(message.to_string()),
            _ => Err(CairnError::MissingStepResult {
                step: name.to_string(),
            }),
        }
    }

    /// Step names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Executes a plan's steps in order, enforcing skip and fail-fast semantics.
pub struct PlanRunner<'a> {
    ui: &'a Ui,
}

impl<'a> PlanRunner<'a> {
    pub fn new(ui: &'a Ui) -> Self {
        Self { ui }
    }

    /// Run every step of the plan in declaration order.
    ///
    /// Each step's prompts (if any) are gathered first, then its skip check
    /// decides whether `run` is called at all. A `Failed` result - from the
    /// skip check or from execution - halts the plan immediately; steps
    /// already applied are not rolled back, and recovery is re-invocation.
    pub fn run(&self, mut plan: Plan<'_>) -> Result<PlanResults> {
        let mut results = PlanResults::new();

        for step in plan.iter_mut() {
            debug!("starting step {:?}", step.name());

            if step.has_prompts() {
                step.prompt()?;
            }

            let status = self.ui.status(step.description());

            let skip = step.is_skip();
            match skip.status {
                ResultStatus::Skipped => {
                    status.finish_skipped(&format!("{} (already done)", step.description()));
                    debug!("skipping step {:?}", step.name());
                    results.record(step.name(), skip);
                    continue;
                }
                ResultStatus::Failed => {
                    status.finish_error(step.description());
                    return Err(CairnError::StepFailed {
                        step: step.name().to_string(),
                        message: skip.error_detail().to_string(),
                    });
                }
                ResultStatus::Completed => {}
            }

            debug!("running step {:?}", step.name());
            let result = step.run();
            debug!(
                "finished step {:?} with status {}",
                step.name(),
                result.status
            );

            if result.is_failed() {
                status.finish_error(step.description());
                let message = result.error_detail().to_string();
                results.record(step.name(), result);
                return Err(CairnError::StepFailed {
                    step: step.name().to_string(),
                    message,
                });
            }

            status.finish_success(step.description());
            results.record(step.name(), result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Test step that records its execution into a shared log.
    struct RecordingStep {
        name: &'static str,
        skip: StepResult,
        run: StepResult,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingStep {
        fn new(name: &'static str, log: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                skip: StepResult::completed(),
                run: StepResult::completed(),
                log,
            }
        }

        fn skipping(mut self, result: StepResult) -> Self {
            self.skip = result;
            self
        }

        fn running(mut self, result: StepResult) -> Self {
            self.run = result;
            self
        }
    }

    impl Step for RecordingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.name
        }

        fn is_skip(&mut self) -> StepResult {
            self.log.borrow_mut().push(format!("check:{}", self.name));
            self.skip.clone()
        }

        fn run(&mut self) -> StepResult {
            self.log.borrow_mut().push(format!("run:{}", self.name));
            self.run.clone()
        }
    }

    fn quiet_ui() -> Ui {
        Ui::silent()
    }

    #[test]
    fn steps_execute_in_declaration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![
            Box::new(RecordingStep::new("a", log.clone())),
            Box::new(RecordingStep::new("b", log.clone())),
            Box::new(RecordingStep::new("c", log.clone())),
        ];

        let ui = quiet_ui();
        let results = PlanRunner::new(&ui).run(plan).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["check:a", "run:a", "check:b", "run:b", "check:c", "run:c"]
        );
        assert_eq!(results.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn order_preserved_when_middle_step_skips() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![
            Box::new(RecordingStep::new("a", log.clone())),
            Box::new(RecordingStep::new("b", log.clone()).skipping(StepResult::skipped())),
            Box::new(RecordingStep::new("c", log.clone())),
        ];

        let ui = quiet_ui();
        PlanRunner::new(&ui).run(plan).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["check:a", "run:a", "check:b", "check:c", "run:c"]
        );
    }

    #[test]
    fn skipped_step_is_not_executed() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![Box::new(
            RecordingStep::new("a", log.clone()).skipping(StepResult::skipped_with("cached")),
        )];

        let ui = quiet_ui();
        let results = PlanRunner::new(&ui).run(plan).unwrap();

        assert!(!log.borrow().iter().any(|e| e == "run:a"));
        assert_eq!(results.get("a").unwrap().status, ResultStatus::Skipped);
    }

    #[test]
    fn skip_payload_is_surfaced_in_results() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![Box::new(
            RecordingStep::new("token", log).skipping(StepResult::skipped_with("tok-42")),
        )];

        let ui = quiet_ui();
        let results = PlanRunner::new(&ui).run(plan).unwrap();

        assert_eq!(results.require_message("token").unwrap(), "tok-42");
    }

    #[test]
    fn failed_run_halts_remaining_steps() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![
            Box::new(RecordingStep::new("a", log.clone())),
            Box::new(RecordingStep::new("b", log.clone()).running(StepResult::failed("boom"))),
            Box::new(RecordingStep::new("c", log.clone())),
        ];

        let ui = quiet_ui();
        let err = PlanRunner::new(&ui).run(plan).unwrap_err();

        match err {
            CairnError::StepFailed { step, message } => {
                assert_eq!(step, "b");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!log.borrow().iter().any(|e| e.contains('c')));
    }

    #[test]
    fn failed_skip_check_halts_the_plan() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![
            Box::new(
                RecordingStep::new("a", log.clone())
                    .skipping(StepResult::failed("node not registered")),
            ),
            Box::new(RecordingStep::new("b", log.clone())),
        ];

        let ui = quiet_ui();
        let err = PlanRunner::new(&ui).run(plan).unwrap_err();

        assert!(matches!(err, CairnError::StepFailed { .. }));
        assert!(!log.borrow().iter().any(|e| e == "run:a" || e == "check:b"));
    }

    #[test]
    fn resumption_skips_applied_prefix_and_runs_the_rest() {
        // Steps a and b report already-applied; only c executes.
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![
            Box::new(RecordingStep::new("a", log.clone()).skipping(StepResult::skipped())),
            Box::new(RecordingStep::new("b", log.clone()).skipping(StepResult::skipped())),
            Box::new(RecordingStep::new("c", log.clone())),
        ];

        let ui = quiet_ui();
        let results = PlanRunner::new(&ui).run(plan).unwrap();

        assert_eq!(results.get("a").unwrap().status, ResultStatus::Skipped);
        assert_eq!(results.get("b").unwrap().status, ResultStatus::Skipped);
        assert_eq!(results.get("c").unwrap().status, ResultStatus::Completed);
        assert_eq!(
            *log.borrow(),
            vec!["check:a", "check:b", "check:c", "run:c"]
        );
    }

    #[test]
    fn require_message_fails_on_missing_key() {
        let results = PlanResults::new();
        let err = results.require_message("never-ran").unwrap_err();
        assert!(matches!(err, CairnError::MissingStepResult { .. }));
    }

    #[test]
    fn require_message_fails_on_empty_payload() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plan: Plan = vec![Box::new(
            RecordingStep::new("a", log).skipping(StepResult::skipped()),
        )];

        let ui = quiet_ui();
        let results = PlanRunner::new(&ui).run(plan).unwrap();

        assert!(results.require_message("a").is_err());
    }
}
