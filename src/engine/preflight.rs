//! Preflight checks run before any plan executes.

use tracing::debug;

use crate::error::{CairnError, Result};
use crate::ui::Ui;

/// A read-only validation of the local environment.
///
/// Checks must have no side effects so that re-running them after fixing a
/// reported condition is always safe. A failing check returns the specific
/// unmet condition, including a remediation hint where one exists.
pub trait PreflightCheck {
    /// Short name used in error reporting.
    fn name(&self) -> &str;

    /// Human-readable description shown while the check runs.
    fn description(&self) -> String;

    /// Run the check. `Err` carries the reason the environment is unsuitable.
    fn run(&self) -> std::result::Result<(), String>;
}

/// Run every check in registration order, aborting on the first failure.
///
/// No plan is constructed or run when any check fails.
pub fn run_preflight_checks(checks: &[Box<dyn PreflightCheck + '_>], ui: &Ui) -> Result<()> {
    for check in checks {
        debug!("starting preflight check {:?}", check.name());
        let status = ui.status(&check.description());
        match check.run() {
            Ok(()) => status.finish_success(&check.description()),
            Err(message) => {
                status.finish_error(&check.description());
                return Err(CairnError::PreflightFailed {
                    check: check.name().to_string(),
                    message,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FixedCheck {
        name: &'static str,
        outcome: std::result::Result<(), String>,
        ran: Rc<Cell<bool>>,
    }

    impl PreflightCheck for FixedCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> String {
            format!("Checking {}", self.name)
        }

        fn run(&self) -> std::result::Result<(), String> {
            self.ran.set(true);
            self.outcome.clone()
        }
    }

    fn check(
        name: &'static str,
        outcome: std::result::Result<(), String>,
    ) -> (Box<dyn PreflightCheck>, Rc<Cell<bool>>) {
        let ran = Rc::new(Cell::new(false));
        (
            Box::new(FixedCheck {
                name,
                outcome,
                ran: ran.clone(),
            }),
            ran,
        )
    }

    #[test]
    fn all_passing_checks_run() {
        let (a, ran_a) = check("a", Ok(()));
        let (b, ran_b) = check("b", Ok(()));
        let ui = Ui::silent();

        run_preflight_checks(&[a, b], &ui).unwrap();

        assert!(ran_a.get());
        assert!(ran_b.get());
    }

    #[test]
    fn first_failure_aborts_remaining_checks() {
        let (a, _) = check("a", Err("missing group membership".to_string()));
        let (b, ran_b) = check("b", Ok(()));
        let ui = Ui::silent();

        let err = run_preflight_checks(&[a, b], &ui).unwrap_err();

        match err {
            CairnError::PreflightFailed { check, message } => {
                assert_eq!(check, "a");
                assert!(message.contains("group membership"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ran_b.get());
    }

    #[test]
    fn empty_check_list_passes() {
        let ui = Ui::silent();
        run_preflight_checks(&[], &ui).unwrap();
    }
}
