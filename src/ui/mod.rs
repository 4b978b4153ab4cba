//! Console output: status spinners, styled messages, and tables.
//!
//! Steps and preflight checks report progress through [`Ui::status`], which
//! shows a live spinner while an operation is in flight and replaces it with
//! a final success / skipped / failed line. In quiet mode (and in tests) the
//! spinner is hidden and nothing is printed.

pub mod table;

pub use table::Table;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Console frontend for operator-facing output.
#[derive(Debug, Clone, Copy)]
pub struct Ui {
    quiet: bool,
}

impl Ui {
    /// Normal interactive output.
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Suppress all non-error output. Used by tests and `--quiet`.
    pub fn silent() -> Self {
        Self { quiet: true }
    }

    /// Start a status spinner for an in-flight operation.
    pub fn status(&self, message: &str) -> StatusHandle {
        if self.quiet {
            return StatusHandle {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        bar.set_message(format!("{} ... ", message));
        bar.enable_steady_tick(Duration::from_millis(80));
        StatusHandle { bar }
    }

    /// Display a plain message.
    pub fn message(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Display a success message.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{} {}", style("✓").green(), msg);
        }
    }

    /// Display a warning message.
    pub fn warning(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("!").yellow(), msg);
        }
    }

    /// Display an error message. Shown even in quiet mode.
    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", style("✗").red(), msg);
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for finishing a status spinner.
pub struct StatusHandle {
    bar: ProgressBar,
}

impl StatusHandle {
    /// Replace the spinner with a success line.
    pub fn finish_success(self, msg: &str) {
        self.finish_with(format!("{} {}", style("✓").green(), msg));
    }

    /// Replace the spinner with a skipped line.
    pub fn finish_skipped(self, msg: &str) {
        self.finish_with(format!("{} {}", style("⊘").dim(), msg));
    }

    /// Replace the spinner with a failure line.
    pub fn finish_error(self, msg: &str) {
        self.finish_with(format!("{} {}", style("✗").red(), msg));
    }

    fn finish_with(self, line: String) {
        if self.bar.is_hidden() {
            self.bar.finish_and_clear();
            return;
        }
        self.bar
            .set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
        self.bar.finish_with_message(line);
    }
}
