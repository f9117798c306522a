//! Output formatting module

pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use styles::Styles;

use crate::domain::report::{Severity, ValidationReport, ValidationStatus};

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print a warning message prefixed with `⚠`. Suppressed when `quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// Print an info message prefixed with `ℹ`. Suppressed when `quiet`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Print a section header. Suppressed when `quiet`.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Render a validation report: per-issue lines, then counters and the
    /// overall verdict. Issues are never suppressed by `quiet`.
    pub fn print_validation_report(&self, report: &ValidationReport) {
        for issue in &report.issues {
            let line = match &issue.details {
                Some(details) => format!("{} ({details})", issue.message),
                None => issue.message.clone(),
            };
            if issue.severity == Severity::Critical {
                self.error(&line);
            } else {
                self.warn(&line);
            }
        }

        if !self.quiet {
            println!(
                "  {} valid, {} missing, {} corrupted",
                report.stats.valid_files, report.stats.missing_files, report.stats.corrupted_files
            );
        }

        match report.status {
            ValidationStatus::Ok => self.success("Installation is valid"),
            ValidationStatus::Degraded => self.warn("Installation is degraded"),
            ValidationStatus::Failed => self.error("Validation failed"),
        }
    }
}
