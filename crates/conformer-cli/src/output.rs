//! Output formatting and progress reporting

use conformer::{LiveTestCaseResult, Status, SuiteResults};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// Output format for test results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text on stderr
    #[default]
    Text,
    /// Logger JSON on stdout
    Json,
}

/// Progress reporter for case execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print logs of passing cases too
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Also print logs of cases that did not fail
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start a spinner; the case count is not known up front
    pub fn start_progress(&mut self, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {elapsed} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        self.progress_bar = Some(pb);
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match &self.progress_bar {
            Some(pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, color: Style, message: &str) {
        let prefix = if self.use_color {
            color.bold().apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.prefixed("✓", "PASS", Style::new().green(), message);
        }
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.prefixed("✗", "FAIL", Style::new().red(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.prefixed("⚠", "WARN", Style::new().yellow(), message);
        }
    }

    /// Print a skip message
    pub fn skipped(&self, message: &str) {
        if !self.quiet {
            self.prefixed("-", "SKIP", Style::new().cyan(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.prefixed("ℹ", "INFO", Style::new().blue(), message);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print one finished case; failures include their logs
    pub fn case_result(&self, query: &str, result: &LiveTestCaseResult) {
        let message = format!("{query} ({:.3}ms)", result.timems);
        match result.status {
            Status::Pass => self.success(&message),
            Status::Warn => self.warning(&message),
            Status::Skip => self.skipped(&message),
            Status::Fail => self.failure(&message),
            Status::Running => self.info(&message),
        }
        let show_logs = result.status == Status::Fail || (self.verbose && !self.quiet);
        if !show_logs {
            return;
        }
        for log in result.logs.iter().flatten() {
            for text in log.to_string().lines() {
                self.line(&format!("    {text}"));
            }
        }
    }

    /// Print the run summary
    pub fn summary(&self, results: &SuiteResults) {
        let failed = results.failed_count();
        if self.quiet && failed == 0 {
            return;
        }

        let passed = results.passed_count();
        let warned = results.warned_count();
        let skipped = results.skipped_count();
        let total = results.total();
        let duration_secs = results.duration.as_secs_f64();

        self.line("");
        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            self.line(&format!(
                "{} {} cases in {:.2}s ({} passed, {} warned, {} failed, {} skipped)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                warned,
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            self.line(&format!(
                "{status} {total} cases in {duration_secs:.2}s ({passed} passed, {warned} warned, {failed} failed, {skipped} skipped)"
            ));
        }
        if results.stopped_early {
            self.warning("stopped at first failure (--fail-fast)");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conformer::TestResult;
    use std::time::Duration;

    fn results(statuses: &[Status]) -> SuiteResults {
        SuiteResults {
            suite_name: "s".to_string(),
            results: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| TestResult {
                    query: format!("s:f:t:i={i}"),
                    status: *status,
                    timems: 0.5,
                })
                .collect(),
            duration: Duration::from_millis(12),
            stopped_early: false,
        }
    }

    mod output_format_tests {
        use super::*;

        #[test]
        fn test_default_format() {
            assert_eq!(OutputFormat::default(), OutputFormat::Text);
        }

        #[test]
        fn test_serde_names() {
            let json = serde_json::to_string(&OutputFormat::Json).unwrap();
            assert_eq!(json, "\"Json\"");
        }
    }

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
            assert!(!reporter.verbose);
        }

        #[test]
        fn test_messages() {
            let reporter = ProgressReporter::new(false, false);
            reporter.success("passed");
            reporter.failure("failed");
            reporter.warning("warned");
            reporter.skipped("skipped");
            reporter.info("info");
            reporter.header("Header");
            // No panic = success
        }

        #[test]
        fn test_case_result_with_logs() {
            let reporter = ProgressReporter::new(false, false).with_verbose(true);
            let result = LiveTestCaseResult {
                status: Status::Fail,
                timems: 1.25,
                logs: Some(Vec::new()),
            };
            reporter.case_result("s:f:t:", &result);
            // No panic = success
        }

        #[test]
        fn test_summary() {
            let reporter = ProgressReporter::new(false, false);
            reporter.summary(&results(&[Status::Pass, Status::Warn, Status::Skip]));
            reporter.summary(&results(&[Status::Fail]));
            // No panic = success
        }

        #[test]
        fn test_progress_spinner() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress("running");
            reporter.finish();
            // No panic = success
        }

        #[test]
        fn test_quiet_mode_suppresses_output() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress("running");
            assert!(reporter.progress_bar.is_none());
            reporter.success("hidden");
            reporter.summary(&results(&[Status::Pass]));
            // Failure is still printed
            reporter.failure("shown");
        }
    }
}
