//! Per-case accumulation of logs and status.
//!
//! A recorder is created by the [`Logger`](super::Logger) for exactly one case
//! and is never reused. Every entry raises the case (or the current subcase)
//! to at least its severity; `finish()` freezes the worst severity into the
//! shared [`LiveTestCaseResult`].

use super::log_message::LogMessageWithStack;
use super::result::{Expectation, LiveTestCaseResult, ResultHandle};
use super::severity::LogSeverity;
use crate::result::{CaseError, ConformError, ConformResult, IntoTestError, SkipTestCase, TestError};
use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::trace;

/// Only this many entries at the highest severity keep their stacks
pub const MAX_LOG_STACKS: usize = 2;

#[derive(Debug)]
struct RecorderState {
    result: ResultHandle,
    debugging: bool,
    started: Option<Instant>,
    in_sub_case: bool,
    sub_case_status: LogSeverity,
    final_case_status: LogSeverity,
    hide_stacks_below_severity: LogSeverity,
    log_lines_at_current_severity: usize,
    logs: Vec<LogMessageWithStack>,
    /// Stack text -> index into `logs` of its first occurrence
    seen_stacks: HashMap<String, usize>,
}

impl RecorderState {
    fn log(&mut self, level: LogSeverity, name: &str, error: TestError) {
        trace!(level = ?level, name, message = error.message(), "recorder entry");
        let mut entry = LogMessageWithStack::new(name, error);

        if !self.debugging {
            if let Some(stack) = &entry.stack {
                if let Some(&index) = self.seen_stacks.get(stack) {
                    self.logs[index].increment_times_seen();
                    return;
                }
                self.seen_stacks.insert(stack.clone(), self.logs.len());
            }
        }

        let status = if self.in_sub_case {
            &mut self.sub_case_status
        } else {
            &mut self.final_case_status
        };
        *status = (*status).max(level);

        if level > self.hide_stacks_below_severity {
            self.log_lines_at_current_severity = 0;
            self.hide_stacks_below_severity = level;
            for earlier in &mut self.logs {
                earlier.set_stack_hidden();
            }
        }
        if level == self.hide_stacks_below_severity {
            self.log_lines_at_current_severity += 1;
        }
        if level < self.hide_stacks_below_severity
            || self.log_lines_at_current_severity > MAX_LOG_STACKS
        {
            entry.set_stack_hidden();
        }

        self.logs.push(entry);
    }
}

/// Cloneable handle to one case's recorder.
///
/// The runner and the case's fixture share the same handle.
#[derive(Debug, Clone)]
pub struct TestCaseRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl TestCaseRecorder {
    /// Create a recorder writing into `result`
    #[must_use]
    pub fn new(result: ResultHandle, debugging: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState {
                result,
                debugging,
                started: None,
                in_sub_case: false,
                sub_case_status: LogSeverity::Pass,
                final_case_status: LogSeverity::Pass,
                hide_stacks_below_severity: LogSeverity::Warn,
                log_lines_at_current_severity: 0,
                logs: Vec::new(),
                seen_stacks: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether debug entries are kept (and deduplication is off)
    #[must_use]
    pub fn is_debugging(&self) -> bool {
        self.lock().debugging
    }

    /// Worst severity recorded outside subcases so far
    #[must_use]
    pub fn case_severity(&self) -> LogSeverity {
        self.lock().final_case_status
    }

    /// Begin timing. A recorder can be started only once.
    pub fn start(&self) -> ConformResult<()> {
        let mut state = self.lock();
        if state.started.is_some() {
            return Err(ConformError::RecorderReused);
        }
        state.started = Some(Instant::now());
        Ok(())
    }

    /// Freeze status, time and logs into the shared result
    pub fn finish(&self) -> ConformResult<()> {
        let state = self.lock();
        let started = state.started.ok_or(ConformError::RecorderNotStarted)?;
        let millis = started.elapsed().as_secs_f64() * 1000.0;
        // Round up to the microsecond
        let timems = (millis * 1000.0).ceil() / 1000.0;
        let status = state.final_case_status.status();
        let logs = state.logs.clone();
        state.result.update(|result| {
            result.timems = timems;
            result.status = status;
            result.logs = Some(logs);
        });
        Ok(())
    }

    /// Start attributing entries to a fresh subcase
    pub fn begin_sub_case(&self) {
        let mut state = self.lock();
        state.sub_case_status = LogSeverity::Pass;
        state.in_sub_case = true;
    }

    /// Fold the subcase into the case.
    ///
    /// With an expected failure the subcase contributes `Pass`, and one that
    /// reached at most `Warn` is reported as [`ConformError::UnexpectedPass`]
    /// for the caller to log.
    pub fn end_sub_case(&self, expected: Expectation) -> ConformResult<()> {
        let mut state = self.lock();
        let outcome = if expected == Expectation::Fail {
            let passed = state.sub_case_status <= LogSeverity::Warn;
            state.sub_case_status = LogSeverity::Pass;
            if passed {
                Err(ConformError::UnexpectedPass)
            } else {
                Ok(())
            }
        } else {
            Ok(())
        };
        state.in_sub_case = false;
        state.final_case_status = state.final_case_status.max(state.sub_case_status);
        outcome
    }

    /// Overwrite the shared result with one produced elsewhere
    pub fn inject_result(&self, injected: LiveTestCaseResult) {
        self.lock().result.update(|result| *result = injected);
    }

    /// Debug entry; dropped unless debugging
    #[track_caller]
    pub fn debug(&self, message: impl IntoTestError) {
        let location = Location::caller();
        let mut state = self.lock();
        if state.debugging {
            state.log(LogSeverity::Pass, "DEBUG", message.into_test_error(location));
        }
    }

    /// Informational entry
    #[track_caller]
    pub fn info(&self, message: impl IntoTestError) {
        let error = message.into_test_error(Location::caller());
        self.lock().log(LogSeverity::Pass, "INFO", error);
    }

    /// Skip entry
    pub fn skipped(&self, skip: SkipTestCase) {
        self.lock().log(LogSeverity::Skip, "SKIP", skip.into_error());
    }

    /// Warning entry
    #[track_caller]
    pub fn warn(&self, message: impl IntoTestError) {
        let error = message.into_test_error(Location::caller());
        self.lock().log(LogSeverity::Warn, "WARN", error);
    }

    /// Failed-expectation entry
    #[track_caller]
    pub fn expectation_failed(&self, message: impl IntoTestError) {
        let error = message.into_test_error(Location::caller());
        self.lock()
            .log(LogSeverity::ExpectFailed, "EXPECTATION FAILED", error);
    }

    /// Validation-error entry
    #[track_caller]
    pub fn validation_failed(&self, message: impl IntoTestError) {
        let error = message.into_test_error(Location::caller());
        self.lock()
            .log(LogSeverity::ValidationFailed, "VALIDATION FAILED", error);
    }

    /// Record something a fixture or body returned; skips log as skips
    pub fn threw(&self, error: CaseError) {
        match error {
            CaseError::Skip(skip) => self.skipped(skip),
            CaseError::Failure(error) => {
                self.lock().log(LogSeverity::ThrewException, "EXCEPTION", error);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::logging::Status;

    fn recorder(debugging: bool) -> (TestCaseRecorder, ResultHandle) {
        let result = ResultHandle::default();
        (TestCaseRecorder::new(result.clone(), debugging), result)
    }

    fn finished(rec: &TestCaseRecorder, result: &ResultHandle) -> LiveTestCaseResult {
        rec.finish().unwrap();
        result.snapshot()
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_start_twice_fails() {
            let (rec, _) = recorder(false);
            rec.start().unwrap();
            assert!(matches!(rec.start(), Err(ConformError::RecorderReused)));
        }

        #[test]
        fn test_finish_before_start_fails() {
            let (rec, _) = recorder(false);
            assert!(matches!(rec.finish(), Err(ConformError::RecorderNotStarted)));
        }

        #[test]
        fn test_empty_case_passes() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            let r = finished(&rec, &result);
            assert_eq!(r.status, Status::Pass);
            assert!(r.timems >= 0.0);
            assert_eq!(r.logs, Some(vec![]));
        }

        #[test]
        fn test_timems_rounded_to_microsecond() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            let r = finished(&rec, &result);
            let micros = r.timems * 1000.0;
            assert!((micros - micros.round()).abs() < 1e-6);
        }

        #[test]
        fn test_inject_result() {
            let (rec, result) = recorder(false);
            rec.inject_result(LiveTestCaseResult {
                status: Status::Warn,
                timems: 3.5,
                logs: None,
            });
            assert_eq!(result.snapshot().status, Status::Warn);
        }
    }

    mod severity_tests {
        use super::*;

        #[test]
        fn test_worst_severity_wins() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.info("a");
            rec.warn("b");
            assert_eq!(rec.case_severity(), LogSeverity::Warn);
            rec.expectation_failed("c");
            rec.info("d");
            assert_eq!(finished(&rec, &result).status, Status::Fail);
        }

        #[test]
        fn test_threw_skip_is_skip() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.threw(CaseError::skip("not here"));
            let r = finished(&rec, &result);
            assert_eq!(r.status, Status::Skip);
            assert_eq!(r.logs.unwrap()[0].name, "SKIP");
        }

        #[test]
        fn test_threw_failure_is_exception() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.threw(CaseError::failure("boom"));
            let r = finished(&rec, &result);
            assert_eq!(r.status, Status::Fail);
            assert_eq!(r.logs.unwrap()[0].name, "EXCEPTION");
        }

        #[test]
        fn test_debug_dropped_unless_debugging() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.debug("hidden");
            assert!(finished(&rec, &result).logs.unwrap().is_empty());

            let (rec, result) = recorder(true);
            rec.start().unwrap();
            rec.debug("shown");
            assert_eq!(finished(&rec, &result).logs.unwrap()[0].name, "DEBUG");
        }
    }

    mod dedup_tests {
        use super::*;

        #[test]
        fn test_identical_stack_counted_once() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            for _ in 0..3 {
                rec.warn("same");
            }
            let logs = finished(&rec, &result).logs.unwrap();
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].times_seen, 3);
            assert!(logs[0].to_string().contains("(seen 3 times with identical stack)"));
        }

        #[test]
        fn test_same_message_other_site_not_deduped() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.warn("same");
            rec.warn("same");
            assert_eq!(finished(&rec, &result).logs.unwrap().len(), 2);
        }

        #[test]
        fn test_debugging_disables_dedup() {
            let (rec, result) = recorder(true);
            rec.start().unwrap();
            for _ in 0..3 {
                rec.warn("same");
            }
            assert_eq!(finished(&rec, &result).logs.unwrap().len(), 3);
        }

        #[test]
        fn test_deduped_entry_does_not_raise_severity() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            let err = TestError::new("shared");
            rec.info(err.clone());
            rec.expectation_failed(err);
            assert_eq!(finished(&rec, &result).status, Status::Pass);
        }
    }

    mod stack_hiding_tests {
        use super::*;

        #[test]
        fn test_only_two_stacks_at_top_severity() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.warn("a");
            rec.warn("b");
            rec.warn("c");
            let logs = finished(&rec, &result).logs.unwrap();
            let hidden: Vec<bool> = logs.iter().map(|l| l.stack_hidden).collect();
            assert_eq!(hidden, vec![false, false, true]);
        }

        #[test]
        fn test_raising_severity_hides_earlier() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.warn("a");
            rec.warn("b");
            rec.threw(CaseError::failure("c"));
            rec.warn("d");
            let logs = finished(&rec, &result).logs.unwrap();
            let hidden: Vec<bool> = logs.iter().map(|l| l.stack_hidden).collect();
            assert_eq!(hidden, vec![true, true, false, true]);
        }

        #[test]
        fn test_info_stacks_hidden() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.info("note");
            assert!(finished(&rec, &result).logs.unwrap()[0].stack_hidden);
        }
    }

    mod subcase_tests {
        use super::*;

        #[test]
        fn test_subcase_folds_into_case() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.begin_sub_case();
            rec.warn("w");
            assert_eq!(rec.case_severity(), LogSeverity::Pass);
            rec.end_sub_case(Expectation::Pass).unwrap();
            assert_eq!(rec.case_severity(), LogSeverity::Warn);
            assert_eq!(finished(&rec, &result).status, Status::Warn);
        }

        #[test]
        fn test_expected_fail_that_passes() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.begin_sub_case();
            rec.warn("only a warning");
            let err = rec.end_sub_case(Expectation::Fail).unwrap_err();
            assert!(matches!(err, ConformError::UnexpectedPass));
            assert_eq!(err.to_string(), "Testcase passed unexpectedly.");
            // The subcase itself folds in as a pass; the warning is the caller's
            assert_eq!(rec.case_severity(), LogSeverity::Pass);
            rec.warn(err.to_string());
            assert_eq!(finished(&rec, &result).status, Status::Warn);
        }

        #[test]
        fn test_expected_fail_that_fails_is_pass() {
            let (rec, result) = recorder(false);
            rec.start().unwrap();
            rec.begin_sub_case();
            rec.validation_failed("known bug");
            rec.end_sub_case(Expectation::Fail).unwrap();
            assert_eq!(finished(&rec, &result).status, Status::Pass);
        }
    }
}
