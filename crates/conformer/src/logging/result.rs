//! Case results and expectations.

use super::log_message::LogMessageWithStack;
use crate::query::TestQuery;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Reported status of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not finished yet
    Running,
    /// Passed
    Pass,
    /// Skipped
    Skip,
    /// Passed with warnings
    Warn,
    /// Failed
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Pass => "pass",
            Self::Skip => "skip",
            Self::Warn => "warn",
            Self::Fail => "fail",
        })
    }
}

/// The mutable result of one case, filled in by its recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTestCaseResult {
    /// Status (`running` until finished)
    pub status: Status,
    /// Wall time in milliseconds, `-1` until finished
    pub timems: f64,
    /// Log entries, set at finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogMessageWithStack>>,
}

impl Default for LiveTestCaseResult {
    fn default() -> Self {
        Self {
            status: Status::Running,
            timems: -1.0,
            logs: None,
        }
    }
}

/// Shared slot holding one case's [`LiveTestCaseResult`].
///
/// The [`Logger`](super::Logger) keeps one clone, the recorder writes through another.
#[derive(Debug, Clone, Default)]
pub struct ResultHandle(Arc<Mutex<LiveTestCaseResult>>);

impl ResultHandle {
    /// Copy of the current result
    #[must_use]
    pub fn snapshot(&self) -> LiveTestCaseResult {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut LiveTestCaseResult)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// What a (sub)case run expects to observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Expectation {
    /// No expectation: the case should pass
    #[default]
    Pass,
    /// The case is not run
    Skip,
    /// The case is known to fail; passing is an error
    Fail,
}

/// Outcome named by an expectations entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedOutcome {
    /// Do not run matching cases
    Skip,
    /// Matching cases are known to fail
    Fail,
}

impl From<ExpectedOutcome> for Expectation {
    fn from(outcome: ExpectedOutcome) -> Self {
        match outcome {
            ExpectedOutcome::Skip => Self::Skip,
            ExpectedOutcome::Fail => Self::Fail,
        }
    }
}

/// An expectations entry: every case the query covers has this outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestQueryWithExpectation {
    /// Covered cases
    pub query: TestQuery,
    /// Expected outcome
    pub expectation: ExpectedOutcome,
}
