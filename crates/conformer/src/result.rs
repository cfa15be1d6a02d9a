//! Result and error types for Conformer.
//!
//! Two channels exist. [`ConformError`] covers everything the framework itself
//! rejects: malformed registrations, failed validation, bad queries and misuse
//! of a recorder. These propagate to the caller. [`CaseError`] is what a
//! fixture or test body hands back to the runner: either the skip signal or a
//! genuine failure. The runner contains it inside the case.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Result type for Conformer operations
pub type ConformResult<T> = Result<T, ConformError>;

/// Errors that can occur in Conformer
#[derive(Debug, Error)]
pub enum ConformError {
    /// Test name is not a valid query path
    #[error("Invalid test name {name}: {reason}")]
    InvalidTestName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Test name registered twice in one group
    #[error("Duplicate test name: {name}")]
    DuplicateTestName {
        /// Offending name
        name: String,
    },

    /// `.params*()` called on an already-parameterized test
    #[error("Test case is already parameterized: {test}")]
    AlreadyParameterized {
        /// Test path
        test: String,
    },

    /// `.body()` or `.unimplemented()` called twice
    #[error("Test function is already set: {test}")]
    TestFnAlreadySet {
        /// Test path
        test: String,
    },

    /// Test has no body attached
    #[error("Test is missing .body(): {test}\n-> test created at: {created_at}")]
    MissingTestFn {
        /// Test path
        test: String,
        /// Where the test was registered
        created_at: String,
    },

    /// Two cases of one test share a public params fingerprint
    #[error("Duplicate public test case params for test {test}: {params}")]
    DuplicateCaseParams {
        /// Test path
        test: String,
        /// Human-readable params
        params: String,
    },

    /// Merging two params objects found a key on both sides
    #[error("Params key {key} is shadowed: already set to {existing}, merged again with {incoming}")]
    ParamsShadowed {
        /// Colliding key
        key: String,
        /// Value already present
        existing: String,
        /// Value being merged in
        incoming: String,
    },

    /// Structural defect in a params builder
    #[error("Invalid params builder: {message}")]
    InvalidParams {
        /// Error message
        message: String,
    },

    /// Param key or value cannot be stringified into a query
    #[error("Invalid param value: {message}")]
    InvalidParamValue {
        /// Error message
        message: String,
    },

    /// Query string does not parse
    #[error("Invalid query {query}: {message}")]
    InvalidQuery {
        /// Query text
        query: String,
        /// Error message
        message: String,
    },

    /// `start()` called on a recorder that already started
    #[error("TestCaseRecorder cannot be reused")]
    RecorderReused,

    /// `finish()` called before `start()`
    #[error("finish() before start()")]
    RecorderNotStarted,

    /// A subcase expected to fail passed
    #[error("Testcase passed unexpectedly.")]
    UnexpectedPass,

    /// A query expected to name one case resolved to some other count
    #[error("Query {query} resolved to {count} cases, expected exactly 1")]
    CaseCountMismatch {
        /// Query text
        query: String,
        /// Number of cases found
        count: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConformError {
    /// Create an invalid-query error
    #[must_use]
    pub fn invalid_query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-param-value error
    #[must_use]
    pub fn invalid_param_value(message: impl Into<String>) -> Self {
        Self::InvalidParamValue {
            message: message.into(),
        }
    }
}

/// An error value with a message and a captured "stack".
///
/// Rust has no exception stacks, so the stack is the source location where the
/// error was created (or where `?` converted it), rendered after the message.
/// Two errors with the same message created at the same place have identical
/// stacks, which is what the recorder deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError {
    message: String,
    stack: Option<String>,
}

impl TestError {
    /// Create an error, capturing the caller's location as its stack
    #[must_use]
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let stack = Some(render_stack(&message, Location::caller()));
        Self { message, stack }
    }

    /// Create an error with no stack at all
    #[must_use]
    pub fn without_stack(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Wrap any error, flattening its source chain into the message
    #[must_use]
    #[track_caller]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
        Self::new(message)
    }

    /// Replace the stack (e.g. with the test registration site)
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Replace the message, keeping the stack location
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Captured stack, if any
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for TestError {
    #[track_caller]
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TestError {
    #[track_caller]
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

pub(crate) fn render_stack(message: &str, location: &Location<'_>) -> String {
    format!("{message}\n    at {location}")
}

/// Anything a recorder can log.
///
/// Plain messages take the location of the logging call as their stack;
/// a [`TestError`] keeps its own.
pub trait IntoTestError {
    /// Convert, using `location` if no stack exists yet
    fn into_test_error(self, location: &'static Location<'static>) -> TestError;
}

impl IntoTestError for TestError {
    fn into_test_error(self, _location: &'static Location<'static>) -> TestError {
        self
    }
}

impl IntoTestError for String {
    fn into_test_error(self, location: &'static Location<'static>) -> TestError {
        let stack = Some(render_stack(&self, location));
        TestError {
            message: self,
            stack,
        }
    }
}

impl IntoTestError for &str {
    fn into_test_error(self, location: &'static Location<'static>) -> TestError {
        self.to_string().into_test_error(location)
    }
}

/// The skip signal: "this case does not apply here".
///
/// Not a defect. The recorder logs it at skip severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipTestCase(TestError);

impl SkipTestCase {
    /// Create a skip signal
    #[must_use]
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self(TestError::new(message))
    }

    /// Prefix the message, e.g. `subcase skipped: `
    #[must_use]
    pub fn prefixed(self, prefix: &str) -> Self {
        let message = format!("{prefix}{}", self.0.message());
        Self(self.0.with_message(message))
    }

    /// The underlying error payload
    #[must_use]
    pub fn error(&self) -> &TestError {
        &self.0
    }

    /// Consume into the underlying error payload
    #[must_use]
    pub fn into_error(self) -> TestError {
        self.0
    }
}

impl fmt::Display for SkipTestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a fixture or test body returns when it stops early.
///
/// `?` converts any [`std::error::Error`] into [`CaseError::Failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    /// Control-flow skip signal
    Skip(SkipTestCase),
    /// Genuine failure (assertion, runtime error, panic)
    Failure(TestError),
}

/// Result type for fixture and test body code
pub type CaseResult<T = ()> = Result<T, CaseError>;

impl CaseError {
    /// Build a skip signal
    #[must_use]
    #[track_caller]
    pub fn skip(message: impl Into<String>) -> Self {
        Self::Skip(SkipTestCase::new(message))
    }

    /// Build a failure
    #[must_use]
    #[track_caller]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(TestError::new(message))
    }

    /// Whether this is the skip signal
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip(skip) => write!(f, "skipped: {skip}"),
            Self::Failure(err) => err.fmt(f),
        }
    }
}

impl<E> From<E> for CaseError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(err: E) -> Self {
        Self::Failure(TestError::from_error(&err))
    }
}

impl From<SkipTestCase> for CaseError {
    fn from(skip: SkipTestCase) -> Self {
        Self::Skip(skip)
    }
}

impl From<TestError> for CaseError {
    fn from(err: TestError) -> Self {
        Self::Failure(err)
    }
}
