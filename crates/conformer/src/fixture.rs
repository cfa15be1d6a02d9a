//! Per-case fixtures.
//!
//! Every case gets a freshly constructed fixture. The runner drives it
//! through `new -> init -> body -> finalize`; `finalize` runs whenever `new`
//! succeeded, even if `init` or the body failed.
//!
//! [`BaseFixture`] is the ready-made fixture that domain fixtures embed. It
//! holds the case's recorder and params and offers the assertion helpers.

use crate::logging::TestCaseRecorder;
use crate::params::Params;
use crate::result::{CaseError, CaseResult, IntoTestError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

/// Lifecycle of a per-case fixture.
///
/// # Example
///
/// ```ignore
/// struct DeviceFixture {
///     base: BaseFixture,
///     device: Option<Device>,
/// }
///
/// #[async_trait]
/// impl Fixture for DeviceFixture {
///     fn new(rec: TestCaseRecorder, params: Params) -> CaseResult<Self> {
///         Ok(Self { base: BaseFixture::new(rec, params), device: None })
///     }
///
///     async fn init(&mut self) -> CaseResult {
///         self.device = Some(Device::open().await?);
///         Ok(())
///     }
///
///     async fn finalize(&mut self) -> CaseResult {
///         self.base.finalize().await
///     }
/// }
/// ```
#[async_trait]
pub trait Fixture: Sized + Send + 'static {
    /// Construct the fixture for one case.
    ///
    /// # Errors
    ///
    /// A failure here skips `init`, the body and `finalize`.
    fn new(rec: TestCaseRecorder, params: Params) -> CaseResult<Self>;

    /// Asynchronous setup before the body
    async fn init(&mut self) -> CaseResult {
        Ok(())
    }

    /// Asynchronous teardown after the body
    async fn finalize(&mut self) -> CaseResult {
        Ok(())
    }
}

type Cleanup = Box<dyn FnOnce() -> CaseResult + Send>;

/// The standard fixture: recorder, params, deferred checks and cleanups.
///
/// `Sync`, so async bodies can hold `&BaseFixture` across an `.await`. The
/// deferred work is only `Send`, hence the mutexes; they are reached through
/// `&mut self` and never contended.
pub struct BaseFixture {
    rec: TestCaseRecorder,
    params: Params,
    eventual_expectations: Mutex<Vec<BoxFuture<'static, ()>>>,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl fmt::Debug for BaseFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseFixture")
            .field("params", &self.params)
            .field("eventual_expectations", &pending(&self.eventual_expectations))
            .field("cleanups", &pending(&self.cleanups))
            .finish()
    }
}

impl BaseFixture {
    /// Create a base fixture for one case
    #[must_use]
    pub fn new(rec: TestCaseRecorder, params: Params) -> Self {
        Self {
            rec,
            params,
            eventual_expectations: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    /// The case's recorder
    #[must_use]
    pub const fn rec(&self) -> &TestCaseRecorder {
        &self.rec
    }

    /// The case's merged params
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Log at debug level (kept only when debugging)
    #[track_caller]
    pub fn debug(&self, message: impl IntoTestError) {
        self.rec.debug(message);
    }

    /// Log informationally
    #[track_caller]
    pub fn info(&self, message: impl IntoTestError) {
        self.rec.info(message);
    }

    /// Log a warning
    #[track_caller]
    pub fn warn(&self, message: impl IntoTestError) {
        self.rec.warn(message);
    }

    /// Record a failed expectation; the case keeps running
    #[track_caller]
    pub fn fail(&self, message: impl IntoTestError) {
        self.rec.expectation_failed(message);
    }

    /// Record an observed validation error
    #[track_caller]
    pub fn validation_failed(&self, message: impl IntoTestError) {
        self.rec.validation_failed(message);
    }

    /// The skip signal, to be returned with `Err(..)` or `?`
    #[must_use]
    #[track_caller]
    pub fn skip(&self, message: impl Into<String>) -> CaseError {
        CaseError::skip(message)
    }

    /// Skip when `condition` holds
    ///
    /// # Errors
    ///
    /// Returns the skip signal if `condition` is true.
    #[track_caller]
    pub fn skip_if(&self, condition: bool, message: impl Into<String>) -> CaseResult {
        if condition {
            Err(CaseError::skip(message))
        } else {
            Ok(())
        }
    }

    /// Record a failure unless `condition` holds. Returns `condition`.
    #[track_caller]
    pub fn expect(&self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            let message: String = message.into();
            self.rec.expectation_failed(message);
        }
        condition
    }

    /// Record a failure if `result` is an error
    #[track_caller]
    pub fn expect_ok<T, E: fmt::Display>(&self, result: Result<T, E>, message: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.rec.expectation_failed(format!("{message}: {e}"));
                None
            }
        }
    }

    /// Record a failure if `result` is *not* an error. Returns whether it errored.
    #[track_caller]
    pub fn should_error<T, E>(&self, result: Result<T, E>, message: &str) -> bool {
        let errored = result.is_err();
        if !errored {
            self.rec
                .expectation_failed(format!("{message}: expected an error, got Ok"));
        }
        errored
    }

    /// Defer a check until `finalize`. The future logs its own outcome.
    pub fn eventual_async_expectation<Fut>(&mut self, check: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        exclusive(&mut self.eventual_expectations).push(check.boxed());
    }

    /// Expect `fut` to resolve to `Err`; checked at `finalize`
    #[track_caller]
    pub fn should_reject<Fut, T, E>(&mut self, fut: Fut, message: &str)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let rec = self.rec.clone();
        let failure = format!("{message}: expected rejection, but it resolved")
            .into_test_error(Location::caller());
        self.eventual_async_expectation(async move {
            if fut.await.is_ok() {
                rec.expectation_failed(failure);
            }
        });
    }

    /// Expect `fut` to resolve to `Ok`; checked at `finalize`
    #[track_caller]
    pub fn should_resolve<Fut, T, E>(&mut self, fut: Fut, message: &str)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let rec = self.rec.clone();
        let location = Location::caller();
        let message = message.to_string();
        self.eventual_async_expectation(async move {
            if let Err(e) = fut.await {
                rec.expectation_failed(format!("{message}: rejected: {e}").into_test_error(location));
            }
        });
    }

    /// Run `cleanup` at `finalize`, most recently tracked first
    pub fn track_for_cleanup<C>(&mut self, cleanup: C)
    where
        C: FnOnce() -> CaseResult + Send + 'static,
    {
        exclusive(&mut self.cleanups).push(Box::new(cleanup));
    }

    /// Await deferred expectations, then run cleanups.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup failure, after every cleanup has run.
    pub async fn finalize(&mut self) -> CaseResult {
        let checks = std::mem::take(exclusive(&mut self.eventual_expectations));
        for check in checks {
            check.await;
        }
        let mut first_failure = None;
        while let Some(cleanup) = exclusive(&mut self.cleanups).pop() {
            if let Err(e) = cleanup() {
                first_failure.get_or_insert(e);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

fn exclusive<T>(slot: &mut Mutex<T>) -> &mut T {
    slot.get_mut().unwrap_or_else(PoisonError::into_inner)
}

fn pending<T>(slot: &Mutex<Vec<T>>) -> usize {
    slot.lock().map_or(0, |items| items.len())
}

#[async_trait]
impl Fixture for BaseFixture {
    fn new(rec: TestCaseRecorder, params: Params) -> CaseResult<Self> {
        Ok(Self::new(rec, params))
    }

    async fn finalize(&mut self) -> CaseResult {
        Self::finalize(self).await
    }
}
