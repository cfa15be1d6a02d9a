//! Test groups: registration, validation and per-case execution.
//!
//! ```ignore
//! let mut g = make_test_group::<BaseFixture>();
//! g.test("copy,aligned")?
//!     .desc("copies at aligned offsets")
//!     .params(|u| u.combine("offset", [0, 4, 8]).begin_subcases().combine("size", [4, 16]))?
//!     .body_sync(|t| {
//!         let offset = t.params().get_i64("offset").unwrap_or(0);
//!         t.expect(offset % 4 == 0, "aligned");
//!         Ok(())
//!     })?;
//! ```
//!
//! Registration errors (bad names, duplicates, double parameterization) are
//! returned immediately. `validate()` expands every case and subcase to check
//! stringification and fingerprint uniqueness. At run time each case gets a
//! fresh fixture and an exclusive recorder; nothing a case does escapes it.

use crate::fixture::Fixture;
use crate::logging::{
    ExpectedOutcome, Expectation, TestCaseRecorder, TestQueryWithExpectation,
};
use crate::params::{
    extract_public_params, merge_params, unit_params, CaseParamsBuilder, ParamsPipeline, Params,
    SubcaseParamsBuilder, Subcases,
};
use crate::query::separators::PATH_SEPARATOR;
use crate::query::stringify::{
    is_valid_query_part, stringify_public_params, stringify_public_params_uniquely,
    VALID_QUERY_PART,
};
use crate::query::{compare_queries, Ordering, TestQuery, TestQuerySingleCase};
use crate::result::{
    render_stack, CaseError, CaseResult, ConformError, ConformResult, SkipTestCase, TestError,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A test body: borrows the fixture for the duration of the returned future
pub type TestFn<F> =
    Arc<dyn for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync>;

/// Create an empty test group whose cases use fixture `F`
#[must_use]
pub fn make_test_group<F: Fixture>() -> TestGroup<F> {
    TestGroup::new()
}

/// An ordered collection of uniquely named tests sharing one fixture type
pub struct TestGroup<F> {
    seen: HashSet<String>,
    tests: Vec<TestBuilder<F>>,
}

impl<F> fmt::Debug for TestGroup<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestGroup")
            .field("tests", &self.tests)
            .finish()
    }
}

impl<F: Fixture> Default for TestGroup<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Fixture> TestGroup<F> {
    /// Create an empty group
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            tests: Vec::new(),
        }
    }

    /// Register a test; `name` is a `,`-separated test path.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name or a path part outside `[a-zA-Z0-9_]`.
    #[track_caller]
    pub fn test(&mut self, name: &str) -> ConformResult<&mut TestBuilder<F>> {
        let created_at = Location::caller();
        if name.contains('%') {
            return Err(ConformError::InvalidTestName {
                name: name.to_string(),
                reason: "not idempotent under URI decoding".to_string(),
            });
        }
        if !self.seen.insert(name.to_string()) {
            return Err(ConformError::DuplicateTestName {
                name: name.to_string(),
            });
        }
        let parts: Vec<String> = name.split(PATH_SEPARATOR).map(str::to_string).collect();
        if let Some(bad) = parts.iter().find(|p| !is_valid_query_part(p)) {
            return Err(ConformError::InvalidTestName {
                name: name.to_string(),
                reason: format!("invalid test name part {bad:?}; must match {VALID_QUERY_PART}"),
            });
        }
        let creation_stack = render_stack(&format!("Test created: {name}"), created_at);
        self.tests.push(TestBuilder {
            test_path: parts,
            description: None,
            cases: None,
            test_fn: None,
            created_at,
            creation_stack: creation_stack.into(),
        });
        let index = self.tests.len() - 1;
        Ok(&mut self.tests[index])
    }

    /// Registered tests in registration order
    pub fn iterate(&self) -> std::slice::Iter<'_, TestBuilder<F>> {
        self.tests.iter()
    }

    /// Validate every test; the first error wins
    pub fn validate(&self) -> ConformResult<()> {
        self.tests.iter().try_for_each(TestBuilder::validate)
    }
}

/// One registered test: its path, description, parameterization and body
pub struct TestBuilder<F> {
    test_path: Vec<String>,
    description: Option<String>,
    cases: Option<ParamsPipeline>,
    test_fn: Option<TestFn<F>>,
    created_at: &'static Location<'static>,
    creation_stack: Arc<str>,
}

impl<F> fmt::Debug for TestBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBuilder")
            .field("test_path", &self.test_path)
            .field("description", &self.description)
            .field("cases", &self.cases)
            .field("has_fn", &self.test_fn.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl<F: Fixture> TestBuilder<F> {
    fn path_string(&self) -> String {
        self.test_path.join(&PATH_SEPARATOR.to_string())
    }

    /// Test path parts
    #[must_use]
    pub fn test_path(&self) -> &[String] {
        &self.test_path
    }

    /// Description, if any
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Where `test()` was called, as a renderable stack
    #[must_use]
    pub fn test_creation_stack(&self) -> &str {
        &self.creation_stack
    }

    /// Set the description (trimmed)
    pub fn desc(&mut self, description: &str) -> &mut Self {
        self.description = Some(description.trim().to_string());
        self
    }

    /// Parameterize with a builder closure over the unit builder
    ///
    /// # Errors
    ///
    /// Fails if already parameterized or the builder is structurally defective.
    pub fn params<B, P>(&mut self, build: B) -> ConformResult<&mut Self>
    where
        B: FnOnce(CaseParamsBuilder) -> P,
        P: Into<ParamsPipeline>,
    {
        self.params_pipeline(build(unit_params()))
    }

    /// Parameterize with an already-built pipeline
    ///
    /// # Errors
    ///
    /// Fails if already parameterized or the pipeline is structurally defective.
    pub fn params_pipeline(&mut self, pipeline: impl Into<ParamsPipeline>) -> ConformResult<&mut Self> {
        if self.cases.is_some() {
            return Err(ConformError::AlreadyParameterized {
                test: self.path_string(),
            });
        }
        let pipeline = pipeline.into();
        pipeline.check()?;
        self.cases = Some(pipeline);
        Ok(self)
    }

    /// One case per listed params object
    ///
    /// # Errors
    ///
    /// Fails if already parameterized or the list holds duplicates.
    pub fn params_simple(&mut self, cases: impl IntoIterator<Item = Params>) -> ConformResult<&mut Self> {
        self.params_pipeline(unit_params().combine_with_params(cases))
    }

    /// A single `{}` case whose subcases come from `build`
    ///
    /// # Errors
    ///
    /// Fails if already parameterized or the builder is structurally defective.
    pub fn params_subcases_only<B>(&mut self, build: B) -> ConformResult<&mut Self>
    where
        B: FnOnce(SubcaseParamsBuilder) -> SubcaseParamsBuilder,
    {
        self.params_pipeline(build(unit_params().begin_subcases()))
    }

    /// A single `{}` case with one subcase per listed params object
    ///
    /// # Errors
    ///
    /// Fails if already parameterized or the list holds duplicates.
    pub fn params_subcases_simple(
        &mut self,
        subcases: impl IntoIterator<Item = Params>,
    ) -> ConformResult<&mut Self> {
        self.params_pipeline(unit_params().begin_subcases().combine_with_params(subcases))
    }

    fn set_fn(&mut self, test_fn: TestFn<F>) -> ConformResult<&mut Self> {
        if self.test_fn.is_some() {
            return Err(ConformError::TestFnAlreadySet {
                test: self.path_string(),
            });
        }
        self.test_fn = Some(test_fn);
        Ok(self)
    }

    /// Attach an async body
    ///
    /// # Errors
    ///
    /// Fails if a body is already attached.
    pub fn body<B>(&mut self, body: B) -> ConformResult<&mut Self>
    where
        B: for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        self.set_fn(Arc::new(body))
    }

    /// Attach a synchronous body
    ///
    /// # Errors
    ///
    /// Fails if a body is already attached.
    pub fn body_sync<B>(&mut self, body: B) -> ConformResult<&mut Self>
    where
        B: Fn(&mut F) -> CaseResult + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        self.set_fn(Arc::new(move |t: &mut F| {
            let body = Arc::clone(&body);
            async move { body(t) }.boxed()
        }))
    }

    /// Mark the test as not written yet: it always skips
    ///
    /// # Errors
    ///
    /// Fails if a body is already attached.
    pub fn unimplemented(&mut self) -> ConformResult<&mut Self> {
        let note = "TODO: .unimplemented()";
        self.description = Some(match self.description.take() {
            Some(d) if !d.is_empty() => format!("{d}\n\n{note}"),
            _ => note.to_string(),
        });
        self.body_sync(|_| Err(CaseError::skip("test unimplemented")))
    }

    /// Check the body exists and every expanded case stringifies uniquely
    pub fn validate(&self) -> ConformResult<()> {
        if self.test_fn.is_none() {
            return Err(ConformError::MissingTestFn {
                test: self.path_string(),
                created_at: self.created_at.to_string(),
            });
        }
        let Some(pipeline) = &self.cases else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        let mut check = |params: Params| -> ConformResult<()> {
            let display = stringify_public_params(&params)?;
            let unique = stringify_public_params_uniquely(&params)?;
            if !seen.insert(unique) {
                return Err(ConformError::DuplicateCaseParams {
                    test: self.path_string(),
                    params: display,
                });
            }
            Ok(())
        };
        for entry in pipeline.iterate_cases_with_subcases() {
            let (case, subcases) = entry?;
            match subcases {
                Some(subcases) => {
                    for sub in &subcases {
                        check(merge_params(&case, &sub?)?)?;
                    }
                }
                None => check(case)?,
            }
        }
        Ok(())
    }

    /// One runnable per case, lazily
    ///
    /// # Errors
    ///
    /// Fails if no body is attached.
    pub fn iterate(
        &self,
    ) -> ConformResult<impl Iterator<Item = ConformResult<RunCaseSpecific<F>>> + Send + '_> {
        let test_fn = self.test_fn.clone().ok_or_else(|| ConformError::MissingTestFn {
            test: self.path_string(),
            created_at: self.created_at.to_string(),
        })?;
        let cases = self
            .cases
            .as_ref()
            .map_or_else(|| ParamsPipeline::from(unit_params()), Clone::clone);
        Ok(cases.iterate_cases_with_subcases().map(move |entry| {
            let (params, subcases) = entry?;
            Ok(RunCaseSpecific {
                id: CaseId {
                    test: self.test_path.clone(),
                    params: extract_public_params(&params),
                },
                params,
                subcases,
                test_fn: Arc::clone(&test_fn),
                creation_stack: Arc::clone(&self.creation_stack),
            })
        }))
    }
}

/// Identity of a case within its file: test path plus public params
#[derive(Debug, Clone, PartialEq)]
pub struct CaseId {
    /// Test path parts
    pub test: Vec<String>,
    /// Public params of the case
    pub params: Params,
}

/// The worst expectation covering `query`: skip beats fail beats pass
#[must_use]
pub fn expected_status(query: &TestQuery, expectations: &[TestQueryWithExpectation]) -> Expectation {
    let mut saw_fail = false;
    for exp in expectations {
        if matches!(
            compare_queries(&exp.query, query),
            Ordering::Unordered | Ordering::StrictSubset
        ) {
            continue;
        }
        match exp.expectation {
            ExpectedOutcome::Skip => return Expectation::Skip,
            ExpectedOutcome::Fail => saw_fail = true,
        }
    }
    if saw_fail {
        Expectation::Fail
    } else {
        Expectation::Pass
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn panicked(payload: &(dyn Any + Send)) -> CaseError {
    CaseError::Failure(TestError::without_stack(format!(
        "panicked: {}",
        panic_message(payload)
    )))
}

/// Pin closure inference to `FnOnce`, so the body may return a future
/// borrowing the fixture it was handed
fn once<R>(f: impl FnOnce() -> R) -> impl FnOnce() -> R {
    f
}

/// Await a lifecycle phase, turning a panic into a failure
async fn guarded<Fut>(phase: Fut) -> CaseResult
where
    Fut: Future<Output = CaseResult>,
{
    AssertUnwindSafe(phase)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
}

/// A case ready to run: params, lazily evaluated subcases, body and fixture type
pub struct RunCaseSpecific<F> {
    id: CaseId,
    params: Params,
    subcases: Option<Subcases>,
    test_fn: TestFn<F>,
    creation_stack: Arc<str>,
}

impl<F> fmt::Debug for RunCaseSpecific<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCaseSpecific")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("subcases", &self.subcases)
            .finish_non_exhaustive()
    }
}

impl<F: Fixture> RunCaseSpecific<F> {
    /// Test path and public params
    #[must_use]
    pub const fn id(&self) -> &CaseId {
        &self.id
    }

    /// Full case params, private keys included
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Whether the case runs a subcase loop
    #[must_use]
    pub const fn has_subcases(&self) -> bool {
        self.subcases.is_some()
    }

    /// Construct, init, body, finalize. Returns the first failure; a second
    /// failure from `finalize` is recorded directly.
    async fn run_lifecycle(
        &self,
        rec: &TestCaseRecorder,
        params: Params,
        expected: Expectation,
    ) -> CaseResult {
        if expected == Expectation::Skip {
            return Err(CaseError::skip("Skipped by expectations"));
        }

        let mut inst = std::panic::catch_unwind(AssertUnwindSafe(|| F::new(rec.clone(), params)))
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))?;

        let mut outcome = guarded(inst.init()).await;
        if outcome.is_ok() {
            let inst_ref = &mut inst;
            let body = std::panic::catch_unwind(AssertUnwindSafe(once(move || {
                (self.test_fn)(inst_ref)
            })));
            outcome = match body {
                Ok(fut) => guarded(fut).await,
                Err(payload) => Err(panicked(payload.as_ref())),
            };
        }

        // Runs whenever construction succeeded
        let finalized = guarded(inst.finalize()).await;
        match (outcome, finalized) {
            (Ok(()), result) => result,
            (Err(first), Ok(())) => Err(first),
            (Err(first), Err(second)) => {
                rec.threw(first);
                Err(second)
            }
        }
    }

    /// Run one (sub)case inside a recorder subcase.
    ///
    /// With `throw_skip`, a skip signal is handed back instead of recorded.
    async fn run_test(
        &self,
        rec: &TestCaseRecorder,
        params: Params,
        throw_skip: bool,
        expected: Expectation,
    ) -> Result<(), SkipTestCase> {
        rec.begin_sub_case();
        let propagated = match self.run_lifecycle(rec, params, expected).await {
            Ok(()) => None,
            Err(CaseError::Skip(skip)) if throw_skip => Some(skip),
            Err(error) => {
                rec.threw(error);
                None
            }
        };
        if let Err(unexpected) = rec.end_sub_case(expected) {
            rec.warn(TestError::without_stack(unexpected.to_string()).with_stack(&*self.creation_stack));
        }
        propagated.map_or(Ok(()), Err)
    }

    async fn run_subcases(
        &self,
        rec: &TestCaseRecorder,
        self_query: &TestQuerySingleCase,
        expectations: &[TestQueryWithExpectation],
        subcases: &Subcases,
    ) {
        let mut total = 0usize;
        let mut skipped = 0usize;
        for sub in subcases {
            total += 1;
            let prepared = sub.and_then(|sub| {
                rec.info(format!("subcase: {}", stringify_public_params(&sub)?));
                let params = merge_params(&self.params, &sub)?;
                let query = self_query.with_params(params.clone())?;
                Ok((params, query))
            });
            let (params, query) = match prepared {
                Ok(prepared) => prepared,
                Err(error) => {
                    rec.threw(CaseError::from(error));
                    continue;
                }
            };
            trace!(query = %query, "running subcase");
            let expected = expected_status(query.as_query(), expectations);
            if let Err(skip) = self.run_test(rec, params, true, expected).await {
                rec.info(skip.prefixed("subcase skipped: ").into_error());
                skipped += 1;
            }
        }
        if skipped == total {
            rec.skipped(SkipTestCase::new("all subcases were skipped"));
        }
    }

    /// Run the case against `rec`, which must be fresh.
    ///
    /// # Errors
    ///
    /// Only recorder misuse (reuse) propagates; everything the case does is
    /// recorded instead.
    pub async fn run(
        &self,
        rec: &TestCaseRecorder,
        self_query: &TestQuerySingleCase,
        expectations: &[TestQueryWithExpectation],
    ) -> ConformResult<()> {
        rec.start()?;
        debug!(query = %self_query, "running case");
        match &self.subcases {
            Some(subcases) => {
                self.run_subcases(rec, self_query, expectations, subcases).await;
            }
            None => {
                let expected = expected_status(self_query.as_query(), expectations);
                if let Err(skip) = self.run_test(rec, self.params.clone(), false, expected).await {
                    rec.skipped(skip);
                }
            }
        }
        rec.finish()?;
        let severity = rec.case_severity();
        if severity.status() == crate::logging::Status::Fail {
            warn!(query = %self_query, ?severity, "case failed");
        } else {
            debug!(query = %self_query, ?severity, "case finished");
        }
        Ok(())
    }
}

/// A case with its fixture type erased
#[async_trait]
pub trait RunCase: Send + Sync + fmt::Debug {
    /// Test path and public params
    fn id(&self) -> &CaseId;

    /// Full case params
    fn params(&self) -> &Params;

    /// Run against a fresh recorder
    async fn run(
        &self,
        rec: &TestCaseRecorder,
        self_query: &TestQuerySingleCase,
        expectations: &[TestQueryWithExpectation],
    ) -> ConformResult<()>;
}

#[async_trait]
impl<F: Fixture> RunCase for RunCaseSpecific<F> {
    fn id(&self) -> &CaseId {
        Self::id(self)
    }

    fn params(&self) -> &Params {
        Self::params(self)
    }

    async fn run(
        &self,
        rec: &TestCaseRecorder,
        self_query: &TestQuerySingleCase,
        expectations: &[TestQueryWithExpectation],
    ) -> ConformResult<()> {
        Self::run(self, rec, self_query, expectations).await
    }
}

/// Lazy stream of type-erased cases
pub type CaseStream<'a> = Box<dyn Iterator<Item = ConformResult<Box<dyn RunCase>>> + Send + 'a>;

/// A test with its fixture type erased
pub trait IterableTest: Send + Sync + fmt::Debug {
    /// Test path parts
    fn test_path(&self) -> &[String];

    /// Description, if any
    fn description(&self) -> Option<&str>;

    /// Registration site
    fn test_creation_stack(&self) -> &str;

    /// Cases in pipeline order
    fn iterate_cases(&self) -> ConformResult<CaseStream<'_>>;
}

impl<F: Fixture> IterableTest for TestBuilder<F> {
    fn test_path(&self) -> &[String] {
        Self::test_path(self)
    }

    fn description(&self) -> Option<&str> {
        Self::description(self)
    }

    fn test_creation_stack(&self) -> &str {
        Self::test_creation_stack(self)
    }

    fn iterate_cases(&self) -> ConformResult<CaseStream<'_>> {
        let cases = self.iterate()?;
        Ok(Box::new(cases.map(|case| case.map(|c| Box::new(c) as Box<dyn RunCase>))))
    }
}

/// A group with its fixture type erased
pub trait IterableTestGroup: Send + Sync + fmt::Debug {
    /// Tests in registration order
    fn iterate_tests(&self) -> Box<dyn Iterator<Item = &dyn IterableTest> + Send + '_>;

    /// Validate every test
    fn validate(&self) -> ConformResult<()>;
}

impl<F: Fixture> IterableTestGroup for TestGroup<F> {
    fn iterate_tests(&self) -> Box<dyn Iterator<Item = &dyn IterableTest> + Send + '_> {
        Box::new(self.tests.iter().map(|t| t as &dyn IterableTest))
    }

    fn validate(&self) -> ConformResult<()> {
        Self::validate(self)
    }
}
