//! Suite loading and query-driven execution.

use crate::group::{IterableTest, IterableTestGroup, RunCase};
use crate::logging::{Logger, Status, TestQueryWithExpectation};
use crate::params::Params;
use crate::query::separators::PATH_SEPARATOR;
use crate::query::stringify::is_valid_query_part;
use crate::query::{compare_queries, Ordering, TestQuery, TestQuerySingleCase};
use crate::result::{ConformError, ConformResult};
use std::iter;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct SuiteFile {
    path: Vec<String>,
    query: TestQuery,
    group: Box<dyn IterableTestGroup>,
}

/// A named suite of files, each holding one test group
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    files: Vec<SuiteFile>,
}

/// A case selected by a query, with the query naming it
#[derive(Debug)]
pub struct LoadedCase {
    /// Single-case query for this case
    pub query: TestQuerySingleCase,
    /// The runnable case
    pub case: Box<dyn RunCase>,
}

/// Lazy stream of loaded cases
pub type LoadedCases<'a> = Box<dyn Iterator<Item = ConformResult<LoadedCase>> + Send + 'a>;

fn overlaps(query: &TestQuery, scope: &TestQuery) -> bool {
    compare_queries(query, scope) != Ordering::Unordered
}

impl TestSuite {
    /// Create an empty suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a file; `path` is `,`-separated
    ///
    /// # Errors
    ///
    /// Fails if a path part is not a valid query part.
    pub fn add_file(
        &mut self,
        path: &str,
        group: impl IterableTestGroup + 'static,
    ) -> ConformResult<&mut Self> {
        let parts: Vec<String> = path.split(PATH_SEPARATOR).map(str::to_string).collect();
        if parts.iter().any(|p| !is_valid_query_part(p)) {
            return Err(ConformError::invalid_query(path, "invalid file path"));
        }
        let query = TestQuery::multi_test(self.name.clone(), parts.clone(), Vec::new())?;
        self.files.push(SuiteFile {
            path: parts,
            query,
            group: Box::new(group),
        });
        Ok(self)
    }

    /// Get the number of files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Validate every group in the suite
    pub fn validate(&self) -> ConformResult<()> {
        self.files.iter().try_for_each(|file| file.group.validate())
    }

    /// Every case `query` contains, in registration order
    #[must_use]
    pub fn load_cases<'a>(&'a self, query: &'a TestQuery) -> LoadedCases<'a> {
        if query.suite() != self.name {
            return Box::new(iter::empty());
        }
        let tests = self
            .files
            .iter()
            .filter(move |file| overlaps(query, &file.query))
            .flat_map(|file| file.group.iterate_tests().map(move |test| (file, test)))
            .filter(move |(file, test)| {
                TestQuery::multi_case(
                    self.name.clone(),
                    file.path.clone(),
                    test.test_path().to_vec(),
                    Params::new(),
                )
                .is_ok_and(|scope| overlaps(query, &scope))
            });
        Box::new(tests.flat_map(move |(file, test)| self.cases_of(query, file, test)))
    }

    fn cases_of<'a>(
        &'a self,
        query: &'a TestQuery,
        file: &'a SuiteFile,
        test: &'a dyn IterableTest,
    ) -> LoadedCases<'a> {
        let cases = match test.iterate_cases() {
            Ok(cases) => cases,
            Err(e) => return Box::new(iter::once(Err(e))),
        };
        Box::new(cases.filter_map(move |case| {
            let loaded = case.and_then(|case| {
                let case_query = TestQuerySingleCase::new(
                    self.name.clone(),
                    file.path.clone(),
                    test.test_path().to_vec(),
                    case.params().clone(),
                )?;
                Ok(LoadedCase {
                    query: case_query,
                    case,
                })
            });
            match loaded {
                Ok(loaded) => matches!(
                    compare_queries(query, loaded.query.as_query()),
                    Ordering::Equal | Ordering::StrictSuperset
                )
                .then_some(Ok(loaded)),
                Err(e) => Some(Err(e)),
            }
        }))
    }
}

/// Result of running a single case
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Case query
    pub query: String,
    /// Final status
    pub status: Status,
    /// Wall time in milliseconds
    pub timems: f64,
}

impl TestResult {
    /// Anything but `fail` counts as passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status != Status::Fail
    }
}

/// Results from running a query against a suite
#[derive(Debug, Clone)]
pub struct SuiteResults {
    /// Suite name
    pub suite_name: String,
    /// Individual case results
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
    /// Whether fail-fast cut the run short
    pub stopped_early: bool,
}

impl SuiteResults {
    /// Check if no case failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(TestResult::passed)
    }

    /// Count cases with `status`
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Count passed cases
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(Status::Pass)
    }

    /// Count failed cases
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(Status::Fail)
    }

    /// Count skipped cases
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(Status::Skip)
    }

    /// Count cases that passed with warnings
    #[must_use]
    pub fn warned_count(&self) -> usize {
        self.count(Status::Warn)
    }

    /// Get total case count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed cases
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed()).collect()
    }
}

/// Runs the cases a query selects, one at a time
#[derive(Debug, Default)]
pub struct TestHarness {
    /// Whether to stop on first failure
    pub fail_fast: bool,
}

impl TestHarness {
    /// Create a new test harness
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Run every case `query` selects, recording into `logger`.
    ///
    /// # Errors
    ///
    /// Fails on errors loading cases (e.g. shadowed case params). Failures
    /// inside a case are recorded, not returned.
    pub async fn run(
        &self,
        suite: &TestSuite,
        query: &TestQuery,
        expectations: &[TestQueryWithExpectation],
        logger: &mut Logger,
    ) -> ConformResult<SuiteResults> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut stopped_early = false;
        info!(suite = suite.name(), query = %query, "running query");

        for loaded in suite.load_cases(query) {
            let LoadedCase { query: case_query, case } = loaded?;
            let name = case_query.to_string();
            let (rec, handle) = logger.record(name.clone());
            case.run(&rec, &case_query, expectations).await?;

            let result = handle.snapshot();
            results.push(TestResult {
                query: name,
                status: result.status,
                timems: result.timems,
            });
            if self.fail_fast && result.status == Status::Fail {
                warn!(query = %case_query, "stopping at first failure");
                stopped_early = true;
                break;
            }
        }

        let results = SuiteResults {
            suite_name: suite.name().to_string(),
            results,
            duration: start.elapsed(),
            stopped_early,
        };
        debug!(
            total = results.total(),
            failed = results.failed_count(),
            "query finished"
        );
        Ok(results)
    }
}
