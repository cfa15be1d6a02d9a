//! Test runner implementation

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::{OutputFormat, ProgressReporter};
use crate::suites::load_suite;
use conformer::{
    parse_query, run_worker_request, Logger, SuiteResults, TestHarness, TestQuery,
    TestQueryWithExpectation, WorkerRequest, WorkerResponse,
};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Read a JSON expectations file: an array of `{query, expectation}`
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_expectations(path: &Path) -> CliResult<Vec<TestQueryWithExpectation>> {
    let text = std::fs::read_to_string(path)?;
    let entries: Vec<TestQueryWithExpectation> = serde_json::from_str(&text)?;
    debug!(path = %path.display(), count = entries.len(), "loaded expectations");
    Ok(entries)
}

/// Runs queries against the embedded suites
#[derive(Debug)]
pub struct TestRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl TestRunner {
    /// Create a new test runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
                .with_verbose(config.verbosity.is_verbose());
        Self { config, reporter }
    }

    /// Every case `query` selects, as single-case query strings
    ///
    /// # Errors
    ///
    /// Returns error if the query is invalid or names an unknown suite
    pub fn list(&self, query: &str) -> CliResult<Vec<String>> {
        let query = parse_query(query)?;
        let suite = load_suite(query.suite())?;
        suite
            .load_cases(&query)
            .map(|loaded| -> CliResult<String> { Ok(loaded?.query.to_string()) })
            .collect()
    }

    /// Run every case `query` selects
    ///
    /// In JSON format the logger document goes to stdout; the human-readable
    /// report always goes to stderr.
    ///
    /// # Errors
    ///
    /// Returns error if the query is invalid, the suite is unknown, or a case
    /// cannot be loaded
    pub async fn run(
        &mut self,
        query: &str,
        expectations: &[TestQueryWithExpectation],
    ) -> CliResult<SuiteResults> {
        let query: TestQuery = parse_query(query)?;
        let suite = load_suite(query.suite())?;
        let harness = if self.config.fail_fast {
            TestHarness::new().with_fail_fast()
        } else {
            TestHarness::new()
        };
        let mut logger = Logger::new(self.config.keeps_debug_logs());
        info!(query = %query, expectations = expectations.len(), "run started");

        self.reporter.header(&format!("Running {query}"));
        self.reporter.start_progress(&query.to_string());
        let results = harness.run(&suite, &query, expectations, &mut logger).await;
        self.reporter.finish();
        let results = results?;

        for (name, result) in logger.results() {
            self.reporter.case_result(&name, &result);
        }
        self.reporter.summary(&results);

        if self.config.format == OutputFormat::Json {
            let json = logger.as_json(true)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
        Ok(results)
    }

    /// Answer one [`WorkerRequest`] read from `input` with a [`WorkerResponse`] on `output`
    ///
    /// # Errors
    ///
    /// Returns error if the request is malformed or does not name exactly one case
    pub async fn worker(
        &self,
        mut input: impl Read,
        mut output: impl Write,
    ) -> CliResult<WorkerResponse> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let request: WorkerRequest = serde_json::from_str(&text)?;
        let query = parse_query(&request.query)?;
        let suite = load_suite(query.suite())?;

        let response = run_worker_request(&suite, &request).await?;
        writeln!(output, "{}", serde_json::to_string(&response)?)?;
        Ok(response)
    }
}

/// Whether a finished run should exit successfully
#[must_use]
pub fn run_succeeded(results: &SuiteResults) -> bool {
    results.failed_count() == 0
}
