//! Single-case requests for running cases in a separate worker.
//!
//! A worker receives a [`WorkerRequest`] naming exactly one case, runs it with
//! a fresh logger and answers with the finished [`LiveTestCaseResult`]. The
//! requester injects that result into its own recorder.

use crate::harness::{LoadedCase, TestSuite};
use crate::logging::{LiveTestCaseResult, Logger, TestQueryWithExpectation};
use crate::query::parse_query;
use crate::result::{ConformError, ConformResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Run one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Query naming exactly one case
    pub query: String,
    /// Expectations applied to the case and its subcases
    #[serde(default)]
    pub expectations: Vec<TestQueryWithExpectation>,
    /// Keep debug log entries
    #[serde(default)]
    pub debug: bool,
}

/// The finished result of a [`WorkerRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// The requested query, as sent
    pub query: String,
    /// The case's result
    pub result: LiveTestCaseResult,
}

/// Resolve the request's query to its one case and run it.
///
/// # Errors
///
/// Fails if the query does not parse or does not select exactly one case.
pub async fn run_worker_request(
    suite: &TestSuite,
    request: &WorkerRequest,
) -> ConformResult<WorkerResponse> {
    let query = parse_query(&request.query)?;
    let mut cases = suite
        .load_cases(&query)
        .collect::<ConformResult<Vec<LoadedCase>>>()?;
    if cases.len() != 1 {
        return Err(ConformError::CaseCountMismatch {
            query: request.query.clone(),
            count: cases.len(),
        });
    }
    let LoadedCase { query: case_query, case } = cases.remove(0);

    debug!(query = %case_query, "worker running case");
    let mut logger = Logger::new(request.debug);
    let (rec, handle) = logger.record(case_query.to_string());
    case.run(&rec, &case_query, &request.expectations).await?;

    Ok(WorkerResponse {
        query: request.query.clone(),
        result: handle.snapshot(),
    })
}
