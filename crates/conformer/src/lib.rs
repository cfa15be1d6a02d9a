//! Conformer: parameterized conformance-test authoring and execution
//!
//! Tests are registered in groups. Each test declares a lazy combinatorial
//! parameter pipeline split into a case axis and an optional subcase axis,
//! and every case runs against a fresh fixture with its own recorder.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      CONFORMER Architecture                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐             │
//! │   │ TestGroup  │    │ TestSuite  │    │ Harness /  │             │
//! │   │ + params   │───►│ + query    │───►│ worker     │──► Logger   │
//! │   │ pipelines  │    │ selection  │    │ (recorder) │    (JSON)   │
//! │   └────────────┘    └────────────┘    └────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use conformer::prelude::*;
//!
//! let mut g = make_test_group::<BaseFixture>();
//! g.test("add")?
//!     .params(|u| u.combine("a", [1, 2]).begin_subcases().combine("b", [3, 4]))?
//!     .body_sync(|t| {
//!         let a = t.params().get_i64("a").unwrap_or(0);
//!         t.expect(a > 0, "a is positive");
//!         Ok(())
//!     })?;
//!
//! let mut suite = TestSuite::new("demo");
//! suite.add_file("math", g)?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod fixture;
mod group;
mod harness;
pub mod logging;
pub mod params;
pub mod query;
mod result;
mod worker;

pub use fixture::{BaseFixture, Fixture};
pub use group::{
    expected_status, make_test_group, CaseId, CaseStream, IterableTest, IterableTestGroup,
    RunCase, RunCaseSpecific, TestBuilder, TestFn, TestGroup,
};
pub use harness::{LoadedCase, LoadedCases, SuiteResults, TestHarness, TestResult, TestSuite};
pub use logging::{
    ExpectedOutcome, Expectation, LiveTestCaseResult, LogMessageWithStack, LogSeverity, Logger,
    Status, TestCaseRecorder, TestQueryWithExpectation,
};
pub use params::{
    extract_public_params, merge_params, public_params_equals, unit_params, CaseParamsBuilder,
    ParamValue, Params, ParamsPipeline, SubcaseParamsBuilder,
};
pub use query::{parse_query, TestQuery, TestQuerySingleCase};
pub use result::{
    CaseError, CaseResult, ConformError, ConformResult, IntoTestError, SkipTestCase, TestError,
};
pub use worker::{run_worker_request, WorkerRequest, WorkerResponse};

/// Everything needed to author and run tests
pub mod prelude {
    pub use super::fixture::*;
    pub use super::group::*;
    pub use super::harness::*;
    pub use super::logging::{
        ExpectedOutcome, Expectation, LiveTestCaseResult, Logger, Status, TestCaseRecorder,
        TestQueryWithExpectation,
    };
    pub use super::params::{unit_params, ParamValue, Params, ParamsPipeline};
    pub use super::query::{parse_query, TestQuery, TestQuerySingleCase};
    pub use super::result::*;
    pub use super::worker::*;
    pub use crate::params;
    pub use async_trait::async_trait;
    pub use futures::FutureExt;
}
