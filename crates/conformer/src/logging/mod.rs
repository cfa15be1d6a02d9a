//! Case recording: severities, log entries, results and the logger that owns them.

mod log_message;
mod logger;
mod recorder;
mod result;
mod severity;

pub use log_message::LogMessageWithStack;
pub use logger::Logger;
pub use recorder::{TestCaseRecorder, MAX_LOG_STACKS};
pub use result::{
    ExpectedOutcome, Expectation, LiveTestCaseResult, ResultHandle, Status,
    TestQueryWithExpectation,
};
pub use severity::LogSeverity;
