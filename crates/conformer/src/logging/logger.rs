use super::recorder::TestCaseRecorder;
use super::result::{LiveTestCaseResult, ResultHandle};
use crate::result::ConformResult;
use serde::Serialize;

/// Owns the results of every case run so far, keyed by query string
#[derive(Debug, Default)]
pub struct Logger {
    debug: bool,
    results: Vec<(String, ResultHandle)>,
}

#[derive(Serialize)]
struct LogDocument<'a> {
    version: &'a str,
    results: Vec<(&'a str, LiveTestCaseResult)>,
}

impl Logger {
    /// Create a logger; `debug` turns on debug entries in every recorder
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            results: Vec::new(),
        }
    }

    /// Whether recorders are created in debug mode
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug
    }

    /// Start a fresh result for `name` and hand out its recorder.
    ///
    /// Recording the same name again replaces the earlier result.
    pub fn record(&mut self, name: impl Into<String>) -> (TestCaseRecorder, ResultHandle) {
        let name = name.into();
        let handle = ResultHandle::default();
        match self.results.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = handle.clone(),
            None => self.results.push((name, handle.clone())),
        }
        (TestCaseRecorder::new(handle.clone(), self.debug), handle)
    }

    /// Snapshot of every result in recording order
    #[must_use]
    pub fn results(&self) -> Vec<(String, LiveTestCaseResult)> {
        self.results
            .iter()
            .map(|(name, handle)| (name.clone(), handle.snapshot()))
            .collect()
    }

    /// `{"version": ..., "results": [[name, result], ...]}`
    pub fn as_json(&self, pretty: bool) -> ConformResult<String> {
        let doc = LogDocument {
            version: env!("CARGO_PKG_VERSION"),
            results: self
                .results
                .iter()
                .map(|(name, handle)| (name.as_str(), handle.snapshot()))
                .collect(),
        };
        let json = if pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        Ok(json)
    }
}
