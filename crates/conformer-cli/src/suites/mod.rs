//! Suites compiled into the binary, addressed by the first part of a query.

pub mod demo;
pub mod unittests;

use crate::error::{CliError, CliResult};
use conformer::TestSuite;

/// Names of the embedded suites
pub const SUITE_NAMES: &[&str] = &["unittests", "demo"];

/// Build the embedded suite called `name`
pub fn load_suite(name: &str) -> CliResult<TestSuite> {
    match name {
        "unittests" => Ok(unittests::suite()?),
        "demo" => Ok(demo::suite()?),
        other => Err(CliError::UnknownSuite {
            name: other.to_string(),
        }),
    }
}
