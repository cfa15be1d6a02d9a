//! Conformer CLI Library
//!
//! Command-line interface for listing, running and serving conformance test
//! cases by query against the suites compiled into the binary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;
pub mod suites;

pub use commands::{Cli, ColorArg, Commands, FormatArg, ListArgs, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{load_expectations, run_succeeded, TestRunner};
