//! CLI command definitions using clap

use crate::config::ColorChoice;
use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Conformer: list and run parameterized conformance test cases by query
#[derive(Parser, Debug)]
#[command(name = "conformer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, global = true)]
    pub color: Option<ColorArg>,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// YAML configuration file; flags override it
    #[arg(long, global = true, env = "CONFORMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the cases a query selects
    List(ListArgs),

    /// Run the cases a query selects
    Run(RunArgs),

    /// Run one case from a JSON request on stdin
    Worker,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Query, e.g. `unittests:*` or `unittests:logging:*`
    pub query: String,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Query, e.g. `unittests:*` or `unittests:test_group:skip:*`
    pub query: String,

    /// JSON expectations file: `[{"query": ..., "expectation": "skip"|"fail"}]`
    #[arg(short, long)]
    pub expectations: Option<PathBuf>,

    /// Keep debug log entries in case results
    #[arg(long)]
    pub debug: bool,

    /// Stop at the first failing case
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format
    #[arg(short, long)]
    pub format: Option<FormatArg>,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Detect terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Output format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// Logger JSON document
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}
