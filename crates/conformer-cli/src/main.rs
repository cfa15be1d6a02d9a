//! Conformer CLI: list and run conformance test cases by query
//!
//! ## Usage
//!
//! ```bash
//! conformer list 'unittests:*'                      # Print matching cases
//! conformer run 'unittests:logging:*'               # Run them
//! conformer run 'demo:*' -e expectations.json       # Apply expectations
//! echo '{"query":"demo:outcomes:warns:"}' | conformer worker
//! ```

use clap::Parser;
use conformer_cli::{
    load_expectations, run_succeeded, Cli, CliConfig, CliError, CliResult, Commands, RunArgs,
    TestRunner, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every selected case passed
fn run() -> CliResult<bool> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    init_tracing(config.verbosity, cli.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::List(args) => {
            let runner = TestRunner::new(config);
            for case in runner.list(&args.query)? {
                println!("{case}");
            }
            Ok(true)
        }
        Commands::Run(args) => {
            let config = apply_run_args(config, &args);
            let expectations = match &args.expectations {
                Some(path) => load_expectations(path)?,
                None => Vec::new(),
            };
            let mut runner = TestRunner::new(config);
            let results = runtime.block_on(runner.run(&args.query, &expectations))?;
            Ok(run_succeeded(&results))
        }
        Commands::Worker => {
            let runner = TestRunner::new(config);
            let stdin = std::io::stdin().lock();
            let stdout = std::io::stdout().lock();
            runtime.block_on(runner.worker(stdin, stdout))?;
            Ok(true)
        }
    }
}

/// Config file first, then global flags on top
fn build_config(cli: &Cli) -> CliResult<CliConfig> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::from_yaml_file(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => CliConfig::new(),
    };
    if cli.quiet || cli.verbose > 0 {
        config = config.with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet));
    }
    if let Some(color) = cli.color {
        config = config.with_color(color.into());
    }
    Ok(config)
}

fn apply_run_args(mut config: CliConfig, args: &RunArgs) -> CliConfig {
    if args.debug {
        config = config.with_debug(true);
    }
    if args.fail_fast {
        config = config.with_fail_fast(true);
    }
    if let Some(format) = args.format {
        config = config.with_format(format.into());
    }
    config
}

/// Diagnostics go to stderr; `RUST_LOG` wins over the verbosity flags
fn init_tracing(verbosity: Verbosity, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
