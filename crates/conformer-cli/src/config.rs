//! CLI configuration
//!
//! Settings come from an optional YAML file (`--config`); flags given on the
//! command line override it.
//!
//! ```yaml
//! verbosity: Verbose
//! color: Never
//! debug: false
//! format: Json
//! fail_fast: true
//! ```

use crate::error::CliResult;
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// From `-v` count and `-q`
    #[must_use]
    pub const fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Default `tracing` filter directive for this level
    #[must_use]
    pub const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Keep debug log entries in case results
    pub debug: bool,
    /// Result output format
    pub format: OutputFormat,
    /// Stop at the first failing case
    pub fail_fast: bool,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML configuration
    pub fn from_yaml_str(yaml: &str) -> CliResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load YAML configuration from `path`
    pub fn from_yaml_file(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Whether case results keep `DEBUG` entries: `debug` or `-vv`
    #[must_use]
    pub const fn keeps_debug_logs(&self) -> bool {
        self.debug || self.verbosity.is_debug()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set debug logging in case results
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set output format
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set fail fast
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_default_verbosity() {
            assert_eq!(Verbosity::default(), Verbosity::Normal);
        }

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(3, false), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(2, true), Verbosity::Quiet);
        }

        #[test]
        fn test_predicates() {
            assert!(Verbosity::Quiet.is_quiet());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Debug.is_debug());
        }

        #[test]
        fn test_log_filter() {
            assert_eq!(Verbosity::Normal.log_filter(), "warn");
            assert_eq!(Verbosity::Debug.log_filter(), "debug");
        }
    }

    mod color_choice_tests {
        use super::*;

        #[test]
        fn test_default_color() {
            assert_eq!(ColorChoice::default(), ColorChoice::Auto);
        }

        #[test]
        fn test_should_color() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
            assert_eq!(
                ColorChoice::Auto.should_color(),
                console::Term::stderr().features().colors_supported()
            );
        }
    }

    mod cli_config_tests {
        use super::*;

        #[test]
        fn test_default_config() {
            let config = CliConfig::default();
            assert_eq!(config.verbosity, Verbosity::Normal);
            assert_eq!(config.color, ColorChoice::Auto);
            assert_eq!(config.format, OutputFormat::Text);
            assert!(!config.debug);
            assert!(!config.fail_fast);
        }

        #[test]
        fn test_chained_builders() {
            let config = CliConfig::new()
                .with_verbosity(Verbosity::Verbose)
                .with_color(ColorChoice::Always)
                .with_debug(true)
                .with_format(OutputFormat::Json)
                .with_fail_fast(true);
            assert_eq!(config.verbosity, Verbosity::Verbose);
            assert_eq!(config.color, ColorChoice::Always);
            assert!(config.debug);
            assert_eq!(config.format, OutputFormat::Json);
            assert!(config.fail_fast);
        }

        #[test]
        fn test_keeps_debug_logs() {
            assert!(!CliConfig::new().keeps_debug_logs());
            assert!(CliConfig::new().with_debug(true).keeps_debug_logs());
            let very_verbose = CliConfig::new().with_verbosity(Verbosity::from_flags(2, false));
            assert!(very_verbose.keeps_debug_logs());
            assert!(!CliConfig::new()
                .with_verbosity(Verbosity::Verbose)
                .keeps_debug_logs());
        }

        #[test]
        fn test_yaml_partial() {
            let config = CliConfig::from_yaml_str("fail_fast: true\nformat: Json\n").unwrap();
            assert!(config.fail_fast);
            assert_eq!(config.format, OutputFormat::Json);
            assert_eq!(config.verbosity, Verbosity::Normal);
        }

        #[test]
        fn test_yaml_invalid() {
            assert!(CliConfig::from_yaml_str("verbosity: Loud\n").is_err());
        }

        #[test]
        fn test_yaml_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("conformer.yaml");
            std::fs::write(&path, "debug: true\ncolor: Never\n").unwrap();
            let config = CliConfig::from_yaml_file(&path).unwrap();
            assert!(config.debug);
            assert_eq!(config.color, ColorChoice::Never);
        }

        #[test]
        fn test_missing_file() {
            assert!(CliConfig::from_yaml_file(Path::new("/nonexistent/conformer.yaml")).is_err());
        }
    }
}
