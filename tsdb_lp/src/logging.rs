//! Log setup shared by every command.
use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum LogFormat {
    #[default]
    Full,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid log format '{s}'. Valid options: full, pretty, json"
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// CLI config for the logging setup. Logs always go to stderr.
#[derive(Debug, Clone, clap::Parser)]
pub(crate) struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified as well.
    /// For example `debug,tsdb_points=trace`
    #[clap(long = "log-filter", env = "LOG_FILTER", global = true, action)]
    pub(crate) log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug'
    ///
    /// -vvv 'trace'
    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
    )]
    pub(crate) log_verbose_count: u8,

    /// Logs: message format
    ///
    /// Can be one of: "full", "pretty", "json"
    #[clap(
        long = "log-format",
        env = "LOG_FORMAT",
        default_value = "full",
        global = true,
        action
    )]
    pub(crate) log_format: LogFormat,
}

impl LoggingConfig {
    /// The filter directive in effect: `-v` wins over `--log-filter`.
    fn filter_directive(&self) -> &str {
        match self.log_verbose_count {
            0 => self
                .log_filter
                .as_deref()
                .unwrap_or(DEFAULT_LOG_FILTER),
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Installs the global subscriber described by `config`.
pub(crate) fn init(config: &LoggingConfig) -> Result<(), InitError> {
    let filter = EnvFilter::try_new(config.filter_directive())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> LoggingConfig {
        LoggingConfig::try_parse_from(std::iter::once("lp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verbose_overrides_filter() {
        assert_eq!(parse(&[]).filter_directive(), DEFAULT_LOG_FILTER);
        assert_eq!(
            parse(&["--log-filter", "debug,tsdb_points=trace"]).filter_directive(),
            "debug,tsdb_points=trace"
        );
        assert_eq!(parse(&["--log-filter", "error", "-v"]).filter_directive(), "info");
        assert_eq!(parse(&["-vv"]).filter_directive(), "debug");
        assert_eq!(parse(&["-vvvv"]).filter_directive(), "trace");
    }

    #[test]
    fn log_formats() {
        assert_eq!(parse(&[]).log_format, LogFormat::Full);
        assert_eq!(parse(&["--log-format", "JSON"]).log_format, LogFormat::Json);
        assert!(LoggingConfig::try_parse_from(["lp", "--log-format", "logfmt"]).is_err());
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }
}
