//! Logging setup for the relay.
//!
//! One `tracing` subscriber per process: an [`EnvFilter`] followed by a single
//! fmt layer, either JSON lines or compact text.
//!
//! # Noise Filtering
//!
//! Connection-level crates (hyper, reqwest, h2, rustls, redis) are held at
//! `warn` so pool chatter does not bury request logs. `RUST_LOG`, when set,
//! replaces the whole filter.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules that are filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower_http",
    "redis",
];

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    Json,
    /// Compact single-line text.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("'{other}' is not one of json, pretty")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

/// Parse a base level such as `info` or `DEBUG`.
pub fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| format!("'{level}' is not one of trace, debug, info, warn, error, off"))
}

/// Filter directives for a base level: the level itself, then `warn` for
/// every noisy module.
fn filter_directives(level: LevelFilter) -> String {
    std::iter::once(level.to_string().to_ascii_lowercase())
        .chain(NOISY_MODULES.iter().map(|module| format!("{module}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

/// Install the global subscriber.
///
/// An unparseable `log_level` falls back to `info`; config validation reports
/// it afterwards. Returns `false` when a subscriber was already installed, in
/// which case the call changes nothing.
pub fn init_logging(log_level: &str, format: LogFormat) -> bool {
    let level = parse_level(log_level).unwrap_or(LevelFilter::INFO);

    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
    });
    let text = (format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_target(true)
    });

    let installed = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(json)
        .with(text)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(level = %level, format = %format, "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_quiet_noisy_modules() {
        let directives = filter_directives(LevelFilter::DEBUG);
        let parts: Vec<&str> = directives.split(',').collect();

        assert_eq!(parts[0], "debug");
        assert_eq!(parts.len(), NOISY_MODULES.len() + 1);
        assert!(parts.contains(&"redis=warn"));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().unwrap_err().contains("xml"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Ok(LevelFilter::WARN));
        assert_eq!(parse_level("off"), Ok(LevelFilter::OFF));
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_second_init_is_a_no_op() {
        init_logging("info", LogFormat::Pretty);
        assert!(!init_logging("debug", LogFormat::Json));
    }
}
