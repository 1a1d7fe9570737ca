//! Command-line interface handling for the raid server.

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Every option except the config path overrides a value from the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the profile directory
    pub profile_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    pub sweep_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("Raid Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Raid session coordinator with dedicated worker dispatch")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .value_parser(value_parser!(PathBuf))
                    .default_value("raid_server.toml"),
            )
            .arg(
                Arg::new("profiles")
                    .short('p')
                    .long("profiles")
                    .value_name("DIR")
                    .help("Profile directory path")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("sweep-interval-ms")
                    .long("sweep-interval-ms")
                    .value_name("MS")
                    .help("Heartbeat sweep period in milliseconds")
                    .value_parser(value_parser!(u64)),
            )
            .arg(
                Arg::new("heartbeat-timeout-ms")
                    .long("heartbeat-timeout-ms")
                    .value_name("MS")
                    .help("Evict workers silent for longer than this")
                    .value_parser(value_parser!(u64)),
            )
    }

    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("raid_server.toml")),
            profile_dir: matches.get_one::<PathBuf>("profiles").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            sweep_interval_ms: matches.get_one::<u64>("sweep-interval-ms").copied(),
            heartbeat_timeout_ms: matches.get_one::<u64>("heartbeat-timeout-ms").copied(),
        }
    }
}
