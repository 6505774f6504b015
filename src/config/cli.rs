use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the fetchbind binary.
#[derive(Debug, Parser)]
#[command(
    name = "fetchbind",
    version,
    about = "Fetch JSON resources through a shared request cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FETCHBIND_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Bind each key against one shared cache and print the final snapshots.
    Fetch(FetchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub overrides: FetchOverrides,

    /// Keys to fetch, in order. Repeated keys are served from the cache.
    #[arg(value_name = "KEY", required = true)]
    pub keys: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FetchOverrides {
    /// Base URL that relative keys are resolved against.
    #[arg(long = "base-url", env = "FETCHBIND_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds (0 disables).
    #[arg(long = "timeout-ms", value_name = "MILLIS")]
    pub timeout_ms: Option<u64>,

    /// Override the User-Agent header.
    #[arg(long = "user-agent", value_name = "AGENT")]
    pub user_agent: Option<String>,

    /// Cache write ordering (last_settled|newest_issued).
    #[arg(long = "write-policy", value_name = "POLICY")]
    pub write_policy: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
