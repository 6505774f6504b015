//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::WritePolicy;
use crate::fetch::FetchConfig;

mod cli;

pub use cli::{CliArgs, Command, FetchArgs, FetchOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fetchbind";
const ENV_PREFIX: &str = "FETCHBIND";
const MAX_REQUEST_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub base_url: Option<Url>,
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub write_policy: WritePolicy,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Fetch(args) => raw.apply_fetch_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    fetch: RawFetchSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_fetch_overrides(&mut self, overrides: &FetchOverrides) {
        if let Some(url) = overrides.base_url.as_ref() {
            self.fetch.base_url = Some(url.clone());
        }
        if let Some(timeout) = overrides.timeout_ms {
            self.fetch.request_timeout_ms = Some(timeout);
        }
        if let Some(agent) = overrides.user_agent.as_ref() {
            self.fetch.user_agent = Some(agent.clone());
        }
        if let Some(policy) = overrides.write_policy.as_ref() {
            self.cache.write_policy = Some(policy.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            fetch,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            fetch: build_fetch_settings(fetch)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let base_url = match fetch.base_url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            let url = Url::parse(value)
                .map_err(|err| LoadError::invalid("fetch.base_url", format!("{value}: {err}")))?;
            if url.cannot_be_a_base() {
                return Err(LoadError::invalid(
                    "fetch.base_url",
                    format!("`{value}` cannot be used as a base url"),
                ));
            }
            Some(url)
        }
    };

    let request_timeout = match fetch.request_timeout_ms {
        None | Some(0) => None,
        Some(millis) if millis > MAX_REQUEST_TIMEOUT_MS => {
            return Err(LoadError::invalid(
                "fetch.request_timeout_ms",
                format!("must not exceed {MAX_REQUEST_TIMEOUT_MS}"),
            ));
        }
        Some(millis) => Some(Duration::from_millis(millis)),
    };

    let user_agent = match fetch.user_agent.map(|agent| agent.trim().to_string()) {
        Some(agent) if agent.is_empty() => {
            return Err(LoadError::invalid("fetch.user_agent", "must not be empty"));
        }
        Some(agent) => agent,
        None => FetchConfig::default_user_agent().to_string(),
    };

    Ok(FetchSettings {
        base_url,
        request_timeout,
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let write_policy = match cache.write_policy {
        Some(value) => WritePolicy::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.write_policy", reason))?,
        None => WritePolicy::default(),
    };

    Ok(CacheSettings { write_policy })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    write_policy: Option<String>,
}
