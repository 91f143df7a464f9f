//! Configuration for a Darwin filter: the JSON document read from
//! `config_path` plus the positional command-line arguments a filter is
//! started with.
//!
//! Unlike the teacher crate this reads JSON, since the filter's config
//! document format predates this crate and is shared with the non-Rust
//! members of a Darwin fleet (§6).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How a filter composes the body of its response packet (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    Raw,
    Log,
    #[default]
    None,
    Parsed,
}

impl OutputMode {
    /// Unrecognised strings fall back to `None`, matching
    /// `convert_output_string` in the original implementation.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "RAW" => OutputMode::Raw,
            "LOG" => OutputMode::Log,
            "PARSED" => OutputMode::Parsed,
            _ => OutputMode::None,
        }
    }
}

/// The JSON config document at `config_path`. Fields common to every
/// filter (alerting/Redis) are typed; filter-specific keys
/// (`database`, `rule_file_list`, `outputs`, ...) are kept as a raw JSON
/// map for the classifier generator to consult.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub redis_socket_path: Option<String>,
    pub alert_redis_list_name: Option<String>,
    pub alert_redis_channel_name: Option<String>,
    pub log_file_path: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FilterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(|v| v.as_u64())
    }

    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(|v| v.as_bool())
    }

    pub fn extra_array<'a>(&'a self, key: &str) -> Option<&'a Vec<serde_json::Value>> {
        self.extra.get(key).and_then(|v| v.as_array())
    }
}

/// Positional command-line arguments a filter process is started with,
/// per §4.7.
#[derive(Debug, Clone)]
pub struct CoreArgs {
    pub filter_name: String,
    pub config_path: PathBuf,
    pub monitor_socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub listen_address: String,
    pub nb_threads: usize,
    pub cache_size: usize,
    pub threshold: u32,
    pub output: OutputMode,
    pub next_filter_address: Option<String>,
    pub daemon: bool,
    pub log_level: String,
}

impl CoreArgs {
    /// Parse from a raw argv slice (excluding argv[0]), in the fixed
    /// positional order given by §4.7, with `--daemon` and `--log-level`
    /// accepted anywhere after the positionals.
    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        const POSITIONAL_COUNT: usize = 9;

        let mut positionals = Vec::with_capacity(POSITIONAL_COUNT);
        let mut daemon = false;
        let mut log_level = "info".to_string();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--daemon" => daemon = true,
                "--log-level" => {
                    i += 1;
                    log_level = args.get(i).cloned().ok_or(ConfigError::MissingArgument("--log-level"))?;
                }
                other => positionals.push(other.to_string()),
            }
            i += 1;
        }

        if positionals.len() < POSITIONAL_COUNT {
            return Err(ConfigError::MissingArgument("not enough positional arguments"));
        }

        let nb_threads = positionals[5].parse().map_err(|_| ConfigError::InvalidArgument("nb_threads"))?;
        let cache_size = positionals[6].parse().map_err(|_| ConfigError::InvalidArgument("cache_size"))?;
        let threshold = positionals[7].parse().map_err(|_| ConfigError::InvalidArgument("threshold"))?;

        Ok(CoreArgs {
            filter_name: positionals[0].clone(),
            config_path: PathBuf::from(&positionals[1]),
            monitor_socket_path: PathBuf::from(&positionals[2]),
            pid_path: PathBuf::from(&positionals[3]),
            listen_address: positionals[4].clone(),
            nb_threads,
            cache_size,
            threshold,
            output: OutputMode::from_str_lossy(&positionals[8]),
            next_filter_address: positionals.get(9).cloned(),
            daemon,
            log_level,
        })
    }

    pub fn pid_file(&self) -> PathBuf {
        self.pid_path.join(format!("{}.pid", self.filter_name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
