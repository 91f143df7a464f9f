//! Alert manager — formats alert JSON and delivers it to a log file and/or
//! Redis, with bounded retries on write failure (§4.3).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use darwin_core::config::FilterConfig;

/// Number of retries `WriteLogs` performs before giving up and logging the
/// failure, matching `RETRY` in the original implementation.
const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// The Redis operations the alert manager invokes. The real client
/// (connection pooling, the Redis wire protocol) is out of scope (§1); this
/// trait is the seam a concrete client plugs into.
pub trait RedisSink: Send + Sync {
    fn lpush(&self, list: &str, value: &str) -> Result<(), AlertError>;
    fn publish(&self, channel: &str, value: &str) -> Result<(), AlertError>;
}

struct LogSink {
    path: PathBuf,
    file: File,
}

impl LogSink {
    fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: PathBuf::from(path),
            file,
        })
    }

    fn reopen(&mut self) -> std::io::Result<()> {
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

struct RedisDelivery {
    list_name: Option<String>,
    channel_name: Option<String>,
    sink: Arc<dyn RedisSink>,
}

pub struct AlertManager {
    filter_name: String,
    rule_name: String,
    default_tags: String,
    log: Option<Mutex<LogSink>>,
    redis: Option<RedisDelivery>,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("filter_name", &self.filter_name)
            .field("rule_name", &self.rule_name)
            .field("default_tags", &self.default_tags)
            .field("has_log", &self.log.is_some())
            .field("has_redis", &self.redis.is_some())
            .finish()
    }
}

impl AlertManager {
    /// Mirrors `AlertManager::Configure`: succeeds iff at least one of
    /// {file, Redis} is enabled and every enabled channel configures
    /// successfully.
    pub fn configure(
        filter_name: &str,
        rule_name: &str,
        default_tags: serde_json::Value,
        cfg: &FilterConfig,
        redis_sink: Option<Arc<dyn RedisSink>>,
    ) -> Result<Self, AlertError> {
        let want_log = cfg.log_file_path.as_deref().is_some_and(|p| !p.is_empty());
        let want_redis = cfg.redis_socket_path.as_deref().is_some_and(|p| !p.is_empty());

        if !want_log && !want_redis {
            return Err(AlertError::NoChannelConfigured);
        }

        let log = if want_log {
            let path = cfg.log_file_path.as_deref().unwrap();
            let sink = LogSink::open(path).map_err(|e| AlertError::LogOpenFailed(path.to_string(), e))?;
            tracing::info!(log_file_path = path, "alert log file configured");
            Some(Mutex::new(sink))
        } else {
            None
        };

        let redis = if want_redis {
            let list_name = cfg.alert_redis_list_name.clone().filter(|s| !s.is_empty());
            let channel_name = cfg.alert_redis_channel_name.clone().filter(|s| !s.is_empty());
            if list_name.is_none() && channel_name.is_none() {
                return Err(AlertError::RedisChannelMissing);
            }
            let sink = redis_sink.ok_or(AlertError::RedisNotConfigured)?;
            tracing::info!(?list_name, ?channel_name, "redis alert delivery configured");
            Some(RedisDelivery { list_name, channel_name, sink })
        } else {
            None
        };

        Ok(Self {
            filter_name: filter_name.to_string(),
            rule_name: rule_name.to_string(),
            default_tags: default_tags.to_string(),
            log,
            redis,
        })
    }

    /// Format one alert, then deliver it. Equivalent to
    /// `Alert(FormatLog(entry, certitude, evt_id, details, tags))`.
    pub fn alert(&self, entry: &str, certitude: u32, evt_id: &str, details: &str, tags: &str) {
        let line = self.format_log(entry, certitude, evt_id, details, tags);
        self.alert_raw(&line);
    }

    pub fn alert_raw(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        if let Some(log) = &self.log {
            let mut sink = log.lock().unwrap();
            if !Self::write_with_retry(&mut sink.file, line) {
                tracing::error!("AlertManager: too many retries writing to log file, alert dropped");
            }
        }
        if let Some(redis) = &self.redis {
            if let Some(list) = &redis.list_name {
                if let Err(e) = redis.sink.lpush(list, line) {
                    tracing::warn!(error = %e, "AlertManager: failed to LPUSH alert to redis");
                }
            }
            if let Some(channel) = &redis.channel_name {
                if let Err(e) = redis.sink.publish(channel, line) {
                    tracing::warn!(error = %e, "AlertManager: failed to PUBLISH alert to redis");
                }
            }
        }
    }

    fn write_with_retry(file: &mut File, line: &str) -> bool {
        let mut attempts_left = WRITE_RETRIES;
        loop {
            let result = writeln!(file, "{line}");
            if result.is_ok() {
                return true;
            }
            if attempts_left == 0 {
                return false;
            }
            attempts_left -= 1;
            std::thread::sleep(WRITE_RETRY_BACKOFF);
            tracing::info!(remaining = attempts_left, "AlertManager: retrying log write");
        }
    }

    /// Closes and reopens the log file under the same lock writers take,
    /// matching `Rotate()`.
    pub fn rotate(&self) {
        if let Some(log) = &self.log {
            let mut sink = log.lock().unwrap();
            if let Err(e) = sink.reopen() {
                tracing::error!(error = %e, "AlertManager: failed to reopen log file on rotate");
            }
        }
    }

    /// Builds the fixed-field-order alert JSON line (§4.3). Fields are
    /// written directly rather than through a generic JSON serializer so
    /// the field order is guaranteed regardless of map implementation.
    fn format_log(&self, entry: &str, certitude: u32, evt_id: &str, details: &str, tags: &str) -> String {
        let tags = if tags.is_empty() { self.default_tags.as_str() } else { tags };
        format!(
            "{{\"alert_type\": \"darwin\", \"alert_subtype\": \"{}\", \"alert_time\": \"{}\", \"level\": \"high\", \"rule_name\": \"{}\", \"tags\": {}, \"entry\": \"{}\", \"score\": {}, \"evt_id\": \"{}\", \"details\": {}}}",
            self.filter_name,
            now_timestamp(),
            self.rule_name,
            tags,
            entry,
            certitude,
            evt_id,
            details,
        )
    }
}

/// Local timestamp in the `%F%Z%T%z` strftime pattern used by the original
/// implementation, e.g. `2026-08-01UTC14:02:31+0000`.
fn now_timestamp() -> String {
    let now = chrono::Local::now();
    format!(
        "{}{}{}{}",
        now.format("%Y-%m-%d"),
        now.format("%Z"),
        now.format("%H:%M:%S"),
        now.format("%z"),
    )
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("no alert delivery channel configured (need log_file_path or redis_socket_path)")]
    NoChannelConfigured,
    #[error("failed to open alert log file {0}: {1}")]
    LogOpenFailed(String, std::io::Error),
    #[error("redis_socket_path set but neither alert_redis_list_name nor alert_redis_channel_name given")]
    RedisChannelMissing,
    #[error("redis_socket_path set but no redis sink was provided")]
    RedisNotConfigured,
    #[error("redis operation failed: {0}")]
    RedisOperationFailed(String),
}
