//! Lifecycle orchestration — parses arguments, loads configuration,
//! constructs the classifier and its supporting services, then runs the
//! acceptor and monitor until a terminating signal, per §4.7.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Semaphore};

use darwin_core::config::{CoreArgs, FilterConfig};
use darwin_core::wire::DecodeLimits;
use darwin_services::classifiers::buffer::OutputTarget;
use darwin_services::classifiers::{Buffer, HostLookup, UserAgent, Yara};
use darwin_services::{AlertManager, Classifier, Forwarder, Monitor, Target, TaskContext};

use crate::acceptor::Acceptor;

/// Matches `_max_attempts{3}` / `_attempts_delay_ms{1000}` in
/// `ANextFilterConnector`'s constructor — the defaults a forwarder is given
/// when nothing in the config overrides them.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPTS_DELAY: Duration = Duration::from_millis(1000);

pub struct Core {
    args: CoreArgs,
    classifier: Arc<dyn Classifier>,
    ctx: Arc<TaskContext>,
    pool: Arc<Semaphore>,
    limits: DecodeLimits,
}

impl Core {
    pub fn configure(args: CoreArgs) -> Result<Self> {
        let cfg = FilterConfig::load(&args.config_path)
            .with_context(|| format!("loading config {}", args.config_path.display()))?;

        let classifier = build_classifier(&args.filter_name, &cfg)
            .with_context(|| format!("configuring classifier '{}'", args.filter_name))?;

        let cache = Arc::new(darwin_services::ResultCache::new(args.cache_size));

        let alerts = if cfg.log_file_path.is_some() || cfg.redis_socket_path.is_some() {
            let rule_name = format!("{}_rule", args.filter_name);
            Some(Arc::new(
                AlertManager::configure(&args.filter_name, &rule_name, serde_json::json!([]), &cfg, None)
                    .context("configuring alert manager")?,
            ))
        } else {
            tracing::info!(filter = %args.filter_name, "no alert channel configured, alerts disabled");
            None
        };

        let next_filter = match &args.next_filter_address {
            Some(addr) => {
                let target = Target::parse(addr, false).context("parsing next-filter address")?;
                Some(Arc::new(Forwarder::new(target, DEFAULT_MAX_ATTEMPTS, DEFAULT_ATTEMPTS_DELAY)))
            }
            None => None,
        };

        let ctx = Arc::new(TaskContext {
            filter_name: args.filter_name.clone(),
            rule_name: format!("{}_rule", args.filter_name),
            threshold: args.threshold,
            output: args.output,
            cache,
            alerts,
            next_filter,
        });

        Ok(Self {
            pool: Arc::new(Semaphore::new(args.nb_threads.max(1))),
            limits: DecodeLimits::default(),
            args,
            classifier,
            ctx,
        })
    }

    /// Runs until `shutdown` fires, then waits for in-flight sessions to
    /// finish and removes the PID file, matching `main()`'s
    /// `WritePID`/`run`/`ClearPID` sequence.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let pid_file = self.args.pid_file();
        write_pid_file(&pid_file)?;

        let monitor = Monitor::bind(&self.args.monitor_socket_path, shutdown.resubscribe())
            .context("binding monitor socket")?;
        let acceptor = Acceptor::bind(
            &self.args.listen_address,
            self.classifier.clone(),
            self.ctx.clone(),
            self.pool.clone(),
            self.limits,
            shutdown.resubscribe(),
        )
        .await
        .context("binding listen socket")?;

        let monitor_task = tokio::spawn(monitor.run());
        let acceptor_task = tokio::spawn(acceptor.run());

        let _ = shutdown.recv().await;
        tracing::info!(filter = %self.args.filter_name, "core: shutdown signal received");

        let _ = acceptor_task.await;
        let _ = monitor_task.await;

        let _ = std::fs::remove_file(&pid_file);
        Ok(())
    }

    pub fn alert_manager(&self) -> Option<Arc<AlertManager>> {
        self.ctx.alerts.clone()
    }
}

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating pid directory {}", parent.display()))?;
    }
    std::fs::write(path, format!("{}\n", std::process::id())).with_context(|| format!("writing pid file {}", path.display()))
}

/// Instantiates the classifier named by `filter_name` from its config keys
/// (§6). A single `darwind` binary serves every filter kind, chosen at
/// startup rather than compiled separately per filter as in the original.
fn build_classifier(filter_name: &str, cfg: &FilterConfig) -> Result<Arc<dyn Classifier>> {
    match filter_name {
        "hostlookup" => {
            let database = cfg.extra_str("database").context("hostlookup requires 'database'")?;
            let db_type = cfg.extra_str("db_type").unwrap_or("text");
            Ok(Arc::new(HostLookup::load(database, db_type)?))
        }
        "useragent" => {
            let token_map_path = cfg.extra_str("token_map_path").context("useragent requires 'token_map_path'")?;
            let model_path = cfg.extra_str("model_path").context("useragent requires 'model_path'")?;
            let max_tokens = cfg.extra_u64("max_tokens").map(|v| v as u32);
            Ok(Arc::new(UserAgent::load(token_map_path, model_path, max_tokens)?))
        }
        "yara" => {
            let rule_files: Vec<String> = cfg
                .extra_array("rule_file_list")
                .context("yara requires 'rule_file_list'")?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let fastmode = cfg.extra_bool("fastmode");
            let timeout = cfg.extra_u64("timeout").map(|v| v as u32);
            Ok(Arc::new(Yara::new(rule_files, fastmode, timeout)?))
        }
        "buffer" => {
            let redis_socket_path = cfg.redis_socket_path.clone().unwrap_or_default();
            let log_file_path = cfg.log_file_path.clone().unwrap_or_default();
            let raw_inputs: Vec<(String, String)> = cfg
                .extra_array("input_format")
                .context("buffer requires 'input_format'")?
                .iter()
                .filter_map(|v| {
                    let name = v.get("name")?.as_str()?.to_string();
                    let ty = v.get("type")?.as_str()?.to_string();
                    Some((name, ty))
                })
                .collect();
            let outputs: Vec<OutputTarget> = cfg
                .extra_array("outputs")
                .context("buffer requires 'outputs'")?
                .iter()
                .filter_map(parse_output_target)
                .collect();
            Ok(Arc::new(Buffer::new(redis_socket_path, log_file_path, raw_inputs, outputs)?))
        }
        other => anyhow::bail!("unknown filter_name '{other}'"),
    }
}

fn parse_output_target(v: &serde_json::Value) -> Option<OutputTarget> {
    let filter_type = v.get("filter_type")?.as_str()?.to_string();
    let required_log_lines = v.get("required_log_lines").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32;
    let redis_lists = v
        .get("redis_list_name")
        .and_then(|n| n.as_str())
        .map(|name| vec![(name.to_string(), filter_type.clone())])
        .unwrap_or_default();
    Some(OutputTarget { filter_type, redis_lists, required_log_lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use darwin_core::config::OutputMode;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("darwin-core-test-{}-{}.json", std::process::id(), id));
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{contents}").unwrap();
        path
    }

    fn sample_args(config_path: PathBuf) -> CoreArgs {
        CoreArgs {
            filter_name: "hostlookup".into(),
            config_path,
            monitor_socket_path: std::env::temp_dir().join("darwin-core-test.mon.sock"),
            pid_path: std::env::temp_dir(),
            listen_address: std::env::temp_dir().join("darwin-core-test.sock").to_string_lossy().into_owned(),
            nb_threads: 2,
            cache_size: 100,
            threshold: 50,
            output: OutputMode::Raw,
            next_filter_address: None,
            daemon: false,
            log_level: "info".into(),
        }
    }

    #[test]
    fn configure_builds_hostlookup_classifier_without_alerts() {
        let db_path = write_temp("evil.example\n");
        let cfg_path = write_temp(&format!(r#"{{"database": "{}", "db_type": "text"}}"#, db_path.to_str().unwrap()));

        let core = Core::configure(sample_args(cfg_path.clone())).unwrap();
        assert!(core.alert_manager().is_none());

        let _ = std::fs::remove_file(db_path);
        let _ = std::fs::remove_file(cfg_path);
    }

    #[test]
    fn configure_fails_on_unknown_filter_name() {
        let cfg_path = write_temp("{}");
        let mut args = sample_args(cfg_path.clone());
        args.filter_name = "nonexistent".into();
        assert!(Core::configure(args).is_err());
        let _ = std::fs::remove_file(cfg_path);
    }

    #[test]
    fn configure_fails_on_missing_database_key() {
        let cfg_path = write_temp("{}");
        assert!(Core::configure(sample_args(cfg_path.clone())).is_err());
        let _ = std::fs::remove_file(cfg_path);
    }
}
