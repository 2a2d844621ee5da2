//! Monitor configuration
//!
//! Loaded from a config file (explicit, or `~/.rmon/config.toml` when it
//! exists), then `RMON_*` environment variables
//! (nested keys separated by `__`, e.g. `RMON_ANOMALY__MIN_DATA_POINTS=20`),
//! with serde defaults for anything left unset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::MetricType;

/// Top-level configuration shared by the daemon and the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Instance label attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub optimization: OptimizationConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            metrics: MetricsConfig::default(),
            anomaly: AnomalyConfig::default(),
            optimization: OptimizationConfig::default(),
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::from(default_config_path()).required(false),
        };

        let builder = config::Config::builder().add_source(file);

        let settings = builder
            .add_source(
                config::Environment::with_prefix("RMON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let mut config: MonitorConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.daemon.expand_paths();

        Ok(config)
    }
}

/// Per-category on/off switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledMetrics {
    #[serde(default = "default_true")]
    pub cpu: bool,
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub disk: bool,
    #[serde(default = "default_true")]
    pub network: bool,
    #[serde(default = "default_true")]
    pub custom: bool,
}

impl Default for EnabledMetrics {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            custom: true,
        }
    }
}

impl EnabledMetrics {
    pub fn is_enabled(&self, metric_type: MetricType) -> bool {
        match metric_type {
            MetricType::Cpu => self.cpu,
            MetricType::Memory => self.memory,
            MetricType::Disk => self.disk,
            MetricType::Network => self.network,
            MetricType::Custom => self.custom,
        }
    }

    /// Enabled types in canonical order
    pub fn iter(&self) -> impl Iterator<Item = MetricType> + '_ {
        MetricType::ALL.into_iter().filter(|t| self.is_enabled(*t))
    }
}

/// Where a custom metric value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomMetricSource {
    Command,
    Label,
    Env,
}

/// One user-defined metric read from each container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetric {
    pub name: String,
    pub source: CustomMetricSource,
    /// Shell command run inside the container (source = command)
    #[serde(default)]
    pub command: Option<String>,
    /// Container label key (source = label)
    #[serde(default)]
    pub label: Option<String>,
    /// Environment variable name (source = env)
    #[serde(default)]
    pub env_var: Option<String>,
}

/// Metrics collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Samples older than this are purged every cycle
    #[serde(default = "default_retention")]
    pub retention_period_secs: u64,

    #[serde(default)]
    pub enabled: EnabledMetrics,

    #[serde(default)]
    pub custom_metrics: Vec<CustomMetric>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: default_collection_interval(),
            retention_period_secs: default_retention(),
            enabled: EnabledMetrics::default(),
            custom_metrics: Vec::new(),
        }
    }
}

impl MetricsConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs.max(1))
    }

    pub fn retention_period(&self) -> chrono::Duration {
        secs_to_chrono(self.retention_period_secs)
    }
}

/// Anomaly detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_detection_interval")]
    pub detection_interval_secs: u64,

    #[serde(default = "default_anomaly_lookback")]
    pub lookback_period_hours: u64,

    /// Bounds are mean +/- threshold_multiplier * stddev
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f64,

    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,

    #[serde(default = "default_anomaly_enabled")]
    pub enabled: EnabledMetrics,

    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,

    #[serde(default = "default_retention")]
    pub history_retention_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            detection_interval_secs: default_detection_interval(),
            lookback_period_hours: default_anomaly_lookback(),
            threshold_multiplier: default_threshold_multiplier(),
            min_data_points: default_min_data_points(),
            enabled: default_anomaly_enabled(),
            alert_cooldown_secs: default_alert_cooldown(),
            history_retention_secs: default_retention(),
        }
    }
}

impl AnomalyConfig {
    pub fn detection_interval(&self) -> Duration {
        Duration::from_secs(self.detection_interval_secs.max(1))
    }

    pub fn lookback_period(&self) -> chrono::Duration {
        secs_to_chrono(self.lookback_period_hours.saturating_mul(3600))
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        secs_to_chrono(self.alert_cooldown_secs)
    }

    pub fn history_retention(&self) -> chrono::Duration {
        secs_to_chrono(self.history_retention_secs)
    }
}

/// Recommendation engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    #[serde(default = "default_optimization_lookback")]
    pub lookback_period_hours: u64,

    #[serde(default = "default_high_threshold")]
    pub cpu_high_threshold: f64,

    #[serde(default = "default_low_threshold")]
    pub cpu_low_threshold: f64,

    #[serde(default = "default_high_threshold")]
    pub memory_high_threshold: f64,

    #[serde(default = "default_low_threshold")]
    pub memory_low_threshold: f64,

    /// Combined read+write bytes per second
    #[serde(default = "default_io_threshold")]
    pub disk_io_threshold: f64,

    /// Combined rx+tx bytes per second
    #[serde(default = "default_io_threshold")]
    pub network_io_threshold: f64,

    /// CPU peak percent above which throttling is suspected
    #[serde(default = "default_throttling_threshold")]
    pub throttling_threshold: f64,

    /// Average cpu and memory percent below which a container counts as idle
    #[serde(default = "default_low_utilization_threshold")]
    pub low_utilization_threshold: f64,

    #[serde(default = "default_retention")]
    pub history_retention_secs: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: default_analysis_interval(),
            lookback_period_hours: default_optimization_lookback(),
            cpu_high_threshold: default_high_threshold(),
            cpu_low_threshold: default_low_threshold(),
            memory_high_threshold: default_high_threshold(),
            memory_low_threshold: default_low_threshold(),
            disk_io_threshold: default_io_threshold(),
            network_io_threshold: default_io_threshold(),
            throttling_threshold: default_throttling_threshold(),
            low_utilization_threshold: default_low_utilization_threshold(),
            history_retention_secs: default_retention(),
        }
    }
}

impl OptimizationConfig {
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs.max(1))
    }

    pub fn lookback_period(&self) -> chrono::Duration {
        secs_to_chrono(self.lookback_period_hours.saturating_mul(3600))
    }

    pub fn history_retention(&self) -> chrono::Duration {
        secs_to_chrono(self.history_retention_secs)
    }
}

/// Daemon process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Upper bound on waiting for each worker to exit
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub api_enabled: bool,

    #[serde(default = "default_api_bind")]
    pub api_bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let mut config = Self {
            pid_file: default_pid_file(),
            log_file: default_log_file(),
            status_file: default_status_file(),
            status_interval_secs: default_status_interval(),
            stop_timeout_secs: default_stop_timeout(),
            api_enabled: true,
            api_bind: default_api_bind(),
        };
        config.expand_paths();
        config
    }
}

impl DaemonConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Resolve a leading `~` in the file paths against the home directory
    pub fn expand_paths(&mut self) {
        self.pid_file = expand_home(&self.pid_file);
        self.log_file = expand_home(&self.log_file);
        self.status_file = expand_home(&self.status_file);
    }
}

/// Log output settings for the daemon binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `text`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Replace a leading `~` component with the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs_next::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Config file read when none is given explicitly
pub fn default_config_path() -> PathBuf {
    expand_home(Path::new("~/.rmon/config.toml"))
}

/// Clamped to the longest span `chrono::Duration` can hold
fn secs_to_chrono(secs: u64) -> chrono::Duration {
    const MAX_SECS: u64 = (i64::MAX / 1000) as u64;
    chrono::Duration::seconds(secs.min(MAX_SECS) as i64)
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_true() -> bool {
    true
}

fn default_collection_interval() -> u64 {
    10
}

fn default_retention() -> u64 {
    7 * 24 * 3600
}

fn default_detection_interval() -> u64 {
    300
}

fn default_anomaly_lookback() -> u64 {
    24
}

fn default_threshold_multiplier() -> f64 {
    3.0
}

fn default_min_data_points() -> usize {
    10
}

fn default_anomaly_enabled() -> EnabledMetrics {
    EnabledMetrics {
        custom: false,
        ..EnabledMetrics::default()
    }
}

fn default_alert_cooldown() -> u64 {
    3600
}

fn default_analysis_interval() -> u64 {
    3600
}

fn default_optimization_lookback() -> u64 {
    168
}

fn default_high_threshold() -> f64 {
    80.0
}

fn default_low_threshold() -> f64 {
    20.0
}

fn default_io_threshold() -> f64 {
    100_000_000.0
}

fn default_throttling_threshold() -> f64 {
    90.0
}

fn default_low_utilization_threshold() -> f64 {
    10.0
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("~/.rmon/daemon.pid")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("~/.rmon/daemon.log")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("~/.rmon/daemon_status.json")
}

fn default_status_interval() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_api_bind() -> String {
    "127.0.0.1:9465".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
