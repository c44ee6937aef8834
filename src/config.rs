//! Service configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`warehouse.toml`), then environment variables (a `.env` file is honoured
//! by the binary), then command-line flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! cors_allowed_origins = ["http://localhost:3000"]
//!
//! [grid]
//! width = 10
//! height = 10
//!
//! [fleet]
//! robots = 1
//! queue_capacity = 5
//! step_delay_ms = 2000
//!
//! [monitor]
//! lifetime_secs = 1800
//! max_watchers = 256
//!
//! [cancel]
//! attempts = 3
//! base_delay_ms = 100
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::executor::ExecutorConfig;
use crate::grid::Grid;
use crate::monitor::MonitorConfig;
use crate::orchestrator::RetryPolicy;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "warehouse.toml";

/// Upper bound for `monitor.lifetime_secs` (one week).
pub const MAX_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for `fleet.step_delay_ms` (ten minutes).
pub const MAX_STEP_DELAY_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSection {
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

fn default_dimension() -> u32 {
    10
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSection {
    /// Number of simulated robots, IDs `0..robots`.
    #[serde(default = "default_robots")]
    pub robots: usize,
    /// Tasks held per robot, counting the running one.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Simulated travel time of one step, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

fn default_robots() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    5
}

fn default_step_delay_ms() -> u64 {
    2000
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            robots: default_robots(),
            queue_capacity: default_queue_capacity(),
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Maximum lifetime of an active task, in seconds.
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,
    #[serde(default = "default_max_watchers")]
    pub max_watchers: usize,
}

fn default_lifetime_secs() -> u64 {
    30 * 60
}

fn default_max_watchers() -> usize {
    256
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            lifetime_secs: default_lifetime_secs(),
            max_watchers: default_max_watchers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

impl Default for CancelSection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: pretty, json",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The complete warehouse.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub grid: GridSection,
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub cancel: CancelSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl WarehouseConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse warehouse.toml")
    }

    /// Load `warehouse.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(width) = get("GRID_WIDTH") {
            self.grid.width = parse_env("GRID_WIDTH", &width)?;
        }
        if let Some(height) = get("GRID_HEIGHT") {
            self.grid.height = parse_env("GRID_HEIGHT", &height)?;
        }
        if let Some(robots) = get("ROBOT_COUNT") {
            self.fleet.robots = parse_env("ROBOT_COUNT", &robots)?;
        }
        if let Some(capacity) = get("QUEUE_CAPACITY") {
            self.fleet.queue_capacity = parse_env("QUEUE_CAPACITY", &capacity)?;
        }
        if let Some(delay) = get("STEP_DELAY_MS") {
            self.fleet.step_delay_ms = parse_env("STEP_DELAY_MS", &delay)?;
        }
        if let Some(lifetime) = get("TASK_LIFETIME_SECS") {
            self.monitor.lifetime_secs = parse_env("TASK_LIFETIME_SECS", &lifetime)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            self.logging.format = format
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))
                .context("Invalid LOG_FORMAT")?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            bail!(
                "grid dimensions must be positive, got {}x{}",
                self.grid.width,
                self.grid.height
            );
        }
        if self.fleet.robots == 0 {
            bail!("fleet.robots must be at least 1");
        }
        if self.fleet.queue_capacity == 0 {
            bail!("fleet.queue_capacity must be at least 1");
        }
        if self.monitor.max_watchers == 0 {
            bail!("monitor.max_watchers must be at least 1");
        }
        if self.monitor.lifetime_secs == 0 {
            bail!("monitor.lifetime_secs must be at least 1");
        }
        if self.monitor.lifetime_secs > MAX_LIFETIME_SECS {
            bail!(
                "monitor.lifetime_secs must be at most {}, got {}",
                MAX_LIFETIME_SECS,
                self.monitor.lifetime_secs
            );
        }
        if self.fleet.step_delay_ms > MAX_STEP_DELAY_MS {
            bail!(
                "fleet.step_delay_ms must be at most {}, got {}",
                MAX_STEP_DELAY_MS,
                self.fleet.step_delay_ms
            );
        }
        if self.cancel.attempts == 0 {
            bail!("cancel.attempts must be at least 1");
        }
        Ok(())
    }

    pub fn grid(&self) -> Grid {
        Grid::new(self.grid.width, self.grid.height)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            grid: self.grid(),
            capacity: self.fleet.queue_capacity,
            step_delay: Duration::from_millis(self.fleet.step_delay_ms),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            lifetime: Duration::from_secs(self.monitor.lifetime_secs),
            max_watchers: self.monitor.max_watchers,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.cancel.attempts,
            base_delay: Duration::from_millis(self.cancel.base_delay_ms),
        }
    }

    /// `host:port` the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))
}
