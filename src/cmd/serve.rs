//! HTTP server command (`warehouse-robots serve`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use warehouse_robots::config::{LogFormat, WarehouseConfig};
use warehouse_robots::server::start_server;

/// Command-line overrides for the server; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub robots: Option<usize>,
    pub step_delay_ms: Option<u64>,
    pub log_format: Option<LogFormat>,
}

impl ServeOptions {
    /// Resolve the final configuration: file, then environment, then flags.
    pub fn resolve(&self) -> Result<WarehouseConfig> {
        let mut config = match &self.config {
            Some(path) => WarehouseConfig::load(path)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                WarehouseConfig::load_or_default(&cwd)?
            }
        };
        config.apply_env()?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut WarehouseConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(robots) = self.robots {
            config.fleet.robots = robots;
        }
        if let Some(delay) = self.step_delay_ms {
            config.fleet.step_delay_ms = delay;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

pub async fn cmd_serve(options: ServeOptions, verbose: bool) -> Result<()> {
    let config = options.resolve()?;
    super::init_logging(verbose, &config.logging.level, config.logging.format)?;
    start_server(config).await
}
