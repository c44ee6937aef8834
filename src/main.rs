use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warehouse_robots::config::LogFormat;
use warehouse_robots::grid::{Grid, Position};

mod cmd;

#[derive(Parser)]
#[command(name = "warehouse-robots")]
#[command(version, about = "Task lifecycle engine for warehouse robots")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format. Overrides the configured format.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Path to a TOML config file (defaults to ./warehouse.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Number of simulated robots
        #[arg(long)]
        robots: Option<usize>,
        /// Simulated travel time of one step, in milliseconds
        #[arg(long)]
        step_delay_ms: Option<u64>,
    },
    /// Check a command string against the grid boundaries without running it
    Validate {
        /// Start position as X,Y
        #[arg(long, default_value = "0,0", value_parser = cmd::parse_start)]
        from: Position,
        #[arg(long, env = "GRID_WIDTH", default_value_t = 10)]
        width: u32,
        #[arg(long, env = "GRID_HEIGHT", default_value_t = 10)]
        height: u32,
        /// Commands such as "NNEE"; case and whitespace are ignored
        commands: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            config,
            host,
            port,
            robots,
            step_delay_ms,
        } => {
            let options = cmd::ServeOptions {
                config: config.clone(),
                host: host.clone(),
                port: *port,
                robots: *robots,
                step_delay_ms: *step_delay_ms,
                log_format: cli.log_format,
            };
            cmd::cmd_serve(options, cli.verbose).await?;
        }
        Commands::Validate {
            from,
            width,
            height,
            commands,
        } => {
            cmd::cmd_validate(
                *from,
                Grid::new(*width, *height),
                commands,
                cli.verbose,
                cli.log_format.unwrap_or_default(),
            )?;
        }
    }

    Ok(())
}
