//! Offline plan check (`warehouse-robots validate`).

use anyhow::Result;
use warehouse_robots::config::LogFormat;
use warehouse_robots::grid::{Grid, Position};
use warehouse_robots::plan::{Plan, simulate};

/// Parse a `X,Y` start position.
pub fn parse_start(value: &str) -> Result<Position, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{}'", value))?;
    let x = x
        .trim()
        .parse()
        .map_err(|_| format!("invalid x coordinate '{}'", x.trim()))?;
    let y = y
        .trim()
        .parse()
        .map_err(|_| format!("invalid y coordinate '{}'", y.trim()))?;
    Ok(Position::new(x, y, false))
}

pub fn cmd_validate(
    start: Position,
    grid: Grid,
    commands: &str,
    verbose: bool,
    log_format: LogFormat,
) -> Result<()> {
    super::init_logging(verbose, "warn", log_format)?;

    let plan = Plan::parse(commands)?;
    let end = simulate(grid, start, &plan)?;
    println!(
        "OK {} -> {} ({} steps on a {}x{} grid)",
        start,
        end,
        plan.len(),
        grid.width,
        grid.height
    );
    Ok(())
}
