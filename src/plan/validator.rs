//! Boundary validation for movement plans.
//!
//! Validation is a pure walk over the plan: every intermediate position must
//! stay on the grid, not just the endpoint. The first offending step wins.

use tracing::debug;

use super::Plan;
use crate::errors::PlanError;
use crate::grid::{Grid, Position};

/// Walk `plan` from `start`, returning the end position.
pub fn simulate(grid: Grid, start: Position, plan: &Plan) -> Result<Position, PlanError> {
    if !grid.contains_position(start) {
        return Err(PlanError::InvalidStart {
            start,
            width: grid.width,
            height: grid.height,
        });
    }

    let mut current = start;
    for (index, &direction) in plan.directions().iter().enumerate() {
        current = match grid.step(current, direction) {
            Some(next) => next,
            None => {
                let (x, y) = Grid::offset(current, direction);
                debug!(
                    step = index + 1,
                    command = %direction.as_char(),
                    from = %current,
                    x,
                    y,
                    "boundary violation"
                );
                return Err(PlanError::OutOfBounds {
                    step: index + 1,
                    command: direction.as_char(),
                    from: current,
                    x,
                    y,
                    width: grid.width,
                    height: grid.height,
                });
            }
        };
    }
    Ok(current)
}

/// Parse and validate a raw command string from `start`.
///
/// Malformed input is reported before any movement is simulated. An empty
/// plan is valid and leaves the robot where it is.
pub fn validate(grid: Grid, start: Position, commands: &str) -> Result<Position, PlanError> {
    let plan = Plan::parse(commands)?;
    simulate(grid, start, &plan)
}
