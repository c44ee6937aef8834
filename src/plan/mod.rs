//! Movement plans and boundary validation.
//!
//! A plan is the normalized form of a command string: whitespace removed,
//! letters uppercased, every character one of `N`, `S`, `E`, `W`.
//!
//! ```
//! use warehouse_robots::grid::{Grid, Position};
//! use warehouse_robots::plan::{Plan, validate};
//!
//! let plan = Plan::parse(" nn e ").unwrap();
//! assert_eq!(plan.to_string(), "NNE");
//!
//! let end = validate(Grid::new(10, 10), Position::origin(), "NNE").unwrap();
//! assert_eq!(end, Position::new(1, 2, false));
//! ```

mod validator;

pub use validator::{simulate, validate};

use std::fmt;

use crate::errors::PlanError;
use crate::grid::Direction;

/// A normalized sequence of single-step directives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    directions: Vec<Direction>,
}

impl Plan {
    /// Strip whitespace and uppercase ASCII letters.
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Parse a raw command string.
    ///
    /// The first character outside `{N, S, E, W}` is reported with its
    /// 1-based position in the normalized string. An empty or
    /// whitespace-only input yields an empty plan.
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let directions = Self::normalize(raw)
            .chars()
            .enumerate()
            .map(|(index, c)| {
                Direction::from_char(c).ok_or(PlanError::InvalidCommand {
                    command: c,
                    position: index + 1,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { directions })
    }

    /// Parse a raw command string that must contain at least one directive.
    pub fn parse_non_empty(raw: &str) -> Result<Self, PlanError> {
        let plan = Self::parse(raw)?;
        if plan.is_empty() {
            return Err(PlanError::Empty);
        }
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn get(&self, index: usize) -> Option<Direction> {
        self.directions.get(index).copied()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for direction in &self.directions {
            write!(f, "{}", direction.as_char())?;
        }
        Ok(())
    }
}
