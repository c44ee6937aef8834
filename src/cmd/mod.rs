//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `validate` | `Validate`       |

pub mod serve;
pub mod validate;

pub use serve::{ServeOptions, cmd_serve};
pub use validate::{cmd_validate, parse_start};

use anyhow::Result;
use warehouse_robots::config::LogFormat;
use warehouse_robots::telemetry::init_tracing;

/// Install the log subscriber; `--verbose` forces debug output.
fn init_logging(verbose: bool, level: &str, format: LogFormat) -> Result<()> {
    let level = if verbose { "debug" } else { level };
    init_tracing(level, format)
}
