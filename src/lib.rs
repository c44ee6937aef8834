pub mod api;
pub mod config;
pub mod errors;
pub mod executor;
pub mod grid;
pub mod monitor;
pub mod orchestrator;
pub mod plan;
pub mod server;
pub mod store;
pub mod task;
pub mod telemetry;
