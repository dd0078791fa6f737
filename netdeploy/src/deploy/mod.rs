//! Deployment engine

pub mod backup;
pub mod delta;
pub mod fsm;
pub mod orchestrator;
pub mod task;
pub mod validate;

/// Operational command printing the running configuration as `set` lines
pub const RUNNING_CONFIG_COMMAND: &str = "show configuration commands";
