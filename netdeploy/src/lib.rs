//! Netdeploy Library
//!
//! Concurrent, idempotent configuration deployment for network device fleets.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod inventory;
pub mod logs;
pub mod models;
pub mod render;
pub mod report;
pub mod retention;
pub mod session;
pub mod storage;
pub mod utils;
