//! On-disk project layout and settings

pub mod env;
pub mod layout;
pub mod settings;
