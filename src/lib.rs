//! Command-line front end of the ScriptFlow dashboard state layer.
//!
//! Exposes configuration and replay for integration testing.

pub mod config;
pub mod replay;

pub use config::{load_config, DashConfig};
pub use replay::{replay, ReplayBundle, ReplayReport};
