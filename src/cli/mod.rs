//! Command-line interface.

pub mod args;
pub mod commands;

pub use args::{Cli, ClusterCommands, Commands};
pub use commands::Deployment;
