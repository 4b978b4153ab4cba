//! Cairn - small-cluster lifecycle orchestration.
//!
//! Cairn turns a handful of machines into a managed cluster: the first node
//! is bootstrapped into a one-node deployment, further nodes are invited
//! with join tokens, and nodes can be listed and removed again. Every
//! lifecycle command is expressed as sequential plans of idempotent steps,
//! so an interrupted command can simply be run again.
//!
//! # Modules
//!
//! - [`checks`] - Preflight checks run before any workflow starts
//! - [`cli`] - Command-line interface and the lifecycle commands
//! - [`cluster`] - REST client for the membership daemon
//! - [`config`] - Settings, node roles, and preseed files
//! - [`controller`] - Deployment controller client and saved accounts
//! - [`engine`] - The step, plan, and preflight execution machinery
//! - [`error`] - Error types and result alias
//! - [`host`] - Local machine facts (FQDN, address, RAM, cores)
//! - [`logging`] - Log file management and tracing setup
//! - [`provision`] - Terraform plan staging and execution
//! - [`shell`] - External command execution
//! - [`steps`] - The concrete lifecycle steps composed into plans
//! - [`ui`] - Status spinners, messages, and table rendering

pub mod checks;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
pub mod provision;
pub mod shell;
pub mod steps;
pub mod ui;

pub use error::{CairnError, Result};
