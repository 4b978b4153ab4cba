//! CLI argument definitions.
//!
//! All arguments are defined with clap's derive macros; [`Cli`] is the
//! entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Role;

/// Cairn - small-cluster lifecycle orchestration.
#[derive(Debug, Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage cluster membership and node lifecycle
    Cluster(ClusterArgs),
}

#[derive(Debug, clap::Args)]
pub struct ClusterArgs {
    #[command(subcommand)]
    pub command: ClusterCommands,
}

#[derive(Debug, Subcommand)]
pub enum ClusterCommands {
    /// Set up the first node of a new deployment
    Bootstrap(BootstrapArgs),

    /// Generate a join token for a new node
    Add(AddArgs),

    /// Join this node to an existing deployment
    Join(JoinArgs),

    /// List the nodes of the deployment
    List(ListArgs),

    /// Remove a node from the deployment
    Remove(RemoveArgs),
}

/// Arguments for `cluster bootstrap`.
#[derive(Debug, Clone, clap::Args)]
pub struct BootstrapArgs {
    /// Roles this node takes (repeat or comma-separate; default control,compute)
    #[arg(long = "role", value_delimiter = ',')]
    pub roles: Vec<Role>,

    /// Control plane scale
    #[arg(long, default_value = "auto", value_parser = ["auto", "single", "multi", "large"])]
    pub topology: String,

    /// Database scale
    #[arg(long, default_value = "auto", value_parser = ["auto", "single", "multi"])]
    pub database: String,

    /// Answer file bypassing interactive prompts
    #[arg(short, long)]
    pub preseed: Option<PathBuf>,

    /// Accept default answers, no prompts
    #[arg(short, long)]
    pub accept_defaults: bool,
}

/// Arguments for `cluster add`.
#[derive(Debug, Clone, clap::Args)]
pub struct AddArgs {
    /// Fully qualified name of the node to invite
    pub name: String,

    /// How to print the join token
    #[arg(short, long, value_enum, default_value_t = TokenFormat::Default)]
    pub format: TokenFormat,
}

/// Arguments for `cluster join`.
#[derive(Debug, Clone, clap::Args)]
pub struct JoinArgs {
    /// Join token issued by `cluster add` on an existing node
    pub token: String,

    /// Roles this node takes (repeat or comma-separate; default control,compute)
    #[arg(long = "role", value_delimiter = ',')]
    pub roles: Vec<Role>,

    /// Answer file bypassing interactive prompts
    #[arg(short, long)]
    pub preseed: Option<PathBuf>,

    /// Accept default answers, no prompts
    #[arg(short, long)]
    pub accept_defaults: bool,
}

/// Arguments for `cluster list`.
#[derive(Debug, Clone, clap::Args)]
pub struct ListArgs {
    /// Output rendering
    #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
    pub format: ListFormat,
}

/// Arguments for `cluster remove`.
#[derive(Debug, Clone, clap::Args)]
pub struct RemoveArgs {
    /// Fully qualified name of the node to remove
    pub name: String,
}

/// Join token output renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenFormat {
    /// A sentence with the token embedded
    Default,
    /// The bare token
    Value,
    /// A YAML document
    Yaml,
}

/// Node list output renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Aligned table
    Table,
    /// Raw YAML
    Yaml,
}

/// The role set to use when none was given on the command line.
///
/// Repeated roles collapse to one, keeping first-seen order.
pub fn effective_roles(requested: &[Role]) -> Vec<Role> {
    if requested.is_empty() {
        return vec![Role::Control, Role::Compute];
    }
    let mut roles = Vec::new();
    for role in requested {
        if !roles.contains(role) {
            roles.push(*role);
        }
    }
    roles
}
