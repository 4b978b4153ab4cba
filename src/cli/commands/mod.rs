//! Command implementations.
//!
//! Each lifecycle command is a function taking a [`Deployment`] - the bundle
//! of collaborator handles and local facts every workflow needs. The handles
//! are trait objects so workflow tests can drive the commands against
//! in-memory fakes.

pub mod bootstrap;
pub mod node;

use crate::checks::{ConductorBinaryCheck, SystemRequirementsCheck, VerifyHypervisorHostnameCheck};
use crate::cluster::ClusterApi;
use crate::config::{Preseed, Settings};
use crate::controller::ControllerApi;
use crate::engine::PreflightCheck;
use crate::error::Result;
use crate::provision::ProvisionerFactory;
use crate::ui::Ui;

use super::args::ClusterCommands;

/// Builds the checks that inspect the machine itself: installed binaries,
/// hardware sizing, and (for compute nodes) the hypervisor hostname.
pub type HostChecks = fn(fqdn: &str, is_compute: bool) -> Vec<Box<dyn PreflightCheck>>;

/// The host checks run on real deployments.
pub fn host_checks(fqdn: &str, is_compute: bool) -> Vec<Box<dyn PreflightCheck>> {
    let mut checks: Vec<Box<dyn PreflightCheck>> = vec![
        Box::new(ConductorBinaryCheck),
        Box::new(SystemRequirementsCheck),
    ];
    if is_compute {
        checks.push(Box::new(VerifyHypervisorHostnameCheck::new(fqdn)));
    }
    checks
}

/// Collaborator handles and local facts for one invocation.
pub struct Deployment<'a> {
    /// Membership daemon client.
    pub cluster: &'a dyn ClusterApi,

    /// Deployment controller client.
    pub controller: &'a dyn ControllerApi,

    /// Terraform plan staging and execution.
    pub provisioner: &'a dyn ProvisionerFactory,

    /// Machine-inspecting preflight checks for bootstrap and join.
    pub host_checks: HostChecks,

    /// Resolved runtime settings.
    pub settings: Settings,

    /// This machine's fully qualified domain name.
    pub fqdn: String,

    /// This machine's default-route address.
    pub address: String,
}

/// Dispatch a cluster subcommand.
pub fn dispatch(deployment: &Deployment<'_>, command: &ClusterCommands, ui: &Ui) -> Result<()> {
    match command {
        ClusterCommands::Bootstrap(args) => bootstrap::run(deployment, args, ui),
        ClusterCommands::Add(args) => node::add(deployment, args, ui),
        ClusterCommands::Join(args) => node::join(deployment, args, ui),
        ClusterCommands::List(args) => node::list(deployment, args, ui),
        ClusterCommands::Remove(args) => node::remove(deployment, args, ui),
    }
}

fn load_preseed(path: Option<&std::path::Path>) -> Result<Option<Preseed>> {
    match path {
        Some(path) => Ok(Some(Preseed::load(path)?)),
        None => Ok(None),
    }
}
