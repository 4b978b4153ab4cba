//! The bootstrap workflow: turn a fresh machine into the first node of a
//! deployment.
//!
//! Composed as five sequential plans. The splits are commit points: a token
//! must come back from the controller before it can be stored, and a machine
//! id must be assigned before units can be placed. Re-invocation after a
//! failure resumes through each step's own skip check.

use tracing::info;

use crate::checks::{DaemonCheck, DataDirCheck, VerifyFqdnCheck};
use crate::cli::args::{effective_roles, BootstrapArgs};
use crate::config::roles_to_str_list;
use crate::controller::{Account, CONTROLLER, MACHINE_MODEL};
use crate::engine::{run_preflight_checks, Plan, PlanRunner, PreflightCheck};
use crate::error::{CairnError, Result};
use crate::host;
use crate::steps::cluster::{
    ClusterAddUserStep, ClusterInitStep, ClusterMarkBootstrappedStep, ClusterRecordControllerStep,
    ClusterUpdateNodeStep,
};
use crate::steps::control_plane::{self, DeployControlPlaneStep};
use crate::steps::controller::{
    AddMachineStep, BackupBootstrapAccountStep, BootstrapControllerStep, CreateUserStep,
    SaveAccountStep,
};
use crate::steps::k8s::{self, AddK8sCloudStep, DeployK8sApplicationStep, StoreK8sConfigStep};
use crate::steps::terraform::TerraformInitStep;
use crate::steps::unit::AddUnitStep;
use crate::steps::{hypervisor, node_agent, storage};
use crate::steps::storage::ConfigureStorageStep;
use crate::ui::Ui;

use super::{load_preseed, Deployment};

pub fn run(d: &Deployment<'_>, args: &BootstrapArgs, ui: &Ui) -> Result<()> {
    let roles = effective_roles(&args.roles);
    let role_list = roles_to_str_list(&roles);
    let is_control = roles.iter().any(|r| r.is_control_node());
    let is_compute = roles.iter().any(|r| r.is_compute_node());
    let is_storage = roles.iter().any(|r| r.is_storage_node());
    info!("bootstrapping {} with roles {:?}", d.fqdn, role_list);

    let preseed = load_preseed(args.preseed.as_deref())?;

    let mut checks: Vec<Box<dyn PreflightCheck + '_>> = vec![
        Box::new(DaemonCheck::new(d.cluster)),
        Box::new(DataDirCheck::new(d.settings.data_dir.clone())),
        Box::new(VerifyFqdnCheck::new(&d.fqdn)),
    ];
    for check in (d.host_checks)(&d.fqdn, is_compute) {
        checks.push(check);
    }
    run_preflight_checks(&checks, ui)?;

    let mut plans = vec![node_agent::PLAN, k8s::PLAN];
    if is_storage {
        plans.push(storage::PLAN);
    }
    if is_control {
        plans.push(control_plane::PLAN);
    }
    if is_compute {
        plans.push(hypervisor::PLAN);
    }
    d.provisioner.stage(&plans)?;

    let runner = PlanRunner::new(ui);

    // Found the cluster and the controller.
    let plan: Plan = vec![
        Box::new(ClusterInitStep::new(
            d.cluster,
            &d.fqdn,
            &d.address,
            role_list.clone(),
        )),
        Box::new(BootstrapControllerStep::new(
            d.controller,
            &d.settings.cloud_name,
            CONTROLLER,
        )),
    ];
    runner.run(plan)?;

    // Create this node's controller user; the token must come back before
    // it can be stored anywhere.
    let plan: Plan = vec![
        Box::new(ClusterRecordControllerStep::new(d.cluster, CONTROLLER)),
        Box::new(CreateUserStep::new(d.controller, d.cluster, &d.fqdn)),
    ];
    let results = runner.run(plan)?;
    let token = results.require_message(CreateUserStep::NAME)?;

    // Persist the credentials on both sides.
    let accounts_dir = d.settings.accounts_dir();
    let plan: Plan = vec![
        Box::new(ClusterAddUserStep::new(d.cluster, &d.fqdn, &token)),
        Box::new(SaveAccountStep::new(
            accounts_dir.clone(),
            CONTROLLER,
            Account::new(d.fqdn.clone(), token.clone()),
        )),
        Box::new(BackupBootstrapAccountStep::new(accounts_dir, CONTROLLER)),
    ];
    runner.run(plan)?;

    // Deploy the machine applications and enroll this machine.
    let mut plan: Plan = vec![
        Box::new(TerraformInitStep::new(d.provisioner, node_agent::PLAN)),
        Box::new(node_agent::deploy_step(
            d.provisioner,
            d.controller,
            MACHINE_MODEL,
        )),
        Box::new(TerraformInitStep::new(d.provisioner, k8s::PLAN)),
        Box::new(DeployK8sApplicationStep::new(
            d.provisioner,
            d.controller,
            d.cluster,
            MACHINE_MODEL,
            preseed.clone(),
            args.accept_defaults,
        )),
    ];
    if is_storage {
        plan.push(Box::new(TerraformInitStep::new(d.provisioner, storage::PLAN)));
        plan.push(Box::new(storage::deploy_step(
            d.provisioner,
            d.controller,
            MACHINE_MODEL,
        )));
    }
    if is_control {
        plan.push(Box::new(TerraformInitStep::new(
            d.provisioner,
            control_plane::PLAN,
        )));
    }
    if is_compute {
        plan.push(Box::new(TerraformInitStep::new(
            d.provisioner,
            hypervisor::PLAN,
        )));
    }
    plan.push(Box::new(AddMachineStep::new(
        d.controller,
        &d.fqdn,
        &d.address,
        MACHINE_MODEL,
    )));
    let results = runner.run(plan)?;
    let machine_id = results.require_message(AddMachineStep::NAME)?;
    let machine_id_num: i64 = machine_id.parse().map_err(|_| CairnError::StepFailed {
        step: AddMachineStep::NAME.to_string(),
        message: format!("controller returned machine id '{machine_id}'"),
    })?;

    // Place units and bring up the role-specific services.
    let mut plan: Plan = vec![
        Box::new(ClusterUpdateNodeStep::new(d.cluster, &d.fqdn, machine_id_num)),
        Box::new(AddUnitStep::new(
            d.controller,
            node_agent::APP,
            MACHINE_MODEL,
            &machine_id,
        )),
        Box::new(AddUnitStep::new(
            d.controller,
            k8s::APP,
            MACHINE_MODEL,
            &machine_id,
        )),
        Box::new(StoreK8sConfigStep::new(d.controller, d.cluster, MACHINE_MODEL)),
        Box::new(AddK8sCloudStep::new(d.controller, d.cluster)),
    ];
    if is_storage {
        plan.push(Box::new(AddUnitStep::new(
            d.controller,
            storage::APP,
            MACHINE_MODEL,
            &machine_id,
        )));
        plan.push(Box::new(ConfigureStorageStep::new(
            d.controller,
            d.cluster,
            &d.fqdn,
            MACHINE_MODEL,
            preseed.clone(),
            args.accept_defaults,
        )));
    }
    if is_control {
        let ram_kb = host::total_ram_kb()?;
        plan.push(Box::new(DeployControlPlaneStep::new(
            d.provisioner,
            d.controller,
            d.cluster,
            &args.topology,
            &args.database,
            ram_kb,
        )));
    }
    if is_compute {
        plan.push(Box::new(hypervisor::deploy_step(
            d.provisioner,
            d.controller,
            MACHINE_MODEL,
        )));
        plan.push(Box::new(AddUnitStep::new(
            d.controller,
            hypervisor::APP,
            MACHINE_MODEL,
            &machine_id,
        )));
    }
    plan.push(Box::new(ClusterMarkBootstrappedStep::new(d.cluster)));
    runner.run(plan)?;

    ui.success("Bootstrap complete");
    Ok(())
}
