//! Node lifecycle commands: add, join, list, remove.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::checks::{DaemonCheck, DataDirCheck, VerifyFqdnCheck};
use crate::cli::args::{
    effective_roles, AddArgs, JoinArgs, ListArgs, ListFormat, RemoveArgs, TokenFormat,
};
use crate::cluster::ServiceError;
use crate::config::roles_to_str_list;
use crate::controller::{Account, CONTROLLER, MACHINE_MODEL};
use crate::engine::{run_preflight_checks, Plan, PlanRunner, PreflightCheck, ResultStatus};
use crate::error::{CairnError, Result};
use crate::steps::cluster::{
    ClusterAddNodeStep, ClusterAddUserStep, ClusterJoinNodeStep, ClusterListNodesStep,
    ClusterRecordControllerStep, ClusterRemoveNodeStep, ClusterUpdateNodeStep, NodeListing,
};
use crate::steps::controller::{
    AddMachineStep, CreateUserStep, GrantModelAccessStep, LoginStep, RegisterUserStep,
    RemoveMachineStep, SaveAccountStep,
};
use crate::steps::storage::ConfigureStorageStep;
use crate::steps::terraform::TerraformInitStep;
use crate::steps::unit::{AddUnitStep, RemoveUnitStep};
use crate::steps::{hypervisor, k8s, node_agent, storage};
use crate::ui::{Table, Ui};

use super::{load_preseed, Deployment};

/// Invite a new node: issue a join token and prepare its controller user.
pub fn add(d: &Deployment<'_>, args: &AddArgs, ui: &Ui) -> Result<()> {
    let checks: Vec<Box<dyn PreflightCheck + '_>> = vec![
        Box::new(DaemonCheck::new(d.cluster)),
        Box::new(VerifyFqdnCheck::new(&args.name)),
    ];
    run_preflight_checks(&checks, ui)?;

    let runner = PlanRunner::new(ui);

    let plan: Plan = vec![
        Box::new(ClusterAddNodeStep::new(d.cluster, &args.name)),
        Box::new(CreateUserStep::new(d.controller, d.cluster, &args.name)),
        Box::new(GrantModelAccessStep::new(
            d.controller,
            &args.name,
            MACHINE_MODEL,
        )),
    ];
    let results = runner.run(plan)?;

    if let Some(result) = results.get(ClusterAddNodeStep::NAME) {
        if result.status == ResultStatus::Skipped && result.message.is_none() {
            ui.message(&format!(
                "{} is already a cluster member; no token to issue",
                args.name
            ));
            return Ok(());
        }
    }
    let join_token = results.require_message(ClusterAddNodeStep::NAME)?;
    let user_token = results.require_message(CreateUserStep::NAME)?;

    // Store the registration token where the joining node can fetch it.
    let plan: Plan = vec![Box::new(ClusterAddUserStep::new(
        d.cluster,
        &args.name,
        &user_token,
    ))];
    runner.run(plan)?;

    print_token(&args.name, &join_token, args.format, ui)?;
    Ok(())
}

#[derive(Serialize)]
struct TokenDocument<'a> {
    name: &'a str,
    token: &'a str,
}

fn print_token(name: &str, token: &str, format: TokenFormat, ui: &Ui) -> Result<()> {
    match format {
        TokenFormat::Default => ui.message(&format!(
            "Run 'cairn cluster join {token}' on {name} to join it to the deployment"
        )),
        TokenFormat::Value => println!("{token}"),
        TokenFormat::Yaml => {
            let doc = serde_yaml::to_string(&TokenDocument { name, token })
                .map_err(|e| CairnError::Other(anyhow::anyhow!("render token: {e}")))?;
            print!("{doc}");
        }
    }
    Ok(())
}

/// Join this node to an existing deployment with a token.
pub fn join(d: &Deployment<'_>, args: &JoinArgs, ui: &Ui) -> Result<()> {
    let roles = effective_roles(&args.roles);
    let role_list = roles_to_str_list(&roles);
    let is_control = roles.iter().any(|r| r.is_control_node());
    let is_compute = roles.iter().any(|r| r.is_compute_node());
    let is_storage = roles.iter().any(|r| r.is_storage_node());
    info!("joining {} with roles {:?}", d.fqdn, role_list);

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

    if is_compute {
        d.provisioner.stage(&[hypervisor::PLAN])?;
    }

    let runner = PlanRunner::new(ui);

    // Membership first; everything else needs the daemon's records.
    let plan: Plan = vec![
        Box::new(LoginStep::new(
            d.controller,
            d.settings.accounts_dir(),
            CONTROLLER,
        )),
        Box::new(ClusterJoinNodeStep::new(
            d.cluster,
            &d.fqdn,
            &d.address,
            &args.token,
            role_list.clone(),
        )),
    ];
    runner.run(plan)?;

    // After joining, the daemon's replicated config tells us which
    // controller this deployment registers against.
    let controller_name = ClusterRecordControllerStep::recorded_controller(d.cluster)
        .unwrap_or_else(|| CONTROLLER.to_string());

    // The inviting node stored our registration token in the daemon.
    let user_token = d.cluster.get_user_token(&d.fqdn).map_err(|e| match e {
        ServiceError::UserNotFound(_) => CairnError::StepFailed {
            step: RegisterUserStep::NAME.to_string(),
            message: format!(
                "no registration token stored for {}; run 'cairn cluster add {}' on an \
                 existing member first",
                d.fqdn, d.fqdn
            ),
        },
        e => e.into(),
    })?;

    // Register with the controller and enroll the machine.
    let plan: Plan = vec![
        Box::new(RegisterUserStep::new(
            d.controller,
            &user_token,
            &controller_name,
        )),
        Box::new(SaveAccountStep::new(
            d.settings.accounts_dir(),
            &controller_name,
            Account::new(d.fqdn.clone(), user_token.clone()),
        )),
        Box::new(AddMachineStep::new(
            d.controller,
            &d.fqdn,
            &d.address,
            MACHINE_MODEL,
        )),
    ];
    let results = runner.run(plan)?;
    let machine_id = results.require_message(AddMachineStep::NAME)?;
    let machine_id_num: i64 = machine_id.parse().map_err(|_| CairnError::StepFailed {
        step: AddMachineStep::NAME.to_string(),
        message: format!("controller returned machine id '{machine_id}'"),
    })?;

    // Place this node's units according to its roles.
    let mut plan: Plan = vec![
        Box::new(ClusterUpdateNodeStep::new(d.cluster, &d.fqdn, machine_id_num)),
        Box::new(AddUnitStep::new(
            d.controller,
            node_agent::APP,
            MACHINE_MODEL,
            &machine_id,
        )),
    ];
    if is_control {
        plan.push(Box::new(AddUnitStep::new(
            d.controller,
            k8s::APP,
            MACHINE_MODEL,
            &machine_id,
        )));
    }
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
            preseed,
            args.accept_defaults,
        )));
    }
    if is_compute {
        plan.push(Box::new(TerraformInitStep::new(
            d.provisioner,
            hypervisor::PLAN,
        )));
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
    runner.run(plan)?;

    ui.success(&format!("{} joined the deployment", d.fqdn));
    Ok(())
}

/// List the deployment's nodes.
pub fn list(d: &Deployment<'_>, args: &ListArgs, ui: &Ui) -> Result<()> {
    let checks: Vec<Box<dyn PreflightCheck + '_>> = vec![Box::new(DaemonCheck::new(d.cluster))];
    run_preflight_checks(&checks, ui)?;

    let runner = PlanRunner::new(ui);
    let plan: Plan = vec![Box::new(ClusterListNodesStep::new(d.cluster))];
    let results = runner.run(plan)?;
    let rendered = results.require_message(ClusterListNodesStep::NAME)?;

    match args.format {
        ListFormat::Yaml => print!("{rendered}"),
        ListFormat::Table => {
            let listing: BTreeMap<String, NodeListing> = serde_yaml::from_str(&rendered)
                .map_err(|e| CairnError::Other(anyhow::anyhow!("parse node list: {e}")))?;
            let mut table = Table::new(vec!["Node", "Status", "Roles", "Machine"]);
            for (name, node) in &listing {
                let machine = if node.machine_id < 0 {
                    "-".to_string()
                } else {
                    node.machine_id.to_string()
                };
                let roles = node.roles.join(",");
                table.add_row(vec![name, &node.status, &roles, &machine]);
            }
            println!("{}", table.render());
        }
    }
    Ok(())
}

/// Remove a node and all its traces from the deployment.
pub fn remove(d: &Deployment<'_>, args: &RemoveArgs, ui: &Ui) -> Result<()> {
    let checks: Vec<Box<dyn PreflightCheck + '_>> = vec![Box::new(DaemonCheck::new(d.cluster))];
    run_preflight_checks(&checks, ui)?;

    if let Ok(info) = d.cluster.get_node_info(&args.name) {
        if info.roles.iter().any(|r| r == "storage") && storage::storage_node_count(d.cluster)? <= 1
        {
            ui.warning("Removing the last storage node; stored data becomes unavailable");
        }
    }

    let runner = PlanRunner::new(ui);

    // Workload units first, then the machine, then the membership records.
    let plan: Plan = vec![
        Box::new(RemoveUnitStep::new(
            d.controller,
            d.cluster,
            k8s::APP,
            MACHINE_MODEL,
            &args.name,
        )),
        Box::new(RemoveUnitStep::new(
            d.controller,
            d.cluster,
            storage::APP,
            MACHINE_MODEL,
            &args.name,
        )),
        Box::new(RemoveUnitStep::new(
            d.controller,
            d.cluster,
            hypervisor::APP,
            MACHINE_MODEL,
            &args.name,
        )),
        Box::new(RemoveUnitStep::new(
            d.controller,
            d.cluster,
            node_agent::APP,
            MACHINE_MODEL,
            &args.name,
        )),
        Box::new(RemoveMachineStep::new(
            d.controller,
            d.cluster,
            &args.name,
            MACHINE_MODEL,
        )),
        Box::new(ClusterRemoveNodeStep::new(d.cluster, &args.name)),
    ];
    runner.run(plan)?;

    ui.success(&format!("Removed {} from the deployment", args.name));
    Ok(())
}
