//! Hypervisor deployment for compute nodes.

use std::collections::HashMap;

use serde_json::json;

use crate::controller::ControllerApi;
use crate::provision::ProvisionerFactory;
use crate::steps::deploy::DeployApplicationStep;

pub const APP: &str = "hypervisor";
pub const PLAN: &str = "deploy-hypervisor";

pub fn deploy_step<'a>(
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    model: &str,
) -> DeployApplicationStep<'a> {
    let mut tfvars = HashMap::new();
    tfvars.insert("machine_model".to_string(), json!(model));
    // Blocked is acceptable until the control plane is reachable.
    DeployApplicationStep::new(
        factory,
        controller,
        PLAN,
        APP,
        model,
        tfvars,
        &["active", "blocked", "waiting"],
    )
}
