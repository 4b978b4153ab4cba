//! Node agent deployment.
//!
//! The agent is the first application on every machine; the other services
//! hang off it.

use std::collections::HashMap;

use serde_json::json;

use crate::controller::ControllerApi;
use crate::provision::ProvisionerFactory;
use crate::steps::deploy::DeployApplicationStep;

pub const APP: &str = "node-agent";
pub const PLAN: &str = "deploy-node-agent";

pub fn deploy_step<'a>(
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    model: &str,
) -> DeployApplicationStep<'a> {
    let mut tfvars = HashMap::new();
    tfvars.insert("machine_model".to_string(), json!(model));
    DeployApplicationStep::new(
        factory,
        controller,
        PLAN,
        APP,
        model,
        tfvars,
        &["active", "waiting"],
    )
}
