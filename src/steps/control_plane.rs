//! Control plane deployment on the container platform cloud.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::cluster::{self, ClusterApi};
use crate::config::RAM_32_GB_IN_KB;
use crate::controller::{ControllerApi, CONTROL_PLANE_MODEL};
use crate::engine::{Step, StepResult};
use crate::provision::ProvisionerFactory;
use crate::steps::{k8s, APPLICATION_TIMEOUT};

pub const PLAN: &str = "deploy-control-plane";

/// Daemon config key holding the sizing decisions made at deploy time.
const CONFIG_KEY: &str = "control-plane-config";

/// Sizing decisions recorded at first deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    pub topology: String,
    pub database: String,
}

/// Resolve an `auto` sizing request against the machine's memory.
pub fn resolve_sizing(requested: &str, ram_kb: u64) -> String {
    if requested == "auto" {
        if ram_kb < RAM_32_GB_IN_KB {
            "single".to_string()
        } else {
            "multi".to_string()
        }
    } else {
        requested.to_string()
    }
}

/// Deploy the control plane services.
///
/// Topology and database sizing are resolved once and recorded in the
/// membership daemon; the database scale cannot be changed after the first
/// deployment and a differing request fails the plan.
pub struct DeployControlPlaneStep<'a> {
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    topology: String,
    database: String,
    ram_kb: u64,
}

impl<'a> DeployControlPlaneStep<'a> {
    pub const NAME: &'static str = "deploy-control-plane";

    pub fn new(
        factory: &'a dyn ProvisionerFactory,
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        topology: &str,
        database: &str,
        ram_kb: u64,
    ) -> Self {
        Self {
            factory,
            controller,
            cluster,
            topology: topology.to_string(),
            database: database.to_string(),
            ram_kb,
        }
    }
}

impl Step for DeployControlPlaneStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Deploying the control plane"
    }

    fn run(&mut self) -> StepResult {
        let resolved = ControlPlaneConfig {
            topology: resolve_sizing(&self.topology, self.ram_kb),
            database: resolve_sizing(&self.database, self.ram_kb),
        };
        debug!("control plane sizing: {:?}", resolved);

        let previous: Option<ControlPlaneConfig> =
            cluster::read_config(self.cluster, CONFIG_KEY).ok();
        if let Some(previous) = previous {
            if previous.database != resolved.database {
                return StepResult::failed(format!(
                    "database scale is {} and cannot be changed to {} after deployment",
                    previous.database, resolved.database
                ));
            }
        }
        if let Err(e) = cluster::update_config(self.cluster, CONFIG_KEY, &resolved) {
            return StepResult::failed(e.to_string());
        }

        let provisioner = match self.factory.create(PLAN) {
            Ok(provisioner) => provisioner,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        let mut tfvars: HashMap<String, serde_json::Value> = HashMap::new();
        tfvars.insert("topology".to_string(), json!(resolved.topology));
        tfvars.insert("database".to_string(), json!(resolved.database));
        tfvars.insert("cloud".to_string(), json!(k8s::CLOUD));
        if let Err(e) = provisioner.write_tfvars(&tfvars) {
            return StepResult::failed(e.to_string());
        }
        if let Err(e) = provisioner.apply() {
            return StepResult::failed(e.to_string());
        }

        match self
            .controller
            .wait_model_ready(CONTROL_PLANE_MODEL, APPLICATION_TIMEOUT)
        {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
