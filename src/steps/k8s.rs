//! Container platform deployment and cloud registration.

use std::collections::HashMap;

use anyhow::anyhow;
use dialoguer::Input;
use serde_json::{json, Value};
use tracing::debug;

use crate::cluster::{self, ClusterApi, ServiceError};
use crate::config::Preseed;
use crate::controller::{ControllerApi, ControllerError};
use crate::engine::{Step, StepResult};
use crate::error::{CairnError, Result};
use crate::provision::ProvisionerFactory;
use crate::steps::APPLICATION_TIMEOUT;

pub const APP: &str = "k8s";
pub const PLAN: &str = "deploy-k8s";

/// Cloud name the container platform is registered under.
pub const CLOUD: &str = "cairn-k8s";
pub const CLOUD_CREDENTIAL: &str = "cairn-k8s-credential";

/// Daemon config key holding the operator's addon answers.
const ADDONS_CONFIG_KEY: &str = "k8s-addons";

/// Daemon config key holding the cluster access document.
const KUBECONFIG_KEY: &str = "k8s-kubeconfig";

const DEFAULT_LB_RANGE: &str = "10.20.21.10-10.20.21.20";

/// Deploy the container platform, prompting for addon configuration.
///
/// Answers are stored in the membership daemon so re-invocations and other
/// nodes prompt with the previously chosen values as defaults.
pub struct DeployK8sApplicationStep<'a> {
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    model: String,
    preseed: Option<Preseed>,
    accept_defaults: bool,
    answers: HashMap<String, String>,
}

impl<'a> DeployK8sApplicationStep<'a> {
    pub const NAME: &'static str = "deploy-k8s";

    pub fn new(
        factory: &'a dyn ProvisionerFactory,
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        model: &str,
        preseed: Option<Preseed>,
        accept_defaults: bool,
    ) -> Self {
        Self {
            factory,
            controller,
            cluster,
            model: model.to_string(),
            preseed,
            accept_defaults,
            answers: HashMap::new(),
        }
    }

    fn previous_answers(&self) -> HashMap<String, String> {
        cluster::read_config(self.cluster, ADDONS_CONFIG_KEY).unwrap_or_default()
    }
}

impl Step for DeployK8sApplicationStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Deploying the container platform"
    }

    fn has_prompts(&self) -> bool {
        true
    }

    fn prompt(&mut self) -> Result<()> {
        let previous = self.previous_answers();
        let default = previous
            .get("load_balancer_range")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LB_RANGE.to_string());

        let preseeded = self
            .preseed
            .as_ref()
            .and_then(|p| p.addons.get("load_balancer_range").cloned());

        let range = if let Some(range) = preseeded {
            range
        } else if self.accept_defaults {
            default
        } else {
            Input::new()
                .with_prompt("Load balancer address range")
                .default(default)
                .interact_text()
                .map_err(|e| CairnError::Other(anyhow!("prompt failed: {e}")))?
        };

        self.answers.insert("load_balancer_range".to_string(), range);
        Ok(())
    }

    fn is_skip(&mut self) -> StepResult {
        // Re-apply when the answers changed even if the application is up.
        match self.controller.get_application(APP, &self.model) {
            Ok(application)
                if application.status == "active" && self.answers == self.previous_answers() =>
            {
                StepResult::skipped()
            }
            Ok(_) => StepResult::completed(),
            Err(ControllerError::ApplicationNotFound(_)) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        if let Err(e) = cluster::update_config(self.cluster, ADDONS_CONFIG_KEY, &self.answers) {
            return StepResult::failed(e.to_string());
        }

        let provisioner = match self.factory.create(PLAN) {
            Ok(provisioner) => provisioner,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        let mut tfvars: HashMap<String, Value> = HashMap::new();
        tfvars.insert("addons".to_string(), json!(self.answers));
        if let Err(e) = provisioner.write_tfvars(&tfvars) {
            return StepResult::failed(e.to_string());
        }
        if let Err(e) = provisioner.apply() {
            return StepResult::failed(e.to_string());
        }
        match self.controller.wait_application_ready(
            APP,
            &self.model,
            &["active"],
            APPLICATION_TIMEOUT,
        ) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Fetch the cluster access document from the platform leader and store it
/// in the membership daemon.
pub struct StoreK8sConfigStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    model: String,
}

impl<'a> StoreK8sConfigStep<'a> {
    pub const NAME: &'static str = "store-k8s-config";

    pub fn new(controller: &'a dyn ControllerApi, cluster: &'a dyn ClusterApi, model: &str) -> Self {
        Self {
            controller,
            cluster,
            model: model.to_string(),
        }
    }
}

impl Step for StoreK8sConfigStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Storing the container platform credentials"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.cluster.get_config(KUBECONFIG_KEY) {
            Ok(_) => StepResult::skipped(),
            Err(ServiceError::ConfigNotFound(_)) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let leader = match self.controller.get_leader_unit(APP, &self.model) {
            Ok(leader) => leader,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        debug!("fetching kubeconfig from {}", leader);
        let results = match self
            .controller
            .run_action(&leader, &self.model, "kubeconfig", &json!({}))
        {
            Ok(results) => results,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        let kubeconfig = match results.get("kubeconfig").and_then(Value::as_str) {
            Some(kubeconfig) => kubeconfig,
            None => return StepResult::failed("kubeconfig action returned no document"),
        };
        match self.cluster.update_config(KUBECONFIG_KEY, kubeconfig) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Register the container platform as a cloud on the controller.
pub struct AddK8sCloudStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
}

impl<'a> AddK8sCloudStep<'a> {
    pub const NAME: &'static str = "add-k8s-cloud";

    pub fn new(controller: &'a dyn ControllerApi, cluster: &'a dyn ClusterApi) -> Self {
        Self { controller, cluster }
    }
}

impl Step for AddK8sCloudStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Registering the container platform as a cloud"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.get_clouds() {
            Ok(clouds) if clouds.iter().any(|c| c == CLOUD) => StepResult::skipped(),
            Ok(_) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let kubeconfig = match self.cluster.get_config(KUBECONFIG_KEY) {
            Ok(kubeconfig) => kubeconfig,
            Err(e) => return StepResult::failed(format!("no stored kubeconfig: {e}")),
        };
        match self
            .controller
            .add_k8s_cloud(CLOUD, CLOUD_CREDENTIAL, &kubeconfig)
        {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
