//! Generic Terraform-backed application deployment.

use std::collections::HashMap;

use serde_json::Value;

use crate::controller::{ControllerApi, ControllerError};
use crate::engine::{Step, StepResult};
use crate::provision::ProvisionerFactory;
use crate::steps::APPLICATION_TIMEOUT;

/// Apply a Terraform plan and wait for the resulting application to settle.
///
/// Deploy steps for services without operator prompts are all instances of
/// this; services that gather answers first wrap it.
pub struct DeployApplicationStep<'a> {
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    plan: String,
    app: String,
    model: String,
    tfvars: HashMap<String, Value>,
    accepted: Vec<String>,
    name: String,
    description: String,
}

impl<'a> DeployApplicationStep<'a> {
    pub fn new(
        factory: &'a dyn ProvisionerFactory,
        controller: &'a dyn ControllerApi,
        plan: &str,
        app: &str,
        model: &str,
        tfvars: HashMap<String, Value>,
        accepted: &[&str],
    ) -> Self {
        Self {
            factory,
            controller,
            plan: plan.to_string(),
            app: app.to_string(),
            model: model.to_string(),
            tfvars,
            accepted: accepted.iter().map(|s| s.to_string()).collect(),
            name: format!("deploy-{app}"),
            description: format!("Deploying {app}"),
        }
    }
}

impl Step for DeployApplicationStep<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.get_application(&self.app, &self.model) {
            Ok(application) if application.status == "active" => StepResult::skipped(),
            Ok(_) => StepResult::completed(),
            Err(ControllerError::ApplicationNotFound(_)) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let provisioner = match self.factory.create(&self.plan) {
            Ok(provisioner) => provisioner,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        if let Err(e) = provisioner.write_tfvars(&self.tfvars) {
            return StepResult::failed(e.to_string());
        }
        if let Err(e) = provisioner.apply() {
            return StepResult::failed(e.to_string());
        }
        let accepted: Vec<&str> = self.accepted.iter().map(String::as_str).collect();
        match self.controller.wait_application_ready(
            &self.app,
            &self.model,
            &accepted,
            APPLICATION_TIMEOUT,
        ) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
