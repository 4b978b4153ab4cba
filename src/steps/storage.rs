//! Storage service deployment and per-node device configuration.

use std::collections::HashMap;

use anyhow::anyhow;
use dialoguer::Input;
use serde_json::json;

use crate::cluster::{ClusterApi, ServiceError};
use crate::config::Preseed;
use crate::controller::ControllerApi;
use crate::engine::{Step, StepResult};
use crate::error::{CairnError, Result};
use crate::provision::ProvisionerFactory;
use crate::steps::deploy::DeployApplicationStep;

pub const APP: &str = "storage";
pub const PLAN: &str = "deploy-storage";

/// Deploy the storage application itself; device enrollment is separate.
pub fn deploy_step<'a>(
    factory: &'a dyn ProvisionerFactory,
    controller: &'a dyn ControllerApi,
    model: &str,
) -> DeployApplicationStep<'a> {
    let mut tfvars = HashMap::new();
    tfvars.insert("machine_model".to_string(), json!(model));
    // Blocked is acceptable: the application waits for devices.
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

fn devices_key(node_name: &str) -> String {
    format!("storage-devices-{node_name}")
}

/// Enroll a node's disks into the storage service.
///
/// The chosen device list is stored in the membership daemon per node, both
/// to pre-fill re-invocation prompts and to make the skip check possible.
pub struct ConfigureStorageStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    node_name: String,
    model: String,
    preseed: Option<Preseed>,
    accept_defaults: bool,
    devices: String,
}

impl<'a> ConfigureStorageStep<'a> {
    pub const NAME: &'static str = "configure-storage";

    pub fn new(
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        node_name: &str,
        model: &str,
        preseed: Option<Preseed>,
        accept_defaults: bool,
    ) -> Self {
        Self {
            controller,
            cluster,
            node_name: node_name.to_string(),
            model: model.to_string(),
            preseed,
            accept_defaults,
            devices: String::new(),
        }
    }

    fn stored_devices(&self) -> Option<String> {
        self.cluster.get_config(&devices_key(&self.node_name)).ok()
    }

    fn node_unit(&self) -> Option<String> {
        let info = self.cluster.get_node_info(&self.node_name).ok()?;
        if info.machine_id < 0 {
            return None;
        }
        let machine_id = info.machine_id.to_string();
        let application = self.controller.get_application(APP, &self.model).ok()?;
        application
            .units
            .iter()
            .find(|u| u.machine == machine_id)
            .map(|u| u.name.clone())
    }
}

impl Step for ConfigureStorageStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Enrolling storage devices"
    }

    fn has_prompts(&self) -> bool {
        true
    }

    fn prompt(&mut self) -> Result<()> {
        let previous = self.stored_devices().unwrap_or_default();

        let preseeded = self
            .preseed
            .as_ref()
            .and_then(|p| p.storage.get("osd_devices").cloned());

        self.devices = if let Some(devices) = preseeded {
            devices
        } else if self.accept_defaults {
            previous
        } else {
            Input::new()
                .with_prompt("Disks to enroll (comma separated)")
                .default(previous)
                .interact_text()
                .map_err(|e| CairnError::Other(anyhow!("prompt failed: {e}")))?
        };
        Ok(())
    }

    fn is_skip(&mut self) -> StepResult {
        if self.devices.is_empty() {
            // Nothing requested and nothing preseeded.
            return StepResult::skipped();
        }
        match self.stored_devices() {
            Some(stored) if stored == self.devices => StepResult::skipped_with(stored),
            _ => StepResult::completed(),
        }
    }

    fn run(&mut self) -> StepResult {
        let Some(unit) = self.node_unit() else {
            return StepResult::failed(format!(
                "no storage unit found for {}",
                self.node_name
            ));
        };
        let params = json!({"device-id": self.devices});
        if let Err(e) = self
            .controller
            .run_action(&unit, &self.model, "add-osd", &params)
        {
            return StepResult::failed(e.to_string());
        }
        match self
            .cluster
            .update_config(&devices_key(&self.node_name), &self.devices)
        {
            Ok(()) => StepResult::completed_with(self.devices.clone()),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Count of nodes currently holding the storage role.
pub fn storage_node_count(cluster: &dyn ClusterApi) -> std::result::Result<usize, ServiceError> {
    Ok(cluster.list_nodes_by_role("storage")?.len())
}
