//! Adding and removing application units on a machine.
//!
//! Every machine-scoped service scales the same way: one unit per enrolled
//! machine. These steps are parameterised by application name rather than
//! duplicated per service.

use crate::cluster::ClusterApi;
use crate::controller::{ControllerApi, ControllerError};
use crate::engine::{Step, StepResult};
use crate::steps::UNIT_TIMEOUT;

/// Place a unit of an application on a machine and wait for it to settle.
///
/// The unit name is the payload; an already-placed unit surfaces its name
/// through the skip result.
pub struct AddUnitStep<'a> {
    controller: &'a dyn ControllerApi,
    app: String,
    model: String,
    machine_id: String,
    name: String,
    description: String,
}

impl<'a> AddUnitStep<'a> {
    pub fn new(controller: &'a dyn ControllerApi, app: &str, model: &str, machine_id: &str) -> Self {
        Self {
            controller,
            app: app.to_string(),
            model: model.to_string(),
            machine_id: machine_id.to_string(),
            name: format!("add-unit-{app}"),
            description: format!("Adding a {app} unit to the machine"),
        }
    }
}

impl Step for AddUnitStep<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.get_application(&self.app, &self.model) {
            Ok(application) => {
                match application
                    .units
                    .iter()
                    .find(|u| u.machine == self.machine_id)
                {
                    Some(unit) => StepResult::skipped_with(unit.name.clone()),
                    None => StepResult::completed(),
                }
            }
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let unit = match self
            .controller
            .add_unit(&self.app, &self.model, &self.machine_id)
        {
            Ok(unit) => unit,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        match self
            .controller
            .wait_unit_ready(&unit, &self.model, UNIT_TIMEOUT)
        {
            Ok(()) => StepResult::completed_with(unit),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Remove a node's unit of an application, if it has one.
pub struct RemoveUnitStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    app: String,
    model: String,
    node_name: String,
    name: String,
    description: String,
}

impl<'a> RemoveUnitStep<'a> {
    pub fn new(
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        app: &str,
        model: &str,
        node_name: &str,
    ) -> Self {
        Self {
            controller,
            cluster,
            app: app.to_string(),
            model: model.to_string(),
            node_name: node_name.to_string(),
            name: format!("remove-unit-{app}"),
            description: format!("Removing the node's {app} unit"),
        }
    }

    fn unit_on_node(&self) -> Option<String> {
        let info = self.cluster.get_node_info(&self.node_name).ok()?;
        if info.machine_id < 0 {
            return None;
        }
        let machine_id = info.machine_id.to_string();
        let application = self.controller.get_application(&self.app, &self.model).ok()?;
        application
            .units
            .iter()
            .find(|u| u.machine == machine_id)
            .map(|u| u.name.clone())
    }
}

impl Step for RemoveUnitStep<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_skip(&mut self) -> StepResult {
        match self.unit_on_node() {
            Some(_) => StepResult::completed(),
            None => StepResult::skipped(),
        }
    }

    fn run(&mut self) -> StepResult {
        let Some(unit) = self.unit_on_node() else {
            return StepResult::skipped();
        };
        match self.controller.remove_unit(&self.app, &unit, &self.model) {
            Ok(()) => StepResult::completed(),
            Err(ControllerError::UnitNotFound(_)) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResultStatus;
    use crate::steps::testing::{FakeCluster, FakeController};

    #[test]
    fn add_unit_places_and_waits() {
        let controller = FakeController::default();
        controller.add_application("controller", "k8s", "active");
        let mut step = AddUnitStep::new(&controller, "k8s", "controller", "2");

        assert_eq!(step.is_skip().status, ResultStatus::Completed);
        let result = step.run();
        assert_eq!(result.message.as_deref(), Some("k8s/0"));
        assert!(controller.calls().contains(&"wait-unit k8s/0".to_string()));
    }

    #[test]
    fn add_unit_skip_surfaces_existing_unit() {
        let controller = FakeController::default();
        controller.add_application("controller", "k8s", "active");
        controller.add_unit_record("controller", "k8s", "k8s/4", "2");
        let mut step = AddUnitStep::new(&controller, "k8s", "controller", "2");

        let result = step.is_skip();
        assert_eq!(result.status, ResultStatus::Skipped);
        assert_eq!(result.message.as_deref(), Some("k8s/4"));
    }

    #[test]
    fn add_unit_missing_application_fails() {
        let controller = FakeController::default();
        let mut step = AddUnitStep::new(&controller, "k8s", "controller", "2");
        assert!(step.is_skip().is_failed());
    }

    #[test]
    fn remove_unit_skips_node_without_unit() {
        let controller = FakeController::default();
        controller.add_application("controller", "k8s", "active");
        let cluster = FakeCluster::default();
        cluster.add_node("node2.example.com", &["control"], 2);

        let mut step = RemoveUnitStep::new(&controller, &cluster, "k8s", "controller", "node2.example.com");
        assert_eq!(step.is_skip().status, ResultStatus::Skipped);
    }

    #[test]
    fn remove_unit_removes_the_nodes_unit() {
        let controller = FakeController::default();
        controller.add_application("controller", "k8s", "active");
        controller.add_unit_record("controller", "k8s", "k8s/1", "2");
        let cluster = FakeCluster::default();
        cluster.add_node("node2.example.com", &["control"], 2);

        let mut step = RemoveUnitStep::new(&controller, &cluster, "k8s", "controller", "node2.example.com");
        assert_eq!(step.is_skip().status, ResultStatus::Completed);
        assert!(!step.run().is_failed());
        assert!(controller
            .get_application("k8s", "controller")
            .unwrap()
            .units
            .is_empty());
    }
}
