//! Terraform plan initialization.

use crate::engine::{Step, StepResult};
use crate::provision::ProvisionerFactory;

/// Initialize a staged Terraform plan (provider download, backend setup).
///
/// Init is idempotent, so the step always runs.
pub struct TerraformInitStep<'a> {
    factory: &'a dyn ProvisionerFactory,
    plan: String,
    name: String,
    description: String,
}

impl<'a> TerraformInitStep<'a> {
    pub fn new(factory: &'a dyn ProvisionerFactory, plan: &str) -> Self {
        Self {
            factory,
            plan: plan.to_string(),
            name: format!("terraform-init-{plan}"),
            description: format!("Initializing the {plan} plan"),
        }
    }
}

impl Step for TerraformInitStep<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&mut self) -> StepResult {
        let provisioner = match self.factory.create(&self.plan) {
            Ok(provisioner) => provisioner,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        match provisioner.init() {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::FakeProvisionerFactory;

    #[test]
    fn init_runs_against_the_named_plan() {
        let factory = FakeProvisionerFactory::default();
        let mut step = TerraformInitStep::new(&factory, "deploy-k8s");
        assert_eq!(step.name(), "terraform-init-deploy-k8s");
        assert!(!step.run().is_failed());
        assert_eq!(factory.applied(), vec!["init deploy-k8s"]);
    }
}
