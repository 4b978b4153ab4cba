//! Infrastructure provisioning via Terraform.
//!
//! Each application family ships a Terraform plan under the template
//! directory. Plans are staged into the writable data area before use, then
//! initialized and applied with variables written to an auto-tfvars file so
//! re-application picks up the same answers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::host;
use crate::shell::{execute, CommandOptions};

/// File Terraform loads automatically on every apply.
pub const AUTO_TFVARS: &str = "terraform.auto.tfvars.json";

/// Errors from the provisioning layer.
#[derive(Debug, Error)]
pub enum TerraformError {
    #[error("terraform {operation} failed in {plan}: {stderr}")]
    CommandFailed {
        operation: String,
        plan: String,
        stderr: String,
    },

    #[error("plan '{0}' is not staged")]
    PlanNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad tfvars document: {0}")]
    Vars(#[from] serde_json::Error),
}

/// One staged provisioning plan, ready to initialize and apply.
pub trait Provisioner {
    /// Download providers and prepare the working directory.
    fn init(&self) -> Result<(), TerraformError>;

    /// Apply the plan with whatever variables are on disk.
    fn apply(&self) -> Result<(), TerraformError>;

    /// Merge variables into the plan's auto-tfvars file.
    fn write_tfvars(&self, vars: &HashMap<String, Value>) -> Result<(), TerraformError>;

    /// Variables currently recorded in the auto-tfvars file.
    fn read_tfvars(&self) -> Result<HashMap<String, Value>, TerraformError>;
}

/// Creates [`Provisioner`]s and stages plan templates.
///
/// The factory is the seam tests substitute: workflow tests hand out fake
/// provisioners that record applies instead of running Terraform.
pub trait ProvisionerFactory {
    /// Copy the named plan templates into the writable data area.
    fn stage(&self, plans: &[&str]) -> Result<(), TerraformError>;

    /// A provisioner rooted at the staged copy of `plan`.
    fn create(&self, plan: &str) -> Result<Box<dyn Provisioner>, TerraformError>;
}

/// Runs the `terraform` binary inside a staged plan directory.
pub struct TerraformClient {
    plan: String,
    dir: PathBuf,
    env: HashMap<String, String>,
}

impl TerraformClient {
    pub fn new(plan: &str, dir: PathBuf, env: HashMap<String, String>) -> Self {
        Self {
            plan: plan.to_string(),
            dir,
            env,
        }
    }

    fn terraform(&self, operation: &str, args: &[&str]) -> Result<(), TerraformError> {
        let options = CommandOptions {
            cwd: Some(self.dir.clone()),
            env: self.env.clone(),
        };
        info!("terraform {} in {}", operation, self.plan);
        let result = execute("terraform", args, &options)?;
        if !result.success {
            return Err(TerraformError::CommandFailed {
                operation: operation.to_string(),
                plan: self.plan.clone(),
                stderr: result.stderr.trim().to_string(),
            });
        }
        debug!("terraform {} done in {:?}", operation, result.duration);
        Ok(())
    }

    fn tfvars_path(&self) -> PathBuf {
        self.dir.join(AUTO_TFVARS)
    }
}

impl Provisioner for TerraformClient {
    fn init(&self) -> Result<(), TerraformError> {
        self.terraform("init", &["init", "-input=false", "-no-color"])
    }

    fn apply(&self) -> Result<(), TerraformError> {
        self.terraform(
            "apply",
            &["apply", "-auto-approve", "-input=false", "-no-color"],
        )
    }

    fn write_tfvars(&self, vars: &HashMap<String, Value>) -> Result<(), TerraformError> {
        let mut merged = self.read_tfvars()?;
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        let text = serde_json::to_string_pretty(&merged)?;
        std::fs::write(self.tfvars_path(), text)?;
        Ok(())
    }

    fn read_tfvars(&self) -> Result<HashMap<String, Value>, TerraformError> {
        match std::fs::read_to_string(self.tfvars_path()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stages plans from the install templates and builds real Terraform clients.
pub struct TerraformFactory {
    template_dir: PathBuf,
    stage_dir: PathBuf,
    env: HashMap<String, String>,
}

impl TerraformFactory {
    /// `template_dir` is the read-only install area; `stage_dir` is where
    /// plans are copied for execution (the settings `etc` area).
    pub fn new(template_dir: PathBuf, stage_dir: PathBuf, env: HashMap<String, String>) -> Self {
        Self {
            template_dir,
            stage_dir,
            env,
        }
    }

    fn staged(&self, plan: &str) -> PathBuf {
        self.stage_dir.join(plan)
    }
}

impl ProvisionerFactory for TerraformFactory {
    fn stage(&self, plans: &[&str]) -> Result<(), TerraformError> {
        for plan in plans {
            let src = self.template_dir.join(plan);
            if !src.is_dir() {
                return Err(TerraformError::PlanNotFound((*plan).to_string()));
            }
            let dst = self.staged(plan);
            debug!("staging plan {} -> {}", src.display(), dst.display());
            host::copy_dir_all(&src, &dst)?;
        }
        Ok(())
    }

    fn create(&self, plan: &str) -> Result<Box<dyn Provisioner>, TerraformError> {
        let dir = self.staged(plan);
        if !dir.is_dir() {
            return Err(TerraformError::PlanNotFound(plan.to_string()));
        }
        Ok(Box::new(TerraformClient::new(plan, dir, self.env.clone())))
    }
}
