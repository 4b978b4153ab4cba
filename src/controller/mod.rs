//! Deployment controller API.
//!
//! The controller manages models of machines and applications. cairn drives
//! it through the `conductor` CLI; the [`ControllerApi`] trait is the seam
//! the steps talk through so tests can substitute an in-memory fake.

pub mod account;
pub mod cli;

pub use account::Account;
pub use cli::ConductorCli;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name the controller is bootstrapped under.
pub const CONTROLLER: &str = "cairn-controller";

/// Model holding the machine-scoped applications (agent, k8s, storage).
pub const MACHINE_MODEL: &str = "controller";

/// Model holding the control-plane applications on the k8s cloud.
pub const CONTROL_PLANE_MODEL: &str = "control-plane";

/// Errors reported by the deployment controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("Controller '{0}' not found")]
    ControllerNotFound(String),

    #[error("Application '{0}' not found")]
    ApplicationNotFound(String),

    #[error("Unit '{0}' not found")]
    UnitNotFound(String),

    #[error("Machine '{0}' not found")]
    MachineNotFound(String),

    #[error("No leader found for application '{0}'")]
    LeaderNotFound(String),

    #[error("User '{0}' already exists")]
    UserAlreadyExists(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Could not parse controller output: {0}")]
    Parse(String),
}

/// A provisioned machine in a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
}

/// One running unit of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    /// Machine id the unit is placed on; empty for k8s-cloud units.
    #[serde(default)]
    pub machine: String,
}

/// An application and its units as the controller reports them.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub status: String,
    pub units: Vec<Unit>,
}

/// Operations the steps need from the deployment controller.
pub trait ControllerApi {
    /// Whether a controller with this name is registered locally.
    fn controller_exists(&self, name: &str) -> Result<bool, ControllerError>;

    /// Bootstrap a new controller onto a cloud.
    fn bootstrap(&self, cloud: &str, controller: &str) -> Result<(), ControllerError>;

    /// Refresh the local session for a saved account, if one exists.
    fn login(&self, user: &str) -> Result<(), ControllerError>;

    /// Create a controller user; returns a one-time registration token.
    fn create_user(&self, name: &str) -> Result<String, ControllerError>;

    /// Whether a controller user exists.
    fn user_exists(&self, name: &str) -> Result<bool, ControllerError>;

    /// Register this client against the controller with a token.
    fn register_user(&self, token: &str, controller: &str) -> Result<(), ControllerError>;

    /// Grant a user admin access on a model. Idempotent: granting access
    /// the user already holds is a no-op.
    fn grant_model_access(&self, user: &str, model: &str) -> Result<(), ControllerError>;

    /// Enroll a machine into a model; returns the assigned machine id.
    fn add_machine(&self, address: &str, model: &str) -> Result<String, ControllerError>;

    /// Machines currently in a model.
    fn list_machines(&self, model: &str) -> Result<Vec<Machine>, ControllerError>;

    /// Remove a machine from a model.
    fn remove_machine(&self, id: &str, model: &str) -> Result<(), ControllerError>;

    /// An application and its unit placement.
    fn get_application(&self, name: &str, model: &str) -> Result<Application, ControllerError>;

    /// Add a unit of an application on a specific machine; returns the new
    /// unit's name.
    fn add_unit(&self, app: &str, model: &str, machine_id: &str)
        -> Result<String, ControllerError>;

    /// Remove a named unit.
    fn remove_unit(&self, app: &str, unit: &str, model: &str) -> Result<(), ControllerError>;

    /// Block until the application reaches one of the accepted statuses.
    fn wait_application_ready(
        &self,
        app: &str,
        model: &str,
        accepted: &[&str],
        timeout_secs: u64,
    ) -> Result<(), ControllerError>;

    /// Block until the unit's workload reports active.
    fn wait_unit_ready(&self, unit: &str, model: &str, timeout_secs: u64)
        -> Result<(), ControllerError>;

    /// Block until every application in the model reports active.
    fn wait_model_ready(&self, model: &str, timeout_secs: u64) -> Result<(), ControllerError>;

    /// The leader unit of an application.
    fn get_leader_unit(&self, app: &str, model: &str) -> Result<String, ControllerError>;

    /// Run an action on a unit and return its result document.
    fn run_action(
        &self,
        unit: &str,
        model: &str,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ControllerError>;

    /// Names of clouds registered on the controller.
    fn get_clouds(&self) -> Result<Vec<String>, ControllerError>;

    /// Register a k8s cloud with its access credential.
    fn add_k8s_cloud(
        &self,
        name: &str,
        credential: &str,
        kubeconfig: &str,
    ) -> Result<(), ControllerError>;
}
