//! Steps acting on the deployment controller.

use std::path::PathBuf;

use tracing::debug;

use crate::cluster::{ClusterApi, ServiceError};
use crate::controller::{account, Account, ControllerApi, ControllerError};
use crate::engine::{Step, StepResult};

/// Bootstrap the deployment controller onto the local cloud.
pub struct BootstrapControllerStep<'a> {
    controller: &'a dyn ControllerApi,
    cloud: String,
    name: String,
}

impl<'a> BootstrapControllerStep<'a> {
    pub const NAME: &'static str = "bootstrap-controller";

    pub fn new(controller: &'a dyn ControllerApi, cloud: &str, name: &str) -> Self {
        Self {
            controller,
            cloud: cloud.to_string(),
            name: name.to_string(),
        }
    }
}

impl Step for BootstrapControllerStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Bootstrapping the deployment controller"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.controller_exists(&self.name) {
            Ok(true) => StepResult::skipped(),
            Ok(false) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.controller.bootstrap(&self.cloud, &self.name) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Create a controller user for a node.
///
/// The registration token is the payload. On re-invocation the token is
/// recovered from the membership daemon; a user that exists without a
/// stored token is unrecoverable and fails the plan.
pub struct CreateUserStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    username: String,
}

impl<'a> CreateUserStep<'a> {
    pub const NAME: &'static str = "create-user";

    pub fn new(
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        username: &str,
    ) -> Self {
        Self {
            controller,
            cluster,
            username: username.to_string(),
        }
    }
}

impl Step for CreateUserStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Creating a controller user for the node"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.user_exists(&self.username) {
            Ok(false) => StepResult::completed(),
            Ok(true) => match self.cluster.get_user_token(&self.username) {
                Ok(token) => StepResult::skipped_with(token),
                Err(ServiceError::UserNotFound(_)) => StepResult::failed(format!(
                    "controller user {} exists but its registration token was never stored; \
                     remove the user and retry",
                    self.username
                )),
                Err(e) => StepResult::failed(e.to_string()),
            },
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.controller.create_user(&self.username) {
            Ok(token) => StepResult::completed_with(token),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Register this client against the controller with a token.
pub struct RegisterUserStep<'a> {
    controller: &'a dyn ControllerApi,
    token: String,
    controller_name: String,
}

impl<'a> RegisterUserStep<'a> {
    pub const NAME: &'static str = "register-user";

    pub fn new(controller: &'a dyn ControllerApi, token: &str, controller_name: &str) -> Self {
        Self {
            controller,
            token: token.to_string(),
            controller_name: controller_name.to_string(),
        }
    }
}

impl Step for RegisterUserStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Registering with the controller"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.controller_exists(&self.controller_name) {
            Ok(true) => StepResult::skipped(),
            Ok(false) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self
            .controller
            .register_user(&self.token, &self.controller_name)
        {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Refresh the controller session from a previously saved account.
pub struct LoginStep<'a> {
    controller: &'a dyn ControllerApi,
    accounts_dir: PathBuf,
    controller_name: String,
}

impl<'a> LoginStep<'a> {
    pub const NAME: &'static str = "login";

    pub fn new(
        controller: &'a dyn ControllerApi,
        accounts_dir: PathBuf,
        controller_name: &str,
    ) -> Self {
        Self {
            controller,
            accounts_dir,
            controller_name: controller_name.to_string(),
        }
    }
}

impl Step for LoginStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Logging in to the controller"
    }

    fn is_skip(&mut self) -> StepResult {
        match account::load_account(&self.accounts_dir, &self.controller_name) {
            Ok(Some(_)) => StepResult::completed(),
            // Nothing saved yet: first invocation on this node.
            Ok(None) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let saved = match account::load_account(&self.accounts_dir, &self.controller_name) {
            Ok(Some(saved)) => saved,
            Ok(None) => return StepResult::skipped(),
            Err(e) => return StepResult::failed(e.to_string()),
        };
        match self.controller.login(&saved.username) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Persist the node's controller account under the data directory.
pub struct SaveAccountStep {
    accounts_dir: PathBuf,
    controller_name: String,
    account: Account,
}

impl SaveAccountStep {
    pub const NAME: &'static str = "save-account";

    pub fn new(accounts_dir: PathBuf, controller_name: &str, account: Account) -> Self {
        Self {
            accounts_dir,
            controller_name: controller_name.to_string(),
            account,
        }
    }
}

impl Step for SaveAccountStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Saving the controller account"
    }

    fn is_skip(&mut self) -> StepResult {
        match account::load_account(&self.accounts_dir, &self.controller_name) {
            Ok(Some(saved)) if saved == self.account => StepResult::skipped(),
            Ok(_) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match account::save_account(&self.accounts_dir, &self.controller_name, &self.account) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Keep a backup copy of the bootstrap account.
pub struct BackupBootstrapAccountStep {
    accounts_dir: PathBuf,
    controller_name: String,
}

impl BackupBootstrapAccountStep {
    pub const NAME: &'static str = "backup-bootstrap-account";

    pub fn new(accounts_dir: PathBuf, controller_name: &str) -> Self {
        Self {
            accounts_dir,
            controller_name: controller_name.to_string(),
        }
    }
}

impl Step for BackupBootstrapAccountStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Backing up the bootstrap account"
    }

    fn is_skip(&mut self) -> StepResult {
        let path = account::account_path(&self.accounts_dir, &self.controller_name);
        if path.is_file() {
            StepResult::completed()
        } else {
            debug!("no account to back up at {}", path.display());
            StepResult::skipped()
        }
    }

    fn run(&mut self) -> StepResult {
        match account::backup_account(&self.accounts_dir, &self.controller_name) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Grant a node's user admin access on a model.
pub struct GrantModelAccessStep<'a> {
    controller: &'a dyn ControllerApi,
    username: String,
    model: String,
}

impl<'a> GrantModelAccessStep<'a> {
    pub const NAME: &'static str = "grant-model-access";

    pub fn new(controller: &'a dyn ControllerApi, username: &str, model: &str) -> Self {
        Self {
            controller,
            username: username.to_string(),
            model: model.to_string(),
        }
    }
}

impl Step for GrantModelAccessStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Granting model access to the node's user"
    }

    fn run(&mut self) -> StepResult {
        match self
            .controller
            .grant_model_access(&self.username, &self.model)
        {
            Ok(()) => StepResult::completed(),
            Err(ControllerError::UserNotFound(u)) => {
                StepResult::failed(format!("controller user {u} does not exist"))
            }
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Enroll the local machine into the machine model.
///
/// The assigned machine id is the payload; a machine already enrolled under
/// this hostname surfaces its existing id through the skip result.
pub struct AddMachineStep<'a> {
    controller: &'a dyn ControllerApi,
    fqdn: String,
    address: String,
    model: String,
}

impl<'a> AddMachineStep<'a> {
    pub const NAME: &'static str = "add-machine";

    pub fn new(controller: &'a dyn ControllerApi, fqdn: &str, address: &str, model: &str) -> Self {
        Self {
            controller,
            fqdn: fqdn.to_string(),
            address: address.to_string(),
            model: model.to_string(),
        }
    }
}

impl Step for AddMachineStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Enrolling the machine with the controller"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.controller.list_machines(&self.model) {
            Ok(machines) => match machines.iter().find(|m| m.hostname == self.fqdn) {
                Some(machine) => StepResult::skipped_with(machine.id.clone()),
                None => StepResult::completed(),
            },
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.controller.add_machine(&self.address, &self.model) {
            Ok(id) => StepResult::completed_with(id),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Remove a node's machine from the machine model.
pub struct RemoveMachineStep<'a> {
    controller: &'a dyn ControllerApi,
    cluster: &'a dyn ClusterApi,
    node_name: String,
    model: String,
}

impl<'a> RemoveMachineStep<'a> {
    pub const NAME: &'static str = "remove-machine";

    pub fn new(
        controller: &'a dyn ControllerApi,
        cluster: &'a dyn ClusterApi,
        node_name: &str,
        model: &str,
    ) -> Self {
        Self {
            controller,
            cluster,
            node_name: node_name.to_string(),
            model: model.to_string(),
        }
    }

    fn machine_id(&self) -> Option<String> {
        let info = self.cluster.get_node_info(&self.node_name).ok()?;
        if info.machine_id < 0 {
            None
        } else {
            Some(info.machine_id.to_string())
        }
    }
}

impl Step for RemoveMachineStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Removing the machine from the controller"
    }

    fn is_skip(&mut self) -> StepResult {
        let Some(id) = self.machine_id() else {
            return StepResult::skipped();
        };
        match self.controller.list_machines(&self.model) {
            Ok(machines) if machines.iter().any(|m| m.id == id) => StepResult::completed(),
            Ok(_) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        let Some(id) = self.machine_id() else {
            return StepResult::skipped();
        };
        match self.controller.remove_machine(&id, &self.model) {
            Ok(()) => StepResult::completed(),
            Err(ControllerError::MachineNotFound(_)) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
