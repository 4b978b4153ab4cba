//! In-memory fakes shared by step unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::cluster::{ClusterApi, Member, NodeInfo, ServiceError, TokenRecord};
use crate::controller::{Application, ControllerApi, ControllerError, Machine, Unit};
use crate::provision::{Provisioner, ProvisionerFactory, TerraformError};

/// In-memory membership daemon.
pub struct FakeCluster {
    pub members: RefCell<Vec<Member>>,
    pub nodes: RefCell<Vec<NodeInfo>>,
    pub tokens: RefCell<Vec<TokenRecord>>,
    pub users: RefCell<Vec<(String, String)>>,
    pub config: RefCell<HashMap<String, String>>,
    pub reachable: std::cell::Cell<bool>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            members: RefCell::default(),
            nodes: RefCell::default(),
            tokens: RefCell::default(),
            users: RefCell::default(),
            config: RefCell::default(),
            reachable: std::cell::Cell::new(true),
        }
    }
}

impl FakeCluster {
    pub fn with_member(name: &str) -> Self {
        let fake = Self::default();
        fake.add_member(name);
        fake
    }

    pub fn add_member(&self, name: &str) {
        self.members.borrow_mut().push(Member {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            status: "ONLINE".to_string(),
        });
    }

    pub fn add_node(&self, name: &str, roles: &[&str], machine_id: i64) {
        self.nodes.borrow_mut().push(NodeInfo {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            machine_id,
        });
    }

    pub fn add_token(&self, name: &str, token: &str) {
        self.tokens.borrow_mut().push(TokenRecord {
            name: name.to_string(),
            token: token.to_string(),
        });
    }

    pub fn store_user(&self, name: &str, token: &str) {
        self.users
            .borrow_mut()
            .push((name.to_string(), token.to_string()));
    }
}

impl ClusterApi for FakeCluster {
    fn is_reachable(&self) -> bool {
        self.reachable.get()
    }

    fn bootstrap(&self, name: &str, address: &str, roles: &[String]) -> Result<(), ServiceError> {
        if !self.members.borrow().is_empty() {
            return Err(ServiceError::AlreadyBootstrapped);
        }
        self.members.borrow_mut().push(Member {
            name: name.to_string(),
            address: address.to_string(),
            status: "ONLINE".to_string(),
        });
        self.nodes.borrow_mut().push(NodeInfo {
            name: name.to_string(),
            roles: roles.to_vec(),
            machine_id: -1,
        });
        Ok(())
    }

    fn generate_token(&self, name: &str) -> Result<String, ServiceError> {
        if self.tokens.borrow().iter().any(|t| t.name == name) {
            return Err(ServiceError::TokenAlreadyGenerated);
        }
        let token = format!("token-{name}");
        self.add_token(name, &token);
        Ok(token)
    }

    fn list_tokens(&self) -> Result<Vec<TokenRecord>, ServiceError> {
        Ok(self.tokens.borrow().clone())
    }

    fn delete_token(&self, name: &str) -> Result<(), ServiceError> {
        let mut tokens = self.tokens.borrow_mut();
        let before = tokens.len();
        tokens.retain(|t| t.name != name);
        if tokens.len() == before {
            return Err(ServiceError::TokenNotFound);
        }
        Ok(())
    }

    fn join(
        &self,
        name: &str,
        address: &str,
        _token: &str,
        roles: &[String],
    ) -> Result<(), ServiceError> {
        if self.members.borrow().iter().any(|m| m.name == name) {
            return Err(ServiceError::NodeAlreadyExists);
        }
        self.members.borrow_mut().push(Member {
            name: name.to_string(),
            address: address.to_string(),
            status: "ONLINE".to_string(),
        });
        self.nodes.borrow_mut().push(NodeInfo {
            name: name.to_string(),
            roles: roles.to_vec(),
            machine_id: -1,
        });
        Ok(())
    }

    fn list_members(&self) -> Result<Vec<Member>, ServiceError> {
        Ok(self.members.borrow().clone())
    }

    fn list_nodes(&self) -> Result<Vec<NodeInfo>, ServiceError> {
        Ok(self.nodes.borrow().clone())
    }

    fn list_nodes_by_role(&self, role: &str) -> Result<Vec<NodeInfo>, ServiceError> {
        Ok(self
            .nodes
            .borrow()
            .iter()
            .filter(|n| n.roles.iter().any(|r| r == role))
            .cloned()
            .collect())
    }

    fn get_node_info(&self, name: &str) -> Result<NodeInfo, ServiceError> {
        self.nodes
            .borrow()
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or(ServiceError::NodeNotFound)
    }

    fn update_node_info(&self, name: &str, machine_id: i64) -> Result<(), ServiceError> {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or(ServiceError::NodeNotFound)?;
        node.machine_id = machine_id;
        Ok(())
    }

    fn remove_node(&self, name: &str) -> Result<(), ServiceError> {
        let mut members = self.members.borrow_mut();
        if members.iter().any(|m| m.name == name) {
            if members.len() == 1 {
                return Err(ServiceError::LastMember);
            }
            members.retain(|m| m.name != name);
            self.nodes.borrow_mut().retain(|n| n.name != name);
            self.users.borrow_mut().retain(|(u, _)| u != name);
            Ok(())
        } else {
            drop(members);
            self.delete_token(name)
        }
    }

    fn add_user(&self, name: &str, token: &str) -> Result<(), ServiceError> {
        self.store_user(name, token);
        Ok(())
    }

    fn get_user_token(&self, name: &str) -> Result<String, ServiceError> {
        self.users
            .borrow()
            .iter()
            .find(|(u, _)| u == name)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| ServiceError::UserNotFound(name.to_string()))
    }

    fn remove_user(&self, name: &str) -> Result<(), ServiceError> {
        self.users.borrow_mut().retain(|(u, _)| u != name);
        Ok(())
    }

    fn get_config(&self, key: &str) -> Result<String, ServiceError> {
        self.config
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::ConfigNotFound(key.to_string()))
    }

    fn update_config(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.config
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn is_bootstrapped(&self) -> bool {
        self.get_config("bootstrapped").as_deref() == Ok("true")
    }

    fn set_bootstrapped(&self) -> Result<(), ServiceError> {
        self.update_config("bootstrapped", "true")
    }
}

/// In-memory deployment controller.
#[derive(Default)]
pub struct FakeController {
    pub controllers: RefCell<Vec<String>>,
    pub users: RefCell<Vec<String>>,
    machines_by_model: RefCell<HashMap<String, Vec<Machine>>>,
    apps: RefCell<HashMap<(String, String), Application>>,
    pub granted: RefCell<Vec<(String, String)>>,
    pub clouds: RefCell<Vec<String>>,
    action_results: RefCell<HashMap<String, Value>>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeController {
    pub fn add_controller(&self, name: &str) {
        self.controllers.borrow_mut().push(name.to_string());
    }

    pub fn add_user(&self, name: &str) {
        self.users.borrow_mut().push(name.to_string());
    }

    pub fn add_machine_record(&self, model: &str, id: &str, hostname: &str) {
        self.machines_by_model
            .borrow_mut()
            .entry(model.to_string())
            .or_default()
            .push(Machine {
                id: id.to_string(),
                hostname: hostname.to_string(),
            });
    }

    pub fn machines(&self, model: &str) -> Vec<Machine> {
        self.machines_by_model
            .borrow()
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_application(&self, model: &str, app: &str, status: &str) {
        self.apps.borrow_mut().insert(
            (model.to_string(), app.to_string()),
            Application {
                name: app.to_string(),
                status: status.to_string(),
                units: Vec::new(),
            },
        );
    }

    pub fn add_unit_record(&self, model: &str, app: &str, unit: &str, machine: &str) {
        let mut apps = self.apps.borrow_mut();
        if let Some(application) = apps.get_mut(&(model.to_string(), app.to_string())) {
            application.units.push(Unit {
                name: unit.to_string(),
                machine: machine.to_string(),
            });
        }
    }

    pub fn set_action_result(&self, action: &str, result: Value) {
        self.action_results
            .borrow_mut()
            .insert(action.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

impl ControllerApi for FakeController {
    fn controller_exists(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self.controllers.borrow().iter().any(|c| c == name))
    }

    fn bootstrap(&self, cloud: &str, controller: &str) -> Result<(), ControllerError> {
        self.log(format!("bootstrap {cloud} {controller}"));
        self.add_controller(controller);
        Ok(())
    }

    fn login(&self, user: &str) -> Result<(), ControllerError> {
        self.log(format!("login {user}"));
        Ok(())
    }

    fn create_user(&self, name: &str) -> Result<String, ControllerError> {
        if self.users.borrow().iter().any(|u| u == name) {
            return Err(ControllerError::UserAlreadyExists(name.to_string()));
        }
        self.log(format!("create-user {name}"));
        self.add_user(name);
        Ok(format!("register-{name}"))
    }

    fn user_exists(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self.users.borrow().iter().any(|u| u == name))
    }

    fn register_user(&self, _token: &str, controller: &str) -> Result<(), ControllerError> {
        self.log(format!("register {controller}"));
        self.add_controller(controller);
        Ok(())
    }

    fn grant_model_access(&self, user: &str, model: &str) -> Result<(), ControllerError> {
        self.log(format!("grant {user} {model}"));
        self.granted
            .borrow_mut()
            .push((user.to_string(), model.to_string()));
        Ok(())
    }

    fn add_machine(&self, address: &str, model: &str) -> Result<String, ControllerError> {
        self.log(format!("add-machine {address} {model}"));
        let mut machines = self.machines_by_model.borrow_mut();
        let entry = machines.entry(model.to_string()).or_default();
        let id = entry.len().to_string();
        entry.push(Machine {
            id: id.clone(),
            hostname: String::new(),
        });
        Ok(id)
    }

    fn list_machines(&self, model: &str) -> Result<Vec<Machine>, ControllerError> {
        Ok(self.machines(model))
    }

    fn remove_machine(&self, id: &str, model: &str) -> Result<(), ControllerError> {
        self.log(format!("remove-machine {id} {model}"));
        let mut machines = self.machines_by_model.borrow_mut();
        let entry = machines.entry(model.to_string()).or_default();
        let before = entry.len();
        entry.retain(|m| m.id != id);
        if entry.len() == before {
            return Err(ControllerError::MachineNotFound(id.to_string()));
        }
        Ok(())
    }

    fn get_application(&self, name: &str, model: &str) -> Result<Application, ControllerError> {
        self.apps
            .borrow()
            .get(&(model.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ControllerError::ApplicationNotFound(name.to_string()))
    }

    fn add_unit(
        &self,
        app: &str,
        model: &str,
        machine_id: &str,
    ) -> Result<String, ControllerError> {
        self.log(format!("add-unit {app} {model} {machine_id}"));
        let mut apps = self.apps.borrow_mut();
        let application = apps
            .get_mut(&(model.to_string(), app.to_string()))
            .ok_or_else(|| ControllerError::ApplicationNotFound(app.to_string()))?;
        let unit = format!("{app}/{}", application.units.len());
        application.units.push(Unit {
            name: unit.clone(),
            machine: machine_id.to_string(),
        });
        Ok(unit)
    }

    fn remove_unit(&self, app: &str, unit: &str, model: &str) -> Result<(), ControllerError> {
        self.log(format!("remove-unit {unit} {model}"));
        let mut apps = self.apps.borrow_mut();
        let application = apps
            .get_mut(&(model.to_string(), app.to_string()))
            .ok_or_else(|| ControllerError::ApplicationNotFound(app.to_string()))?;
        application.units.retain(|u| u.name != unit);
        Ok(())
    }

    fn wait_application_ready(
        &self,
        app: &str,
        _model: &str,
        _accepted: &[&str],
        _timeout_secs: u64,
    ) -> Result<(), ControllerError> {
        self.log(format!("wait-app {app}"));
        Ok(())
    }

    fn wait_unit_ready(
        &self,
        unit: &str,
        _model: &str,
        _timeout_secs: u64,
    ) -> Result<(), ControllerError> {
        self.log(format!("wait-unit {unit}"));
        Ok(())
    }

    fn wait_model_ready(&self, model: &str, _timeout_secs: u64) -> Result<(), ControllerError> {
        self.log(format!("wait-model {model}"));
        Ok(())
    }

    fn get_leader_unit(&self, app: &str, model: &str) -> Result<String, ControllerError> {
        let application = self.get_application(app, model)?;
        application
            .units
            .first()
            .map(|u| u.name.clone())
            .ok_or_else(|| ControllerError::LeaderNotFound(app.to_string()))
    }

    fn run_action(
        &self,
        unit: &str,
        _model: &str,
        action: &str,
        _params: &Value,
    ) -> Result<Value, ControllerError> {
        self.log(format!("run-action {unit} {action}"));
        Ok(self
            .action_results
            .borrow()
            .get(action)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn get_clouds(&self) -> Result<Vec<String>, ControllerError> {
        Ok(self.clouds.borrow().clone())
    }

    fn add_k8s_cloud(
        &self,
        name: &str,
        _credential: &str,
        _kubeconfig: &str,
    ) -> Result<(), ControllerError> {
        self.log(format!("add-k8s {name}"));
        self.clouds.borrow_mut().push(name.to_string());
        Ok(())
    }
}

/// Records applies instead of running Terraform.
#[derive(Default)]
pub struct FakeProvisionerFactory {
    pub staged: RefCell<Vec<String>>,
    pub applied: Rc<RefCell<Vec<String>>>,
    pub vars: Rc<RefCell<HashMap<String, Value>>>,
}

pub struct FakeProvisioner {
    plan: String,
    applied: Rc<RefCell<Vec<String>>>,
    vars: Rc<RefCell<HashMap<String, Value>>>,
}

impl FakeProvisionerFactory {
    pub fn applied(&self) -> Vec<String> {
        self.applied.borrow().clone()
    }
}

impl ProvisionerFactory for FakeProvisionerFactory {
    fn stage(&self, plans: &[&str]) -> Result<(), TerraformError> {
        for plan in plans {
            self.staged.borrow_mut().push((*plan).to_string());
        }
        Ok(())
    }

    fn create(&self, plan: &str) -> Result<Box<dyn Provisioner>, TerraformError> {
        Ok(Box::new(FakeProvisioner {
            plan: plan.to_string(),
            applied: self.applied.clone(),
            vars: self.vars.clone(),
        }))
    }
}

impl Provisioner for FakeProvisioner {
    fn init(&self) -> Result<(), TerraformError> {
        self.applied.borrow_mut().push(format!("init {}", self.plan));
        Ok(())
    }

    fn apply(&self) -> Result<(), TerraformError> {
        self.applied
            .borrow_mut()
            .push(format!("apply {}", self.plan));
        Ok(())
    }

    fn write_tfvars(&self, vars: &HashMap<String, Value>) -> Result<(), TerraformError> {
        for (key, value) in vars {
            self.vars.borrow_mut().insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn read_tfvars(&self) -> Result<HashMap<String, Value>, TerraformError> {
        Ok(self.vars.borrow().clone())
    }
}
