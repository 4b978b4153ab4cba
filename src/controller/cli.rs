//! Driving the `conductor` CLI.
//!
//! All controller interaction shells out to `conductor` with `--format json`
//! and parses the documents it prints. Known failure conditions are matched
//! on stderr text; anything else surfaces as a command failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::shell::{execute, CommandOptions};

use super::{Application, ControllerApi, ControllerError, Machine, Unit};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// [`ControllerApi`] implementation backed by the `conductor` binary.
pub struct ConductorCli {
    binary: String,
    /// State directory passed to the CLI as `CONDUCTOR_HOME`.
    home: PathBuf,
}

impl ConductorCli {
    pub fn new(home: PathBuf) -> Self {
        Self {
            binary: "conductor".to_string(),
            home,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ControllerError> {
        let mut env = HashMap::new();
        env.insert(
            "CONDUCTOR_HOME".to_string(),
            self.home.display().to_string(),
        );
        let options = CommandOptions { cwd: None, env };

        let result = execute(&self.binary, args, &options).map_err(|e| {
            ControllerError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: e.to_string(),
            }
        })?;
        if !result.success {
            return Err(ControllerError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }

    fn run_json(&self, args: &[&str]) -> Result<Value, ControllerError> {
        let stdout = self.run(args)?;
        serde_json::from_str(&stdout).map_err(|e| ControllerError::Parse(e.to_string()))
    }

    fn status(&self, model: &str) -> Result<Value, ControllerError> {
        self.run_json(&["status", "--model", model, "--format", "json"])
    }

    fn applications(status: &Value) -> Value {
        status.get("applications").cloned().unwrap_or(Value::Null)
    }

    fn parse_application(name: &str, doc: &Value) -> Application {
        let status = doc
            .pointer("/application-status/current")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let mut units = Vec::new();
        if let Some(map) = doc.get("units").and_then(Value::as_object) {
            for (unit_name, unit_doc) in map {
                units.push(Unit {
                    name: unit_name.clone(),
                    machine: unit_doc
                        .get("machine")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                });
            }
        }
        Application {
            name: name.to_string(),
            status,
            units,
        }
    }

    fn unit_workload_status(status: &Value, unit: &str) -> Option<String> {
        let apps = status.get("applications")?.as_object()?;
        for doc in apps.values() {
            if let Some(unit_doc) = doc.get("units").and_then(|u| u.get(unit)) {
                return unit_doc
                    .pointer("/workload-status/current")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
        None
    }

    fn wait_until<F>(&self, what: &str, timeout_secs: u64, mut ready: F) -> Result<(), ControllerError>
    where
        F: FnMut() -> Result<bool, ControllerError>,
    {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if ready()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ControllerError::Timeout(format!(
                    "{what} not ready after {timeout_secs}s"
                )));
            }
            debug!("waiting for {}", what);
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ControllerApi for ConductorCli {
    fn controller_exists(&self, name: &str) -> Result<bool, ControllerError> {
        let doc = match self.run_json(&["controllers", "--format", "json"]) {
            Ok(doc) => doc,
            // No client store yet means no controllers at all.
            Err(ControllerError::CommandFailed { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(doc
            .get("controllers")
            .and_then(Value::as_object)
            .map(|c| c.contains_key(name))
            .unwrap_or(false))
    }

    fn bootstrap(&self, cloud: &str, controller: &str) -> Result<(), ControllerError> {
        self.run(&["bootstrap", cloud, controller])?;
        Ok(())
    }

    fn login(&self, user: &str) -> Result<(), ControllerError> {
        self.run(&["login", "--user", user])?;
        Ok(())
    }

    fn create_user(&self, name: &str) -> Result<String, ControllerError> {
        let doc = match self.run_json(&["add-user", name, "--format", "json"]) {
            Ok(doc) => doc,
            Err(ControllerError::CommandFailed { stderr, command }) => {
                if stderr.to_lowercase().contains("already exists") {
                    return Err(ControllerError::UserAlreadyExists(name.to_string()));
                }
                return Err(ControllerError::CommandFailed { stderr, command });
            }
            Err(e) => return Err(e),
        };
        doc.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ControllerError::Parse("registration token missing".to_string()))
    }

    fn user_exists(&self, name: &str) -> Result<bool, ControllerError> {
        let doc = self.run_json(&["users", "--format", "json"])?;
        Ok(doc
            .as_array()
            .map(|users| {
                users.iter().any(|u| {
                    u.get("user-name").and_then(Value::as_str) == Some(name)
                })
            })
            .unwrap_or(false))
    }

    fn register_user(&self, token: &str, controller: &str) -> Result<(), ControllerError> {
        self.run(&["register", token, "--name", controller])?;
        Ok(())
    }

    fn grant_model_access(&self, user: &str, model: &str) -> Result<(), ControllerError> {
        match self.run(&["grant", user, "admin", model]) {
            Ok(_) => Ok(()),
            Err(ControllerError::CommandFailed { stderr, command }) => {
                if stderr.to_lowercase().contains("already has") {
                    Ok(())
                } else {
                    Err(ControllerError::CommandFailed { stderr, command })
                }
            }
            Err(e) => Err(e),
        }
    }

    fn add_machine(&self, address: &str, model: &str) -> Result<String, ControllerError> {
        let doc = self.run_json(&[
            "add-machine",
            address,
            "--model",
            model,
            "--format",
            "json",
        ])?;
        doc.get("machine")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ControllerError::Parse("machine id missing".to_string()))
    }

    fn list_machines(&self, model: &str) -> Result<Vec<Machine>, ControllerError> {
        let status = self.status(model)?;
        let mut machines = Vec::new();
        if let Some(map) = status.get("machines").and_then(Value::as_object) {
            for (id, doc) in map {
                machines.push(Machine {
                    id: id.clone(),
                    hostname: doc
                        .get("hostname")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                });
            }
        }
        Ok(machines)
    }

    fn remove_machine(&self, id: &str, model: &str) -> Result<(), ControllerError> {
        self.run(&["remove-machine", id, "--model", model])?;
        Ok(())
    }

    fn get_application(&self, name: &str, model: &str) -> Result<Application, ControllerError> {
        let status = self.status(model)?;
        let apps = Self::applications(&status);
        match apps.get(name) {
            Some(doc) => Ok(Self::parse_application(name, doc)),
            None => Err(ControllerError::ApplicationNotFound(name.to_string())),
        }
    }

    fn add_unit(
        &self,
        app: &str,
        model: &str,
        machine_id: &str,
    ) -> Result<String, ControllerError> {
        self.run(&["add-unit", app, "--model", model, "--to", machine_id])?;
        // The CLI does not report the new unit's name; find the unit that
        // landed on the requested machine.
        let application = self.get_application(app, model)?;
        application
            .units
            .iter()
            .find(|u| u.machine == machine_id)
            .map(|u| u.name.clone())
            .ok_or_else(|| ControllerError::UnitNotFound(format!("{app} on machine {machine_id}")))
    }

    fn remove_unit(&self, _app: &str, unit: &str, model: &str) -> Result<(), ControllerError> {
        self.run(&["remove-unit", unit, "--model", model])?;
        Ok(())
    }

    fn wait_application_ready(
        &self,
        app: &str,
        model: &str,
        accepted: &[&str],
        timeout_secs: u64,
    ) -> Result<(), ControllerError> {
        self.wait_until(&format!("application {app}"), timeout_secs, || {
            match self.get_application(app, model) {
                Ok(application) => Ok(accepted.contains(&application.status.as_str())),
                Err(ControllerError::ApplicationNotFound(_)) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    fn wait_unit_ready(
        &self,
        unit: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<(), ControllerError> {
        self.wait_until(&format!("unit {unit}"), timeout_secs, || {
            let status = self.status(model)?;
            Ok(Self::unit_workload_status(&status, unit).as_deref() == Some("active"))
        })
    }

    fn wait_model_ready(&self, model: &str, timeout_secs: u64) -> Result<(), ControllerError> {
        self.wait_until(&format!("model {model}"), timeout_secs, || {
            let status = self.status(model)?;
            let apps = Self::applications(&status);
            let Some(map) = apps.as_object() else {
                return Ok(false);
            };
            Ok(map.values().all(|doc| {
                doc.pointer("/application-status/current")
                    .and_then(Value::as_str)
                    == Some("active")
            }))
        })
    }

    fn get_leader_unit(&self, app: &str, model: &str) -> Result<String, ControllerError> {
        let status = self.status(model)?;
        let apps = Self::applications(&status);
        let doc = apps
            .get(app)
            .ok_or_else(|| ControllerError::ApplicationNotFound(app.to_string()))?;
        let units = doc
            .get("units")
            .and_then(Value::as_object)
            .ok_or_else(|| ControllerError::LeaderNotFound(app.to_string()))?;
        for (name, unit_doc) in units {
            if unit_doc.get("leader").and_then(Value::as_bool) == Some(true) {
                return Ok(name.clone());
            }
        }
        Err(ControllerError::LeaderNotFound(app.to_string()))
    }

    fn run_action(
        &self,
        unit: &str,
        model: &str,
        action: &str,
        params: &Value,
    ) -> Result<Value, ControllerError> {
        let params_doc = serde_json::to_string(params)
            .map_err(|e| ControllerError::Parse(e.to_string()))?;
        let doc = self.run_json(&[
            "run",
            unit,
            action,
            "--model",
            model,
            "--params",
            &params_doc,
            "--format",
            "json",
        ])?;
        let outcome = doc
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("failed");
        if outcome != "completed" {
            return Err(ControllerError::ActionFailed(format!(
                "{action} on {unit}: {outcome}"
            )));
        }
        Ok(doc.get("results").cloned().unwrap_or(Value::Null))
    }

    fn get_clouds(&self) -> Result<Vec<String>, ControllerError> {
        let doc = self.run_json(&["clouds", "--format", "json"])?;
        Ok(doc
            .get("clouds")
            .and_then(Value::as_object)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn add_k8s_cloud(
        &self,
        name: &str,
        credential: &str,
        kubeconfig: &str,
    ) -> Result<(), ControllerError> {
        let path = self.home.join(format!("{name}-kubeconfig.yaml"));
        std::fs::write(&path, kubeconfig).map_err(|e| ControllerError::CommandFailed {
            command: format!("write {}", path.display()),
            stderr: e.to_string(),
        })?;
        let path_arg = path.display().to_string();
        self.run(&[
            "add-k8s",
            name,
            "--credential",
            credential,
            "--kubeconfig",
            &path_arg,
        ])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_status() -> Value {
        json!({
            "machines": {
                "0": {"hostname": "node1.example.com"},
                "1": {"hostname": "node2.example.com"}
            },
            "applications": {
                "k8s": {
                    "application-status": {"current": "active"},
                    "units": {
                        "k8s/0": {
                            "machine": "0",
                            "leader": true,
                            "workload-status": {"current": "active"}
                        },
                        "k8s/1": {
                            "machine": "1",
                            "workload-status": {"current": "waiting"}
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn parse_application_extracts_units() {
        let status = sample_status();
        let doc = &status["applications"]["k8s"];
        let app = ConductorCli::parse_application("k8s", doc);
        assert_eq!(app.status, "active");
        assert_eq!(app.units.len(), 2);
        assert!(app.units.iter().any(|u| u.name == "k8s/0" && u.machine == "0"));
    }

    #[test]
    fn unit_workload_status_finds_unit_across_applications() {
        let status = sample_status();
        assert_eq!(
            ConductorCli::unit_workload_status(&status, "k8s/1").as_deref(),
            Some("waiting")
        );
        assert_eq!(ConductorCli::unit_workload_status(&status, "k8s/9"), None);
    }

    #[test]
    fn parse_application_without_units_is_empty() {
        let doc = json!({"application-status": {"current": "waiting"}});
        let app = ConductorCli::parse_application("storage", &doc);
        assert_eq!(app.status, "waiting");
        assert!(app.units.is_empty());
    }
}
