//! HTTP client for the membership daemon.

use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use super::{ClusterApi, Member, NodeInfo, ServiceError, TokenRecord};

/// Key marking a deployment whose bootstrap workflow ran to completion.
/// Distinct from the daemon's own cluster formation.
const BOOTSTRAPPED_KEY: &str = "bootstrapped";

/// Blocking REST client for `cairnd`.
pub struct ClusterClient {
    base_url: String,
    http: HttpClient,
}

impl ClusterClient {
    /// Create a client for the daemon at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ServiceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("[{}] {} body={:?}", method, url, body);

        let mut builder: RequestBuilder = self.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        let payload: Value = response.json().unwrap_or(Value::Null);
        debug!("response({}) = {}", status, payload);

        if !status.is_success() {
            let detail = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(translate_error(detail));
        }

        Ok(payload.get("metadata").cloned().unwrap_or(Value::Null))
    }

    fn get(&self, path: &str) -> Result<Value, ServiceError> {
        self.request(Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, ServiceError> {
        self.request(Method::POST, path, Some(body))
    }

    fn put(&self, path: &str, body: Value) -> Result<Value, ServiceError> {
        self.request(Method::PUT, path, Some(body))
    }

    fn delete(&self, path: &str) -> Result<Value, ServiceError> {
        self.request(Method::DELETE, path, None)
    }
}

/// Translate a daemon error body into a typed error.
///
/// The daemon reports conditions as message strings; the substrings matched
/// here are part of its API contract.
fn translate_error(detail: &str) -> ServiceError {
    let lower = detail.to_lowercase();
    if lower.contains("node already exists") || lower.contains("member already exists") {
        ServiceError::NodeAlreadyExists
    } else if lower.contains("node not found") || lower.contains("no member with") {
        ServiceError::NodeNotFound
    } else if lower.contains("token already generated") {
        ServiceError::TokenAlreadyGenerated
    } else if lower.contains("token not found") {
        ServiceError::TokenNotFound
    } else if lower.contains("invalid join token") {
        ServiceError::JoinFailed
    } else if lower.contains("no remaining") || lower.contains("last member") {
        ServiceError::LastMember
    } else if lower.contains("already bootstrapped") || lower.contains("already running") {
        ServiceError::AlreadyBootstrapped
    } else if lower.contains("config item not found") || lower.contains("configitem not found") {
        ServiceError::ConfigNotFound(detail.to_string())
    } else if lower.contains("user not found") {
        ServiceError::UserNotFound(detail.to_string())
    } else if lower.contains("daemon not yet initialized") {
        ServiceError::Unavailable("cluster daemon not initialized".to_string())
    } else {
        ServiceError::Remote(detail.to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ServiceError> {
    serde_json::from_value(value).map_err(|e| ServiceError::Remote(format!("bad payload: {e}")))
}

impl ClusterApi for ClusterClient {
    fn is_reachable(&self) -> bool {
        // Any answer counts, including an error body from an unformed
        // cluster; only transport failure means unreachable.
        match self.get("core/1.0/cluster") {
            Err(ServiceError::Unavailable(_)) => false,
            _ => true,
        }
    }

    fn bootstrap(&self, name: &str, address: &str, roles: &[String]) -> Result<(), ServiceError> {
        self.post(
            "core/control",
            json!({"bootstrap": true, "name": name, "address": address}),
        )?;
        self.post("1.0/nodes", json!({"name": name, "roles": roles}))?;
        Ok(())
    }

    fn generate_token(&self, name: &str) -> Result<String, ServiceError> {
        let metadata = self.post("core/1.0/tokens", json!({"name": name}))?;
        metadata
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Remote("token missing from response".to_string()))
    }

    fn list_tokens(&self) -> Result<Vec<TokenRecord>, ServiceError> {
        decode(self.get("core/1.0/tokens")?)
    }

    fn delete_token(&self, name: &str) -> Result<(), ServiceError> {
        self.delete(&format!("core/1.0/tokens/{name}"))?;
        Ok(())
    }

    fn join(
        &self,
        name: &str,
        address: &str,
        token: &str,
        roles: &[String],
    ) -> Result<(), ServiceError> {
        self.post(
            "core/control",
            json!({"join_token": token, "name": name, "address": address}),
        )?;
        self.post("1.0/nodes", json!({"name": name, "roles": roles}))?;
        Ok(())
    }

    fn list_members(&self) -> Result<Vec<Member>, ServiceError> {
        decode(self.get("core/1.0/cluster")?)
    }

    fn list_nodes(&self) -> Result<Vec<NodeInfo>, ServiceError> {
        decode(self.get("1.0/nodes")?)
    }

    fn list_nodes_by_role(&self, role: &str) -> Result<Vec<NodeInfo>, ServiceError> {
        decode(self.get(&format!("1.0/nodes?role={role}"))?)
    }

    fn get_node_info(&self, name: &str) -> Result<NodeInfo, ServiceError> {
        decode(self.get(&format!("1.0/nodes/{name}"))?)
    }

    fn update_node_info(&self, name: &str, machine_id: i64) -> Result<(), ServiceError> {
        self.put(&format!("1.0/nodes/{name}"), json!({"machineid": machine_id}))?;
        Ok(())
    }

    fn remove_node(&self, name: &str) -> Result<(), ServiceError> {
        let members = self.list_members()?;
        if members.iter().any(|m| m.name == name) {
            // Order matters: records first, membership last, so that a
            // failure part-way leaves the node discoverable for re-removal.
            match self.remove_user(name) {
                Ok(()) | Err(ServiceError::UserNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            match self.delete(&format!("1.0/nodes/{name}")) {
                Ok(_) => {}
                Err(ServiceError::NodeNotFound) => {}
                Err(e) => return Err(e),
            }
            self.delete(&format!("core/1.0/cluster/{name}"))?;
            Ok(())
        } else {
            // Not a member: the name may still hold an unclaimed token.
            self.delete_token(name)
        }
    }

    fn add_user(&self, name: &str, token: &str) -> Result<(), ServiceError> {
        self.post("1.0/users", json!({"username": name, "token": token}))?;
        Ok(())
    }

    fn get_user_token(&self, name: &str) -> Result<String, ServiceError> {
        let metadata = self.get(&format!("1.0/users/{name}"))?;
        metadata
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::UserNotFound(name.to_string()))
    }

    fn remove_user(&self, name: &str) -> Result<(), ServiceError> {
        self.delete(&format!("1.0/users/{name}"))?;
        Ok(())
    }

    fn get_config(&self, key: &str) -> Result<String, ServiceError> {
        let metadata = self.get(&format!("1.0/config/{key}"))?;
        metadata
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::ConfigNotFound(key.to_string()))
    }

    fn update_config(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.put(&format!("1.0/config/{key}"), json!({"value": value}))?;
        Ok(())
    }

    fn is_bootstrapped(&self) -> bool {
        matches!(self.get_config(BOOTSTRAPPED_KEY).as_deref(), Ok("true"))
    }

    fn set_bootstrapped(&self) -> Result<(), ServiceError> {
        self.update_config(BOOTSTRAPPED_KEY, "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_known_conditions() {
        assert!(matches!(
            translate_error("Node already exists in cluster"),
            ServiceError::NodeAlreadyExists
        ));
        assert!(matches!(
            translate_error("node not found: x"),
            ServiceError::NodeNotFound
        ));
        assert!(matches!(
            translate_error("Token already generated for node"),
            ServiceError::TokenAlreadyGenerated
        ));
        assert!(matches!(
            translate_error("invalid join token"),
            ServiceError::JoinFailed
        ));
        assert!(matches!(
            translate_error("cluster already bootstrapped"),
            ServiceError::AlreadyBootstrapped
        ));
        assert!(matches!(
            translate_error("ConfigItem not found"),
            ServiceError::ConfigNotFound(_)
        ));
    }

    #[test]
    fn translate_unknown_is_remote() {
        assert!(matches!(
            translate_error("disk on fire"),
            ServiceError::Remote(_)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = ClusterClient::new("http://127.0.0.1:7150/");
        assert_eq!(client.base_url, "http://127.0.0.1:7150");
    }
}
