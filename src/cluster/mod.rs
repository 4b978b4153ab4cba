//! Membership daemon API.
//!
//! `cairnd` is the distributed membership store backing a deployment. It
//! tracks cluster members, per-node role/machine records, controller user
//! registrations, join tokens, and small configuration documents. The
//! [`ClusterApi`] trait is the seam the steps talk through; [`ClusterClient`]
//! is the HTTP implementation.

pub mod client;

pub use client::ClusterClient;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the membership daemon.
///
/// The "already exists" family is load-bearing: skip checks rely on being
/// able to tell an idempotent-safe condition apart from a fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Cluster daemon not reachable: {0}")]
    Unavailable(String),

    #[error("Node already exists in the cluster")]
    NodeAlreadyExists,

    #[error("Node does not exist in the cluster")]
    NodeNotFound,

    #[error("Token already generated for the node")]
    TokenAlreadyGenerated,

    #[error("Token not found for the node")]
    TokenNotFound,

    #[error("Join failed with the given token")]
    JoinFailed,

    #[error("Cannot remove the last remaining cluster member")]
    LastMember,

    #[error("Cluster is already bootstrapped")]
    AlreadyBootstrapped,

    #[error("Config item '{0}' not found")]
    ConfigNotFound(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Cluster daemon error: {0}")]
    Remote(String),
}

/// A raw cluster member as the daemon reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub address: String,
    pub status: String,
}

/// Role and machine bookkeeping for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,

    #[serde(default)]
    pub roles: Vec<String>,

    /// Controller machine id, -1 until one is assigned.
    #[serde(default = "default_machine_id", rename = "machineid")]
    pub machine_id: i64,
}

fn default_machine_id() -> i64 {
    -1
}

/// A join token the daemon has issued but which is not yet claimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub name: String,
    pub token: String,
}

/// Operations the steps need from the membership daemon.
///
/// Implemented by [`ClusterClient`] for the real daemon and by in-memory
/// fakes in tests.
pub trait ClusterApi {
    /// Whether the daemon answers at all. Used by preflight.
    fn is_reachable(&self) -> bool;

    /// Register the local node as the founding cluster member.
    fn bootstrap(
        &self,
        name: &str,
        address: &str,
        roles: &[String],
    ) -> Result<(), ServiceError>;

    /// Issue a join token for a prospective member.
    fn generate_token(&self, name: &str) -> Result<String, ServiceError>;

    /// Tokens issued but not yet claimed.
    fn list_tokens(&self) -> Result<Vec<TokenRecord>, ServiceError>;

    /// Discard an unclaimed join token.
    fn delete_token(&self, name: &str) -> Result<(), ServiceError>;

    /// Join the local node to an existing cluster using a token.
    fn join(
        &self,
        name: &str,
        address: &str,
        token: &str,
        roles: &[String],
    ) -> Result<(), ServiceError>;

    /// All current cluster members.
    fn list_members(&self) -> Result<Vec<Member>, ServiceError>;

    /// Node role/machine records.
    fn list_nodes(&self) -> Result<Vec<NodeInfo>, ServiceError>;

    /// Nodes holding a given role.
    fn list_nodes_by_role(&self, role: &str) -> Result<Vec<NodeInfo>, ServiceError>;

    /// The record for one node.
    fn get_node_info(&self, name: &str) -> Result<NodeInfo, ServiceError>;

    /// Record the controller machine id for a node.
    fn update_node_info(&self, name: &str, machine_id: i64) -> Result<(), ServiceError>;

    /// Remove a node from the cluster, cleaning up its records.
    fn remove_node(&self, name: &str) -> Result<(), ServiceError>;

    /// Store a controller user's registration token.
    fn add_user(&self, name: &str, token: &str) -> Result<(), ServiceError>;

    /// The registration token stored for a controller user.
    fn get_user_token(&self, name: &str) -> Result<String, ServiceError>;

    /// Remove a controller user record.
    fn remove_user(&self, name: &str) -> Result<(), ServiceError>;

    /// Fetch a configuration document.
    fn get_config(&self, key: &str) -> Result<String, ServiceError>;

    /// Store a configuration document, creating it if missing.
    fn update_config(&self, key: &str, value: &str) -> Result<(), ServiceError>;

    /// Whether a full bootstrap has completed on this deployment.
    fn is_bootstrapped(&self) -> bool;

    /// Mark the deployment as bootstrapped.
    fn set_bootstrapped(&self) -> Result<(), ServiceError>;
}

/// Read a JSON configuration document into a concrete type.
pub fn read_config<T: serde::de::DeserializeOwned>(
    client: &dyn ClusterApi,
    key: &str,
) -> Result<T, ServiceError> {
    let raw = client.get_config(key)?;
    serde_json::from_str(&raw).map_err(|e| ServiceError::Remote(format!("bad config {key}: {e}")))
}

/// Serialize a value into a JSON configuration document.
pub fn update_config<T: serde::Serialize>(
    client: &dyn ClusterApi,
    key: &str,
    value: &T,
) -> Result<(), ServiceError> {
    let raw = serde_json::to_string(value)
        .map_err(|e| ServiceError::Remote(format!("bad config {key}: {e}")))?;
    client.update_config(key, &raw)
}
