//! Steps acting on the membership daemon.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::{ClusterApi, ServiceError};
use crate::engine::{Step, StepResult};

/// Bootstrap the daemon, making the local node the founding member.
pub struct ClusterInitStep<'a> {
    client: &'a dyn ClusterApi,
    fqdn: String,
    address: String,
    roles: Vec<String>,
}

impl<'a> ClusterInitStep<'a> {
    pub const NAME: &'static str = "cluster-init";

    pub fn new(client: &'a dyn ClusterApi, fqdn: &str, address: &str, roles: Vec<String>) -> Self {
        Self {
            client,
            fqdn: fqdn.to_string(),
            address: address.to_string(),
            roles,
        }
    }
}

impl Step for ClusterInitStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Bootstrapping the cluster service"
    }

    fn is_skip(&mut self) -> StepResult {
        // An unformed daemon cannot list members; that just means we have
        // work to do.
        match self.client.list_members() {
            Ok(members) if members.iter().any(|m| m.name == self.fqdn) => StepResult::skipped(),
            _ => StepResult::completed(),
        }
    }

    fn run(&mut self) -> StepResult {
        match self
            .client
            .bootstrap(&self.fqdn, &self.address, &self.roles)
        {
            Ok(()) => StepResult::completed(),
            Err(ServiceError::AlreadyBootstrapped) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Issue a join token for a prospective member.
///
/// The token is the step's payload; on re-invocation the previously issued
/// token is surfaced through the skip result so the caller can still print
/// it.
pub struct ClusterAddNodeStep<'a> {
    client: &'a dyn ClusterApi,
    node_name: String,
}

impl<'a> ClusterAddNodeStep<'a> {
    pub const NAME: &'static str = "cluster-add-node";

    pub fn new(client: &'a dyn ClusterApi, node_name: &str) -> Self {
        Self {
            client,
            node_name: node_name.to_string(),
        }
    }

    fn stored_token(&self) -> Option<String> {
        let tokens = self.client.list_tokens().ok()?;
        tokens
            .into_iter()
            .find(|t| t.name == self.node_name)
            .map(|t| t.token)
    }
}

impl Step for ClusterAddNodeStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Generating a join token for the node"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.client.list_members() {
            Ok(members) if members.iter().any(|m| m.name == self.node_name) => {
                // Already joined; there is no token to hand out.
                StepResult::skipped()
            }
            Ok(_) => match self.stored_token() {
                Some(token) => StepResult::skipped_with(token),
                None => StepResult::completed(),
            },
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.generate_token(&self.node_name) {
            Ok(token) => StepResult::completed_with(token),
            Err(ServiceError::TokenAlreadyGenerated) => match self.stored_token() {
                Some(token) => StepResult::completed_with(token),
                None => StepResult::failed(format!(
                    "a token was already issued for {} but cannot be recovered",
                    self.node_name
                )),
            },
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Join the local node to an existing cluster with a token.
pub struct ClusterJoinNodeStep<'a> {
    client: &'a dyn ClusterApi,
    fqdn: String,
    address: String,
    token: String,
    roles: Vec<String>,
}

impl<'a> ClusterJoinNodeStep<'a> {
    pub const NAME: &'static str = "cluster-join-node";

    pub fn new(
        client: &'a dyn ClusterApi,
        fqdn: &str,
        address: &str,
        token: &str,
        roles: Vec<String>,
    ) -> Self {
        Self {
            client,
            fqdn: fqdn.to_string(),
            address: address.to_string(),
            token: token.to_string(),
            roles,
        }
    }
}

impl Step for ClusterJoinNodeStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Joining the node to the cluster"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.client.list_members() {
            Ok(members) if members.iter().any(|m| m.name == self.fqdn) => StepResult::skipped(),
            _ => StepResult::completed(),
        }
    }

    fn run(&mut self) -> StepResult {
        match self
            .client
            .join(&self.fqdn, &self.address, &self.token, &self.roles)
        {
            Ok(()) => StepResult::completed(),
            Err(ServiceError::NodeAlreadyExists) => StepResult::skipped(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Record the controller machine id assigned to this node.
pub struct ClusterUpdateNodeStep<'a> {
    client: &'a dyn ClusterApi,
    fqdn: String,
    machine_id: i64,
}

impl<'a> ClusterUpdateNodeStep<'a> {
    pub const NAME: &'static str = "cluster-update-node";

    pub fn new(client: &'a dyn ClusterApi, fqdn: &str, machine_id: i64) -> Self {
        Self {
            client,
            fqdn: fqdn.to_string(),
            machine_id,
        }
    }
}

impl Step for ClusterUpdateNodeStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Recording the node's machine id"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.client.get_node_info(&self.fqdn) {
            Ok(info) if info.machine_id == self.machine_id => StepResult::skipped(),
            Ok(_) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.update_node_info(&self.fqdn, self.machine_id) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Store a controller user's registration token in the daemon so other
/// workflows (and re-invocations) can recover it.
pub struct ClusterAddUserStep<'a> {
    client: &'a dyn ClusterApi,
    username: String,
    token: String,
}

impl<'a> ClusterAddUserStep<'a> {
    pub const NAME: &'static str = "cluster-add-user";

    pub fn new(client: &'a dyn ClusterApi, username: &str, token: &str) -> Self {
        Self {
            client,
            username: username.to_string(),
            token: token.to_string(),
        }
    }
}

impl Step for ClusterAddUserStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Storing the user's registration token"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.client.get_user_token(&self.username) {
            Ok(token) => StepResult::skipped_with(token),
            Err(ServiceError::UserNotFound(_)) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.add_user(&self.username, &self.token) {
            Ok(()) => StepResult::completed_with(self.token.clone()),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Remove a node's membership and records from the daemon.
pub struct ClusterRemoveNodeStep<'a> {
    client: &'a dyn ClusterApi,
    node_name: String,
}

impl<'a> ClusterRemoveNodeStep<'a> {
    pub const NAME: &'static str = "cluster-remove-node";

    pub fn new(client: &'a dyn ClusterApi, node_name: &str) -> Self {
        Self {
            client,
            node_name: node_name.to_string(),
        }
    }
}

impl Step for ClusterRemoveNodeStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Removing the node from the cluster"
    }

    fn is_skip(&mut self) -> StepResult {
        let is_member = match self.client.list_members() {
            Ok(members) => members.iter().any(|m| m.name == self.node_name),
            Err(e) => return StepResult::failed(e.to_string()),
        };
        if is_member {
            return StepResult::completed();
        }
        let has_token = self
            .client
            .list_tokens()
            .map(|tokens| tokens.iter().any(|t| t.name == self.node_name))
            .unwrap_or(false);
        if has_token {
            StepResult::completed()
        } else {
            debug!("{} holds no membership or token", self.node_name);
            StepResult::skipped()
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.remove_node(&self.node_name) {
            Ok(()) => StepResult::completed(),
            Err(ServiceError::NodeNotFound) | Err(ServiceError::TokenNotFound) => {
                StepResult::skipped()
            }
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Record the controller name in the daemon so joining nodes know which
/// controller to register against.
pub struct ClusterRecordControllerStep<'a> {
    client: &'a dyn ClusterApi,
    controller: String,
}

const CONTROLLER_KEY: &str = "controller";

impl<'a> ClusterRecordControllerStep<'a> {
    pub const NAME: &'static str = "cluster-record-controller";

    pub fn new(client: &'a dyn ClusterApi, controller: &str) -> Self {
        Self {
            client,
            controller: controller.to_string(),
        }
    }

    /// The controller name previously recorded, if any.
    pub fn recorded_controller(client: &dyn ClusterApi) -> Option<String> {
        client.get_config(CONTROLLER_KEY).ok()
    }
}

impl Step for ClusterRecordControllerStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Recording the controller in the cluster"
    }

    fn is_skip(&mut self) -> StepResult {
        match self.client.get_config(CONTROLLER_KEY) {
            Ok(name) if name == self.controller => StepResult::skipped(),
            _ => StepResult::completed(),
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.update_config(CONTROLLER_KEY, &self.controller) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Mark the deployment as fully bootstrapped.
pub struct ClusterMarkBootstrappedStep<'a> {
    client: &'a dyn ClusterApi,
}

impl<'a> ClusterMarkBootstrappedStep<'a> {
    pub const NAME: &'static str = "cluster-mark-bootstrapped";

    pub fn new(client: &'a dyn ClusterApi) -> Self {
        Self { client }
    }
}

impl Step for ClusterMarkBootstrappedStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Marking the deployment as bootstrapped"
    }

    fn is_skip(&mut self) -> StepResult {
        if self.client.is_bootstrapped() {
            StepResult::skipped()
        } else {
            StepResult::completed()
        }
    }

    fn run(&mut self) -> StepResult {
        match self.client.set_bootstrapped() {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// One row of the node inventory, as rendered by [`ClusterListNodesStep`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeListing {
    pub roles: Vec<String>,
    pub status: String,
    #[serde(rename = "machineid")]
    pub machine_id: i64,
}

/// Render the current node inventory as YAML.
///
/// The rendered document is the step's payload; the command layer decides
/// whether to print it raw or as a table.
pub struct ClusterListNodesStep<'a> {
    client: &'a dyn ClusterApi,
}

impl<'a> ClusterListNodesStep<'a> {
    pub const NAME: &'static str = "cluster-list-nodes";

    pub fn new(client: &'a dyn ClusterApi) -> Self {
        Self { client }
    }
}

impl Step for ClusterListNodesStep<'_> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Listing cluster nodes"
    }

    fn run(&mut self) -> StepResult {
        let members = match self.client.list_members() {
            Ok(members) => members,
            Err(e) => return StepResult::failed(e.to_string()),
        };
        let nodes = match self.client.list_nodes() {
            Ok(nodes) => nodes,
            Err(e) => return StepResult::failed(e.to_string()),
        };

        let mut listing: BTreeMap<String, NodeListing> = BTreeMap::new();
        for member in members {
            listing.insert(
                member.name.clone(),
                NodeListing {
                    roles: Vec::new(),
                    status: member.status,
                    machine_id: -1,
                },
            );
        }
        for node in nodes {
            if let Some(entry) = listing.get_mut(&node.name) {
                entry.roles = node.roles;
                entry.machine_id = node.machine_id;
            }
        }

        match serde_yaml::to_string(&listing) {
            Ok(rendered) => StepResult::completed_with(rendered),
            Err(e) => StepResult::failed(format!("cannot render node list: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::FakeCluster;

    #[test]
    fn init_skips_when_already_a_member() {
        let fake = FakeCluster::with_member("node1.example.com");
        let mut step = ClusterInitStep::new(&fake, "node1.example.com", "10.0.0.1", vec![]);
        assert_eq!(step.is_skip().status, crate::engine::ResultStatus::Skipped);
    }

    #[test]
    fn init_bootstraps_fresh_daemon() {
        let fake = FakeCluster::default();
        let mut step = ClusterInitStep::new(
            &fake,
            "node1.example.com",
            "10.0.0.1",
            vec!["control".to_string()],
        );
        assert_eq!(
            step.is_skip().status,
            crate::engine::ResultStatus::Completed
        );
        assert!(!step.run().is_failed());
        assert_eq!(fake.members.borrow().len(), 1);
    }

    #[test]
    fn add_node_payload_is_the_token() {
        let fake = FakeCluster::with_member("node1.example.com");
        let mut step = ClusterAddNodeStep::new(&fake, "node2.example.com");
        assert_eq!(
            step.is_skip().status,
            crate::engine::ResultStatus::Completed
        );
        let result = step.run();
        assert_eq!(result.message.as_deref(), Some("token-node2.example.com"));
    }

    #[test]
    fn add_node_reinvocation_surfaces_stored_token() {
        let fake = FakeCluster::with_member("node1.example.com");
        fake.add_token("node2.example.com", "earlier-token");
        let mut step = ClusterAddNodeStep::new(&fake, "node2.example.com");
        let result = step.is_skip();
        assert_eq!(result.status, crate::engine::ResultStatus::Skipped);
        assert_eq!(result.message.as_deref(), Some("earlier-token"));
    }

    #[test]
    fn add_node_skips_bare_when_already_member() {
        let fake = FakeCluster::with_member("node2.example.com");
        let mut step = ClusterAddNodeStep::new(&fake, "node2.example.com");
        let result = step.is_skip();
        assert_eq!(result.status, crate::engine::ResultStatus::Skipped);
        assert!(result.message.is_none());
    }

    #[test]
    fn join_then_reinvoke_skips() {
        let fake = FakeCluster::with_member("node1.example.com");
        let mut step = ClusterJoinNodeStep::new(
            &fake,
            "node2.example.com",
            "10.0.0.2",
            "token",
            vec!["compute".to_string()],
        );
        assert!(!step.run().is_failed());

        let mut again = ClusterJoinNodeStep::new(
            &fake,
            "node2.example.com",
            "10.0.0.2",
            "token",
            vec!["compute".to_string()],
        );
        assert_eq!(again.is_skip().status, crate::engine::ResultStatus::Skipped);
    }

    #[test]
    fn update_node_records_machine_id() {
        let fake = FakeCluster::default();
        fake.bootstrap("node1.example.com", "10.0.0.1", &["control".to_string()])
            .unwrap();
        let mut step = ClusterUpdateNodeStep::new(&fake, "node1.example.com", 7);
        assert!(!step.run().is_failed());
        assert_eq!(fake.get_node_info("node1.example.com").unwrap().machine_id, 7);

        let mut again = ClusterUpdateNodeStep::new(&fake, "node1.example.com", 7);
        assert_eq!(again.is_skip().status, crate::engine::ResultStatus::Skipped);
    }

    #[test]
    fn add_user_skip_surfaces_stored_token() {
        let fake = FakeCluster::default();
        fake.add_user("node1.example.com", "stored").unwrap();
        let mut step = ClusterAddUserStep::new(&fake, "node1.example.com", "fresh");
        let result = step.is_skip();
        assert_eq!(result.status, crate::engine::ResultStatus::Skipped);
        assert_eq!(result.message.as_deref(), Some("stored"));
    }

    #[test]
    fn remove_node_of_absent_node_skips() {
        let fake = FakeCluster::with_member("node1.example.com");
        let mut step = ClusterRemoveNodeStep::new(&fake, "gone.example.com");
        assert_eq!(step.is_skip().status, crate::engine::ResultStatus::Skipped);
    }

    #[test]
    fn remove_last_member_fails() {
        let fake = FakeCluster::with_member("node1.example.com");
        let mut step = ClusterRemoveNodeStep::new(&fake, "node1.example.com");
        assert_eq!(
            step.is_skip().status,
            crate::engine::ResultStatus::Completed
        );
        let result = step.run();
        assert!(result.is_failed());
        assert!(result.error_detail().contains("last"));
    }

    #[test]
    fn remove_node_with_unclaimed_token_deletes_it() {
        let fake = FakeCluster::with_member("node1.example.com");
        fake.add_token("node2.example.com", "t");
        let mut step = ClusterRemoveNodeStep::new(&fake, "node2.example.com");
        assert_eq!(
            step.is_skip().status,
            crate::engine::ResultStatus::Completed
        );
        assert!(!step.run().is_failed());
        assert!(fake.tokens.borrow().is_empty());
    }

    #[test]
    fn mark_bootstrapped_is_idempotent() {
        let fake = FakeCluster::default();
        let mut step = ClusterMarkBootstrappedStep::new(&fake);
        assert!(!step.run().is_failed());
        assert!(fake.is_bootstrapped());

        let mut again = ClusterMarkBootstrappedStep::new(&fake);
        assert_eq!(again.is_skip().status, crate::engine::ResultStatus::Skipped);
    }

    #[test]
    fn list_nodes_renders_yaml_inventory() {
        let fake = FakeCluster::default();
        fake.bootstrap(
            "node1.example.com",
            "10.0.0.1",
            &["control".to_string(), "compute".to_string()],
        )
        .unwrap();
        fake.update_node_info("node1.example.com", 0).unwrap();

        let mut step = ClusterListNodesStep::new(&fake);
        let result = step.run();
        let rendered = result.message.unwrap();
        assert!(rendered.contains("node1.example.com"));
        assert!(rendered.contains("control"));
        assert!(rendered.contains("machineid: 0"));
    }

    #[test]
    fn record_controller_round_trip() {
        let fake = FakeCluster::default();
        let mut step = ClusterRecordControllerStep::new(&fake, "cairn-controller");
        assert!(!step.run().is_failed());
        assert_eq!(
            ClusterRecordControllerStep::recorded_controller(&fake).as_deref(),
            Some("cairn-controller")
        );

        let mut again = ClusterRecordControllerStep::new(&fake, "cairn-controller");
        assert_eq!(again.is_skip().status, crate::engine::ResultStatus::Skipped);
    }
}
