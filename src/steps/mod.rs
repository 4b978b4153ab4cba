//! Concrete workflow steps.
//!
//! Steps are grouped by the collaborator they act on: the membership
//! daemon (`cluster`), the deployment controller (`controller`), Terraform
//! plans (`terraform`, `deploy`, `unit`), and the per-service deploy and
//! configure steps.

pub mod cluster;
pub mod control_plane;
pub mod controller;
pub mod deploy;
pub mod hypervisor;
pub mod k8s;
pub mod node_agent;
pub mod storage;
pub mod terraform;
pub mod unit;

#[cfg(test)]
pub(crate) mod testing;

/// How long to wait for an application to settle after an apply, seconds.
pub const APPLICATION_TIMEOUT: u64 = 1800;

/// How long to wait for a single unit to settle, seconds.
pub const UNIT_TIMEOUT: u64 = 1200;
