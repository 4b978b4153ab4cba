//! Settings, node roles, and preseed files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CairnError, Result};

/// 16 GiB expressed in kilobytes, the minimum supported RAM.
pub const RAM_16_GB_IN_KB: u64 = 16 * 1024 * 1024;

/// 32 GiB in kilobytes; below this a single-instance topology is chosen.
pub const RAM_32_GB_IN_KB: u64 = 32 * 1024 * 1024;

/// The role a node plays in the cluster.
///
/// Roles determine which services are configured and installed on the node.
/// A node may hold several roles at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Runs control-plane services.
    Control,
    /// Runs workload compute services.
    Compute,
    /// Contributes storage devices to the cluster.
    Storage,
}

impl Role {
    pub fn is_control_node(&self) -> bool {
        *self == Role::Control
    }

    pub fn is_compute_node(&self) -> bool {
        *self == Role::Compute
    }

    pub fn is_storage_node(&self) -> bool {
        *self == Role::Storage
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Control => "control",
            Role::Compute => "compute",
            Role::Storage => "storage",
        }
    }
}

/// Lower-case role names for daemon payloads and display.
pub fn roles_to_str_list(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// Runtime settings resolved from the environment.
///
/// Everything has a sensible default so `cairn` works out of the box on a
/// standard install; each value can be overridden for development.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the membership daemon's REST API.
    pub daemon_url: String,

    /// Writable per-user data area (accounts, staged plans, logs).
    pub data_dir: PathBuf,

    /// Read-only install area holding provisioning plan templates.
    pub template_dir: PathBuf,

    /// Cloud the controller is bootstrapped onto.
    pub cloud_name: String,
}

impl Settings {
    /// Resolve settings from environment variables with install defaults.
    pub fn load() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/root"));

        Self {
            daemon_url: std::env::var("CAIRN_DAEMON_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7150".to_string()),
            data_dir: std::env::var_os("CAIRN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(".local/share/cairn")),
            template_dir: std::env::var_os("CAIRN_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/share/cairn/etc")),
            cloud_name: std::env::var("CAIRN_CLOUD").unwrap_or_else(|_| "local".to_string()),
        }
    }

    /// Directory where provisioning plans are staged for execution.
    pub fn plan_dir(&self, plan: &str) -> PathBuf {
        self.data_dir.join("etc").join(plan)
    }

    /// Directory holding saved controller accounts.
    pub fn accounts_dir(&self) -> PathBuf {
        self.data_dir.join("accounts")
    }

    /// Directory holding execution log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Answers supplied up front in a preseed file, bypassing prompts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Preseed {
    /// Container platform addon answers.
    #[serde(default)]
    pub addons: HashMap<String, String>,

    /// Storage configuration answers.
    #[serde(default)]
    pub storage: HashMap<String, String>,
}

impl Preseed {
    /// Load a preseed document from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CairnError::PreseedError {
            message: format!("{}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&text).map_err(|e| CairnError::PreseedError {
            message: format!("{}: {}", path.display(), e),
        })
    }
}
