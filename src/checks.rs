//! Concrete preflight checks.
//!
//! Each check validates one environmental condition and reports a
//! remediation hint on failure. All of them are read-only.

use std::path::PathBuf;

use regex::Regex;

use crate::cluster::ClusterApi;
use crate::config::RAM_16_GB_IN_KB;
use crate::engine::PreflightCheck;
use crate::host;

/// The membership daemon must answer before any workflow starts.
pub struct DaemonCheck<'a> {
    client: &'a dyn ClusterApi,
}

impl<'a> DaemonCheck<'a> {
    pub fn new(client: &'a dyn ClusterApi) -> Self {
        Self { client }
    }
}

impl PreflightCheck for DaemonCheck<'_> {
    fn name(&self) -> &str {
        "daemon"
    }

    fn description(&self) -> String {
        "Checking the cluster daemon is running".to_string()
    }

    fn run(&self) -> Result<(), String> {
        if self.client.is_reachable() {
            Ok(())
        } else {
            Err("cluster daemon is not reachable; install and start cairnd first".to_string())
        }
    }
}

/// The `conductor` binary must be on PATH.
pub struct ConductorBinaryCheck;

impl PreflightCheck for ConductorBinaryCheck {
    fn name(&self) -> &str {
        "conductor-binary"
    }

    fn description(&self) -> String {
        "Checking the conductor CLI is installed".to_string()
    }

    fn run(&self) -> Result<(), String> {
        match host::find_in_path("conductor") {
            Some(_) => Ok(()),
            None => Err("conductor binary not found on PATH".to_string()),
        }
    }
}

/// The data directory must exist and be writable.
///
/// Like every check this one is read-only; the directory itself is created
/// during startup, before any workflow runs.
pub struct DataDirCheck {
    data_dir: PathBuf,
}

impl DataDirCheck {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

impl PreflightCheck for DataDirCheck {
    fn name(&self) -> &str {
        "data-dir"
    }

    fn description(&self) -> String {
        format!("Checking {} is writable", self.data_dir.display())
    }

    fn run(&self) -> Result<(), String> {
        let meta = std::fs::metadata(&self.data_dir).map_err(|_| {
            format!(
                "{} does not exist; set CAIRN_DATA_DIR to a writable directory",
                self.data_dir.display()
            )
        })?;
        if !meta.is_dir() {
            return Err(format!("{} is not a directory", self.data_dir.display()));
        }
        if meta.permissions().readonly() {
            return Err(format!("{} is not writable", self.data_dir.display()));
        }
        Ok(())
    }
}

/// The machine must meet minimum hardware requirements.
///
/// Undersized machines fail hard rather than proceed with a warning; a
/// deployment that cannot host its own control plane is not recoverable
/// later.
pub struct SystemRequirementsCheck;

const MIN_CORES: usize = 4;

impl PreflightCheck for SystemRequirementsCheck {
    fn name(&self) -> &str {
        "system-requirements"
    }

    fn description(&self) -> String {
        "Checking for hardware requirements".to_string()
    }

    fn run(&self) -> Result<(), String> {
        let cores = host::total_cores();
        if cores < MIN_CORES {
            return Err(format!(
                "found {cores} CPU cores, at least {MIN_CORES} are required"
            ));
        }
        let ram = host::total_ram_kb().map_err(|e| format!("cannot read memory size: {e}"))?;
        if ram < RAM_16_GB_IN_KB {
            return Err(format!(
                "found {} GB of RAM, at least 16 GB is required",
                ram / (1024 * 1024)
            ));
        }
        Ok(())
    }
}

/// Node names must be well-formed fully qualified domain names.
pub struct VerifyFqdnCheck {
    fqdn: String,
}

impl VerifyFqdnCheck {
    pub fn new(fqdn: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
        }
    }
}

fn valid_fqdn(name: &str) -> bool {
    // A trailing dot marks an absolute name and is allowed.
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let label = match Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$") {
        Ok(re) => re,
        Err(_) => return false,
    };
    name.split('.').all(|part| label.is_match(part))
}

impl PreflightCheck for VerifyFqdnCheck {
    fn name(&self) -> &str {
        "fqdn"
    }

    fn description(&self) -> String {
        "Checking the node name is a valid FQDN".to_string()
    }

    fn run(&self) -> Result<(), String> {
        if valid_fqdn(&self.fqdn) {
            Ok(())
        } else {
            Err(format!(
                "'{}' is not a valid fully qualified domain name",
                self.fqdn
            ))
        }
    }
}

/// Compute nodes must present the same hostname to the controller and to
/// the hypervisor, or placement breaks later.
pub struct VerifyHypervisorHostnameCheck {
    fqdn: String,
}

impl VerifyHypervisorHostnameCheck {
    pub fn new(fqdn: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
        }
    }
}

impl PreflightCheck for VerifyHypervisorHostnameCheck {
    fn name(&self) -> &str {
        "hypervisor-hostname"
    }

    fn description(&self) -> String {
        "Checking the hypervisor hostname matches the FQDN".to_string()
    }

    fn run(&self) -> Result<(), String> {
        let reported = host::hypervisor_hostname()
            .map_err(|e| format!("cannot query hypervisor hostname: {e}"))?;
        if reported == self.fqdn {
            Ok(())
        } else {
            Err(format!(
                "hypervisor reports hostname '{reported}' but the node name is '{}'",
                self.fqdn
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fqdn_accepts_qualified_names() {
        assert!(valid_fqdn("node1.example.com"));
        assert!(valid_fqdn("node1.example.com."));
        assert!(valid_fqdn("a.b"));
    }

    #[test]
    fn fqdn_rejects_malformed_names() {
        assert!(!valid_fqdn(""));
        assert!(!valid_fqdn("-node.example.com"));
        assert!(!valid_fqdn("node-.example.com"));
        assert!(!valid_fqdn("node..example.com"));
        assert!(!valid_fqdn("node_1.example.com"));
        assert!(!valid_fqdn(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn fqdn_rejects_overlong_names() {
        let long = std::iter::repeat("label")
            .take(60)
            .collect::<Vec<_>>()
            .join(".");
        assert!(!valid_fqdn(&long));
    }

    #[test]
    fn data_dir_check_accepts_existing_directory() {
        let dir = TempDir::new().unwrap();
        DataDirCheck::new(dir.path().to_path_buf()).run().unwrap();
    }

    #[test]
    fn data_dir_check_fails_without_creating_anything() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/data");
        let check = DataDirCheck::new(target.clone());

        assert!(check.run().is_err());
        assert!(!target.exists());
    }

    #[test]
    #[cfg(unix)]
    fn data_dir_check_rejects_readonly_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data");
        std::fs::create_dir(&target).unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o555)).unwrap();

        assert!(DataDirCheck::new(target.clone()).run().is_err());

        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn system_requirements_names_the_check() {
        assert_eq!(SystemRequirementsCheck.name(), "system-requirements");
    }
}
