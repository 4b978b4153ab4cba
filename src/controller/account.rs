//! Saved controller accounts.
//!
//! Each node keeps the credentials it registered with under the data
//! directory, one YAML file per controller. The bootstrap account gets an
//! additional backup copy so a later re-registration cannot orphan it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CairnError, Result};

/// Credentials for one controller user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub token: String,
}

impl Account {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

/// Path of the account file for a controller.
pub fn account_path(accounts_dir: &Path, controller: &str) -> PathBuf {
    accounts_dir.join(format!("{controller}.yaml"))
}

/// Persist an account, creating the accounts directory if needed.
pub fn save_account(accounts_dir: &Path, controller: &str, account: &Account) -> Result<()> {
    fs::create_dir_all(accounts_dir)?;
    let text = serde_yaml::to_string(account)
        .map_err(|e| CairnError::Other(anyhow::anyhow!("serialize account: {e}")))?;
    fs::write(account_path(accounts_dir, controller), text)?;
    Ok(())
}

/// Load a previously saved account, or `None` if none was saved.
pub fn load_account(accounts_dir: &Path, controller: &str) -> Result<Option<Account>> {
    let path = account_path(accounts_dir, controller);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let account = serde_yaml::from_str(&text)
        .map_err(|e| CairnError::Other(anyhow::anyhow!("parse {}: {e}", path.display())))?;
    Ok(Some(account))
}

/// Copy the account file to a `.bk` sibling.
pub fn backup_account(accounts_dir: &Path, controller: &str) -> Result<()> {
    let path = account_path(accounts_dir, controller);
    let backup = path.with_extension("yaml.bk");
    fs::copy(&path, &backup)?;
    Ok(())
}
