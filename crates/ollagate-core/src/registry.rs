//! Active-user registry — the only state that survives a restart.
//!
//! A monotonically growing set of user ids that have ever talked to the
//! bot, used to notify people about shutdown and startup. Persisted as a
//! single JSON record, rewritten wholesale on every insertion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::session::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegisteredUser {
    id: UserId,
    first_seen: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    users: Vec<RegisteredUser>,
}

pub struct ActiveUserRegistry {
    path: PathBuf,
    users: Mutex<BTreeMap<UserId, DateTime<Utc>>>,
}

impl ActiveUserRegistry {
    /// Load the registry from disk; a missing file means an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let users = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let file: RegistryFile = serde_json::from_str(&content)
                .map_err(|e| GateError::Registry(format!("corrupt registry file: {}", e)))?;
            file.users.into_iter().map(|u| (u.id, u.first_seen)).collect()
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            users: Mutex::new(users),
        })
    }

    /// Record a user. Returns `true` if the user was new; the file is
    /// rewritten only then. Writers serialize on the internal mutex so a
    /// rewrite can never interleave with another.
    pub fn add(&self, user_id: UserId) -> Result<bool> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&user_id) {
            return Ok(false);
        }
        users.insert(user_id, Utc::now());
        self.persist(&users)?;
        Ok(true)
    }

    /// All known user ids.
    pub fn users(&self) -> Vec<UserId> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, users: &BTreeMap<UserId, DateTime<Utc>>) -> Result<()> {
        let file = RegistryFile {
            users: users
                .iter()
                .map(|(id, first_seen)| RegisteredUser {
                    id: *id,
                    first_seen: *first_seen,
                })
                .collect(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
