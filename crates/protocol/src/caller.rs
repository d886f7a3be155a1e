//! Caller identity threaded into every core call.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::Username;

/// Session-level permission bits captured when the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermsSnapshot {
    /// Global administrator; bypasses every folder-level check.
    pub is_admin: bool,
    /// Account-wide read-only; strips every mutating capability.
    pub read_only: bool,
    /// Account-wide upload ban; strips the create capability.
    pub disable_upload: bool,
}

impl PermsSnapshot {
    /// Snapshot for a global administrator.
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Self::default()
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Normalized username.
    pub username: Username,
    /// Permission bits for this session.
    pub perms: PermsSnapshot,
}

impl CallerContext {
    /// Create a caller context.
    pub fn new(username: Username, perms: PermsSnapshot) -> Self {
        Self { username, perms }
    }

    /// A regular user with default session bits.
    pub fn user(name: &str) -> Result<Self> {
        Ok(Self::new(Username::new(name)?, PermsSnapshot::default()))
    }

    /// A global administrator.
    pub fn admin(name: &str) -> Result<Self> {
        Ok(Self::new(Username::new(name)?, PermsSnapshot::admin()))
    }

    /// Returns true if the session marks the caller as a global administrator.
    pub fn is_admin(&self) -> bool {
        self.perms.is_admin
    }
}
