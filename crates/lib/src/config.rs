//! Configuration for synchronization sessions.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::control::StaleBasePolicy;
use crate::history::HistoryRole;

/// Settings shared by controls, models and sessions.
///
/// ```
/// # use convergent::config::SyncConfig;
/// # use convergent::history::HistoryRole;
/// let config = SyncConfig::from_json(r#"{"role": "passThrough"}"#).unwrap();
/// assert_eq!(config.role, HistoryRole::PassThrough);
/// assert!(config.reset_on_mismatch);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Whether this participant assigns history ids.
    pub role: HistoryRole,
    pub stale_base: StaleBasePolicy,
    /// Rebuild an object from its whole operation when an operation does not fit it.
    pub reset_on_mismatch: bool,
    /// Name attached to the operations this participant sends.
    pub user: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            role: HistoryRole::Authoritative,
            stale_base: StaleBasePolicy::Transform,
            reset_on_mismatch: true,
            user: None,
        }
    }
}

impl SyncConfig {
    /// Defaults for a client mirroring an authority.
    pub fn client() -> Self {
        Self::default().with_role(HistoryRole::PassThrough)
    }

    pub fn with_role(mut self, role: HistoryRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_stale_base(mut self, stale_base: StaleBasePolicy) -> Self {
        self.stale_base = stale_base;
        self
    }

    pub fn with_reset_on_mismatch(mut self, reset_on_mismatch: bool) -> Self {
        self.reset_on_mismatch = reset_on_mismatch;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
