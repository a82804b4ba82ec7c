//! 子管理员模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PanelError, PanelResult};

/// A delegated operator bound to exactly one panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    /// Name of the bound panel
    pub panel: String,
    pub inbound_id: Option<i64>,
    pub inbound_flow: Option<String>,
    /// JSON object: protocol -> inbound tags
    pub marzban_inbounds: Option<String>,
    #[serde(skip_serializing)]
    pub marzban_password: Option<String>,
    /// Remaining quota in bytes, may go negative until enforcement runs
    pub traffic: i64,
    pub return_traffic: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl Admin {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_exhausted(&self) -> bool {
        self.traffic <= 0
    }

    /// Whether this admin's clients must be switched off right now.
    pub fn should_block(&self, now: DateTime<Utc>) -> bool {
        self.is_exhausted() || self.is_expired(now)
    }

    /// Parse the stored marzban inbound set.
    pub fn parsed_inbounds(&self) -> PanelResult<BTreeMap<String, Vec<String>>> {
        match self.marzban_inbounds.as_deref().map(str::trim) {
            None | Some("") => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                PanelError::Configuration(format!(
                    "admin {} has malformed marzban_inbounds: {}",
                    self.username, e
                ))
            }),
        }
    }
}

/// Superadmin input for creating or replacing an admin.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminInput {
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub panel: String,
    #[serde(default)]
    pub inbound_id: Option<i64>,
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub marzban_inbounds: Option<String>,
    #[serde(default)]
    pub marzban_password: Option<String>,
    /// Opening balance, only read on create
    #[serde(default)]
    pub traffic: i64,
    #[serde(default)]
    pub return_traffic: bool,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}
