//! 远程客户端视图
//! 面板上报的实时用户数据，本地不持久化

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Admin;
use crate::error::PanelResult;

/// Marker written into a client's note when this service switched it off.
pub const AUTO_DISABLED_TAG: &str = "[walpanel:auto-disabled]";

/// One proxy user as reported live by a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClient {
    pub email: String,
    pub uuid: String,
    pub enabled: bool,
    pub expiry: Option<DateTime<Utc>>,
    /// Quota in bytes, 0 means unlimited
    pub total: u64,
    pub used: u64,
    pub sub_id: String,
    pub flow: String,
    #[serde(default)]
    pub note: String,
}

impl RemoteClient {
    pub fn is_auto_disabled(&self) -> bool {
        self.note.contains(AUTO_DISABLED_TAG)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// Desired state of a remote client, sent on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {
    pub email: String,
    pub uuid: String,
    pub enabled: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub total: u64,
    #[serde(default)]
    pub sub_id: String,
    #[serde(default)]
    pub flow: String,
    #[serde(default)]
    pub note: String,
}

impl ClientSpec {
    /// Same client with the auto-disable marker set and the client switched off.
    pub fn auto_disabled(mut self) -> Self {
        self.enabled = false;
        if !self.note.contains(AUTO_DISABLED_TAG) {
            self.note = if self.note.is_empty() {
                AUTO_DISABLED_TAG.to_string()
            } else {
                format!("{} {}", self.note, AUTO_DISABLED_TAG)
            };
        }
        self
    }

    /// Same client re-enabled with the marker removed.
    pub fn restored(mut self) -> Self {
        self.enabled = true;
        self.note = self.note.replace(AUTO_DISABLED_TAG, "").trim().to_string();
        self
    }
}

impl From<&RemoteClient> for ClientSpec {
    fn from(c: &RemoteClient) -> Self {
        Self {
            email: c.email.clone(),
            uuid: c.uuid.clone(),
            enabled: c.enabled,
            expiry: c.expiry,
            total: c.total,
            sub_id: c.sub_id.clone(),
            flow: c.flow.clone(),
            note: c.note.clone(),
        }
    }
}

/// A panel-side listener/protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    /// Numeric id (3x-ui) or tag (marzban)
    pub id: String,
    pub protocol: String,
    pub remark: String,
    pub port: Option<u16>,
    pub enabled: bool,
}

/// Which remote clients belong to one admin.
#[derive(Debug, Clone, Default)]
pub struct ClientScope {
    pub owner: String,
    pub inbound_id: Option<i64>,
    pub flow: Option<String>,
    pub inbounds: BTreeMap<String, Vec<String>>,
}

impl ClientScope {
    pub fn for_admin(admin: &Admin) -> PanelResult<Self> {
        Ok(Self {
            owner: admin.username.clone(),
            inbound_id: admin.inbound_id,
            flow: admin.inbound_flow.clone().filter(|f| !f.is_empty()),
            inbounds: admin.parsed_inbounds()?,
        })
    }
}
