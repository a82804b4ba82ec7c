//! 应用配置模型

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub superadmin_username: String,
    /// Bearer key for the HTTP API, generated on first start when empty
    pub api_key: String,
    pub scheduler_enabled: bool,
    pub reconcile_interval_secs: u64, // 秒
    pub request_timeout_secs: u64,    // 秒
    /// Admin passes running at once across all panels
    pub max_concurrent_reconciles: usize,
    /// Admin passes running at once against a single panel
    pub per_panel_concurrency: usize,
    /// Parallel usage reads inside one admin pass
    pub usage_fetch_concurrency: usize,
    /// Delete individually expired clients and credit their unused quota
    pub purge_expired_clients: bool,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            superadmin_username: "admin".to_string(),
            api_key: String::new(),
            scheduler_enabled: true,
            reconcile_interval_secs: 300,
            request_timeout_secs: 15,
            max_concurrent_reconciles: 16,
            per_panel_concurrency: 2,
            usage_fetch_concurrency: 4,
            purge_expired_clients: false,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(10))
    }

    /// Fill in generated values. Returns true when something changed.
    pub fn ensure_api_key(&mut self) -> bool {
        if self.api_key.trim().is_empty() {
            self.api_key = format!("sk-{}", uuid::Uuid::new_v4().simple());
            return true;
        }
        false
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
