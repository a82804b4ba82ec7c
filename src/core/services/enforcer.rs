//! 配额执行
//! 余额耗尽或过期时禁用全部用户并打标记，恢复时只启用带标记的用户

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::models::{Admin, ClientScope, ClientSpec, RemoteClient};
use crate::core::panel::PanelClient;
use crate::error::PanelError;

/// A failure tied to one client, or to the whole pass when `client` is None.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassError {
    pub client: Option<String>,
    pub kind: &'static str,
    pub message: String,
}

impl PassError {
    pub fn for_client(email: &str, error: &PanelError) -> Self {
        Self {
            client: Some(email.to_string()),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn for_pass(error: &PanelError) -> Self {
        Self {
            client: None,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EnforcementOutcome {
    pub disabled: Vec<String>,
    pub enabled: Vec<String>,
    pub errors: Vec<PassError>,
}

pub struct QuotaEnforcer;

impl QuotaEnforcer {
    /// Bring the admin's clients in line with its balance and expiry.
    ///
    /// Each client is handled on its own; one rejected update does not stop
    /// the rest.
    pub async fn enforce(
        client: &dyn PanelClient,
        scope: &ClientScope,
        admin: &Admin,
        remote: &[RemoteClient],
        now: DateTime<Utc>,
    ) -> EnforcementOutcome {
        let mut outcome = EnforcementOutcome::default();
        let block = admin.should_block(now);

        for rc in remote {
            let spec = match (block, rc.enabled, rc.is_auto_disabled()) {
                (true, true, _) => ClientSpec::from(rc).auto_disabled(),
                (false, false, true) => ClientSpec::from(rc).restored(),
                _ => continue,
            };

            let key = client.client_key(rc);
            match client.update_client(scope, key, &spec).await {
                Ok(()) if spec.enabled => outcome.enabled.push(rc.email.clone()),
                Ok(()) => outcome.disabled.push(rc.email.clone()),
                Err(e) => {
                    tracing::warn!(
                        "Failed to {} client {} of admin {}: {}",
                        if spec.enabled { "enable" } else { "disable" },
                        rc.email,
                        admin.username,
                        e
                    );
                    outcome.errors.push(PassError::for_client(&rc.email, &e));
                }
            }
        }

        if !outcome.disabled.is_empty() {
            tracing::info!(
                "Admin {} blocked (traffic {}), disabled {} client(s)",
                admin.username,
                admin.traffic,
                outcome.disabled.len()
            );
        }
        if !outcome.enabled.is_empty() {
            tracing::info!(
                "Admin {} restored, re-enabled {} client(s)",
                admin.username,
                outcome.enabled.len()
            );
        }
        outcome
    }
}
