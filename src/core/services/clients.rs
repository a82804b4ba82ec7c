//! 子管理员的面板用户管理
//! 创建用户时从余额预留其额度；删除时先结清用量，再按 return_traffic 退还未用的预留

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use super::reconciler::TrafficReconciler;
use crate::core::models::{Admin, ClientScope, ClientSpec, RemoteClient};
use crate::core::panel::{ClientFactory, PanelClient};
use crate::core::storage::{AdminStorage, PanelStorage};
use crate::error::{AppError, AppResult, PanelError};

/// Smallest quota a client may be given (100 MiB).
pub const MIN_CLIENT_QUOTA: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInput {
    pub email: String,
    /// Client uuid, generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Milliseconds since epoch, 0 means no expiry
    #[serde(default)]
    pub expiry_time: i64,
    pub total: u64,
    #[serde(default)]
    pub sub_id: Option<String>,
    #[serde(default)]
    pub flow: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientUpdateInput {
    pub enable: bool,
    #[serde(default)]
    pub expiry_time: i64,
    pub total: u64,
    #[serde(default)]
    pub flow: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub email: String,
    pub charged: i64,
    pub credited: i64,
    pub new_balance: i64,
}

fn default_true() -> bool {
    true
}

fn expiry_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms > 0 {
        DateTime::<Utc>::from_timestamp_millis(ms)
    } else {
        None
    }
}

pub struct ClientService {
    pool: SqlitePool,
    factory: Arc<dyn ClientFactory>,
    reconciler: Arc<TrafficReconciler>,
}

impl ClientService {
    pub fn new(
        pool: SqlitePool,
        factory: Arc<dyn ClientFactory>,
        reconciler: Arc<TrafficReconciler>,
    ) -> Self {
        Self {
            pool,
            factory,
            reconciler,
        }
    }

    async fn session(&self, admin_id: i64) -> AppResult<(Admin, ClientScope, Arc<dyn PanelClient>)> {
        let admin = AdminStorage::get_by_id(&self.pool, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;
        let panel = PanelStorage::get_by_name(&self.pool, &admin.panel)
            .await?
            .ok_or_else(|| {
                PanelError::QuotaState(format!(
                    "admin {} is bound to missing panel {}",
                    admin.username, admin.panel
                ))
            })?;
        let scope = ClientScope::for_admin(&admin)?;
        let client = self.factory.build(&panel, Some(&admin))?;
        client.authenticate().await?;
        Ok((admin, scope, client))
    }

    async fn find(
        client: &dyn PanelClient,
        scope: &ClientScope,
        email: &str,
    ) -> AppResult<RemoteClient> {
        client
            .list_clients(scope)
            .await?
            .into_iter()
            .find(|c| c.email == email)
            .ok_or_else(|| AppError::NotFound(format!("client {}", email)))
    }

    pub async fn list(&self, admin_id: i64) -> AppResult<Vec<RemoteClient>> {
        let (_, scope, client) = self.session(admin_id).await?;
        Ok(client.list_clients(&scope).await?)
    }

    /// Create a client and reserve its whole quota from the admin's balance.
    pub async fn create(&self, admin_id: i64, input: &ClientInput) -> AppResult<ClientSpec> {
        if input.email.trim().is_empty() {
            return Err(AppError::InvalidInput("email is empty".into()));
        }
        let _guard = self.reconciler.lock_admin(admin_id).await;
        let (admin, scope, client) = self.session(admin_id).await?;
        let quota = quota_bytes(input.total)?;
        check_allowance(&admin, input.total, input.enable, quota)?;

        let uuid = input
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let sub_id = input
            .sub_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..16].to_string());
        let spec = ClientSpec {
            email: input.email.trim().to_string(),
            uuid,
            enabled: input.enable,
            expiry: expiry_from_millis(input.expiry_time),
            total: input.total,
            sub_id,
            flow: input.flow.clone(),
            note: String::new(),
        };

        let balance = AdminStorage::reserve_client(&self.pool, admin.id, &spec.email, quota).await?;
        if let Err(e) = client.create_client(&scope, &spec).await {
            AdminStorage::release_reservation(&self.pool, admin.id, &spec.email, quota).await?;
            return Err(e.into());
        }
        tracing::info!(
            "Admin {} created client {} ({} bytes reserved, balance {})",
            admin.username,
            spec.email,
            quota,
            balance
        );
        Ok(spec)
    }

    /// Change a client. A larger quota reserves the difference; a smaller one
    /// hands the difference back when the admin returns traffic.
    pub async fn update(
        &self,
        admin_id: i64,
        email: &str,
        input: &ClientUpdateInput,
    ) -> AppResult<ClientSpec> {
        let _guard = self.reconciler.lock_admin(admin_id).await;
        let (admin, scope, client) = self.session(admin_id).await?;
        let current = Self::find(&*client, &scope, email).await?;
        let change = quota_bytes(input.total)? - quota_bytes(current.total)?;
        check_allowance(&admin, input.total, input.enable, change.max(0))?;

        let mut spec = ClientSpec::from(&current);
        spec.enabled = input.enable;
        spec.expiry = expiry_from_millis(input.expiry_time);
        spec.total = input.total;
        if let Some(flow) = &input.flow {
            spec.flow = flow.clone();
        }
        if spec.enabled {
            spec = spec.restored();
        }

        if change > 0 {
            AdminStorage::reserve_client(&self.pool, admin.id, email, change).await?;
        }
        if let Err(e) = client
            .update_client(&scope, client.client_key(&current), &spec)
            .await
        {
            if change > 0 {
                AdminStorage::release_reservation(&self.pool, admin.id, email, change).await?;
            }
            return Err(e.into());
        }
        if change < 0 && admin.return_traffic {
            let (released, balance) =
                AdminStorage::release_reservation(&self.pool, admin.id, email, -change).await?;
            tracing::debug!(
                "Client {} shrank, returned {} bytes, balance {}",
                email,
                released,
                balance
            );
        }
        Ok(spec)
    }

    /// Remove a client. Its usage since the last pass is settled against its
    /// reservation first, then what is left of the reservation is credited
    /// when the admin returns traffic.
    pub async fn delete(&self, admin_id: i64, email: &str) -> AppResult<DeleteOutcome> {
        let _guard = self.reconciler.lock_admin(admin_id).await;
        let (admin, scope, client) = self.session(admin_id).await?;
        let current = Self::find(&*client, &scope, email).await?;
        let used = match client.get_usage(&scope, email).await {
            Ok(used) => used,
            Err(e) => {
                tracing::warn!(
                    "Usage of client {} unreadable, settling with listed {} bytes: {}",
                    email,
                    current.used,
                    e
                );
                current.used
            }
        };

        client
            .delete_client(&scope, client.client_key(&current))
            .await?;

        let used = i64::try_from(used).unwrap_or(i64::MAX);
        let settled = AdminStorage::settle_client(&self.pool, admin.id, email, used).await?;

        let mut balance = settled.balance;
        let mut credited = 0;
        if settled.unused_reserve > 0 {
            if let Some(b) =
                AdminStorage::increase_traffic(&self.pool, admin.id, settled.unused_reserve).await?
            {
                credited = settled.unused_reserve;
                balance = b;
            }
        }

        tracing::info!(
            "Admin {} deleted client {}: charged {}, credited {}",
            admin.username,
            email,
            settled.charged,
            credited
        );
        Ok(DeleteOutcome {
            email: email.to_string(),
            charged: settled.charged,
            credited,
            new_balance: balance,
        })
    }
}

fn quota_bytes(total: u64) -> AppResult<i64> {
    i64::try_from(total)
        .map_err(|_| AppError::InvalidInput(format!("client quota {} is too large", total)))
}

/// Blocked admins cannot hand out enabled clients, and the quota still to be
/// reserved must fit in the admin's remaining balance.
fn check_allowance(admin: &Admin, total: u64, enable: bool, to_reserve: i64) -> AppResult<()> {
    if total < MIN_CLIENT_QUOTA {
        return Err(AppError::InvalidInput(format!(
            "client quota must be at least {} bytes",
            MIN_CLIENT_QUOTA
        )));
    }
    if enable && admin.should_block(Utc::now()) {
        return Err(AppError::Conflict(format!(
            "admin {} has no traffic left or is expired",
            admin.username
        )));
    }
    if to_reserve > admin.traffic {
        return Err(AppError::InvalidInput(format!(
            "client quota {} exceeds remaining traffic {}",
            to_reserve, admin.traffic
        )));
    }
    Ok(())
}
