//! 流量对账服务
//! 按管理员拉取面板用户用量，扣减余额后执行配额

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{AcquireError, Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use super::enforcer::{PassError, QuotaEnforcer};
use crate::core::models::{Admin, AppConfig, ClientScope, Panel, RemoteClient};
use crate::core::panel::{ClientFactory, PanelClient};
use crate::core::storage::{charge_usage, AdminStorage, ObservedUsage, PanelStorage};
use crate::error::{AppError, AppResult, PanelError, PanelResult};

/// Outcome of one admin's pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationResult {
    pub admin_id: i64,
    pub admin: String,
    pub consumed: i64,
    pub credited: i64,
    pub new_balance: i64,
    pub disabled_clients: Vec<String>,
    pub enabled_clients: Vec<String>,
    pub purged_clients: Vec<String>,
    pub errors: Vec<PassError>,
}

impl ReconciliationResult {
    fn start(admin: &Admin) -> Self {
        Self {
            admin_id: admin.id,
            admin: admin.username.clone(),
            new_balance: admin.traffic,
            ..Default::default()
        }
    }
}

/// Global and per-panel admission for reconciliation passes.
pub struct PanelLimiter {
    global: Arc<Semaphore>,
    per_panel: DashMap<String, Arc<Semaphore>>,
    per_panel_permits: usize,
}

impl PanelLimiter {
    pub fn new(global: usize, per_panel: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global.max(1))),
            per_panel: DashMap::new(),
            per_panel_permits: per_panel.max(1),
        }
    }

    /// Waits for the panel slot first so a busy panel does not pin global slots.
    pub async fn acquire(
        &self,
        panel: &str,
    ) -> Result<(OwnedSemaphorePermit, OwnedSemaphorePermit), AcquireError> {
        let panel_sem = self
            .per_panel
            .entry(panel.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_panel_permits)))
            .clone();
        let panel_permit = panel_sem.acquire_owned().await?;
        let global_permit = self.global.clone().acquire_owned().await?;
        Ok((panel_permit, global_permit))
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub usage_fetch_concurrency: usize,
    pub purge_expired_clients: bool,
}

impl From<&AppConfig> for ReconcileSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            usage_fetch_concurrency: config.usage_fetch_concurrency.max(1),
            purge_expired_clients: config.purge_expired_clients,
        }
    }
}

pub struct TrafficReconciler {
    pool: SqlitePool,
    factory: Arc<dyn ClientFactory>,
    limiter: PanelLimiter,
    settings: ReconcileSettings,
    admin_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl TrafficReconciler {
    pub fn new(pool: SqlitePool, factory: Arc<dyn ClientFactory>, config: &AppConfig) -> Self {
        Self {
            pool,
            factory,
            limiter: PanelLimiter::new(config.max_concurrent_reconciles, config.per_panel_concurrency),
            settings: ReconcileSettings::from(config),
            admin_locks: DashMap::new(),
        }
    }

    fn admin_lock(&self, admin_id: i64) -> Arc<Mutex<()>> {
        self.admin_locks
            .entry(admin_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hold off passes for this admin while the guard lives.
    pub async fn lock_admin(&self, admin_id: i64) -> OwnedMutexGuard<()> {
        self.admin_lock(admin_id).lock_owned().await
    }

    /// Reconcile one admin and enforce its quota.
    ///
    /// Panel failures end up in `errors` of the result; only storage
    /// failures and a missing admin are returned as `Err`.
    pub async fn reconcile_and_enforce(&self, admin_id: i64) -> AppResult<ReconciliationResult> {
        let lock = self.admin_lock(admin_id);
        let _guard = lock.lock().await;

        let admin = AdminStorage::get_by_id(&self.pool, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;
        let mut result = ReconciliationResult::start(&admin);

        let Some(panel) = PanelStorage::get_by_name(&self.pool, &admin.panel).await? else {
            let err = PanelError::QuotaState(format!(
                "admin {} is bound to missing panel {}",
                admin.username, admin.panel
            ));
            tracing::warn!("{}", err);
            result.errors.push(PassError::for_pass(&err));
            return Ok(result);
        };

        let _permits = self
            .limiter
            .acquire(&panel.name)
            .await
            .map_err(|e| PanelError::QuotaState(format!("limiter closed: {}", e)))?;

        match self.run_pass(&admin, &panel, &mut result).await {
            Ok(()) => {}
            Err(AppError::Panel(e)) => {
                tracing::warn!(
                    "Reconcile of admin {} on panel {} aborted: {}",
                    admin.username,
                    panel.name,
                    e
                );
                result.errors.push(PassError::for_pass(&e));
            }
            Err(e) => return Err(e),
        }

        tracing::debug!(
            "Admin {}: consumed {} credited {} balance {}",
            admin.username,
            result.consumed,
            result.credited,
            result.new_balance
        );
        Ok(result)
    }

    async fn run_pass(
        &self,
        admin: &Admin,
        panel: &Panel,
        result: &mut ReconciliationResult,
    ) -> AppResult<()> {
        let scope = ClientScope::for_admin(admin)?;
        let client = self.factory.build(panel, Some(admin))?;
        client.authenticate().await?;
        let remote = client.list_clients(&scope).await?;

        // 1. 读取用量，预留额度先抵扣
        let usage = self.fetch_usage(&*client, &scope, &remote).await;
        let baselines = AdminStorage::usage_baselines(&self.pool, admin.id).await?;

        let mut consumed: i64 = 0;
        let mut observed = Vec::with_capacity(remote.len());
        for rc in &remote {
            let baseline = baselines.get(&rc.email);
            match usage.get(&rc.email) {
                Some(Ok(used)) => {
                    let used = i64::try_from(*used).unwrap_or(i64::MAX);
                    let (charged, reserved_left) = charge_usage(baseline, used);
                    consumed = consumed.checked_add(charged).ok_or_else(|| {
                        PanelError::QuotaState(format!(
                            "consumption overflow for admin {}",
                            admin.username
                        ))
                    })?;
                    observed.push(ObservedUsage {
                        email: rc.email.clone(),
                        observed_bytes: used,
                        reserved_bytes: reserved_left,
                    });
                }
                Some(Err(e)) => {
                    result.errors.push(PassError::for_client(&rc.email, e));
                    // Keep the old row so the next pass charges the gap.
                    if let Some(base) = baseline {
                        observed.push(ObservedUsage {
                            email: rc.email.clone(),
                            observed_bytes: base.observed_bytes,
                            reserved_bytes: base.reserved_bytes,
                        });
                    }
                }
                None => {}
            }
        }

        // Clients removed on the panel directly still hold a reservation
        let listed: HashSet<&str> = remote.iter().map(|rc| rc.email.as_str()).collect();
        let orphaned: i64 = baselines
            .iter()
            .filter(|(email, _)| !listed.contains(email.as_str()))
            .map(|(_, base)| base.reserved_bytes.max(0))
            .fold(0i64, |acc, r| acc.saturating_add(r));

        // 2. 扣减余额并替换基线
        let balance =
            AdminStorage::apply_reconciliation(&self.pool, admin.id, consumed, &observed).await?;
        result.consumed = consumed;
        result.new_balance = balance;
        if consumed > 0 {
            tracing::info!(
                "Charged admin {} {} bytes, balance {}",
                admin.username,
                consumed,
                balance
            );
        }
        if orphaned > 0 {
            if let Some(balance) =
                AdminStorage::increase_traffic(&self.pool, admin.id, orphaned).await?
            {
                tracing::info!(
                    "Returned {} reserved bytes of vanished clients to admin {}",
                    orphaned,
                    admin.username
                );
                result.credited += orphaned;
                result.new_balance = balance;
            }
        }

        // 3. 清理过期用户
        let remaining = if self.settings.purge_expired_clients {
            self.purge_expired(&*client, &scope, admin, remote, &usage, result)
                .await?
        } else {
            remote
        };

        // 4. 执行配额
        let mut current = admin.clone();
        current.traffic = result.new_balance;
        let outcome =
            QuotaEnforcer::enforce(&*client, &scope, &current, &remaining, Utc::now()).await;
        result.disabled_clients = outcome.disabled;
        result.enabled_clients = outcome.enabled;
        result.errors.extend(outcome.errors);
        Ok(())
    }

    async fn fetch_usage(
        &self,
        client: &dyn PanelClient,
        scope: &ClientScope,
        remote: &[RemoteClient],
    ) -> HashMap<String, PanelResult<u64>> {
        let fetches: Vec<_> = remote
            .iter()
            .map(|rc| async move {
                (rc.email.clone(), client.get_usage(scope, &rc.email).await)
            })
            .collect();
        stream::iter(fetches)
        .buffer_unordered(self.settings.usage_fetch_concurrency)
        .collect()
        .await
    }

    /// Delete clients whose own expiry passed. Their unused reservation goes
    /// back to the admin through the gated credit path. Clients whose usage
    /// could not be read in this pass are kept for a later one. Returns the
    /// survivors.
    async fn purge_expired(
        &self,
        client: &dyn PanelClient,
        scope: &ClientScope,
        admin: &Admin,
        remote: Vec<RemoteClient>,
        usage: &HashMap<String, PanelResult<u64>>,
        result: &mut ReconciliationResult,
    ) -> AppResult<Vec<RemoteClient>> {
        let now = Utc::now();
        let mut survivors = Vec::with_capacity(remote.len());

        for rc in remote {
            if !rc.is_expired(now) {
                survivors.push(rc);
                continue;
            }
            let Some(Ok(used)) = usage.get(&rc.email) else {
                tracing::debug!(
                    "Expired client {} of admin {} kept: usage unknown",
                    rc.email,
                    admin.username
                );
                survivors.push(rc);
                continue;
            };

            if let Err(e) = client.delete_client(scope, client.client_key(&rc)).await {
                result.errors.push(PassError::for_client(&rc.email, &e));
                survivors.push(rc);
                continue;
            }
            let used = i64::try_from(*used).unwrap_or(i64::MAX);
            let settled = AdminStorage::settle_client(&self.pool, admin.id, &rc.email, used).await?;
            result.consumed += settled.charged;
            result.new_balance = settled.balance;
            result.purged_clients.push(rc.email.clone());

            let mut returned = 0;
            if settled.unused_reserve > 0 {
                if let Some(balance) =
                    AdminStorage::increase_traffic(&self.pool, admin.id, settled.unused_reserve)
                        .await?
                {
                    returned = settled.unused_reserve;
                    result.credited += returned;
                    result.new_balance = balance;
                }
            }
            tracing::info!(
                "Purged expired client {} of admin {} (returned {} bytes)",
                rc.email,
                admin.username,
                returned
            );
        }
        Ok(survivors)
    }

    /// Run a pass for every admin at once, bounded by the limiter.
    pub async fn reconcile_all(self: &Arc<Self>) -> AppResult<Vec<ReconciliationResult>> {
        let admins = AdminStorage::list(&self.pool).await?;
        let mut set = JoinSet::new();
        for admin in admins {
            let this = Arc::clone(self);
            set.spawn(async move {
                let outcome = this.reconcile_and_enforce(admin.id).await;
                (admin, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(result))) => results.push(result),
                Ok((admin, Err(e))) => {
                    tracing::error!("Reconcile of admin {} failed: {}", admin.username, e);
                    let mut failed = ReconciliationResult::start(&admin);
                    failed.errors.push(PassError {
                        client: None,
                        kind: "storage",
                        message: e.to_string(),
                    });
                    results.push(failed);
                }
                Err(e) => tracing::error!("Reconcile task crashed: {}", e),
            }
        }
        results.sort_by_key(|r| r.admin_id);
        Ok(results)
    }
}
