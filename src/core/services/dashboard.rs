//! 仪表盘数据
//! 子管理员看自己的余额与用户，超级管理员看全局与主机状态

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sysinfo::{Disks, System};

use super::clients::ClientService;
use crate::core::models::{Admin, Panel, RemoteClient};
use crate::core::storage::{AdminStorage, PanelStorage};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub remaining_traffic: i64,
    pub expiry_time: Option<DateTime<Utc>>,
    pub sub_url: Option<String>,
    pub users: Vec<RemoteClient>,
    /// Set when the panel could not be read; balances are still reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub cpu_usage_percent: f32,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SuperadminDashboard {
    pub admins: Vec<Admin>,
    pub panels: Vec<Panel>,
    pub system: SystemInfo,
}

pub struct DashboardService;

impl DashboardService {
    pub async fn for_admin(
        pool: &SqlitePool,
        clients: &ClientService,
        admin_id: i64,
    ) -> AppResult<AdminDashboard> {
        let admin = AdminStorage::get_by_id(pool, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;
        let panel = PanelStorage::get_by_name(pool, &admin.panel).await?;

        let mut dashboard = AdminDashboard {
            remaining_traffic: admin.traffic,
            expiry_time: admin.expiry_date,
            sub_url: panel.as_ref().and_then(|p| p.sub_url.clone()),
            users: Vec::new(),
            panel_error: None,
        };

        match panel {
            Some(p) if !p.is_active => {
                tracing::debug!("Panel {} inactive, skipping user fetch", p.name);
            }
            _ => match clients.list(admin_id).await {
                Ok(users) => dashboard.users = users,
                Err(AppError::Panel(e)) => {
                    tracing::warn!("Dashboard users for {} unavailable: {}", admin.username, e);
                    dashboard.panel_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            },
        }
        Ok(dashboard)
    }

    pub async fn for_superadmin(pool: &SqlitePool) -> AppResult<SuperadminDashboard> {
        let admins = AdminStorage::list(pool).await?;
        let panels = PanelStorage::list(pool).await?;
        let system = tokio::task::spawn_blocking(system_info)
            .await
            .map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))?;
        Ok(SuperadminDashboard {
            admins,
            panels,
            system,
        })
    }
}

fn system_info() -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    let cpus = sys.cpus();
    let cpu_usage_percent = if cpus.is_empty() {
        0.0
    } else {
        cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
    };

    let disks = Disks::new_with_refreshed_list();
    let (disk_total, disk_free) = disks.iter().fold((0u64, 0u64), |(t, f), d| {
        (t + d.total_space(), f + d.available_space())
    });

    SystemInfo {
        cpu_usage_percent,
        memory_total: sys.total_memory(),
        memory_used: sys.used_memory(),
        disk_total,
        disk_used: disk_total.saturating_sub(disk_free),
        uptime_secs: System::uptime(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::init_memory_db;
    use crate::core::models::AppConfig;
    use crate::core::services::TrafficReconciler;
    use crate::core::testing::{self, remote_client, FakeFactory, FakePanel};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_inactive_panel_skips_user_fetch() {
        let pool = init_memory_db().await.unwrap();
        let factory = FakeFactory::new();
        let host = FakePanel::new("http://main");
        host.add_client(remote_client("c1", 0, 0));
        factory.add(host.clone());
        let mut panel = testing::panel_input("main", "http://main");
        panel.sub_url = Some("https://sub.example.com".into());
        let panel = PanelStorage::insert(&pool, &panel).await.unwrap();
        let admin = AdminStorage::insert(&pool, &testing::admin_input("alice", 42), "h")
            .await
            .unwrap();

        let reconciler = Arc::new(TrafficReconciler::new(
            pool.clone(),
            factory.clone(),
            &AppConfig::default(),
        ));
        let clients = ClientService::new(pool.clone(), factory.clone(), reconciler);

        let active = DashboardService::for_admin(&pool, &clients, admin.id)
            .await
            .unwrap();
        assert_eq!(active.remaining_traffic, 42);
        assert_eq!(active.sub_url.as_deref(), Some("https://sub.example.com"));
        assert_eq!(active.users.len(), 1);

        PanelStorage::toggle_status(&pool, panel.id).await.unwrap();
        let builds = factory.builds();
        let inactive = DashboardService::for_admin(&pool, &clients, admin.id)
            .await
            .unwrap();
        assert!(inactive.users.is_empty());
        assert_eq!(factory.builds(), builds);
    }

    #[tokio::test]
    async fn test_superadmin_view_lists_everything() {
        let pool = init_memory_db().await.unwrap();
        PanelStorage::insert(&pool, &testing::panel_input("main", "http://main"))
            .await
            .unwrap();
        AdminStorage::insert(&pool, &testing::admin_input("alice", 1), "h")
            .await
            .unwrap();
        let view = DashboardService::for_superadmin(&pool).await.unwrap();
        assert_eq!(view.admins.len(), 1);
        assert_eq!(view.panels.len(), 1);
        assert!(view.system.memory_total >= view.system.memory_used);
    }
}
