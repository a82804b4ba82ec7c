//! 子管理员服务
//! 创建/更新前校验面板绑定，密码加盐哈希存储

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::core::models::{Admin, AdminInput, PanelType};
use crate::core::storage::{AdminStorage, PanelStorage};
use crate::error::{AppError, AppResult};

pub struct AdminService;

impl AdminService {
    /// `salt$sha256(salt + password)`, both hex.
    pub fn hash_password(password: &str) -> String {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = to_hex(&salt);
        format!("{}${}", salt, digest(&salt, password))
    }

    pub fn verify_password(password: &str, stored: &str) -> bool {
        match stored.split_once('$') {
            Some((salt, hash)) => digest(salt, password) == hash,
            None => false,
        }
    }

    pub async fn create(pool: &SqlitePool, input: &AdminInput) -> AppResult<Admin> {
        if input.password.is_empty() {
            return Err(AppError::InvalidInput("password is empty".into()));
        }
        Self::check_binding(pool, input).await?;
        let admin = AdminStorage::insert(pool, input, &Self::hash_password(&input.password)).await?;
        tracing::info!(
            "Created admin {} on panel {} with {} bytes",
            admin.username,
            admin.panel,
            admin.traffic
        );
        Ok(admin)
    }

    /// Replace an admin's settings. An empty password keeps the current one;
    /// the balance is not touched, see `add_traffic`.
    pub async fn update(pool: &SqlitePool, admin_id: i64, input: &AdminInput) -> AppResult<Admin> {
        let existing = AdminStorage::get_by_id(pool, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;
        Self::check_binding(pool, input).await?;

        let hash = if input.password.is_empty() {
            existing.password_hash
        } else {
            Self::hash_password(&input.password)
        };
        if !AdminStorage::update(pool, admin_id, input, &hash).await? {
            return Err(AppError::NotFound(format!("admin {}", admin_id)));
        }
        Self::get(pool, admin_id).await
    }

    pub async fn get(pool: &SqlitePool, admin_id: i64) -> AppResult<Admin> {
        AdminStorage::get_by_id(pool, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))
    }

    pub async fn delete(pool: &SqlitePool, admin_id: i64) -> AppResult<()> {
        if !AdminStorage::delete(pool, admin_id).await? {
            return Err(AppError::NotFound(format!("admin {}", admin_id)));
        }
        tracing::info!("Deleted admin {}", admin_id);
        Ok(())
    }

    pub async fn toggle_status(pool: &SqlitePool, admin_id: i64) -> AppResult<Admin> {
        if !AdminStorage::toggle_status(pool, admin_id).await? {
            return Err(AppError::NotFound(format!("admin {}", admin_id)));
        }
        Self::get(pool, admin_id).await
    }

    /// Atomic top-up. Negative amounts deduct.
    pub async fn add_traffic(pool: &SqlitePool, admin_id: i64, amount: i64) -> AppResult<i64> {
        if amount == 0 {
            return Err(AppError::InvalidInput("amount must not be zero".into()));
        }
        let balance = AdminStorage::add_traffic(pool, admin_id, amount)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;
        tracing::info!("Admin {} traffic {:+} -> {}", admin_id, amount, balance);
        Ok(balance)
    }

    /// The bound panel must exist and the admin must carry the binding its
    /// panel type needs.
    async fn check_binding(pool: &SqlitePool, input: &AdminInput) -> AppResult<()> {
        if input.username.trim().is_empty() {
            return Err(AppError::InvalidInput("username is empty".into()));
        }
        let panel = PanelStorage::get_by_name(pool, &input.panel)
            .await?
            .ok_or_else(|| AppError::InvalidInput(format!("unknown panel {}", input.panel)))?;

        match panel.kind()? {
            PanelType::Xui if input.inbound_id.is_none() => Err(AppError::InvalidInput(
                "3x-ui admins need an inbound_id".into(),
            )),
            PanelType::Marzban => {
                let candidate = Admin {
                    id: 0,
                    username: input.username.clone(),
                    password_hash: String::new(),
                    is_active: input.is_active,
                    panel: input.panel.clone(),
                    inbound_id: input.inbound_id,
                    inbound_flow: input.flow.clone(),
                    marzban_inbounds: input.marzban_inbounds.clone(),
                    marzban_password: None,
                    traffic: input.traffic,
                    return_traffic: input.return_traffic,
                    expiry_date: input.expiry_date,
                };
                if candidate.parsed_inbounds()?.is_empty() {
                    return Err(AppError::InvalidInput(
                        "marzban admins need marzban_inbounds".into(),
                    ));
                }
                Ok(())
            }
            PanelType::Xui => Ok(()),
        }
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
