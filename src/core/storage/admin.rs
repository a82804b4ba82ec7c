//! 管理员存储
//! 流量余额的读-改-写都在单条 SQL 中完成，避免并发充值与对账互相覆盖

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::core::models::{Admin, AdminInput};
use crate::error::{AppError, AppResult};

const ADMIN_COLUMNS: &str = "id, username, hashed_password, is_active, panel, inbound_id, inbound_flow, \
     marzban_inbounds, marzban_password, traffic, return_traffic, expiry_date";

/// Per-client accounting row: the last charged usage counter and the part of
/// the client's quota that was paid up front and not consumed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageBaseline {
    pub observed_bytes: i64,
    pub reserved_bytes: i64,
}

/// Usage observed for one client during a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedUsage {
    pub email: String,
    pub observed_bytes: i64,
    pub reserved_bytes: i64,
}

/// Result of closing a client's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Usage beyond the reservation, taken from the balance
    pub charged: i64,
    /// Reserved bytes that were never used
    pub unused_reserve: i64,
    pub balance: i64,
}

pub struct AdminStorage;

impl AdminStorage {
    pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Admin>> {
        let rows = sqlx::query(&format!("SELECT {} FROM admins ORDER BY id", ADMIN_COLUMNS))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(row_to_admin).collect())
    }

    pub async fn get_by_id(pool: &SqlitePool, admin_id: i64) -> AppResult<Option<Admin>> {
        let row = sqlx::query(&format!("SELECT {} FROM admins WHERE id = ?", ADMIN_COLUMNS))
            .bind(admin_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(row_to_admin))
    }

    pub async fn get_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<Admin>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM admins WHERE username = ?",
            ADMIN_COLUMNS
        ))
        .bind(username)
        .fetch_optional(pool)
        .await?;
        Ok(row.as_ref().map(row_to_admin))
    }

    pub async fn list_by_panel(pool: &SqlitePool, panel: &str) -> AppResult<Vec<Admin>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM admins WHERE panel = ? ORDER BY id",
            ADMIN_COLUMNS
        ))
        .bind(panel)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(row_to_admin).collect())
    }

    pub async fn insert(
        pool: &SqlitePool,
        input: &AdminInput,
        password_hash: &str,
    ) -> AppResult<Admin> {
        if Self::get_by_username(pool, &input.username).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "admin {} already exists",
                input.username
            )));
        }

        let id: i64 = sqlx::query(
            "INSERT INTO admins (username, hashed_password, is_active, panel, inbound_id, inbound_flow,
                marzban_inbounds, marzban_password, traffic, return_traffic, expiry_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.username)
        .bind(password_hash)
        .bind(input.is_active)
        .bind(&input.panel)
        .bind(input.inbound_id)
        .bind(&input.flow)
        .bind(&input.marzban_inbounds)
        .bind(&input.marzban_password)
        .bind(input.traffic)
        .bind(input.return_traffic)
        .bind(input.expiry_date.map(|d| d.timestamp()))
        .bind(Utc::now().timestamp())
        .fetch_one(pool)
        .await?
        .get("id");

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", id)))
    }

    /// Replace the settings of an admin. The balance is left alone; it only
    /// moves through the traffic operations below. Returns false when the row is missing.
    pub async fn update(
        pool: &SqlitePool,
        admin_id: i64,
        input: &AdminInput,
        password_hash: &str,
    ) -> AppResult<bool> {
        if let Some(other) = Self::get_by_username(pool, &input.username).await? {
            if other.id != admin_id {
                return Err(AppError::Conflict(format!(
                    "admin {} already exists",
                    input.username
                )));
            }
        }

        let result = sqlx::query(
            "UPDATE admins SET username = ?, hashed_password = ?, is_active = ?, panel = ?,
                inbound_id = ?, inbound_flow = ?, marzban_inbounds = ?, marzban_password = ?,
                return_traffic = ?, expiry_date = ?
             WHERE id = ?",
        )
        .bind(&input.username)
        .bind(password_hash)
        .bind(input.is_active)
        .bind(&input.panel)
        .bind(input.inbound_id)
        .bind(&input.flow)
        .bind(&input.marzban_inbounds)
        .bind(&input.marzban_password)
        .bind(input.return_traffic)
        .bind(input.expiry_date.map(|d| d.timestamp()))
        .bind(admin_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, admin_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM admins WHERE id = ?")
            .bind(admin_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn toggle_status(pool: &SqlitePool, admin_id: i64) -> AppResult<bool> {
        let result = sqlx::query("UPDATE admins SET is_active = NOT is_active WHERE id = ?")
            .bind(admin_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Subtract consumed bytes. Returns the new balance, None if the admin is gone.
    pub async fn reduce_traffic(
        pool: &SqlitePool,
        admin_id: i64,
        used: i64,
    ) -> AppResult<Option<i64>> {
        if used < 0 {
            return Err(AppError::InvalidInput(format!(
                "negative consumption: {}",
                used
            )));
        }
        let row = sqlx::query("UPDATE admins SET traffic = traffic - ? WHERE id = ? RETURNING traffic")
            .bind(used)
            .bind(admin_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|r| r.get("traffic")))
    }

    /// Credit freed traffic back. Only applies when the admin has
    /// `return_traffic` set; returns None when nothing was applied.
    pub async fn increase_traffic(
        pool: &SqlitePool,
        admin_id: i64,
        added: i64,
    ) -> AppResult<Option<i64>> {
        if added < 0 {
            return Err(AppError::InvalidInput(format!("negative credit: {}", added)));
        }
        let row = sqlx::query(
            "UPDATE admins SET traffic = traffic + ? WHERE id = ? AND return_traffic = 1 RETURNING traffic",
        )
        .bind(added)
        .bind(admin_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|r| r.get("traffic")))
    }

    /// Superadmin top-up, not gated by `return_traffic`.
    pub async fn add_traffic(
        pool: &SqlitePool,
        admin_id: i64,
        amount: i64,
    ) -> AppResult<Option<i64>> {
        let row = sqlx::query("UPDATE admins SET traffic = traffic + ? WHERE id = ? RETURNING traffic")
            .bind(amount)
            .bind(admin_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|r| r.get("traffic")))
    }

    /// Accounting rows per client email.
    pub async fn usage_baselines(
        pool: &SqlitePool,
        admin_id: i64,
    ) -> AppResult<HashMap<String, UsageBaseline>> {
        let rows = sqlx::query(
            "SELECT client_email, observed_bytes, reserved_bytes FROM usage_snapshots WHERE admin_id = ?",
        )
        .bind(admin_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get("client_email"),
                    UsageBaseline {
                        observed_bytes: r.get("observed_bytes"),
                        reserved_bytes: r.get("reserved_bytes"),
                    },
                )
            })
            .collect())
    }

    /// Charge one pass: subtract `consumed` and replace the accounting rows,
    /// all in one transaction. Returns the new balance.
    pub async fn apply_reconciliation(
        pool: &SqlitePool,
        admin_id: i64,
        consumed: i64,
        observed: &[ObservedUsage],
    ) -> AppResult<i64> {
        if consumed < 0 {
            return Err(AppError::InvalidInput(format!(
                "negative consumption: {}",
                consumed
            )));
        }

        let mut tx = pool.begin().await?;

        let balance: i64 = sqlx::query(
            "UPDATE admins SET traffic = traffic - ?, last_reconciled_at = ? WHERE id = ? RETURNING traffic",
        )
        .bind(consumed)
        .bind(Utc::now().timestamp())
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("traffic"))
        .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;

        sqlx::query("DELETE FROM usage_snapshots WHERE admin_id = ?")
            .bind(admin_id)
            .execute(&mut *tx)
            .await?;

        for usage in observed {
            sqlx::query(
                "INSERT INTO usage_snapshots (admin_id, client_email, observed_bytes, reserved_bytes)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(admin_id)
            .bind(&usage.email)
            .bind(usage.observed_bytes)
            .bind(usage.reserved_bytes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(balance)
    }

    /// Take `amount` from the balance and hold it as prepaid quota of one
    /// client. Fails without side effects when the balance is short.
    pub async fn reserve_client(
        pool: &SqlitePool,
        admin_id: i64,
        email: &str,
        amount: i64,
    ) -> AppResult<i64> {
        if amount < 0 {
            return Err(AppError::InvalidInput(format!("negative reservation: {}", amount)));
        }

        let mut tx = pool.begin().await?;

        let balance: Option<i64> = sqlx::query(
            "UPDATE admins SET traffic = traffic - ? WHERE id = ? AND traffic >= ? RETURNING traffic",
        )
        .bind(amount)
        .bind(admin_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("traffic"));

        let Some(balance) = balance else {
            let current: Option<i64> = sqlx::query("SELECT traffic FROM admins WHERE id = ?")
                .bind(admin_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("traffic"));
            return match current {
                Some(traffic) => Err(AppError::InvalidInput(format!(
                    "client quota {} exceeds remaining traffic {}",
                    amount, traffic
                ))),
                None => Err(AppError::NotFound(format!("admin {}", admin_id))),
            };
        };

        sqlx::query(
            "INSERT INTO usage_snapshots (admin_id, client_email, observed_bytes, reserved_bytes)
             VALUES (?, ?, 0, ?)
             ON CONFLICT(admin_id, client_email)
             DO UPDATE SET reserved_bytes = reserved_bytes + excluded.reserved_bytes",
        )
        .bind(admin_id)
        .bind(email)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(balance)
    }

    /// Hand back up to `amount` of a client's unused reservation to the
    /// balance. Returns (released, new balance).
    pub async fn release_reservation(
        pool: &SqlitePool,
        admin_id: i64,
        email: &str,
        amount: i64,
    ) -> AppResult<(i64, i64)> {
        let mut tx = pool.begin().await?;

        let reserved: i64 = sqlx::query(
            "SELECT reserved_bytes FROM usage_snapshots WHERE admin_id = ? AND client_email = ?",
        )
        .bind(admin_id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("reserved_bytes"))
        .unwrap_or(0);
        let released = amount.clamp(0, reserved.max(0));

        sqlx::query(
            "UPDATE usage_snapshots SET reserved_bytes = reserved_bytes - ?
             WHERE admin_id = ? AND client_email = ?",
        )
        .bind(released)
        .bind(admin_id)
        .bind(email)
        .execute(&mut *tx)
        .await?;

        let balance: i64 =
            sqlx::query("UPDATE admins SET traffic = traffic + ? WHERE id = ? RETURNING traffic")
                .bind(released)
                .bind(admin_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("traffic"))
                .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;

        tx.commit().await?;
        Ok((released, balance))
    }

    /// Close the account of a client about to be removed: usage since the
    /// baseline is covered by the reservation first and the rest is charged.
    /// The row is dropped; the leftover reservation is returned to the caller
    /// to be credited through `increase_traffic`.
    pub async fn settle_client(
        pool: &SqlitePool,
        admin_id: i64,
        email: &str,
        used: i64,
    ) -> AppResult<Settlement> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query(
            "SELECT observed_bytes, reserved_bytes FROM usage_snapshots
             WHERE admin_id = ? AND client_email = ?",
        )
        .bind(admin_id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| UsageBaseline {
            observed_bytes: r.get("observed_bytes"),
            reserved_bytes: r.get("reserved_bytes"),
        });

        let (charged, unused_reserve) = charge_usage(row.as_ref(), used.max(0));

        let balance: i64 =
            sqlx::query("UPDATE admins SET traffic = traffic - ? WHERE id = ? RETURNING traffic")
                .bind(charged)
                .bind(admin_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("traffic"))
                .ok_or_else(|| AppError::NotFound(format!("admin {}", admin_id)))?;

        sqlx::query("DELETE FROM usage_snapshots WHERE admin_id = ? AND client_email = ?")
            .bind(admin_id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Settlement {
            charged,
            unused_reserve,
            balance,
        })
    }
}

/// Bytes a client consumed since its baseline. A counter lower than the
/// baseline was reset on the panel.
pub fn usage_delta(baseline: Option<i64>, used: i64) -> i64 {
    match baseline {
        Some(base) if used >= base => used - base,
        _ => used,
    }
}

/// Split a client's new usage into (charged to the balance, reservation left).
pub fn charge_usage(baseline: Option<&UsageBaseline>, used: i64) -> (i64, i64) {
    let delta = usage_delta(baseline.map(|b| b.observed_bytes), used);
    let reserved = baseline.map(|b| b.reserved_bytes.max(0)).unwrap_or(0);
    let covered = delta.min(reserved);
    (delta - covered, reserved - covered)
}

fn row_to_admin(row: &SqliteRow) -> Admin {
    Admin {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("hashed_password"),
        is_active: row.get("is_active"),
        panel: row.get("panel"),
        inbound_id: row.get("inbound_id"),
        inbound_flow: row.get("inbound_flow"),
        marzban_inbounds: row.get("marzban_inbounds"),
        marzban_password: row.get("marzban_password"),
        traffic: row.get("traffic"),
        return_traffic: row.get("return_traffic"),
        expiry_date: row
            .get::<Option<i64>, _>("expiry_date")
            .and_then(timestamp_to_utc),
    }
}

fn timestamp_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::init_memory_db;

    fn input(username: &str, traffic: i64, return_traffic: bool) -> AdminInput {
        AdminInput {
            username: username.to_string(),
            password: "secret".into(),
            is_active: true,
            panel: "main".into(),
            inbound_id: Some(1),
            flow: None,
            marzban_inbounds: None,
            marzban_password: None,
            traffic,
            return_traffic,
            expiry_date: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_username() {
        let pool = init_memory_db().await.unwrap();
        AdminStorage::insert(&pool, &input("a", 0, false), "h").await.unwrap();
        let err = AdminStorage::insert(&pool, &input("a", 0, false), "h")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reduce_traffic_goes_negative_exactly() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 5_000_000_000, false), "h")
            .await
            .unwrap();
        let balance = AdminStorage::reduce_traffic(&pool, admin.id, 6_000_000_000)
            .await
            .unwrap();
        assert_eq!(balance, Some(-1_000_000_000));
    }

    #[tokio::test]
    async fn test_increase_traffic_gated_by_return_flag() {
        let pool = init_memory_db().await.unwrap();
        let keeps = AdminStorage::insert(&pool, &input("keeps", 100, false), "h")
            .await
            .unwrap();
        let returns = AdminStorage::insert(&pool, &input("returns", 100, true), "h")
            .await
            .unwrap();

        for amount in [0, 1, 8_000_000_000] {
            assert_eq!(
                AdminStorage::increase_traffic(&pool, keeps.id, amount)
                    .await
                    .unwrap(),
                None
            );
        }
        let stored = AdminStorage::get_by_id(&pool, keeps.id).await.unwrap().unwrap();
        assert_eq!(stored.traffic, 100);

        assert_eq!(
            AdminStorage::increase_traffic(&pool, returns.id, 50)
                .await
                .unwrap(),
            Some(150)
        );
    }

    #[tokio::test]
    async fn test_missing_admin_returns_none() {
        let pool = init_memory_db().await.unwrap();
        assert!(AdminStorage::get_by_id(&pool, 42).await.unwrap().is_none());
        assert_eq!(AdminStorage::reduce_traffic(&pool, 42, 1).await.unwrap(), None);
        assert!(!AdminStorage::toggle_status(&pool, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_reconciliation_replaces_baselines() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 1_000, false), "h")
            .await
            .unwrap();

        let first = vec![
            ObservedUsage { email: "u1".into(), observed_bytes: 100, reserved_bytes: 0 },
            ObservedUsage { email: "u2".into(), observed_bytes: 50, reserved_bytes: 0 },
        ];
        let balance = AdminStorage::apply_reconciliation(&pool, admin.id, 150, &first)
            .await
            .unwrap();
        assert_eq!(balance, 850);

        let second = vec![ObservedUsage { email: "u1".into(), observed_bytes: 120, reserved_bytes: 7 }];
        AdminStorage::apply_reconciliation(&pool, admin.id, 20, &second)
            .await
            .unwrap();

        let baselines = AdminStorage::usage_baselines(&pool, admin.id).await.unwrap();
        assert_eq!(baselines.len(), 1);
        assert_eq!(
            baselines["u1"],
            UsageBaseline { observed_bytes: 120, reserved_bytes: 7 }
        );
    }

    #[tokio::test]
    async fn test_settle_client_charges_remaining_delta() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 1_000, false), "h")
            .await
            .unwrap();
        let seen = vec![ObservedUsage { email: "u1".into(), observed_bytes: 100, reserved_bytes: 0 }];
        AdminStorage::apply_reconciliation(&pool, admin.id, 100, &seen)
            .await
            .unwrap();

        let settled = AdminStorage::settle_client(&pool, admin.id, "u1", 140)
            .await
            .unwrap();
        assert_eq!(
            settled,
            Settlement { charged: 40, unused_reserve: 0, balance: 860 }
        );
        assert!(AdminStorage::usage_baselines(&pool, admin.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reservation_covers_usage_before_balance() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 1_000, true), "h")
            .await
            .unwrap();

        let balance = AdminStorage::reserve_client(&pool, admin.id, "u1", 300)
            .await
            .unwrap();
        assert_eq!(balance, 700);

        // 250 used out of a 300 reservation: nothing more to charge
        let settled = AdminStorage::settle_client(&pool, admin.id, "u1", 250)
            .await
            .unwrap();
        assert_eq!(
            settled,
            Settlement { charged: 0, unused_reserve: 50, balance: 700 }
        );

        AdminStorage::reserve_client(&pool, admin.id, "u2", 100)
            .await
            .unwrap();
        let settled = AdminStorage::settle_client(&pool, admin.id, "u2", 160)
            .await
            .unwrap();
        assert_eq!(
            settled,
            Settlement { charged: 60, unused_reserve: 0, balance: 540 }
        );
    }

    #[tokio::test]
    async fn test_reserve_beyond_balance_changes_nothing() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 100, false), "h")
            .await
            .unwrap();

        let err = AdminStorage::reserve_client(&pool, admin.id, "u1", 101)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let stored = AdminStorage::get_by_id(&pool, admin.id).await.unwrap().unwrap();
        assert_eq!(stored.traffic, 100);
        assert!(AdminStorage::usage_baselines(&pool, admin.id)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            AdminStorage::reserve_client(&pool, 42, "u1", 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_release_is_capped_by_reservation() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 1_000, false), "h")
            .await
            .unwrap();
        AdminStorage::reserve_client(&pool, admin.id, "u1", 300)
            .await
            .unwrap();

        let (released, balance) = AdminStorage::release_reservation(&pool, admin.id, "u1", 500)
            .await
            .unwrap();
        assert_eq!((released, balance), (300, 1_000));
        let baselines = AdminStorage::usage_baselines(&pool, admin.id).await.unwrap();
        assert_eq!(baselines["u1"].reserved_bytes, 0);
    }

    #[test]
    fn test_charge_usage_splits_delta() {
        let row = UsageBaseline { observed_bytes: 20, reserved_bytes: 100 };
        assert_eq!(charge_usage(None, 50), (50, 0));
        assert_eq!(charge_usage(Some(&row), 70), (0, 50));
        assert_eq!(charge_usage(Some(&row), 150), (30, 0));
        // Counter reset on the panel
        assert_eq!(charge_usage(Some(&row), 10), (0, 90));
        assert_eq!(usage_delta(Some(80), 10), 10);
    }

    #[tokio::test]
    async fn test_update_keeps_balance() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 1_000, false), "h")
            .await
            .unwrap();
        AdminStorage::reduce_traffic(&pool, admin.id, 400).await.unwrap();

        // A stale form still carries the old balance
        let stale = input("a", 1_000, true);
        assert!(AdminStorage::update(&pool, admin.id, &stale, "h2").await.unwrap());

        let stored = AdminStorage::get_by_id(&pool, admin.id).await.unwrap().unwrap();
        assert_eq!(stored.traffic, 600);
        assert!(stored.return_traffic);
    }

    #[tokio::test]
    async fn test_top_up_and_reduce_do_not_lose_updates() {
        let pool = init_memory_db().await.unwrap();
        let admin = AdminStorage::insert(&pool, &input("a", 0, false), "h")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    AdminStorage::add_traffic(&pool, admin.id, 10).await.unwrap();
                } else {
                    AdminStorage::reduce_traffic(&pool, admin.id, 3).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stored = AdminStorage::get_by_id(&pool, admin.id).await.unwrap().unwrap();
        assert_eq!(stored.traffic, 10 * 10 - 3 * 10);
    }
}
