//! 面板存储

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::core::models::{Panel, PanelInput};
use crate::error::{AppError, AppResult};

const PANEL_COLUMNS: &str = "id, panel_type, name, url, sub_url, username, password, is_active";

pub struct PanelStorage;

impl PanelStorage {
    pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Panel>> {
        let rows = sqlx::query(&format!("SELECT {} FROM panels ORDER BY id", PANEL_COLUMNS))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(row_to_panel).collect())
    }

    pub async fn get_by_id(pool: &SqlitePool, panel_id: i64) -> AppResult<Option<Panel>> {
        let row = sqlx::query(&format!("SELECT {} FROM panels WHERE id = ?", PANEL_COLUMNS))
            .bind(panel_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(row_to_panel))
    }

    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Panel>> {
        let row = sqlx::query(&format!("SELECT {} FROM panels WHERE name = ?", PANEL_COLUMNS))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(row_to_panel))
    }

    /// Callers must have validated the credentials first.
    pub async fn insert(pool: &SqlitePool, input: &PanelInput) -> AppResult<Panel> {
        let id: i64 = sqlx::query(
            "INSERT INTO panels (panel_type, name, url, sub_url, username, password, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.panel_type)
        .bind(&input.name)
        .bind(&input.url)
        .bind(&input.sub_url)
        .bind(&input.username)
        .bind(&input.password)
        .bind(input.is_active)
        .fetch_one(pool)
        .await?
        .get("id");

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", id)))
    }

    /// Overwrite a panel row. When the name changes, admins bound to the old
    /// name follow it in the same transaction. The active flag is left as is.
    pub async fn update(
        pool: &SqlitePool,
        panel_id: i64,
        input: &PanelInput,
    ) -> AppResult<bool> {
        let mut tx = pool.begin().await?;

        let old_name: Option<String> = sqlx::query("SELECT name FROM panels WHERE id = ?")
            .bind(panel_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("name"));

        let Some(old_name) = old_name else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE panels SET panel_type = ?, name = ?, url = ?, sub_url = ?, username = ?, password = ?
             WHERE id = ?",
        )
        .bind(&input.panel_type)
        .bind(&input.name)
        .bind(&input.url)
        .bind(&input.sub_url)
        .bind(&input.username)
        .bind(&input.password)
        .bind(panel_id)
        .execute(&mut *tx)
        .await?;

        if old_name != input.name {
            sqlx::query("UPDATE admins SET panel = ? WHERE panel = ?")
                .bind(&input.name)
                .bind(&old_name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn delete(pool: &SqlitePool, panel_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM panels WHERE id = ?")
            .bind(panel_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn toggle_status(pool: &SqlitePool, panel_id: i64) -> AppResult<bool> {
        let result = sqlx::query("UPDATE panels SET is_active = NOT is_active WHERE id = ?")
            .bind(panel_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_panel(row: &SqliteRow) -> Panel {
    Panel {
        id: row.get("id"),
        panel_type: row.get("panel_type"),
        name: row.get("name"),
        url: row.get("url"),
        sub_url: row.get("sub_url"),
        username: row.get("username"),
        password: row.get("password"),
        is_active: row.get("is_active"),
    }
}
