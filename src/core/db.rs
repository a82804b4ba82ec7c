use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub async fn init_db(data_dir: &Path) -> Result<SqlitePool, String> {
    let db_path = data_dir.join("walpanel.db");
    let db_url = format!("sqlite:{}", db_path.to_string_lossy());

    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|e| e.to_string())?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to connect to database: {}", e))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, used by tests.
pub async fn init_memory_db() -> Result<SqlitePool, String> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| e.to_string())?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to open in-memory database: {}", e))?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS panels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            panel_type TEXT NOT NULL,
            name TEXT UNIQUE NOT NULL,
            url TEXT NOT NULL,
            sub_url TEXT,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        );",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create panels table: {}", e))?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            hashed_password TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            panel TEXT NOT NULL,
            inbound_id INTEGER,
            inbound_flow TEXT,
            marzban_inbounds TEXT,
            marzban_password TEXT,
            traffic INTEGER NOT NULL DEFAULT 0,
            return_traffic BOOLEAN NOT NULL DEFAULT FALSE,
            expiry_date INTEGER
        );",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create admins table: {}", e))?;

    // Add new columns if they don't exist
    let new_columns = [("created_at", "INTEGER"), ("last_reconciled_at", "INTEGER")];

    for (name, col_type) in new_columns {
        let _ = sqlx::query(&format!(
            "ALTER TABLE admins ADD COLUMN {} {}",
            name, col_type
        ))
        .execute(pool)
        .await;
    }

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS usage_snapshots (
            admin_id INTEGER NOT NULL REFERENCES admins(id) ON DELETE CASCADE,
            client_email TEXT NOT NULL,
            observed_bytes INTEGER NOT NULL,
            reserved_bytes INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (admin_id, client_email)
        );",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create usage_snapshots table: {}", e))?;

    let _ = sqlx::query(
        "ALTER TABLE usage_snapshots ADD COLUMN reserved_bytes INTEGER NOT NULL DEFAULT 0",
    )
    .execute(pool)
    .await;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS configs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create configs table: {}", e))?;

    Ok(())
}
