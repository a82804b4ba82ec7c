//! 面板注册服务
//! 保存前先登录并探测 inbound，凭据不对的面板不会入库

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::core::models::{Inbound, Panel, PanelInput, PanelType};
use crate::core::panel::ClientFactory;
use crate::core::storage::{AdminStorage, PanelStorage};
use crate::error::{AppError, AppResult, PanelResult};

pub struct PanelRegistrar {
    pool: SqlitePool,
    factory: Arc<dyn ClientFactory>,
}

impl PanelRegistrar {
    pub fn new(pool: SqlitePool, factory: Arc<dyn ClientFactory>) -> Self {
        Self { pool, factory }
    }

    /// Log in and list inbounds. Touches nothing locally.
    pub async fn validate(&self, panel: &Panel) -> PanelResult<Vec<Inbound>> {
        let client = self.factory.build(panel, None)?;
        client.authenticate().await?;
        let inbounds = client.list_inbounds().await?;
        tracing::debug!(
            "Panel {} validated, {} inbounds visible",
            panel.name,
            inbounds.len()
        );
        Ok(inbounds)
    }

    pub async fn register(&self, input: &PanelInput) -> AppResult<Panel> {
        check_input(input)?;
        if PanelStorage::get_by_name(&self.pool, &input.name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!("panel {} already exists", input.name)));
        }

        if let Err(e) = self.validate(&input.to_panel(0)).await {
            tracing::warn!("Rejected panel {}: {}", input.name, e);
            return Err(e.into());
        }

        let panel = PanelStorage::insert(&self.pool, input).await?;
        tracing::info!("Registered {} panel {} ({})", panel.panel_type, panel.name, panel.url);
        Ok(panel)
    }

    /// Replace a panel's connection details. Nothing is written unless the
    /// new details validate.
    pub async fn update(&self, panel_id: i64, input: &PanelInput) -> AppResult<Panel> {
        check_input(input)?;
        let existing = PanelStorage::get_by_id(&self.pool, panel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", panel_id)))?;

        if existing.name != input.name {
            if let Some(other) = PanelStorage::get_by_name(&self.pool, &input.name).await? {
                if other.id != panel_id {
                    return Err(AppError::Conflict(format!(
                        "panel {} already exists",
                        input.name
                    )));
                }
            }
        }

        let mut candidate = input.to_panel(panel_id);
        candidate.is_active = existing.is_active;
        if let Err(e) = self.validate(&candidate).await {
            tracing::warn!("Rejected update of panel {}: {}", existing.name, e);
            return Err(e.into());
        }

        if !PanelStorage::update(&self.pool, panel_id, input).await? {
            return Err(AppError::NotFound(format!("panel {}", panel_id)));
        }
        if existing.name != input.name {
            tracing::info!("Panel {} renamed to {}", existing.name, input.name);
        }

        PanelStorage::get_by_id(&self.pool, panel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", panel_id)))
    }

    /// Flip the active flag without contacting the panel.
    pub async fn toggle_status(&self, panel_id: i64) -> AppResult<Panel> {
        if !PanelStorage::toggle_status(&self.pool, panel_id).await? {
            return Err(AppError::NotFound(format!("panel {}", panel_id)));
        }
        PanelStorage::get_by_id(&self.pool, panel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", panel_id)))
    }

    /// Remove a panel no admin is bound to.
    pub async fn delete(&self, panel_id: i64) -> AppResult<()> {
        let panel = PanelStorage::get_by_id(&self.pool, panel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", panel_id)))?;
        let bound = AdminStorage::list_by_panel(&self.pool, &panel.name).await?;
        if !bound.is_empty() {
            return Err(AppError::Conflict(format!(
                "panel {} still has {} admin(s)",
                panel.name,
                bound.len()
            )));
        }
        PanelStorage::delete(&self.pool, panel_id).await?;
        tracing::info!("Deleted panel {}", panel.name);
        Ok(())
    }

    /// Inbounds of a stored panel, read live.
    pub async fn inbounds(&self, panel_id: i64) -> AppResult<Vec<Inbound>> {
        let panel = PanelStorage::get_by_id(&self.pool, panel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("panel {}", panel_id)))?;
        Ok(self.validate(&panel).await?)
    }
}

fn check_input(input: &PanelInput) -> AppResult<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::InvalidInput("panel name is empty".into()));
    }
    if input.url.trim().is_empty() {
        return Err(AppError::InvalidInput("panel url is empty".into()));
    }
    input.panel_type.parse::<PanelType>()?;
    Ok(())
}
