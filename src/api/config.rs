use axum::{
    extract::{Json, State},
    response::Response,
};
use std::sync::Arc;

use super::common::into_response;
use crate::core::models::AppConfig;
use crate::core::storage::ConfigStorage;
use crate::error::AppError;
use crate::state::AppState;

pub async fn load_config(State(state): State<Arc<AppState>>) -> Response {
    into_response(Ok::<_, AppError>(state.config.read().await.clone()))
}

/// Persist a new config. Concurrency limits and the request timeout apply
/// after a restart; the api key and scheduler settings apply immediately.
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    Json(mut config): Json<AppConfig>,
) -> Response {
    let mut current = state.config.write().await;
    if config.api_key.trim().is_empty() {
        config.api_key = current.api_key.clone();
    }
    let result = ConfigStorage::save(&state.db_pool, &config)
        .await
        .map_err(AppError::Config)
        .map(|()| {
            *current = config.clone();
            tracing::info!("Configuration updated");
            config
        });
    into_response(result)
}
