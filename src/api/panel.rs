use axum::{
    extract::{Json, Path, State},
    response::Response,
};
use std::sync::Arc;

use super::common::into_response;
use crate::core::models::PanelInput;
use crate::core::storage::PanelStorage;
use crate::error::AppError;
use crate::state::AppState;

pub async fn list_panels(State(state): State<Arc<AppState>>) -> Response {
    into_response(PanelStorage::list(&state.db_pool).await)
}

pub async fn get_panel(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let result = PanelStorage::get_by_id(&state.db_pool, id)
        .await
        .and_then(|p| p.ok_or_else(|| AppError::NotFound(format!("panel {}", id))));
    into_response(result)
}

pub async fn create_panel(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PanelInput>,
) -> Response {
    into_response(state.registrar.register(&input).await)
}

pub async fn update_panel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(input): Json<PanelInput>,
) -> Response {
    into_response(state.registrar.update(id, &input).await)
}

pub async fn delete_panel(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(state.registrar.delete(id).await)
}

pub async fn toggle_panel(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(state.registrar.toggle_status(id).await)
}

pub async fn list_inbounds(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(state.registrar.inbounds(id).await)
}
