use axum::{
    extract::{Json, Path, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::common::into_response;
use crate::core::models::AdminInput;
use crate::core::services::AdminService;
use crate::core::storage::AdminStorage;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TrafficRequest {
    /// Bytes to add, negative to deduct
    pub amount: i64,
}

pub async fn list_admins(State(state): State<Arc<AppState>>) -> Response {
    into_response(AdminStorage::list(&state.db_pool).await)
}

pub async fn get_admin(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(AdminService::get(&state.db_pool, id).await)
}

pub async fn create_admin(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AdminInput>,
) -> Response {
    into_response(AdminService::create(&state.db_pool, &input).await)
}

pub async fn update_admin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(input): Json<AdminInput>,
) -> Response {
    into_response(AdminService::update(&state.db_pool, id, &input).await)
}

pub async fn delete_admin(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(AdminService::delete(&state.db_pool, id).await)
}

pub async fn toggle_admin(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(AdminService::toggle_status(&state.db_pool, id).await)
}

pub async fn add_traffic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<TrafficRequest>,
) -> Response {
    into_response(AdminService::add_traffic(&state.db_pool, id, req.amount).await)
}
