use axum::{
    extract::{Json, Path, State},
    response::Response,
};
use std::sync::Arc;

use super::common::into_response;
use crate::core::services::{ClientInput, ClientUpdateInput};
use crate::state::AppState;

pub async fn list_clients(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(state.clients.list(id).await)
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(input): Json<ClientInput>,
) -> Response {
    into_response(state.clients.create(id, &input).await)
}

pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Path((id, email)): Path<(i64, String)>,
    Json(input): Json<ClientUpdateInput>,
) -> Response {
    into_response(state.clients.update(id, &email, &input).await)
}

pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path((id, email)): Path<(i64, String)>,
) -> Response {
    into_response(state.clients.delete(id, &email).await)
}
