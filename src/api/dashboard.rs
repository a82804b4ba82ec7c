use axum::{
    extract::{Path, State},
    response::Response,
};
use std::sync::Arc;

use super::common::into_response;
use crate::core::services::DashboardService;
use crate::state::AppState;

pub async fn superadmin_dashboard(State(state): State<Arc<AppState>>) -> Response {
    into_response(DashboardService::for_superadmin(&state.db_pool).await)
}

pub async fn admin_dashboard(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(DashboardService::for_admin(&state.db_pool, &state.clients, id).await)
}
