use axum::{
    extract::{Path, State},
    response::Response,
};
use std::sync::Arc;

use super::common::into_response;
use crate::state::AppState;

pub async fn reconcile_admin(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    into_response(state.reconciler.reconcile_and_enforce(id).await)
}

pub async fn reconcile_all(State(state): State<Arc<AppState>>) -> Response {
    into_response(state.reconciler.reconcile_all().await)
}
