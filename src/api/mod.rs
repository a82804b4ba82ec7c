use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

mod admin;
mod client;
pub mod common;
mod config;
mod dashboard;
mod panel;
mod reconcile;

pub fn build_routes(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        // Panels
        .route("/api/panels", get(panel::list_panels).post(panel::create_panel))
        .route(
            "/api/panels/:id",
            get(panel::get_panel)
                .put(panel::update_panel)
                .delete(panel::delete_panel),
        )
        .route("/api/panels/:id/toggle", post(panel::toggle_panel))
        .route("/api/panels/:id/inbounds", get(panel::list_inbounds))
        // Admins
        .route("/api/admins", get(admin::list_admins).post(admin::create_admin))
        .route(
            "/api/admins/:id",
            get(admin::get_admin)
                .put(admin::update_admin)
                .delete(admin::delete_admin),
        )
        .route("/api/admins/:id/toggle", post(admin::toggle_admin))
        .route("/api/admins/:id/traffic", post(admin::add_traffic))
        // Clients of one admin
        .route(
            "/api/admins/:id/clients",
            get(client::list_clients).post(client::create_client),
        )
        .route(
            "/api/admins/:id/clients/:email",
            put(client::update_client).delete(client::delete_client),
        )
        // Reconciliation
        .route("/api/admins/:id/reconcile", post(reconcile::reconcile_admin))
        .route("/api/reconcile", post(reconcile::reconcile_all))
        // Dashboards
        .route("/api/dashboard", get(dashboard::superadmin_dashboard))
        .route("/api/admins/:id/dashboard", get(dashboard::admin_dashboard))
        // Config
        .route(
            "/api/config",
            get(config::load_config).put(config::save_config),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            common::require_api_key,
        ));

    Router::new()
        .merge(protected)
        // Health
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
