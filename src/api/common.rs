use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, PanelError};
use crate::state::AppState;

/// API 响应包装
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn err(message: impl Into<String>, kind: Option<&'static str>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.into()),
            kind,
        })
    }
}

fn status_of(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::Panel(PanelError::Connectivity { .. }) => StatusCode::BAD_GATEWAY,
        AppError::Panel(PanelError::RemoteProtocol { .. }) => StatusCode::BAD_GATEWAY,
        AppError::Panel(PanelError::Authentication { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Panel(PanelError::Configuration(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Panel(PanelError::QuotaState(_)) => StatusCode::CONFLICT,
        AppError::Database(_)
        | AppError::Serialization(_)
        | AppError::Io(_)
        | AppError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let kind = match &self {
            AppError::Panel(e) => Some(e.kind()),
            _ => None,
        };
        (status, ApiResponse::err(self.to_string(), kind)).into_response()
    }
}

// 统一错误处理辅助
pub fn into_response<T: Serialize>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();
    tracing::info!(
        "{} {} - status: {}, latency: {}ms",
        method,
        uri,
        response.status(),
        duration.as_millis()
    );
    response
}

/// Reject requests without `Authorization: Bearer <api_key>`.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let expected = state.config.read().await.api_key.clone();
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(key) if !expected.is_empty() && key == expected => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            ApiResponse::err("missing or invalid api key", None),
        )
            .into_response(),
    }
}
