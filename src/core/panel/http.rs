// 面板 HTTP 公共工具 - 构建客户端、错误分类
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{PanelError, PanelResult};

const USER_AGENT: &str = concat!("walpanel/", env!("CARGO_PKG_VERSION"));

/// 创建带超时的 HTTP 客户端
pub(crate) fn build_http_client(timeout: Duration, cookies: bool) -> PanelResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .cookie_store(cookies)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PanelError::Configuration(format!("failed to build http client: {}", e)))
}

/// Parse a panel base url; the path is kept so panels served under a
/// web base path keep working.
pub(crate) fn parse_base_url(panel: &str, raw: &str) -> PanelResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        PanelError::Configuration(format!("panel {} has invalid url {}: {}", panel, raw, e))
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(PanelError::Configuration(format!(
            "panel {} url must be http(s): {}",
            panel, raw
        )));
    }
    Ok(url)
}

/// Append path segments to a base url, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// 将底层网络错误归类
pub(crate) fn classify_error(panel: &str, error: reqwest::Error) -> PanelError {
    if error.is_timeout() {
        PanelError::connectivity(panel, "request timeout")
    } else if error.is_connect() {
        PanelError::connectivity(panel, format!("connection failed: {}", error))
    } else if error.is_decode() {
        PanelError::protocol(panel, error.to_string())
    } else if let Some(status) = error.status() {
        classify_status(panel, status, "")
    } else {
        PanelError::connectivity(panel, error.to_string())
    }
}

fn classify_status(panel: &str, status: StatusCode, body: &str) -> PanelError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PanelError::auth(panel),
        _ => PanelError::connectivity(panel, format!("HTTP {} {}", status.as_u16(), truncate(body, 200))),
    }
}

/// Turn non-success statuses into classified errors.
pub(crate) async fn check_status(panel: &str, response: Response) -> PanelResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(panel, status, &body))
}

/// Read the whole body, then parse it. Transport failures and shape
/// failures land in different variants.
pub(crate) async fn decode<T: DeserializeOwned>(panel: &str, response: Response) -> PanelResult<T> {
    let response = check_status(panel, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_error(panel, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PanelError::protocol(
            panel,
            format!("{} in {}", e, truncate(&String::from_utf8_lossy(&bytes), 200)),
        )
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len).collect();
    out.push('…');
    out
}
