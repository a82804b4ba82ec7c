//! Marzban 面板客户端
//! Bearer token 认证，用户按 admin 归属，引用多个 inbound

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use super::http::{build_http_client, check_status, classify_error, decode, endpoint, parse_base_url};
use super::PanelClient;
use crate::core::models::{ClientScope, ClientSpec, Inbound, Panel, PanelType, RemoteClient};
use crate::error::{PanelError, PanelResult};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct WireInbound {
    tag: String,
    #[serde(default)]
    protocol: String,
    #[serde(default)]
    port: Value,
}

#[derive(Debug, Deserialize)]
struct WireUsers {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    username: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    used_traffic: u64,
    #[serde(default)]
    data_limit: Option<u64>,
    /// Unix seconds, null or 0 means no expiry
    #[serde(default)]
    expire: Option<i64>,
    #[serde(default)]
    proxies: BTreeMap<String, Value>,
    #[serde(default)]
    subscription_url: String,
    #[serde(default)]
    note: Option<String>,
    /// Seconds of validity granted once an on-hold user first connects
    #[serde(default)]
    on_hold_expire_duration: Option<i64>,
}

impl WireUser {
    /// Status to write when this user is switched on again. A user that was
    /// put on hold and never connected keeps its hold duration, and goes
    /// back on hold instead of starting its clock.
    fn enabled_status(&self) -> &'static str {
        match self.status.as_str() {
            "on_hold" => "on_hold",
            _ if self.on_hold_expire_duration.is_some_and(|d| d > 0) => "on_hold",
            _ => "active",
        }
    }

    fn into_remote(self) -> RemoteClient {
        let uuid = self
            .proxies
            .values()
            .find_map(|p| {
                p.get("id")
                    .or_else(|| p.get("password"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .to_string();
        let flow = self
            .proxies
            .get("vless")
            .and_then(|p| p.get("flow"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        RemoteClient {
            enabled: matches!(self.status.as_str(), "active" | "on_hold"),
            expiry: self
                .expire
                .filter(|secs| *secs > 0)
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            total: self.data_limit.unwrap_or(0),
            used: self.used_traffic,
            sub_id: self.subscription_url,
            note: self.note.unwrap_or_default(),
            email: self.username,
            uuid,
            flow,
        }
    }
}

pub struct MarzbanClient {
    name: String,
    base: Url,
    username: String,
    password: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl MarzbanClient {
    /// `username`/`password` may be the panel's own or a sub-admin's.
    pub fn new(panel: &Panel, username: &str, password: &str, timeout: Duration) -> PanelResult<Self> {
        Ok(Self {
            name: panel.name.clone(),
            base: parse_base_url(&panel.name, &panel.url)?,
            username: username.to_string(),
            password: password.to_string(),
            http: build_http_client(timeout, false)?,
            token: RwLock::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.base, segments)
    }

    async fn bearer(&self) -> PanelResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await?;
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| PanelError::auth(&self.name))
    }

    async fn send(&self, req: RequestBuilder) -> PanelResult<reqwest::Response> {
        let token = self.bearer().await?;
        req.bearer_auth(token)
            .send()
            .await
            .map_err(|e| classify_error(&self.name, e))
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> PanelResult<T> {
        let resp = self.send(req).await?;
        decode(&self.name, resp).await
    }

    async fn execute(&self, req: RequestBuilder) -> PanelResult<()> {
        let resp = self.send(req).await?;
        check_status(&self.name, resp).await.map(|_| ())
    }

    fn proxies_for(scope: &ClientScope, spec: &ClientSpec) -> Map<String, Value> {
        let flow = if spec.flow.is_empty() {
            scope.flow.clone().unwrap_or_default()
        } else {
            spec.flow.clone()
        };
        scope
            .inbounds
            .keys()
            .map(|protocol| {
                let settings = match protocol.as_str() {
                    "vless" if flow.is_empty() => json!({ "id": spec.uuid }),
                    "vless" => json!({ "id": spec.uuid, "flow": flow }),
                    "vmess" => json!({ "id": spec.uuid }),
                    "trojan" => json!({ "password": spec.uuid }),
                    _ => json!({}),
                };
                (protocol.clone(), settings)
            })
            .collect()
    }

    fn status_of(spec: &ClientSpec) -> &'static str {
        if spec.enabled {
            "active"
        } else {
            "disabled"
        }
    }

    fn require_inbounds(&self, scope: &ClientScope) -> PanelResult<()> {
        if scope.inbounds.is_empty() {
            return Err(PanelError::Configuration(format!(
                "admin {} has no inbounds on panel {}",
                scope.owner, self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PanelClient for MarzbanClient {
    fn panel_name(&self) -> &str {
        &self.name
    }

    fn panel_type(&self) -> PanelType {
        PanelType::Marzban
    }

    fn client_key<'a>(&self, client: &'a RemoteClient) -> &'a str {
        &client.email
    }

    async fn authenticate(&self) -> PanelResult<()> {
        let resp = self
            .http
            .post(self.url(&["api", "admin", "token"]))
            .form(&[
                ("grant_type", "password"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_error(&self.name, e))?;
        let token: TokenResponse = decode(&self.name, resp).await?;
        if token.access_token.is_empty() {
            return Err(PanelError::auth(&self.name));
        }
        *self.token.write().await = Some(token.access_token);
        Ok(())
    }

    async fn list_inbounds(&self) -> PanelResult<Vec<Inbound>> {
        let grouped: BTreeMap<String, Vec<WireInbound>> = self
            .fetch(self.http.get(self.url(&["api", "inbounds"])))
            .await?;
        Ok(grouped
            .into_iter()
            .flat_map(|(protocol, inbounds)| {
                inbounds.into_iter().map(move |ib| Inbound {
                    port: match &ib.port {
                        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    },
                    protocol: if ib.protocol.is_empty() {
                        protocol.clone()
                    } else {
                        ib.protocol
                    },
                    remark: ib.tag.clone(),
                    id: ib.tag,
                    enabled: true,
                })
            })
            .collect())
    }

    async fn list_clients(&self, scope: &ClientScope) -> PanelResult<Vec<RemoteClient>> {
        let req = self
            .http
            .get(self.url(&["api", "users"]))
            .query(&[("admin", scope.owner.as_str())]);
        let body: WireUsers = self.fetch(req).await?;
        Ok(body.users.into_iter().map(WireUser::into_remote).collect())
    }

    async fn create_client(&self, scope: &ClientScope, spec: &ClientSpec) -> PanelResult<()> {
        self.require_inbounds(scope)?;
        let body = json!({
            "username": spec.email,
            "proxies": Self::proxies_for(scope, spec),
            "inbounds": scope.inbounds,
            "expire": spec.expiry.map(|t| t.timestamp()),
            "data_limit": spec.total,
            "data_limit_reset_strategy": "no_reset",
            "status": Self::status_of(spec),
            "note": spec.note,
        });
        self.execute(self.http.post(self.url(&["api", "user"])).json(&body))
            .await
    }

    async fn update_client(&self, scope: &ClientScope, key: &str, spec: &ClientSpec) -> PanelResult<()> {
        let current: WireUser = self
            .fetch(self.http.get(self.url(&["api", "user", key])))
            .await?;
        let status = if spec.enabled {
            current.enabled_status()
        } else {
            "disabled"
        };

        let mut body = json!({
            "data_limit": spec.total,
            "status": status,
            "note": spec.note,
        });
        // On-hold users carry no expiry until their first connection
        if status != "on_hold" {
            body["expire"] = json!(spec.expiry.map(|t| t.timestamp()).unwrap_or(0));
        }
        if !scope.inbounds.is_empty() {
            body["inbounds"] = json!(scope.inbounds);
        }
        self.execute(self.http.put(self.url(&["api", "user", key])).json(&body))
            .await
    }

    async fn delete_client(&self, _scope: &ClientScope, key: &str) -> PanelResult<()> {
        self.execute(self.http.delete(self.url(&["api", "user", key])))
            .await
    }

    async fn get_usage(&self, _scope: &ClientScope, email: &str) -> PanelResult<u64> {
        let user: WireUser = self
            .fetch(self.http.get(self.url(&["api", "user", email])))
            .await?;
        Ok(user.used_traffic)
    }
}
