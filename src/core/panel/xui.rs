//! 3x-ui 面板客户端
//! 会话 Cookie 登录，用户挂在单个 inbound 下

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::http::{build_http_client, classify_error, decode, endpoint, parse_base_url};
use super::PanelClient;
use crate::core::models::{ClientScope, ClientSpec, Inbound, Panel, PanelType, RemoteClient};
use crate::error::{PanelError, PanelResult};

#[derive(Debug, Deserialize)]
struct XuiResponse<T> {
    success: bool,
    #[serde(default)]
    msg: String,
    obj: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInbound {
    id: i64,
    #[serde(default)]
    remark: String,
    #[serde(default)]
    protocol: String,
    #[serde(default)]
    port: i64,
    #[serde(default = "default_true")]
    enable: bool,
    /// JSON document encoded as a string
    #[serde(default)]
    settings: String,
    #[serde(default)]
    client_stats: Option<Vec<WireClientStat>>,
}

#[derive(Debug, Deserialize)]
struct WireClientStat {
    email: String,
    #[serde(default)]
    up: u64,
    #[serde(default)]
    down: u64,
}

#[derive(Debug, Default, Deserialize)]
struct WireSettings {
    #[serde(default)]
    clients: Vec<WireClient>,
}

/// One client object of an inbound's `settings`. Fields this service does
/// not manage (`tgId` and the like) ride along in `extra` so that updates
/// send them back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClient {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    /// trojan clients carry a password instead of an id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    password: String,
    email: String,
    #[serde(default = "default_true")]
    enable: bool,
    /// Milliseconds since epoch, 0 or negative means no expiry
    #[serde(default)]
    expiry_time: i64,
    #[serde(rename = "totalGB", default)]
    total_gb: i64,
    #[serde(default)]
    sub_id: String,
    #[serde(default)]
    flow: String,
    #[serde(default)]
    limit_ip: i64,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    reset: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Protocols whose clients authenticate with a password instead of a uuid.
fn keyed_by_password(protocol: &str) -> bool {
    matches!(protocol, "trojan" | "shadowsocks")
}

impl WireClient {
    fn from_spec(spec: &ClientSpec, scope: &ClientScope, protocol: &str) -> Self {
        let flow = if spec.flow.is_empty() {
            scope.flow.clone().unwrap_or_default()
        } else {
            spec.flow.clone()
        };
        let (id, password) = if keyed_by_password(protocol) {
            (String::new(), spec.uuid.clone())
        } else {
            (spec.uuid.clone(), String::new())
        };
        Self {
            id,
            password,
            email: spec.email.clone(),
            enable: spec.enabled,
            expiry_time: spec.expiry.map(|t| t.timestamp_millis()).unwrap_or(0),
            total_gb: i64::try_from(spec.total).unwrap_or(i64::MAX),
            sub_id: spec.sub_id.clone(),
            flow,
            limit_ip: 0,
            comment: spec.note.clone(),
            reset: 0,
            extra: Map::new(),
        }
    }

    fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.password
        } else {
            &self.id
        }
    }

    /// Apply the managed fields of `spec`, leaving credentials, limits and
    /// unknown fields as the panel has them.
    fn patch(&mut self, spec: &ClientSpec) {
        self.enable = spec.enabled;
        self.expiry_time = spec.expiry.map(|t| t.timestamp_millis()).unwrap_or(0);
        self.total_gb = i64::try_from(spec.total).unwrap_or(i64::MAX);
        self.comment = spec.note.clone();
        if !spec.flow.is_empty() {
            self.flow = spec.flow.clone();
        }
    }

    fn into_remote(self, used: u64) -> RemoteClient {
        let uuid = if self.id.is_empty() { self.password } else { self.id };
        let expiry = if self.expiry_time > 0 {
            DateTime::<Utc>::from_timestamp_millis(self.expiry_time)
        } else {
            None
        };
        RemoteClient {
            email: self.email,
            uuid,
            enabled: self.enable,
            expiry,
            total: u64::try_from(self.total_gb).unwrap_or(0),
            used,
            sub_id: self.sub_id,
            flow: self.flow,
            note: self.comment,
        }
    }
}

fn default_true() -> bool {
    true
}

pub struct XuiClient {
    name: String,
    base: Url,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl XuiClient {
    pub fn new(panel: &Panel, timeout: Duration) -> PanelResult<Self> {
        Ok(Self {
            name: panel.name.clone(),
            base: parse_base_url(&panel.name, &panel.url)?,
            username: panel.username.clone(),
            password: panel.password.clone(),
            http: build_http_client(timeout, true)?,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.base, segments)
    }

    fn unwrap_obj<T>(&self, resp: XuiResponse<T>) -> PanelResult<Option<T>> {
        if !resp.success {
            return Err(PanelError::protocol(&self.name, resp.msg));
        }
        Ok(resp.obj)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> PanelResult<Option<T>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(&self.name, e))?;
        let body: XuiResponse<T> = decode(&self.name, resp).await?;
        self.unwrap_obj(body)
    }

    async fn post(&self, url: Url, body: Option<&serde_json::Value>) -> PanelResult<()> {
        let mut req = self.http.post(url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| classify_error(&self.name, e))?;
        let body: XuiResponse<serde_json::Value> = decode(&self.name, resp).await?;
        self.unwrap_obj(body).map(|_| ())
    }

    fn inbound_id(&self, scope: &ClientScope) -> PanelResult<i64> {
        scope.inbound_id.ok_or_else(|| {
            PanelError::Configuration(format!(
                "admin {} has no inbound on panel {}",
                scope.owner, self.name
            ))
        })
    }

    async fn load_inbound(&self, scope: &ClientScope) -> PanelResult<(WireInbound, WireSettings)> {
        let inbound_id = self.inbound_id(scope)?.to_string();
        let inbound: WireInbound = self
            .get(self.url(&["panel", "api", "inbounds", "get", &inbound_id]))
            .await?
            .ok_or_else(|| {
                PanelError::protocol(&self.name, format!("inbound {} missing", inbound_id))
            })?;

        let settings: WireSettings = if inbound.settings.trim().is_empty() {
            WireSettings::default()
        } else {
            serde_json::from_str(&inbound.settings).map_err(|e| {
                PanelError::protocol(&self.name, format!("inbound settings: {}", e))
            })?
        };
        Ok((inbound, settings))
    }

    fn client_payload(inbound_id: i64, client: &WireClient) -> PanelResult<serde_json::Value> {
        let settings = serde_json::to_string(&json!({ "clients": [client] }))
            .map_err(|e| PanelError::Configuration(format!("encode client: {}", e)))?;
        Ok(json!({ "id": inbound_id, "settings": settings }))
    }
}

#[async_trait]
impl PanelClient for XuiClient {
    fn panel_name(&self) -> &str {
        &self.name
    }

    fn panel_type(&self) -> PanelType {
        PanelType::Xui
    }

    fn client_key<'a>(&self, client: &'a RemoteClient) -> &'a str {
        &client.uuid
    }

    async fn authenticate(&self) -> PanelResult<()> {
        let resp = self
            .http
            .post(self.url(&["login"]))
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_error(&self.name, e))?;
        let body: XuiResponse<serde_json::Value> = decode(&self.name, resp).await?;
        if !body.success {
            tracing::debug!("3x-ui login rejected on {}: {}", self.name, body.msg);
            return Err(PanelError::auth(&self.name));
        }
        Ok(())
    }

    async fn list_inbounds(&self) -> PanelResult<Vec<Inbound>> {
        let inbounds: Vec<WireInbound> = self
            .get(self.url(&["panel", "api", "inbounds", "list"]))
            .await?
            .unwrap_or_default();
        Ok(inbounds
            .into_iter()
            .map(|ib| Inbound {
                id: ib.id.to_string(),
                protocol: ib.protocol,
                remark: ib.remark,
                port: u16::try_from(ib.port).ok(),
                enabled: ib.enable,
            })
            .collect())
    }

    async fn list_clients(&self, scope: &ClientScope) -> PanelResult<Vec<RemoteClient>> {
        let (inbound, settings) = self.load_inbound(scope).await?;

        let usage: HashMap<String, u64> = inbound
            .client_stats
            .unwrap_or_default()
            .into_iter()
            .map(|s| (s.email, s.up.saturating_add(s.down)))
            .collect();

        Ok(settings
            .clients
            .into_iter()
            .map(|c| {
                let used = usage.get(&c.email).copied().unwrap_or(0);
                c.into_remote(used)
            })
            .collect())
    }

    async fn create_client(&self, scope: &ClientScope, spec: &ClientSpec) -> PanelResult<()> {
        let inbound_id = self.inbound_id(scope)?;
        let (inbound, _) = self.load_inbound(scope).await?;
        let wire = WireClient::from_spec(spec, scope, &inbound.protocol);
        let payload = Self::client_payload(inbound_id, &wire)?;
        self.post(
            self.url(&["panel", "api", "inbounds", "addClient"]),
            Some(&payload),
        )
        .await
    }

    async fn update_client(&self, scope: &ClientScope, key: &str, spec: &ClientSpec) -> PanelResult<()> {
        let inbound_id = self.inbound_id(scope)?;
        let (_, settings) = self.load_inbound(scope).await?;
        let mut wire = settings
            .clients
            .into_iter()
            .find(|c| c.key() == key)
            .ok_or_else(|| {
                PanelError::protocol(
                    &self.name,
                    format!("client {} not in inbound {}", key, inbound_id),
                )
            })?;
        wire.patch(spec);

        let payload = Self::client_payload(inbound_id, &wire)?;
        self.post(
            self.url(&["panel", "api", "inbounds", "updateClient", key]),
            Some(&payload),
        )
        .await
    }

    async fn delete_client(&self, scope: &ClientScope, key: &str) -> PanelResult<()> {
        let inbound_id = self.inbound_id(scope)?.to_string();
        self.post(
            self.url(&["panel", "api", "inbounds", &inbound_id, "delClient", key]),
            None,
        )
        .await
    }

    async fn get_usage(&self, _scope: &ClientScope, email: &str) -> PanelResult<u64> {
        let stat: WireClientStat = self
            .get(self.url(&["panel", "api", "inbounds", "getClientTraffics", email]))
            .await?
            .ok_or_else(|| {
                PanelError::protocol(&self.name, format!("no traffic record for {}", email))
            })?;
        Ok(stat.up.saturating_add(stat.down))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn panel(url: &str) -> Panel {
        Panel {
            id: 1,
            panel_type: "3x-ui".into(),
            name: "xui".into(),
            url: url.into(),
            sub_url: None,
            username: "root".into(),
            password: "secret".into(),
            is_active: true,
        }
    }

    fn scope() -> ClientScope {
        ClientScope {
            owner: "alice".into(),
            inbound_id: Some(3),
            flow: Some("xtls-rprx-vision".into()),
            ..Default::default()
        }
    }

    fn client(url: &str) -> XuiClient {
        XuiClient::new(&panel(url), Duration::from_secs(2)).unwrap()
    }

    async fn mount_login(server: &MockServer, success: bool) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("username=root"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "3x-ui=session; Path=/")
                    .set_body_json(json!({"success": success, "msg": "", "obj": null})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_rejected_is_authentication_error() {
        let server = MockServer::start().await;
        mount_login(&server, false).await;
        let err = client(&server.uri()).authenticate().await.unwrap_err();
        assert!(matches!(err, PanelError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_list_clients_merges_traffic_stats() {
        let server = MockServer::start().await;
        mount_login(&server, true).await;
        let settings = json!({
            "clients": [
                {"id": "u-1", "email": "a@x", "enable": true, "expiryTime": 0, "totalGB": 1000, "subId": "s1", "flow": "", "comment": ""},
                {"id": "u-2", "email": "b@x", "enable": false, "expiryTime": 1893456000000i64, "totalGB": 0, "subId": "s2", "flow": "", "comment": "[walpanel:auto-disabled]"}
            ]
        })
        .to_string();
        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/get/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "msg": "",
                "obj": {
                    "id": 3, "remark": "main", "protocol": "vless", "port": 443, "enable": true,
                    "settings": settings,
                    "clientStats": [{"email": "a@x", "up": 100, "down": 50}]
                }
            })))
            .mount(&server)
            .await;

        let xui = client(&server.uri());
        xui.authenticate().await.unwrap();
        let clients = xui.list_clients(&scope()).await.unwrap();

        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].used, 150);
        assert_eq!(clients[0].total, 1000);
        assert!(clients[0].expiry.is_none());
        assert_eq!(clients[1].used, 0);
        assert!(clients[1].is_auto_disabled());
        assert!(clients[1].expiry.is_some());
        assert_eq!(xui.client_key(&clients[1]), "u-2");
    }

    async fn mount_inbound(server: &MockServer, protocol: &str, clients: serde_json::Value) {
        let settings = json!({ "clients": clients }).to_string();
        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/get/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "msg": "",
                "obj": {
                    "id": 3, "remark": "main", "protocol": protocol, "port": 443, "enable": true,
                    "settings": settings, "clientStats": []
                }
            })))
            .mount(server)
            .await;
    }

    /// Decoded `settings.clients[0]` of the single request sent to `route`.
    async fn sent_client(server: &MockServer, route: &str) -> serde_json::Value {
        let requests = server.received_requests().await.unwrap();
        let request = requests
            .iter()
            .find(|r| r.url.path() == route)
            .expect("request sent");
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let settings: serde_json::Value =
            serde_json::from_str(body["settings"].as_str().unwrap()).unwrap();
        settings["clients"][0].clone()
    }

    fn ok_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"success": true, "msg": "", "obj": null}))
    }

    #[tokio::test]
    async fn test_update_trojan_client_keeps_password_and_limits() {
        let server = MockServer::start().await;
        mount_inbound(
            &server,
            "trojan",
            json!([{
                "password": "trojan-secret", "email": "t@x", "enable": true,
                "expiryTime": 0, "totalGB": 5000, "subId": "s1", "flow": "",
                "limitIp": 2, "reset": 30, "tgId": "12345", "comment": "vip"
            }]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/updateClient/trojan-secret"))
            .respond_with(ok_response())
            .mount(&server)
            .await;

        let xui = client(&server.uri());
        let listed = xui.list_clients(&scope()).await.unwrap();
        assert_eq!(xui.client_key(&listed[0]), "trojan-secret");

        let disabled = ClientSpec::from(&listed[0]).auto_disabled();
        xui.update_client(&scope(), xui.client_key(&listed[0]), &disabled)
            .await
            .unwrap();

        let sent = sent_client(&server, "/panel/api/inbounds/updateClient/trojan-secret").await;
        assert_eq!(sent["password"], "trojan-secret");
        assert!(sent.get("id").is_none());
        assert_eq!(sent["enable"], false);
        assert_eq!(sent["limitIp"], 2);
        assert_eq!(sent["reset"], 30);
        assert_eq!(sent["tgId"], "12345");
        assert_eq!(sent["totalGB"], 5000);
        assert!(sent["comment"].as_str().unwrap().contains("[walpanel:auto-disabled]"));
    }

    #[tokio::test]
    async fn test_update_unknown_client_is_protocol_error() {
        let server = MockServer::start().await;
        mount_inbound(&server, "vless", json!([])).await;
        let spec = ClientSpec {
            email: "a@x".into(),
            uuid: "u-1".into(),
            enabled: false,
            expiry: None,
            total: 0,
            sub_id: "s".into(),
            flow: String::new(),
            note: String::new(),
        };
        let err = client(&server.uri())
            .update_client(&scope(), "u-1", &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::RemoteProtocol { .. }));
    }

    #[tokio::test]
    async fn test_create_on_trojan_inbound_sends_password() {
        let server = MockServer::start().await;
        mount_inbound(&server, "trojan", json!([])).await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/addClient"))
            .respond_with(ok_response())
            .mount(&server)
            .await;

        let spec = ClientSpec {
            email: "t@x".into(),
            uuid: "generated".into(),
            enabled: true,
            expiry: None,
            total: 1000,
            sub_id: "s".into(),
            flow: String::new(),
            note: String::new(),
        };
        client(&server.uri())
            .create_client(&scope(), &spec)
            .await
            .unwrap();
        let sent = sent_client(&server, "/panel/api/inbounds/addClient").await;
        assert_eq!(sent["password"], "generated");
        assert!(sent.get("id").is_none());
    }

    #[tokio::test]
    async fn test_unsuccessful_call_is_protocol_error() {
        let server = MockServer::start().await;
        mount_inbound(&server, "vless", json!([])).await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/addClient"))
            .and(body_string_contains("xtls-rprx-vision"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false, "msg": "Duplicate email", "obj": null
            })))
            .mount(&server)
            .await;

        let spec = ClientSpec {
            email: "a@x".into(),
            uuid: "u-1".into(),
            enabled: true,
            expiry: None,
            total: 0,
            sub_id: "s".into(),
            flow: String::new(),
            note: String::new(),
        };
        let err = client(&server.uri())
            .create_client(&scope(), &spec)
            .await
            .unwrap_err();
        match err {
            PanelError::RemoteProtocol { message, .. } => assert_eq!(message, "Duplicate email"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_usage_sums_directions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/getClientTraffics/a@x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "msg": "",
                "obj": {"email": "a@x", "up": 7, "down": 3, "total": 0}
            })))
            .mount(&server)
            .await;
        let usage = client(&server.uri()).get_usage(&scope(), "a@x").await.unwrap();
        assert_eq!(usage, 10);
    }

    #[tokio::test]
    async fn test_transport_failures_are_connectivity_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/list"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let err = client(&server.uri()).list_inbounds().await.unwrap_err();
        assert!(matches!(err, PanelError::Connectivity { .. }));

        let slow = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&slow)
            .await;
        let quick = XuiClient::new(&panel(&slow.uri()), Duration::from_millis(200)).unwrap();
        let err = quick.authenticate().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_garbage_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;
        let err = client(&server.uri()).list_inbounds().await.unwrap_err();
        assert!(matches!(err, PanelError::RemoteProtocol { .. }));
    }

    #[tokio::test]
    async fn test_missing_inbound_binding_is_configuration_error() {
        let xui = client("http://127.0.0.1:9");
        let err = xui
            .list_clients(&ClientScope::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Configuration(_)));
    }
}
