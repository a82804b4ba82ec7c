//! 测试辅助：输入构造与内存面板

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::models::{
    Admin, AdminInput, ClientScope, ClientSpec, Inbound, Panel, PanelInput, PanelType,
    RemoteClient,
};
use crate::core::panel::{ClientFactory, PanelClient};
use crate::error::{PanelError, PanelResult};

pub const GB: i64 = 1024 * 1024 * 1024;

pub fn admin_input(username: &str, traffic: i64) -> AdminInput {
    AdminInput {
        username: username.to_string(),
        password: "pw".to_string(),
        is_active: true,
        panel: "main".to_string(),
        inbound_id: Some(1),
        flow: None,
        marzban_inbounds: None,
        marzban_password: None,
        traffic,
        return_traffic: false,
        expiry_date: None,
    }
}

pub fn panel_input(name: &str, url: &str) -> PanelInput {
    PanelInput {
        panel_type: "3x-ui".to_string(),
        name: name.to_string(),
        url: url.to_string(),
        sub_url: None,
        username: "root".to_string(),
        password: "secret".to_string(),
        is_active: true,
    }
}

pub fn remote_client(email: &str, used: u64, total: u64) -> RemoteClient {
    RemoteClient {
        email: email.to_string(),
        uuid: format!("uuid-{}", email),
        enabled: true,
        expiry: None,
        total,
        used,
        sub_id: format!("sub-{}", email),
        flow: String::new(),
        note: String::new(),
    }
}

#[derive(Default)]
struct FakeState {
    clients: Vec<RemoteClient>,
    unreachable: bool,
    failing_updates: HashSet<String>,
    failing_usage: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory stand-in for one remote panel host, addressed by url.
pub struct FakePanel {
    url: String,
    password: String,
    kind: PanelType,
    state: Mutex<FakeState>,
}

impl FakePanel {
    pub fn new(url: &str) -> Arc<Self> {
        Self::with_kind(url, PanelType::Xui)
    }

    pub fn with_kind(url: &str, kind: PanelType) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            password: "secret".to_string(),
            kind,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn add_client(&self, client: RemoteClient) {
        self.state.lock().unwrap().clients.push(client);
    }

    pub fn set_usage(&self, email: &str, used: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.clients.iter_mut().find(|c| c.email == email) {
            c.used = used;
        }
    }

    pub fn client(&self, email: &str) -> Option<RemoteClient> {
        let state = self.state.lock().unwrap();
        state.clients.iter().find(|c| c.email == email).cloned()
    }

    pub fn clients(&self) -> Vec<RemoteClient> {
        self.state.lock().unwrap().clients.clone()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn fail_updates_for(&self, email: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_updates
            .insert(email.to_string());
    }

    /// Make usage reads of one client time out until switched back.
    pub fn fail_usage_for(&self, email: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_usage.insert(email.to_string());
        } else {
            state.failing_usage.remove(email);
        }
    }

    /// Recorded calls such as `update:alice_1`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// A logged-in view of a `FakePanel` built from one panel record.
struct FakeSession {
    name: String,
    password: String,
    host: Arc<FakePanel>,
    authenticated: AtomicBool,
}

impl FakeSession {
    fn enter(&self, call: String) -> PanelResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.host.state.lock().unwrap();
        state.calls.push(call);
        if state.unreachable {
            return Err(PanelError::connectivity(&self.name, "connection refused"));
        }
        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(PanelError::auth(&self.name));
        }
        Ok(state)
    }

    fn key_matches(&self, client: &RemoteClient, key: &str) -> bool {
        match self.host.kind {
            PanelType::Xui => client.uuid == key,
            PanelType::Marzban => client.email == key,
        }
    }
}

#[async_trait]
impl PanelClient for FakeSession {
    fn panel_name(&self) -> &str {
        &self.name
    }

    fn panel_type(&self) -> PanelType {
        self.host.kind
    }

    fn client_key<'a>(&self, client: &'a RemoteClient) -> &'a str {
        match self.host.kind {
            PanelType::Xui => &client.uuid,
            PanelType::Marzban => &client.email,
        }
    }

    async fn authenticate(&self) -> PanelResult<()> {
        let mut state = self.host.state.lock().unwrap();
        state.calls.push("authenticate".to_string());
        if state.unreachable {
            return Err(PanelError::connectivity(&self.name, "connection refused"));
        }
        if self.password != self.host.password {
            return Err(PanelError::auth(&self.name));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn list_inbounds(&self) -> PanelResult<Vec<Inbound>> {
        self.enter("list_inbounds".to_string())?;
        Ok(vec![Inbound {
            id: "1".to_string(),
            protocol: "vless".to_string(),
            remark: "main".to_string(),
            port: Some(443),
            enabled: true,
        }])
    }

    async fn list_clients(&self, _scope: &ClientScope) -> PanelResult<Vec<RemoteClient>> {
        let state = self.enter("list_clients".to_string())?;
        Ok(state.clients.clone())
    }

    async fn create_client(&self, _scope: &ClientScope, spec: &ClientSpec) -> PanelResult<()> {
        let mut state = self.enter(format!("create:{}", spec.email))?;
        if state.clients.iter().any(|c| c.email == spec.email) {
            return Err(PanelError::protocol(&self.name, "Duplicate email"));
        }
        state.clients.push(RemoteClient {
            email: spec.email.clone(),
            uuid: spec.uuid.clone(),
            enabled: spec.enabled,
            expiry: spec.expiry,
            total: spec.total,
            used: 0,
            sub_id: spec.sub_id.clone(),
            flow: spec.flow.clone(),
            note: spec.note.clone(),
        });
        Ok(())
    }

    async fn update_client(&self, _scope: &ClientScope, key: &str, spec: &ClientSpec) -> PanelResult<()> {
        let mut state = self.enter(format!("update:{}", spec.email))?;
        if state.failing_updates.contains(&spec.email) {
            return Err(PanelError::protocol(&self.name, "update rejected"));
        }
        let client = state
            .clients
            .iter_mut()
            .find(|c| self.key_matches(c, key))
            .ok_or_else(|| PanelError::protocol(&self.name, "client not found"))?;
        client.enabled = spec.enabled;
        client.expiry = spec.expiry;
        client.total = spec.total;
        client.flow = spec.flow.clone();
        client.note = spec.note.clone();
        Ok(())
    }

    async fn delete_client(&self, _scope: &ClientScope, key: &str) -> PanelResult<()> {
        let mut state = self.enter(format!("delete:{}", key))?;
        let before = state.clients.len();
        state.clients.retain(|c| !self.key_matches(c, key));
        if state.clients.len() == before {
            return Err(PanelError::protocol(&self.name, "client not found"));
        }
        Ok(())
    }

    async fn get_usage(&self, _scope: &ClientScope, email: &str) -> PanelResult<u64> {
        let state = self.enter(format!("usage:{}", email))?;
        if state.failing_usage.contains(email) {
            return Err(PanelError::connectivity(&self.name, "operation timed out"));
        }
        state
            .clients
            .iter()
            .find(|c| c.email == email)
            .map(|c| c.used)
            .ok_or_else(|| PanelError::protocol(&self.name, "no traffic record"))
    }
}

/// Resolves panel records to registered `FakePanel` hosts by url.
#[derive(Default)]
pub struct FakeFactory {
    hosts: Mutex<HashMap<String, Arc<FakePanel>>>,
    builds: AtomicUsize,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, host: Arc<FakePanel>) {
        self.hosts.lock().unwrap().insert(host.url.clone(), host);
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn build(&self, panel: &Panel, _admin: Option<&Admin>) -> PanelResult<Arc<dyn PanelClient>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        panel.kind()?;
        let host = self
            .hosts
            .lock()
            .unwrap()
            .get(&panel.url)
            .cloned()
            .ok_or_else(|| PanelError::connectivity(&panel.name, "no route to host"))?;
        Ok(Arc::new(FakeSession {
            name: panel.name.clone(),
            password: panel.password.clone(),
            host,
            authenticated: AtomicBool::new(false),
        }))
    }
}
