//! 面板客户端
//! 统一 3x-ui 与 Marzban 的远程用户管理接口

mod factory;
mod http;
mod marzban;
mod xui;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::models::{Admin, ClientScope, ClientSpec, Inbound, Panel, PanelType, RemoteClient};
use crate::error::PanelResult;

pub use factory::PanelClientFactory;
pub use marzban::MarzbanClient;
pub use xui::XuiClient;

/// Uniform operations over one remote panel.
///
/// `authenticate` must succeed before any other call; implementations do not
/// retry on their own. Failures come back as classified `PanelError`s.
#[async_trait]
pub trait PanelClient: Send + Sync {
    fn panel_name(&self) -> &str;

    fn panel_type(&self) -> PanelType;

    /// Identifier used for update/delete: the uuid on 3x-ui, the username on Marzban.
    fn client_key<'a>(&self, client: &'a RemoteClient) -> &'a str;

    async fn authenticate(&self) -> PanelResult<()>;

    async fn list_inbounds(&self) -> PanelResult<Vec<Inbound>>;

    /// Clients belonging to the admin described by `scope`.
    async fn list_clients(&self, scope: &ClientScope) -> PanelResult<Vec<RemoteClient>>;

    async fn create_client(&self, scope: &ClientScope, spec: &ClientSpec) -> PanelResult<()>;

    async fn update_client(&self, scope: &ClientScope, key: &str, spec: &ClientSpec) -> PanelResult<()>;

    async fn delete_client(&self, scope: &ClientScope, key: &str) -> PanelResult<()>;

    /// Cumulative bytes (up + down) the panel has counted for this client.
    async fn get_usage(&self, scope: &ClientScope, email: &str) -> PanelResult<u64>;
}

/// Produces a ready-to-authenticate client for a panel record.
///
/// `admin` is passed for panels where sub-admins act under their own
/// credentials.
pub trait ClientFactory: Send + Sync {
    fn build(&self, panel: &Panel, admin: Option<&Admin>) -> PanelResult<Arc<dyn PanelClient>>;
}
