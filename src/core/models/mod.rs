//! 核心数据模型

mod admin;
mod client;
mod config;
mod panel;

pub use admin::{Admin, AdminInput};
pub use client::{ClientScope, ClientSpec, Inbound, RemoteClient, AUTO_DISABLED_TAG};
pub use config::AppConfig;
pub use panel::{Panel, PanelInput, PanelType};
