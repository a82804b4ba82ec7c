//! 持久化层

mod admin;
mod config;
mod panel;

pub use admin::{charge_usage, AdminStorage, ObservedUsage, Settlement, UsageBaseline};
pub use config::ConfigStorage;
pub use panel::PanelStorage;
