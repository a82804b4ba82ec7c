//! 核心服务层
//! 面板注册、流量对账与配额执行

pub mod admin;
pub mod clients;
pub mod dashboard;
pub mod enforcer;
pub mod reconciler;
pub mod registrar;

pub use admin::AdminService;
pub use clients::{ClientInput, ClientService, ClientUpdateInput, DeleteOutcome};
pub use dashboard::{AdminDashboard, DashboardService, SuperadminDashboard};
pub use enforcer::{PassError, QuotaEnforcer};
pub use reconciler::{PanelLimiter, ReconciliationResult, TrafficReconciler};
pub use registrar::PanelRegistrar;
