//! 核心模块
//! 面板集成、对账与持久化

pub mod db;
pub mod models;
pub mod panel;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// 重导出常用类型
pub use traits::{DefaultStorageConfig, StorageConfig};
