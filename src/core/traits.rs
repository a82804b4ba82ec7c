//! 核心 trait 定义
//! 抽象数据目录，便于测试时替换为临时目录

use std::path::PathBuf;

/// 存储配置 trait
pub trait StorageConfig: Send + Sync {
    /// 获取数据目录路径
    fn data_dir(&self) -> PathBuf;

    /// 数据库文件路径
    fn database_path(&self) -> PathBuf {
        self.data_dir().join("walpanel.db")
    }

    /// 旧版 JSON 配置文件路径
    fn config_path(&self) -> PathBuf {
        self.data_dir().join("config.json")
    }

    /// 日志目录
    fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// 默认存储配置 (使用 ~/.walpanel/)
pub struct DefaultStorageConfig {
    data_dir: PathBuf,
}

impl DefaultStorageConfig {
    pub fn new() -> Result<Self, String> {
        let home = dirs::home_dir().ok_or_else(|| "无法获取用户主目录".to_string())?;
        Self::with_path(home.join(".walpanel"))
    }

    /// 从指定路径创建
    pub fn with_path(data_dir: PathBuf) -> Result<Self, String> {
        std::fs::create_dir_all(&data_dir).map_err(|e| format!("创建数据目录失败: {}", e))?;
        std::fs::create_dir_all(data_dir.join("logs"))
            .map_err(|e| format!("创建日志目录失败: {}", e))?;

        Ok(Self { data_dir })
    }
}

impl StorageConfig for DefaultStorageConfig {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_path_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let storage = DefaultStorageConfig::with_path(root.clone()).unwrap();
        assert!(storage.logs_dir().is_dir());
        assert_eq!(storage.database_path(), root.join("walpanel.db"));
    }
}
