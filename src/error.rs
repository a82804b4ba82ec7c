//! 错误类型
//! 面板集成错误与应用层错误

use thiserror::Error;

/// Failure of a remote panel operation.
///
/// Callers use the variant to tell "panel unreachable" apart from
/// "bad credentials" and "bad local binding".
#[derive(Debug, Clone, Error)]
pub enum PanelError {
    #[error("panel {panel} unreachable: {message}")]
    Connectivity { panel: String, message: String },

    #[error("panel {panel} rejected credentials")]
    Authentication { panel: String },

    #[error("panel {panel} returned an unexpected response: {message}")]
    RemoteProtocol { panel: String, message: String },

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("quota state: {0}")]
    QuotaState(String),
}

impl PanelError {
    pub fn connectivity(panel: &str, message: impl Into<String>) -> Self {
        Self::Connectivity {
            panel: panel.to_string(),
            message: message.into(),
        }
    }

    pub fn auth(panel: &str) -> Self {
        Self::Authentication {
            panel: panel.to_string(),
        }
    }

    pub fn protocol(panel: &str, message: impl Into<String>) -> Self {
        Self::RemoteProtocol {
            panel: panel.to_string(),
            message: message.into(),
        }
    }

    /// Only connectivity failures may be re-attempted on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Short machine-readable kind, used in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "connectivity",
            Self::Authentication { .. } => "authentication",
            Self::RemoteProtocol { .. } => "remote_protocol",
            Self::Configuration(_) => "configuration",
            Self::QuotaState(_) => "quota_state",
        }
    }
}

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Panel(#[from] PanelError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;
