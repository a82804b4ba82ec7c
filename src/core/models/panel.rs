//! 面板模型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;

/// Panel products this service can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelType {
    /// Users live under a single inbound
    #[serde(rename = "3x-ui")]
    Xui,
    /// Users reference a set of inbounds
    #[serde(rename = "marzban")]
    Marzban,
}

impl PanelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xui => "3x-ui",
            Self::Marzban => "marzban",
        }
    }
}

impl fmt::Display for PanelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "3x-ui" | "3xui" | "xui" => Ok(Self::Xui),
            "marzban" => Ok(Self::Marzban),
            other => Err(PanelError::Configuration(format!(
                "unknown panel type: {}",
                other
            ))),
        }
    }
}

/// A registered remote management endpoint.
///
/// `panel_type` stays a string so a row written by an older release with a
/// type this build does not know still loads; it fails at client build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub id: i64,
    pub panel_type: String,
    pub name: String,
    pub url: String,
    pub sub_url: Option<String>,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
}

impl Panel {
    pub fn kind(&self) -> Result<PanelType, PanelError> {
        self.panel_type.parse()
    }

    /// Base url without trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Superadmin input for creating or updating a panel.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelInput {
    #[serde(default = "default_panel_type")]
    pub panel_type: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub sub_url: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl PanelInput {
    /// Unsaved panel record built from this input, used for validation.
    pub fn to_panel(&self, id: i64) -> Panel {
        Panel {
            id,
            panel_type: self.panel_type.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            sub_url: self.sub_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            is_active: self.is_active,
        }
    }
}

fn default_panel_type() -> String {
    PanelType::Xui.as_str().to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_type_parse() {
        assert_eq!("3x-ui".parse::<PanelType>().unwrap(), PanelType::Xui);
        assert_eq!("Marzban".parse::<PanelType>().unwrap(), PanelType::Marzban);
        assert!(matches!(
            "hiddify".parse::<PanelType>(),
            Err(PanelError::Configuration(_))
        ));
    }

    #[test]
    fn test_base_url_trims_slash() {
        let input = PanelInput {
            panel_type: "marzban".into(),
            name: "m".into(),
            url: "https://panel.example.com:8000/".into(),
            sub_url: None,
            username: "root".into(),
            password: "pw".into(),
            is_active: true,
        };
        assert_eq!(
            input.to_panel(0).base_url(),
            "https://panel.example.com:8000"
        );
    }
}
