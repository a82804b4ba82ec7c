use std::sync::Arc;
use std::time::Duration;

use super::{ClientFactory, MarzbanClient, PanelClient, XuiClient};
use crate::core::models::{Admin, AppConfig, Panel, PanelType};
use crate::error::PanelResult;

/// Builds real HTTP clients from stored panel records.
#[derive(Debug, Clone)]
pub struct PanelClientFactory {
    timeout: Duration,
}

impl PanelClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.request_timeout())
    }
}

impl ClientFactory for PanelClientFactory {
    fn build(&self, panel: &Panel, admin: Option<&Admin>) -> PanelResult<Arc<dyn PanelClient>> {
        match panel.kind()? {
            PanelType::Xui => Ok(Arc::new(XuiClient::new(panel, self.timeout)?)),
            PanelType::Marzban => {
                // 子管理员有自己的 Marzban 密码时以其身份登录
                let (username, password) = match admin {
                    Some(a) => match a.marzban_password.as_deref().filter(|p| !p.is_empty()) {
                        Some(pw) => (a.username.as_str(), pw),
                        None => (panel.username.as_str(), panel.password.as_str()),
                    },
                    None => (panel.username.as_str(), panel.password.as_str()),
                };
                Ok(Arc::new(MarzbanClient::new(
                    panel,
                    username,
                    password,
                    self.timeout,
                )?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelError;

    fn panel(panel_type: &str) -> Panel {
        Panel {
            id: 1,
            panel_type: panel_type.into(),
            name: "p".into(),
            url: "https://panel.example.com".into(),
            sub_url: None,
            username: "root".into(),
            password: "pw".into(),
            is_active: true,
        }
    }

    #[test]
    fn test_builds_client_per_type() {
        let factory = PanelClientFactory::new(Duration::from_secs(5));
        let xui = factory.build(&panel("3x-ui"), None).unwrap();
        assert_eq!(xui.panel_type(), PanelType::Xui);
        let mz = factory.build(&panel("marzban"), None).unwrap();
        assert_eq!(mz.panel_type(), PanelType::Marzban);
        assert_eq!(mz.panel_name(), "p");
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let factory = PanelClientFactory::new(Duration::from_secs(5));
        let err = factory.build(&panel("hiddify"), None).err().unwrap();
        assert!(matches!(err, PanelError::Configuration(_)));

        let mut bad_url = panel("3x-ui");
        bad_url.url = "panel.example.com".into();
        let err = factory.build(&bad_url, None).err().unwrap();
        assert!(matches!(err, PanelError::Configuration(_)));
    }
}
