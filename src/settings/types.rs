use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths;

/// Settings for the Syncthing indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_syncthing_binary")]
    pub syncthing_binary: String,

    /// Directory holding the daemon's `config.xml`, tried before any other
    /// location.
    #[serde(default)]
    pub syncthing_config_dir: Option<String>,

    #[serde(default)]
    pub api_uri: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_unit_template")]
    pub unit_template: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_event_timeout")]
    pub event_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            syncthing_binary: default_syncthing_binary(),
            syncthing_config_dir: None,
            api_uri: None,
            api_key: None,
            unit_template: default_unit_template(),
            request_timeout_secs: default_request_timeout(),
            event_timeout_secs: default_event_timeout(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Timeout for the event long-poll; never shorter than a plain request.
    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs.max(self.request_timeout_secs).max(1))
    }

    /// Explicit endpoint, when both halves are configured.
    pub fn explicit_endpoint(&self) -> Option<(&str, &str)> {
        let uri = self.api_uri.as_deref().map(str::trim).filter(|uri| !uri.is_empty())?;
        let key = self.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty())?;
        Some((uri, key))
    }
}

fn default_service_name() -> String {
    "syncthing.service".to_string()
}

fn default_syncthing_binary() -> String {
    "syncthing".to_string()
}

fn default_unit_template() -> String {
    paths::default_unit_template()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_event_timeout() -> u64 {
    75
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "service_name": "st.service" }"#).unwrap();
        assert_eq!(settings.service_name, "st.service");
        assert_eq!(settings.syncthing_binary, "syncthing");
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.event_timeout(), Duration::from_secs(75));
        assert!(settings.explicit_endpoint().is_none());
    }

    #[test]
    fn explicit_endpoint_needs_both_halves() {
        let mut settings = Settings {
            api_uri: Some("https://127.0.0.1:8384".into()),
            ..Settings::default()
        };
        assert!(settings.explicit_endpoint().is_none());

        settings.api_key = Some("  ".into());
        assert!(settings.explicit_endpoint().is_none());

        settings.api_key = Some("KEY".into());
        assert_eq!(
            settings.explicit_endpoint(),
            Some(("https://127.0.0.1:8384", "KEY"))
        );
    }
}
