use std::env;
use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::types::MonitorError;

use super::{paths, Settings};

impl Settings {
    /// Load settings from `config.json` and apply environment overrides.
    /// Falls back to defaults if the file doesn't exist or can't be parsed.
    pub async fn load() -> Self {
        let settings = match Self::try_load().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = ?err, "Failed to load settings, using defaults");
                Self::default()
            }
        };
        let settings = apply_env_overrides(
            settings,
            env::var("SYNCTHING_API_URL").ok(),
            env::var("SYNCTHING_API_KEY").ok(),
        );
        info!(
            service = %settings.service_name,
            binary = %settings.syncthing_binary,
            explicit_endpoint = settings.explicit_endpoint().is_some(),
            "Loaded settings"
        );
        settings
    }

    async fn try_load() -> Result<Self, MonitorError> {
        let path = paths::settings_path()?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            warn!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }
        load_from(&path).await
    }
}

/// Parse the settings file at `path`.
pub async fn load_from(path: &Path) -> Result<Settings, MonitorError> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|err| MonitorError::Settings(format!("Failed to read settings file: {err}")))?;

    Ok(serde_json::from_str(&contents)?)
}

/// Non-empty `SYNCTHING_API_URL` / `SYNCTHING_API_KEY` values win over the file.
pub fn apply_env_overrides(
    mut settings: Settings,
    api_uri: Option<String>,
    api_key: Option<String>,
) -> Settings {
    if let Some(uri) = api_uri.filter(|value| !value.trim().is_empty()) {
        settings.api_uri = Some(uri.trim().to_string());
    }
    if let Some(key) = api_key.filter(|value| !value.trim().is_empty()) {
        settings.api_key = Some(key.trim().to_string());
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "service_name": "syncthing@me.service", "event_timeout_secs": 30 }}"#
        )
        .unwrap();

        let settings = load_from(file.path()).await.unwrap();
        assert_eq!(settings.service_name, "syncthing@me.service");
        assert_eq!(settings.event_timeout_secs, 30);
        assert_eq!(settings.request_timeout_secs, 10);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_from(file.path()).await.unwrap_err();
        assert!(matches!(err, MonitorError::Json(_)));
    }

    #[test]
    fn environment_wins_over_file() {
        let settings = Settings {
            api_uri: Some("http://file:8384".into()),
            ..Settings::default()
        };
        let settings = apply_env_overrides(
            settings,
            Some(" https://env:8384 ".into()),
            Some(String::new()),
        );
        assert_eq!(settings.api_uri.as_deref(), Some("https://env:8384"));
        assert_eq!(settings.api_key, None);
    }
}
