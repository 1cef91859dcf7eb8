use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tracing::{debug, error, info};

use super::{paths, Config, Endpoint};

static GUI_BLOCK: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<gui\b[^>]*?\btls="(true|false)"[^>]*>.*?<address>(.*?)</address>.*?<apikey>(.*?)</apikey>.*?</gui>"#,
    )
});

impl Config {
    /// Resolve the endpoint from settings or the first readable `config.xml`.
    pub async fn load(&mut self) {
        self.clear();

        if let Some((uri, api_key)) = self.settings.explicit_endpoint() {
            info!(uri, "Using configured endpoint");
            self.endpoint = Some(Endpoint::new(uri, api_key));
            return;
        }

        for path in paths::candidates(&self.settings).await {
            let contents = match fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) => {
                    debug!(path = %path.display(), error = ?err, "Skipping config candidate");
                    continue;
                }
            };
            match parse_gui(&contents) {
                Some(endpoint) => {
                    info!(path = %path.display(), uri = %endpoint.uri, "Found config");
                    self.endpoint = Some(endpoint);
                    self.file = Some(path);
                }
                None => error!(path = %path.display(), "Can't find gui node in config"),
            }
            return;
        }

        error!("Can't find config file");
    }
}

/// Extract the GUI endpoint from a daemon `config.xml`.
pub fn parse_gui(contents: &str) -> Option<Endpoint> {
    let regex = match GUI_BLOCK.as_ref() {
        Ok(regex) => regex,
        Err(err) => {
            error!(error = ?err, "Invalid gui pattern");
            return None;
        }
    };
    let captures = regex.captures(contents)?;
    let tls = captures.get(1)?.as_str().eq_ignore_ascii_case("true");
    let address = captures.get(2)?.as_str().trim();
    let api_key = captures.get(3)?.as_str().trim();
    if address.is_empty() {
        return None;
    }
    let scheme = if tls { "https" } else { "http" };
    Some(Endpoint::new(format!("{scheme}://{address}"), api_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    const CONFIG_XML: &str = r#"<configuration version="37">
    <folder id="docs" label="Documents" path="/home/me/Documents"></folder>
    <gui enabled="true" tls="true" debugging="false">
        <address>127.0.0.1:8384</address>
        <apikey>ABC123</apikey>
        <theme>default</theme>
    </gui>
</configuration>"#;

    #[test]
    fn tls_gui_yields_https_uri() {
        let endpoint = parse_gui(CONFIG_XML).unwrap();
        assert_eq!(endpoint.uri, "https://127.0.0.1:8384");
        assert_eq!(endpoint.api_key, "ABC123");
    }

    #[test]
    fn plain_gui_and_camel_case_key() {
        let xml = r#"<gui tls="false"><address>localhost:8080</address><apiKey>k</apiKey></gui>"#;
        let endpoint = parse_gui(xml).unwrap();
        assert_eq!(endpoint.uri, "http://localhost:8080");
        assert_eq!(endpoint.api_key, "k");
    }

    #[test]
    fn missing_gui_block() {
        assert!(parse_gui("<configuration></configuration>").is_none());
    }

    #[tokio::test]
    async fn exists_loads_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.xml"), CONFIG_XML).unwrap();
        let mut config = Config::new(Settings {
            syncthing_config_dir: Some(dir.path().display().to_string()),
            syncthing_binary: "/nonexistent/syncthing".into(),
            ..Settings::default()
        });

        assert!(config.exists().await);
        assert_eq!(config.uri(), Some("https://127.0.0.1:8384"));
        assert_eq!(config.api_key(), Some("ABC123"));
        assert_eq!(config.file(), Some(dir.path().join("config.xml").as_path()));
    }

    #[tokio::test]
    async fn explicit_endpoint_skips_file_lookup() {
        let mut config = Config::new(Settings {
            api_uri: Some("https://nas:8384/".into()),
            api_key: Some("KEY".into()),
            ..Settings::default()
        });

        assert!(config.exists().await);
        assert_eq!(config.uri(), Some("https://nas:8384"));
        assert!(config.file().is_none());

        config.clear();
        assert!(config.endpoint().is_none());
    }
}
