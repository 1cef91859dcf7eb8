use std::collections::HashMap;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::settings::Settings;

const CONFIG_PATH_KEY: &str = "Configuration file";

/// Candidate `config.xml` locations, most specific first: the configured
/// directory, the daemon's own path table, the user state directory and the
/// deprecated user config directory.
pub(super) async fn candidates(settings: &Settings) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = settings
        .syncthing_config_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
    {
        paths.push(PathBuf::from(dir).join("config.xml"));
    }
    if let Some(path) = daemon_config_path(&settings.syncthing_binary).await {
        paths.push(path);
    }
    if let Some(dir) = dirs::state_dir() {
        paths.push(dir.join("syncthing").join("config.xml"));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("syncthing").join("config.xml"));
    }
    paths
}

/// Ask the daemon binary where it keeps its configuration.
async fn daemon_config_path(binary: &str) -> Option<PathBuf> {
    let output = match Command::new(binary).arg("--paths").output().await {
        Ok(output) => output,
        Err(err) => {
            debug!(binary, error = ?err, "Unable to query daemon paths");
            return None;
        }
    };
    let table = parse_path_table(&String::from_utf8_lossy(&output.stdout));
    table
        .get(CONFIG_PATH_KEY)
        .and_then(|entries| entries.first())
        .map(PathBuf::from)
}

/// Parse the output of `syncthing --paths`: blank-line separated blocks of a
/// `Label:` line followed by tab-indented entries.
pub fn parse_path_table(output: &str) -> HashMap<String, Vec<String>> {
    let output = output.replace("\r\n", "\n");
    let mut table = HashMap::new();
    for block in output.split("\n\n") {
        let Some((label, entries)) = block.trim_start_matches('\n').split_once(":\n\t") else {
            continue;
        };
        let entries = entries
            .split("\n\t")
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        table.insert(label.trim().to_string(), entries);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATHS: &str = "Configuration file:\n\t/home/me/.local/state/syncthing/config.xml\n\nDevice private key & certificate files:\n\t/home/me/.local/state/syncthing/key.pem\n\t/home/me/.local/state/syncthing/cert.pem\n\n";

    #[test]
    fn path_table_lists_every_block() {
        let table = parse_path_table(PATHS);
        assert_eq!(
            table.get(CONFIG_PATH_KEY),
            Some(&vec!["/home/me/.local/state/syncthing/config.xml".to_string()])
        );
        assert_eq!(
            table
                .get("Device private key & certificate files")
                .map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn garbage_yields_an_empty_table() {
        assert!(parse_path_table("syncthing: unknown flag --paths").is_empty());
    }

    #[tokio::test]
    async fn configured_directory_comes_first() {
        let settings = Settings {
            syncthing_config_dir: Some("/srv/syncthing".into()),
            syncthing_binary: "/nonexistent/syncthing".into(),
            ..Settings::default()
        };
        let paths = candidates(&settings).await;
        assert_eq!(paths.first(), Some(&PathBuf::from("/srv/syncthing/config.xml")));
    }
}
