use std::env;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::types::MonitorError;

pub(super) const SETTINGS_ENV: &str = "SYNCTHING_INDICATOR_CONFIG";

/// Location of `config.json`: `$SYNCTHING_INDICATOR_CONFIG`, else the
/// per-user config directory.
pub fn settings_path() -> Result<PathBuf, MonitorError> {
    if let Ok(custom) = env::var(SETTINGS_ENV) {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            debug!(path = trimmed, "Settings path from environment");
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("syncthing-indicator").join("config.json"))
        .ok_or_else(|| MonitorError::Settings("Unable to determine user config directory".into()))
}

/// The bundled unit file ships next to the executable.
pub(super) fn default_unit_template() -> String {
    match env::current_exe() {
        Ok(exe_path) => {
            if let Some(dir) = exe_path.parent() {
                return dir.join("syncthing.service").display().to_string();
            }
            "syncthing.service".to_string()
        }
        Err(err) => {
            warn!(error = ?err, "Unable to locate executable, using relative unit template");
            "syncthing.service".to_string()
        }
    }
}
