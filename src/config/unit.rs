use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::types::MonitorError;

use super::Config;

impl Config {
    /// Install the bundled unit file into the user's systemd directory.
    /// An existing unit is only replaced when `force` is set. Returns whether
    /// a file was copied.
    pub async fn set_service(&self, force: bool) -> Result<bool, MonitorError> {
        let target = user_unit_dir()?.join(&self.settings.service_name);
        install_unit(Path::new(&self.settings.unit_template), &target, force).await
    }
}

fn user_unit_dir() -> Result<PathBuf, MonitorError> {
    dirs::config_dir()
        .map(|dir| dir.join("systemd").join("user"))
        .ok_or_else(|| MonitorError::Config("Unable to determine user config directory".into()))
}

/// Copy `template` to `target`, creating parent directories as needed.
pub async fn install_unit(template: &Path, target: &Path, force: bool) -> Result<bool, MonitorError> {
    if !force && fs::try_exists(target).await.unwrap_or(false) {
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::copy(template, target).await {
        Ok(_) => {
            info!(path = %target.display(), "Service unit installed");
            Ok(true)
        }
        Err(err) => {
            warn!(template = %template.display(), path = %target.display(), error = ?err, "Couldn't install service unit");
            Err(MonitorError::Config(format!(
                "Failed to copy {} to {}: {err}",
                template.display(),
                target.display()
            )))
        }
    }
}
