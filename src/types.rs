use thiserror::Error;

/// Errors raised while setting up or talking to the local Syncthing service.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("service command failed: {0}")]
    Command(String),
}
