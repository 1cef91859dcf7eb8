use std::path::{Path, PathBuf};

use crate::settings::Settings;

/// Where and how to reach the daemon's REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub uri: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn new(uri: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            uri: uri.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

/// Lazily resolved daemon configuration.
///
/// Nothing is read until [`Config::exists`] is first asked; a failed lookup
/// is retried on the next call.
#[derive(Debug, Clone)]
pub struct Config {
    pub(super) settings: Settings,
    pub(super) endpoint: Option<Endpoint>,
    pub(super) file: Option<PathBuf>,
}

impl Config {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            endpoint: None,
            file: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether a usable endpoint is known, loading it on first use.
    pub async fn exists(&mut self) -> bool {
        if self.endpoint.is_none() {
            self.load().await;
        }
        self.endpoint.is_some()
    }

    /// Forget the resolved endpoint.
    pub fn clear(&mut self) {
        self.endpoint = None;
        self.file = None;
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.uri.as_str())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.api_key.as_str())
    }

    /// The `config.xml` the endpoint was read from, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}
