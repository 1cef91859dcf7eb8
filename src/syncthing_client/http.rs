use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::debug;

use crate::config::Endpoint;
use crate::types::MonitorError;

/// A single call against the daemon's REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(path: &'static str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path and query, for logs and error messages.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.to_string();
        }
        let query = self
            .query
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("{reason} ({status})")]
    Status { status: u16, reason: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// Sends requests to the daemon and returns the raw response body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, endpoint: &Endpoint, request: &ApiRequest) -> Result<String, TransportError>;
}

/// [`Transport`] over one shared `reqwest` client that accepts the daemon's
/// self-signed certificate.
#[derive(Clone, Debug)]
pub struct HttpClient {
    http: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, MonitorError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(MonitorError::Http)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, endpoint: &Endpoint, request: &ApiRequest) -> Result<String, TransportError> {
        let url = format!(
            "{}/{}",
            endpoint.uri.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        debug!(method = %request.method, uri = %request.uri(), "Opening connection");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header("X-API-Key", &endpoint.api_key)
            .query(&request.query);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            });
        }

        response.text().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(err.to_string())
    }
}
