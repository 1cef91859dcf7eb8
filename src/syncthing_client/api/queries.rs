use std::time::Duration;

use reqwest::Method;

use crate::syncthing_client::ApiRequest;

impl ApiRequest {
    pub fn system_status() -> Self {
        Self::get("/rest/system/status")
    }

    pub fn system_config() -> Self {
        Self::get("/rest/system/config")
    }

    pub fn connections() -> Self {
        Self::get("/rest/system/connections")
    }

    pub fn system_errors() -> Self {
        Self::get("/rest/system/error")
    }

    /// Only the newest event, to establish a cursor.
    pub fn latest_event(timeout: Duration) -> Self {
        Self::get("/rest/events")
            .param("limit", "1")
            .with_timeout(timeout)
    }

    pub fn events_since(since: u64, timeout: Duration) -> Self {
        Self::get("/rest/events")
            .param("since", since.to_string())
            .with_timeout(timeout)
    }

    pub fn folder_status(folder: &str) -> Self {
        Self::get("/rest/db/status").param("folder", folder)
    }

    pub fn completion(folder: &str, device: &str) -> Self {
        Self::get("/rest/db/completion")
            .param("folder", folder)
            .param("device", device)
    }

    /// Rescan one folder, or all of them.
    pub fn scan(folder: Option<&str>) -> Self {
        let request = Self::new(Method::POST, "/rest/db/scan");
        match folder {
            Some(folder) => request.param("folder", folder),
            None => request,
        }
    }

    pub fn pause_device(device: &str) -> Self {
        Self::new(Method::POST, "/rest/system/pause").param("device", device)
    }

    pub fn resume_device(device: &str) -> Self {
        Self::new(Method::POST, "/rest/system/resume").param("device", device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uris() {
        assert_eq!(ApiRequest::system_config().uri(), "/rest/system/config");
        assert_eq!(
            ApiRequest::completion("docs", "PEER-1").uri(),
            "/rest/db/completion?folder=docs&device=PEER-1"
        );
        assert_eq!(
            ApiRequest::events_since(42, Duration::from_secs(75)).uri(),
            "/rest/events?since=42"
        );
        assert_eq!(ApiRequest::scan(None).uri(), "/rest/db/scan");
        assert_eq!(ApiRequest::scan(Some("docs")).method, Method::POST);
    }
}
