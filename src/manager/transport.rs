use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::syncthing_client::{ApiRequest, TransportError};

use super::{ErrorKind, Manager, ManagerEvent, ServiceState, MAX_CONNECTION_ERRORS, RETRY_DELAY};

impl Manager {
    /// Whether requests may go out: the service is up and the connection
    /// has not been given up on.
    pub(super) fn requests_allowed(&self) -> bool {
        self.with_state(|state| state.service_active && !state.connection_failed)
    }

    /// Sends `request` under the retry policy and returns the raw body.
    ///
    /// Timeouts are retried after [`RETRY_DELAY`] for as long as requests
    /// stay allowed. Any other failure is counted and yields `None`.
    pub(super) async fn send(&self, request: &ApiRequest) -> Option<String> {
        loop {
            if !self.requests_allowed() {
                return None;
            }
            let endpoint = {
                let mut config = self.inner.config.lock().await;
                if !config.exists().await {
                    return None;
                }
                config.endpoint().cloned()?
            };

            match self.inner.transport.send(&endpoint, request).await {
                Ok(body) => {
                    // The service may have stopped while this was in flight.
                    if !self.requests_allowed() {
                        return None;
                    }
                    self.on_request_success();
                    return Some(body);
                }
                Err(TransportError::Timeout) => {
                    info!(method = %request.method, uri = %request.uri(), "Request timed out, will retry");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(err) => {
                    self.on_request_failure(request, &err);
                    return None;
                }
            }
        }
    }

    /// [`Manager::send`] followed by JSON decoding. Empty bodies yield
    /// `None`; undecodable ones are reported as a Stream error.
    pub(super) async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Option<T> {
        let body = self.send(&request).await?;
        if body.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&body) {
            Ok(value) => {
                debug!(uri = %request.uri(), "Callback");
                Some(value)
            }
            Err(err) => {
                let target = format!("{}:{}", request.method, request.path);
                error!(uri = %request.uri(), error = ?err, "{}", ErrorKind::Stream);
                self.emit_error(ErrorKind::Stream, Some(target));
                None
            }
        }
    }

    fn on_request_success(&self) {
        let reconnected = self.with_state(|state| {
            state.connection_errors = 0;
            !std::mem::replace(&mut state.service_connected, true)
        });
        if reconnected {
            info!("Connected to daemon");
            self.emit(ManagerEvent::ServiceChange(ServiceState::Connected));
        }
    }

    fn on_request_failure(&self, request: &ApiRequest, err: &TransportError) {
        let target = format!("{}:{}", request.method, request.path);
        error!(uri = %request.uri(), error = %err, "{}", ErrorKind::Connection);
        self.emit_error(ErrorKind::Connection, Some(format!("{err} - {target}")));

        let (disconnected, give_up) = self.with_state(|state| {
            state.connection_errors += 1;
            let disconnected = std::mem::replace(&mut state.service_connected, false);
            let give_up =
                state.connection_errors >= MAX_CONNECTION_ERRORS && !state.connection_failed;
            if give_up {
                state.connection_failed = true;
                state.end_stream();
            }
            (disconnected, give_up)
        });

        if disconnected {
            self.emit(ManagerEvent::ServiceChange(ServiceState::Disconnected));
        }
        if give_up {
            error!(
                errors = MAX_CONNECTION_ERRORS,
                "Giving up on the daemon until the next attach"
            );
            self.inner.poll_timer.cancel();
            self.inner.stream_timer.cancel();
            self.emit(ManagerEvent::ServiceChange(ServiceState::Error));
        }
    }
}
