//! Typed access to the Syncthing REST API.

mod api;
mod http;

pub use api::{
    ConnectionState, ConnectionsResponse, DaemonEvent, DeviceConfig, FolderConfig, FolderDevice,
    FolderStatus, RemoteCompletion, SyncthingConfig, SyncthingEvent, SystemError, SystemErrors,
    SystemStatus,
};
pub use http::{ApiRequest, HttpClient, Transport, TransportError};
