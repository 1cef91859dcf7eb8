mod events;
mod queries;
mod types;

pub use events::DaemonEvent;
pub use types::{
    ConnectionState, ConnectionsResponse, DeviceConfig, FolderConfig, FolderDevice, FolderStatus,
    RemoteCompletion, SyncthingConfig, SyncthingEvent, SystemError, SystemErrors, SystemStatus,
};
