//! Status reconciliation core for a Syncthing panel indicator.
//!
//! [`Manager`] polls the local daemon and its service unit, mirrors folders
//! and devices as observable [`model`] items and republishes everything as
//! [`ManagerEvent`]s for a UI layer to render.

pub mod config;
pub mod manager;
pub mod model;
pub mod service;
pub mod settings;
pub mod signals;
pub mod syncthing_client;
pub mod timer;
pub mod types;

pub use config::{Config, Endpoint};
pub use manager::{ErrorEvent, ErrorKind, Manager, ManagerEvent, ServiceState};
pub use model::{Device, Folder, Item, ItemCollection, State};
pub use settings::Settings;
pub use types::MonitorError;
