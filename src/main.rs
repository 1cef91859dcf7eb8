use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use syncthing_indicator::model::ItemEvent;
use syncthing_indicator::{Item, Manager, ManagerEvent, MonitorError, Settings};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Logs state and name changes of a newly announced item.
fn watch_item<T: Item>(kind: &'static str, item: &T) {
    let id = item.id().to_string();
    item.subscribe(move |event| match event {
        ItemEvent::StateChange(state) => info!(kind, id = %id, %state, "State change"),
        ItemEvent::NameChange(name) => info!(kind, id = %id, name = %name, "Name change"),
        ItemEvent::Destroy => info!(kind, id = %id, "Removed"),
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), MonitorError> {
    init_tracing();

    let settings = Settings::load().await;
    let manager = Manager::with_defaults(settings)?;

    manager.subscribe(|event| match event {
        ManagerEvent::ServiceChange(state) => info!(?state, "Service change"),
        ManagerEvent::Error(err) => error!(kind = ?err.kind, "{err}"),
        ManagerEvent::Login { username } => info!(username = %username, "Login"),
        ManagerEvent::FolderAdd(folder) => {
            info!(folder = %folder.id(), name = %folder.name(), "Folder added");
            watch_item("folder", folder);
        }
        ManagerEvent::DeviceAdd(device) => {
            info!(device = %device.id(), name = %device.name(), "Device added");
            watch_item("device", device);
        }
        ManagerEvent::HostAdd(device) => {
            info!(device = %device.id(), name = %device.name(), "Host added");
            watch_item("host", device);
        }
    });

    manager.attach().await;
    if let Some(uri) = manager.service_uri().await {
        info!(uri = %uri, "Daemon web GUI");
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");

    manager.abort_connections();
    manager.destroy();
    Ok(())
}
