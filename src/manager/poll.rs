use tracing::debug;

use super::{Manager, POLL_CONFIG_HOOK, POLL_CONNECTION_HOOK, POLL_INTERVAL};

impl Manager {
    /// (Re)starts the poll timer; the first tick runs right away.
    pub(super) fn start_polling(&self) {
        let weak = self.downgrade();
        self.inner.poll_timer.start(POLL_INTERVAL, move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = Manager::from_weak(&weak) {
                    manager.poll_state().await;
                }
            }
        });
    }

    /// One poll tick. While the service runs and the config resolves, this
    /// re-reads the config every [`POLL_CONFIG_HOOK`] ticks, enablement and
    /// connections every [`POLL_CONNECTION_HOOK`] ticks, and daemon errors
    /// on every tick. Otherwise it only tracks enablement.
    pub(super) async fn poll_state(&self) {
        let count = self.with_state(|state| {
            let count = state.poll_count;
            state.poll_count += 1;
            count
        });
        debug!(count, "Poll");

        let active = self.is_service_active().await;
        if active && self.inner.config.lock().await.exists().await {
            if count > 0 && count % POLL_CONFIG_HOOK == 0 {
                self.spawn_call_config();
            }
            if count % POLL_CONNECTION_HOOK == 0 {
                self.is_service_enabled().await;
                self.spawn_call_connections();
            }
            self.spawn_call_errors();
            self.ensure_stream();
        } else {
            self.is_service_enabled().await;
        }
    }
}
