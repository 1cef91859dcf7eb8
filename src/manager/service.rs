use tracing::{debug, error, info, warn};

use crate::model::{Item, State};
use crate::service::{ServiceCommand, ServiceScope};

use super::{ErrorKind, Manager, ManagerEvent, ServiceState, SERVICE_SETTLE_DELAY};

impl Manager {
    async fn run_service(&self, command: ServiceCommand, scope: ServiceScope) -> Option<String> {
        let unit = self.with_state(|state| state.unit.clone());
        match self.inner.service.run(&unit, command, scope).await {
            Ok(output) => Some(output),
            Err(err) => {
                warn!(unit = %unit, %command, %scope, error = ?err, "Service command failed");
                None
            }
        }
    }

    /// Finds the scope that knows the unit, user first. Returns it along
    /// with whether the unit is enabled there.
    async fn service_status(&self) -> Option<(ServiceScope, bool)> {
        for scope in [ServiceScope::User, ServiceScope::System] {
            match self.run_service(ServiceCommand::IsEnabled, scope).await.as_deref() {
                Some("enabled") => return Some((scope, true)),
                Some("disabled") => return Some((scope, false)),
                other => debug!(%scope, result = ?other, "Unit not managed in scope"),
            }
        }
        None
    }

    /// Checks whether the unit is running and reacts to the edges: a Daemon
    /// error on entering the failed state, and activation or teardown when
    /// the active flag flips. A running service is also activated once after
    /// every [`Manager::attach`].
    ///
    /// A unit that no scope reports as enabled or disabled counts as stopped.
    pub(super) async fn is_service_active(&self) -> bool {
        let detected = self.service_status().await;
        let scope = match detected {
            Some((scope, _)) => scope,
            None => self.command_scope(),
        };
        let output = match detected {
            Some(_) => self
                .run_service(ServiceCommand::IsActive, scope)
                .await
                .unwrap_or_default(),
            None => String::new(),
        };
        let active = output == "active";
        let failed = output == "failed";

        let (entered_failure, flipped, activate, host) = self.with_state(|state| {
            let entered_failure = failed && !state.service_failed;
            state.service_failed = failed;
            if detected.is_some() {
                state.service_scope = Some(scope);
            }
            let flipped = state.service_active != active;
            state.service_active = active;
            let activate = active && (std::mem::take(&mut state.needs_activation) || flipped);
            (entered_failure, flipped, activate, state.host.clone())
        });

        if entered_failure {
            let unit = self.with_state(|state| state.unit.clone());
            error!(unit = %unit, "{}", ErrorKind::Daemon);
            self.emit_error(ErrorKind::Daemon, Some(unit));
        }

        if flipped {
            info!(%scope, active, "Service state changed");
            let change = if active {
                ServiceState::Active(scope)
            } else {
                ServiceState::Stopped(scope)
            };
            self.emit(ManagerEvent::ServiceChange(change));
            if let Some(host) = host {
                host.set_state(if active { State::Idle } else { State::Disconnected });
            }
            if !active {
                self.on_service_stopped();
            }
        }
        if activate {
            self.on_service_active();
        }

        active
    }

    /// Checks whether the unit is enabled, announcing changes.
    pub(super) async fn is_service_enabled(&self) -> bool {
        let Some((scope, enabled)) = self.service_status().await else {
            return false;
        };
        let flipped = self.with_state(|state| {
            state.service_scope = Some(scope);
            std::mem::replace(&mut state.service_enabled, enabled) != enabled
        });
        if flipped {
            let change = if enabled {
                ServiceState::Enabled(scope)
            } else {
                ServiceState::Disabled(scope)
            };
            self.emit(ManagerEvent::ServiceChange(change));
        }
        enabled
    }

    fn on_service_active(&self) {
        let generation = self.with_state(|state| {
            state.stream_active = true;
            state.stream_generation
        });
        let manager = self.clone();
        self.spawn(async move { manager.activate(generation).await });
    }

    /// Drops the mirrored topology; the next activation rebuilds it.
    fn on_service_stopped(&self) {
        self.inner.stream_timer.cancel();
        self.inner.folders.destroy_all();
        self.inner.devices.destroy_all();
        self.with_state(|state| {
            state.last_event_id = 1;
            state.service_connected = false;
            state.end_stream();
        });
    }

    fn command_scope(&self) -> ServiceScope {
        self.with_state(|state| state.service_scope.unwrap_or(ServiceScope::User))
    }

    /// Installs the unit if missing, starts it and re-checks once it settled.
    pub async fn start_service(&self) {
        let scope = self.command_scope();
        if scope == ServiceScope::User {
            if let Err(err) = self.inner.config.lock().await.set_service(false).await {
                warn!(error = ?err, "Unable to install service unit");
            }
        }
        self.run_service(ServiceCommand::Start, scope).await;
        self.with_state(|state| state.service_failed = false);
        self.recheck_service_later();
    }

    /// Aborts in-flight requests, then stops the unit.
    pub async fn stop_service(&self) {
        self.abort_connections();
        self.run_service(ServiceCommand::Stop, self.command_scope()).await;
        self.recheck_service_later();
    }

    /// Reinstalls the unit and enables it.
    pub async fn enable_service(&self) {
        let scope = self.command_scope();
        if scope == ServiceScope::User {
            if let Err(err) = self.inner.config.lock().await.set_service(true).await {
                warn!(error = ?err, "Unable to install service unit");
            }
        }
        self.run_service(ServiceCommand::Enable, scope).await;
        self.is_service_enabled().await;
    }

    pub async fn disable_service(&self) {
        self.run_service(ServiceCommand::Disable, self.command_scope())
            .await;
        self.is_service_enabled().await;
    }

    /// Service managers report transitional states right after a command.
    fn recheck_service_later(&self) {
        let weak = self.downgrade();
        self.inner
            .service_timer
            .run(SERVICE_SETTLE_DELAY, false, move || {
                let weak = weak.clone();
                async move {
                    if let Some(manager) = Manager::from_weak(&weak) {
                        manager.is_service_active().await;
                    }
                }
            });
    }
}
