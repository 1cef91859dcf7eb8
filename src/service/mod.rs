//! Control of the daemon's systemd unit.

mod systemctl;

use std::fmt;

use async_trait::async_trait;

use crate::types::MonitorError;

pub use systemctl::Systemctl;

/// Which service manager instance owns the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceScope {
    User,
    System,
}

impl ServiceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceScope::User => "user",
            ServiceScope::System => "system",
        }
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCommand {
    IsEnabled,
    IsActive,
    Start,
    Stop,
    Enable,
    Disable,
}

impl ServiceCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCommand::IsEnabled => "is-enabled",
            ServiceCommand::IsActive => "is-active",
            ServiceCommand::Start => "start",
            ServiceCommand::Stop => "stop",
            ServiceCommand::Enable => "enable",
            ServiceCommand::Disable => "disable",
        }
    }

    /// Queries report through their output, whatever the exit status.
    pub fn is_query(self) -> bool {
        matches!(self, ServiceCommand::IsEnabled | ServiceCommand::IsActive)
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a service manager command for `unit` and returns its trimmed output.
#[async_trait]
pub trait ServiceControl: Send + Sync + 'static {
    async fn run(
        &self,
        unit: &str,
        command: ServiceCommand,
        scope: ServiceScope,
    ) -> Result<String, MonitorError>;
}
