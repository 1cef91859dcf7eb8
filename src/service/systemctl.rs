use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::types::MonitorError;

use super::{ServiceCommand, ServiceControl, ServiceScope};

/// [`ServiceControl`] backed by the `systemctl` binary.
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: String,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }
}

impl Systemctl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another binary with the same interface.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub(super) fn command_args(unit: &str, command: ServiceCommand, scope: ServiceScope) -> Vec<&str> {
    let mut args = Vec::with_capacity(3);
    if scope == ServiceScope::User {
        args.push("--user");
    }
    args.push(command.as_str());
    args.push(unit);
    args
}

#[async_trait]
impl ServiceControl for Systemctl {
    async fn run(
        &self,
        unit: &str,
        command: ServiceCommand,
        scope: ServiceScope,
    ) -> Result<String, MonitorError> {
        let args = command_args(unit, command, scope);
        let output = Command::new(&self.program).args(&args).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(program = %self.program, ?args, result = %stdout, "Calling systemd");

        if output.status.success() || command.is_query() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(MonitorError::Command(if stderr.is_empty() {
            format!(
                "Command `{}` with args {:?} failed with status {}",
                self.program, args, output.status
            )
        } else {
            format!(
                "Command `{}` with args {:?} failed: {}",
                self.program, args, stderr
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_scope_adds_flag() {
        assert_eq!(
            command_args("syncthing.service", ServiceCommand::IsActive, ServiceScope::User),
            vec!["--user", "is-active", "syncthing.service"]
        );
        assert_eq!(
            command_args("syncthing.service", ServiceCommand::Start, ServiceScope::System),
            vec!["start", "syncthing.service"]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let systemctl = Systemctl::with_program("/nonexistent/systemctl");
        let err = systemctl
            .run("syncthing.service", ServiceCommand::IsEnabled, ServiceScope::User)
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Io(_)));
    }
}
