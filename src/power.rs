use crate::config::PowerConfig;
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Reboot,
    Shutdown,
}

impl PowerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
        }
    }

    fn argv(self, cfg: &PowerConfig) -> &[String] {
        match self {
            Self::Reboot => &cfg.reboot_command,
            Self::Shutdown => &cfg.shutdown_command,
        }
    }
}

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("invalid password")]
    Unauthorized,
    #[error("failed to start {action} command: {source}")]
    Spawn {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

pub fn reboot(cfg: &PowerConfig) -> Result<(), PowerError> {
    issue(PowerAction::Reboot, cfg)
}

/// `supplied` must match `expected` byte for byte.
pub fn shutdown(cfg: &PowerConfig, expected: &str, supplied: &str) -> Result<(), PowerError> {
    if expected.as_bytes() != supplied.as_bytes() {
        warn!("shutdown rejected: invalid password");
        return Err(PowerError::Unauthorized);
    }
    issue(PowerAction::Shutdown, cfg)
}

/// Starts the configured command and returns without waiting for it. Success
/// means the command was launched, not that the host went down.
fn issue(action: PowerAction, cfg: &PowerConfig) -> Result<(), PowerError> {
    let argv = action.argv(cfg);
    let (program, args) = argv.split_first().ok_or_else(|| PowerError::Spawn {
        action: action.as_str(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    })?;

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| PowerError::Spawn {
            action: action.as_str(),
            source,
        })?;
    info!(action = action.as_str(), command = ?argv, "power command issued");
    Ok(())
}
