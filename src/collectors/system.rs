use crate::collectors::source::{degrade, SourceError};
use crate::collectors::{network, SystemInfo, Timestamp, NOT_AVAILABLE};
use crate::config::CollectConfig;
use nix::sys::utsname::uname;
use std::ffi::OsStr;
use std::io;
use sysinfo::{System, SystemExt};

pub async fn collect(cfg: &CollectConfig) -> SystemInfo {
    let ident = degrade("uname", host_identity()).unwrap_or_else(fallback_identity);
    let boot_secs = System::new().boot_time();
    let now = Timestamp::now();

    SystemInfo {
        hostname: ident.hostname,
        system: ident.system,
        release: ident.release,
        machine: ident.machine,
        boot_time: Timestamp::from_unix_secs(boot_secs),
        uptime_seconds: now.unix_secs().saturating_sub(boot_secs),
        network: network::collect(cfg).await,
    }
}

struct HostIdentity {
    hostname: String,
    system: String,
    release: String,
    machine: String,
}

fn host_identity() -> Result<HostIdentity, SourceError> {
    let uts = uname().map_err(|errno| SourceError::Io {
        what: "uname".to_string(),
        source: io::Error::from(errno),
    })?;
    let text = |s: &OsStr| s.to_string_lossy().into_owned();
    Ok(HostIdentity {
        hostname: text(uts.nodename()),
        system: text(uts.sysname()),
        release: text(uts.release()),
        machine: text(uts.machine()),
    })
}

/// Used only if `uname(2)` itself fails.
fn fallback_identity() -> HostIdentity {
    let sys = System::new();
    let na = || NOT_AVAILABLE.to_string();
    HostIdentity {
        hostname: sys.host_name().unwrap_or_else(na),
        system: sys.name().unwrap_or_else(na),
        release: sys.kernel_version().unwrap_or_else(na),
        machine: std::env::consts::ARCH.to_string(),
    }
}
