use crate::collectors::cpu::ThrottleLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_shutdown_password")]
    pub shutdown_password: String,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub collect: CollectConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PowerConfig {
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectConfig {
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Where each reading comes from. Defaults target a Raspberry Pi running a
/// stock Linux userland.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub thermal_zone_path: PathBuf,
    pub cpufreq_dir: PathBuf,
    pub vcgencmd: String,
    pub vcgencmd_volts: String,
    pub throttle_layout: ThrottleLayout,
    pub smartctl: String,
    pub resolvectl: String,
    pub route_table_path: PathBuf,
    pub resolv_conf_path: PathBuf,
    pub mounts_path: PathBuf,
    pub filesystems_path: PathBuf,
    pub diskstats_path: PathBuf,
    pub meminfo_path: PathBuf,
    pub preferred_interfaces: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub vendor_command_secs: u64,
    pub resolver_command_secs: u64,
    pub smart_scan_secs: u64,
    pub smart_device_secs: u64,
    pub storage_secs: u64,
    pub cpu_sample_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            shutdown_password: default_shutdown_password(),
            power: PowerConfig::default(),
            collect: CollectConfig::default(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            reboot_command: default_reboot_command(),
            shutdown_command: default_shutdown_command(),
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            sources: SourcesConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            thermal_zone_path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            cpufreq_dir: PathBuf::from("/sys/devices/system/cpu/cpu0/cpufreq"),
            vcgencmd: "vcgencmd".to_string(),
            vcgencmd_volts: "/usr/bin/vcgencmd".to_string(),
            throttle_layout: ThrottleLayout::default(),
            smartctl: "smartctl".to_string(),
            resolvectl: "resolvectl".to_string(),
            route_table_path: PathBuf::from("/proc/net/route"),
            resolv_conf_path: PathBuf::from("/etc/resolv.conf"),
            mounts_path: PathBuf::from("/proc/mounts"),
            filesystems_path: PathBuf::from("/proc/filesystems"),
            diskstats_path: PathBuf::from("/proc/diskstats"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            preferred_interfaces: ["eth0", "wlan0", "enp0s3", "enp0s31f6"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            vendor_command_secs: 2,
            resolver_command_secs: 2,
            smart_scan_secs: 5,
            smart_device_secs: 5,
            storage_secs: 10,
            cpu_sample_millis: 1000,
        }
    }
}

impl TimeoutsConfig {
    pub fn vendor_command(&self) -> Duration {
        Duration::from_secs(self.vendor_command_secs)
    }

    pub fn resolver_command(&self) -> Duration {
        Duration::from_secs(self.resolver_command_secs)
    }

    pub fn smart_scan(&self) -> Duration {
        Duration::from_secs(self.smart_scan_secs)
    }

    pub fn smart_device(&self) -> Duration {
        Duration::from_secs(self.smart_device_secs)
    }

    pub fn storage(&self) -> Duration {
        Duration::from_secs(self.storage_secs)
    }

    pub fn cpu_sample(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_millis)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Loads and validates `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            let cfg = Config::default();
            cfg.validate()?;
            return Ok(cfg);
        }
        Self::load_from_file(path_ref)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.shutdown_password.is_empty() {
            return Err(ConfigError::Validation(
                "shutdown_password must not be empty".to_string(),
            ));
        }

        validate_power(&self.power)?;
        validate_timeouts(&self.collect.timeouts)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_power(cfg: &PowerConfig) -> Result<(), ConfigError> {
    for (name, argv) in [
        ("reboot_command", &cfg.reboot_command),
        ("shutdown_command", &cfg.shutdown_command),
    ] {
        if argv.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "power.{name} must name a program"
            )));
        }
    }
    Ok(())
}

fn validate_timeouts(cfg: &TimeoutsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("vendor_command_secs", cfg.vendor_command_secs),
        ("resolver_command_secs", cfg.resolver_command_secs),
        ("smart_scan_secs", cfg.smart_scan_secs),
        ("smart_device_secs", cfg.smart_device_secs),
        ("storage_secs", cfg.storage_secs),
        ("cpu_sample_millis", cfg.cpu_sample_millis),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "collect.timeouts.{name} must be > 0"
            )));
        }
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:5002".to_string()
}

fn default_shutdown_password() -> String {
    "raspberry".to_string()
}

fn default_reboot_command() -> Vec<String> {
    vec!["sudo".to_string(), "reboot".to_string()]
}

fn default_shutdown_command() -> Vec<String> {
    ["sudo", "shutdown", "-h", "now"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

const fn default_parallel() -> bool {
    true
}
