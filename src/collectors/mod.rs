pub mod cpu;
pub mod memory;
pub mod network;
pub mod scrape;
pub mod smart;
pub mod snapshot;
pub mod source;
pub mod storage;
pub mod system;

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Placeholder reported by string fields whose source could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

static LAST_CAPTURE_MICROS: AtomicU64 = AtomicU64::new(0);

/// Wall-clock capture time, serialized as RFC 3339.
///
/// `Timestamp::now` never goes backwards within one process, even if the
/// system clock is stepped back between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(SystemTime);

impl Timestamp {
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let prev = LAST_CAPTURE_MICROS.fetch_max(now, Ordering::SeqCst);
        Self(UNIX_EPOCH + Duration::from_micros(prev.max(now)))
    }

    pub fn from_unix_secs(secs: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn unix_secs(&self) -> u64 {
        self.0
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_rfc3339_micros(self.0))
    }
}

/// Nine throttle indicators reported by the firmware. Unknown state reads as
/// all `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThrottleFlags {
    pub under_voltage: bool,
    pub arm_freq_capped: bool,
    pub throttling: bool,
    pub soft_temp_limit: bool,
    pub currently_throttled: bool,
    pub under_voltage_now: bool,
    pub arm_freq_capped_now: bool,
    pub throttling_now: bool,
    pub soft_temp_limit_now: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    pub cores: usize,
    pub logical_cores: usize,
    pub per_core_usage: Vec<f64>,
    pub average_usage: f64,
    pub current_freq_hz: u64,
    pub min_freq_hz: u64,
    pub max_freq_hz: u64,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub throttling: ThrottleFlags,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub ram_total: u64,
    pub ram_used: u64,
    pub ram_available: u64,
    pub ram_free: u64,
    pub ram_buffers: u64,
    pub ram_cached: u64,
    pub ram_percent: Option<f64>,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
    pub swap_percent: Option<f64>,
    pub excessive_swap: bool,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: Option<f64>,
}

/// Cumulative block I/O since boot. Times are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_time: u64,
    pub write_time: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageSnapshot {
    pub partitions: Vec<PartitionInfo>,
    pub io_counters: Option<IoCounters>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthVerdict {
    Passed,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHealth {
    pub device: String,
    pub health: HealthVerdict,
    pub temperature: Option<u32>,
    pub power_on_hours: Option<u64>,
    pub raw_read_error_rate: Option<u64>,
    pub reallocated_sector_count: Option<u64>,
}

impl DeviceHealth {
    pub fn unknown(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            health: HealthVerdict::Unknown,
            temperature: None,
            power_on_hours: None,
            raw_read_error_rate: None,
            reallocated_sector_count: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SmartReport {
    pub available: bool,
    pub devices: Vec<DeviceHealth>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub ip_address: String,
    pub gateway: String,
    pub dns: String,
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            ip_address: NOT_AVAILABLE.to_string(),
            gateway: NOT_AVAILABLE.to_string(),
            dns: NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub system: String,
    pub release: String,
    pub machine: String,
    pub boot_time: Timestamp,
    pub uptime_seconds: u64,
    pub network: NetworkInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSnapshot {
    pub system_info: SystemInfo,
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    pub storage: StorageSnapshot,
    pub smart: SmartReport,
    pub timestamp: Timestamp,
}

/// `part / whole * 100`, clamped to [0, 100]. `None` when `whole` is zero.
pub fn percent_of(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(((part as f64 / whole as f64) * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_never_go_backwards() {
        let mut prev = Timestamp::now();
        for _ in 0..1000 {
            let next = Timestamp::now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn timestamp_serializes_as_rfc3339() {
        let ts = Timestamp::from_unix_secs(0);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1970-01-01T00:00:00.000000Z\"");
    }

    #[test]
    fn percent_of_zero_whole_is_unknown() {
        assert_eq!(percent_of(10, 0), None);
        assert_eq!(percent_of(0, 10), Some(0.0));
        assert_eq!(percent_of(5, 10), Some(50.0));
    }

    #[test]
    fn health_verdict_uses_uppercase_names() {
        let json = serde_json::to_string(&HealthVerdict::Passed).unwrap();
        assert_eq!(json, "\"PASSED\"");
        let device = DeviceHealth::unknown("/dev/sda");
        assert_eq!(device.health, HealthVerdict::Unknown);
        assert_eq!(device.temperature, None);
    }
}
