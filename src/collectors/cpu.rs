use crate::collectors::source::{degrade, read_source, run_checked, SourceError};
use crate::collectors::{scrape, CpuSnapshot, ThrottleFlags, Timestamp};
use crate::config::CollectConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sysinfo::{CpuExt, CpuRefreshKind, RefreshKind, System, SystemExt};
use tokio::time;

/// Bit layout of the `get_throttled` mask.
///
/// `Documented` follows the firmware documentation: "now" flags in bits 0..=3,
/// "has occurred" flags in bits 16..=19. `Legacy` packs all nine flags into
/// bits 0..=8, as older dashboards for this hardware did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleLayout {
    #[default]
    Documented,
    Legacy,
}

impl ThrottleLayout {
    pub fn decode(self, mask: u32) -> ThrottleFlags {
        let bit = |n: u32| mask & (1 << n) != 0;
        match self {
            Self::Documented => ThrottleFlags {
                under_voltage_now: bit(0),
                arm_freq_capped_now: bit(1),
                throttling_now: bit(2),
                currently_throttled: bit(2),
                soft_temp_limit_now: bit(3),
                under_voltage: bit(16),
                arm_freq_capped: bit(17),
                throttling: bit(18),
                soft_temp_limit: bit(19),
            },
            Self::Legacy => ThrottleFlags {
                throttling: bit(0),
                arm_freq_capped: bit(1),
                currently_throttled: bit(2),
                soft_temp_limit: bit(3),
                under_voltage: bit(4),
                arm_freq_capped_now: bit(5),
                throttling_now: bit(6),
                soft_temp_limit_now: bit(7),
                under_voltage_now: bit(8),
            },
        }
    }
}

pub async fn collect(cfg: &CollectConfig) -> CpuSnapshot {
    let (sample, temperature, voltage, throttling) = tokio::join!(
        sample_usage(cfg),
        temperature(cfg),
        voltage(cfg),
        throttling(cfg)
    );

    let (logical_cores, per_core_usage, average_usage) = summarize_usage(sample.per_core);
    let (min_freq_hz, max_freq_hz) = frequency_bounds(&cfg.sources.cpufreq_dir);

    CpuSnapshot {
        cores: sample.physical_cores.filter(|n| *n > 0).unwrap_or(1),
        logical_cores,
        per_core_usage,
        average_usage,
        current_freq_hz: sample.current_freq_mhz.saturating_mul(1_000_000),
        min_freq_hz,
        max_freq_hz,
        temperature,
        voltage,
        throttling,
        timestamp: Timestamp::now(),
    }
}

struct UsageSample {
    physical_cores: Option<usize>,
    per_core: Vec<f64>,
    current_freq_mhz: u64,
}

/// Blocks for the configured observation window between two CPU refreshes.
async fn sample_usage(cfg: &CollectConfig) -> UsageSample {
    let mut sys =
        System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    let window = cfg
        .timeouts
        .cpu_sample()
        .max(System::MINIMUM_CPU_UPDATE_INTERVAL);
    time::sleep(window).await;
    sys.refresh_cpu_specifics(CpuRefreshKind::everything());

    UsageSample {
        physical_cores: sys.physical_core_count(),
        per_core: sys.cpus().iter().map(|c| f64::from(c.cpu_usage())).collect(),
        current_freq_mhz: sys.cpus().first().map(|c| c.frequency()).unwrap_or(0),
    }
}

/// Clamps readings to [0, 100] and guarantees at least one core so the
/// per-core list always matches the logical core count.
fn summarize_usage(per_core: Vec<f64>) -> (usize, Vec<f64>, f64) {
    let mut per_core: Vec<f64> = per_core
        .into_iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 })
        .collect();
    if per_core.is_empty() {
        per_core.push(0.0);
    }
    let average = per_core.iter().sum::<f64>() / per_core.len() as f64;
    (per_core.len(), per_core, average)
}

fn frequency_bounds(cpufreq_dir: &Path) -> (u64, u64) {
    let read_khz = |name: &str| {
        let path = cpufreq_dir.join(name);
        let value = read_source(&path).and_then(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| SourceError::parse(path.display().to_string()))
        });
        degrade("cpufreq", value)
            .map(|khz| khz.saturating_mul(1000))
            .unwrap_or(0)
    };
    (read_khz("cpuinfo_min_freq"), read_khz("cpuinfo_max_freq"))
}

async fn temperature(cfg: &CollectConfig) -> Option<f64> {
    let thermal = read_thermal_zone(&cfg.sources.thermal_zone_path);
    if let Some(celsius) = degrade("thermal_zone", thermal) {
        return Some(celsius);
    }
    let out = run_checked(
        &cfg.sources.vcgencmd,
        &["measure_temp"],
        cfg.timeouts.vendor_command(),
    )
    .await;
    degrade("vcgencmd measure_temp", out)
        .as_deref()
        .and_then(scrape::vcgencmd_temperature)
}

fn read_thermal_zone(path: &Path) -> Result<f64, SourceError> {
    let raw = read_source(path)?;
    let millidegrees: u64 = raw
        .trim()
        .parse()
        .map_err(|_| SourceError::parse(path.display().to_string()))?;
    Ok(millidegrees as f64 / 1000.0)
}

async fn voltage(cfg: &CollectConfig) -> Option<f64> {
    let out = run_checked(
        &cfg.sources.vcgencmd_volts,
        &["measure_volts"],
        cfg.timeouts.vendor_command(),
    )
    .await;
    degrade("vcgencmd measure_volts", out)
        .as_deref()
        .and_then(scrape::vcgencmd_voltage)
}

async fn throttling(cfg: &CollectConfig) -> ThrottleFlags {
    let out = run_checked(
        &cfg.sources.vcgencmd,
        &["get_throttled"],
        cfg.timeouts.vendor_command(),
    )
    .await;
    degrade("vcgencmd get_throttled", out)
        .as_deref()
        .and_then(scrape::vcgencmd_throttled_mask)
        .map(|mask| cfg.sources.throttle_layout.decode(mask))
        .unwrap_or_default()
}
