//! Adapters over the free-text output of vendor tools.
//!
//! Each function handles one (command, pattern) pair and returns `None` when
//! the expected pattern is absent, so a format change in one tool degrades one
//! field only.

use crate::collectors::{DeviceHealth, HealthVerdict};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

static VCGENCMD_TEMP: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"temp=([0-9.]+)'C").ok());
static VCGENCMD_VOLT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"volt=([0-9.]+)V").ok());
static VCGENCMD_THROTTLED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"throttled=0x([0-9a-fA-F]+)").ok());

static SMART_TEMP_LINE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Temperature[^:\n]*:\s*(\d+)\s*Celsius").ok());
static SMART_TEMP_ATTR: Lazy<Option<Regex>> = Lazy::new(|| attribute_row("Temperature_Celsius"));
static SMART_POWER_ON_ATTR: Lazy<Option<Regex>> = Lazy::new(|| attribute_row("Power_On_Hours"));
static SMART_POWER_ON_NVME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Power On Hours:\s*([\d,]+)").ok());
static SMART_READ_ERRORS_ATTR: Lazy<Option<Regex>> =
    Lazy::new(|| attribute_row("Raw_Read_Error_Rate"));
static SMART_REALLOCATED_ATTR: Lazy<Option<Regex>> =
    Lazy::new(|| attribute_row("Reallocated_Sector_Ct"));

/// Matches one row of the ATA attribute table and captures the leading digits
/// of RAW_VALUE, the tenth column.
fn attribute_row(name: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?m)^\s*\d+\s+{name}\s+(?:\S+\s+){{7}}(\d+)")).ok()
}

fn capture<T: FromStr>(re: &Lazy<Option<Regex>>, text: &str) -> Option<T> {
    let re = re.as_ref()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// `vcgencmd measure_temp` -> `temp=48.3'C`
pub fn vcgencmd_temperature(stdout: &str) -> Option<f64> {
    capture(&VCGENCMD_TEMP, stdout)
}

/// `vcgencmd measure_volts` -> `volt=0.8600V`
pub fn vcgencmd_voltage(stdout: &str) -> Option<f64> {
    capture(&VCGENCMD_VOLT, stdout)
}

/// `vcgencmd get_throttled` -> `throttled=0x50000`
pub fn vcgencmd_throttled_mask(stdout: &str) -> Option<u32> {
    let re = VCGENCMD_THROTTLED.as_ref()?;
    let hex = re.captures(stdout)?.get(1)?.as_str();
    u32::from_str_radix(hex, 16).ok()
}

/// Device paths from `smartctl --scan`, one per line starting with `/dev/`.
pub fn smartctl_scan_devices(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with("/dev/"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Extracts every field of a `smartctl -a <device>` report independently.
pub fn smartctl_device_report(device: &str, stdout: &str) -> DeviceHealth {
    let health = if stdout.contains("PASSED") {
        HealthVerdict::Passed
    } else if stdout.contains("FAILED") {
        HealthVerdict::Failed
    } else {
        HealthVerdict::Unknown
    };

    let temperature =
        capture(&SMART_TEMP_LINE, stdout).or_else(|| capture(&SMART_TEMP_ATTR, stdout));
    let power_on_hours = capture(&SMART_POWER_ON_ATTR, stdout).or_else(|| {
        let re = SMART_POWER_ON_NVME.as_ref()?;
        let raw = re.captures(stdout)?.get(1)?.as_str().replace(',', "");
        raw.parse().ok()
    });

    DeviceHealth {
        device: device.to_string(),
        health,
        temperature,
        power_on_hours,
        raw_read_error_rate: capture(&SMART_READ_ERRORS_ATTR, stdout),
        reallocated_sector_count: capture(&SMART_REALLOCATED_ATTR, stdout),
    }
}

/// First address on the `DNS Servers:` line of `resolvectl status`.
pub fn resolvectl_dns(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.contains("DNS Servers:"))
        .find_map(|line| {
            line.split_whitespace()
                .find(|token| token.contains('.') && !token.starts_with("DNS"))
                .map(str::to_string)
        })
}
