use crate::collectors::source::{degrade, run_command, tool_exists, SourceError};
use crate::collectors::{scrape, DeviceHealth, SmartReport, Timestamp};
use crate::config::CollectConfig;
use tracing::debug;

/// `smartctl --scan` may exit with 1 while still listing usable devices.
const SCAN_BENIGN_EXIT: i32 = 1;

/// Tool detection, then device scan, then one detailed query per device.
/// Each phase can end the run early with an "unavailable" report.
pub async fn collect(cfg: &CollectConfig) -> SmartReport {
    let smartctl = &cfg.sources.smartctl;
    if !tool_exists(smartctl) {
        debug!(tool = %smartctl, "S.M.A.R.T. tool not found");
        return report(false, Vec::new());
    }

    let scan = run_command(smartctl, &["--scan"], cfg.timeouts.smart_scan())
        .await
        .and_then(|out| match out.code {
            Some(0) | Some(SCAN_BENIGN_EXIT) => Ok(out.stdout),
            code => Err(SourceError::Exit {
                program: smartctl.clone(),
                code,
            }),
        });
    let Some(scan) = degrade("smartctl --scan", scan) else {
        return report(true, Vec::new());
    };

    let mut devices = Vec::new();
    for device in scrape::smartctl_scan_devices(&scan) {
        devices.push(query_device(cfg, &device).await);
    }
    report(true, devices)
}

/// A failed query degrades this one device to unknown fields. The report is
/// parsed regardless of exit status, since smartctl encodes disk warnings in
/// the status bits while still printing the full report.
async fn query_device(cfg: &CollectConfig, device: &str) -> DeviceHealth {
    let out = run_command(
        &cfg.sources.smartctl,
        &["-a", device],
        cfg.timeouts.smart_device(),
    )
    .await;
    match degrade("smartctl -a", out) {
        Some(out) => scrape::smartctl_device_report(device, &out.stdout),
        None => DeviceHealth::unknown(device),
    }
}

fn report(available: bool, devices: Vec<DeviceHealth>) -> SmartReport {
    SmartReport {
        available,
        devices,
        timestamp: Timestamp::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::HealthVerdict;
    use crate::collectors::source::tests::stub_script;
    use crate::config::SourcesConfig;

    fn config_with_tool(smartctl: &str) -> CollectConfig {
        CollectConfig {
            sources: SourcesConfig {
                smartctl: smartctl.to_string(),
                ..SourcesConfig::default()
            },
            ..CollectConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_tool_reports_unavailable() {
        let smart = collect(&config_with_tool("hostpulse-missing-smartctl")).await;
        assert!(!smart.available);
        assert!(smart.devices.is_empty());
    }

    #[tokio::test]
    async fn tool_without_devices_is_available_but_empty() {
        // `true` accepts any arguments, exits 0 and prints nothing.
        if !tool_exists("true") {
            return;
        }
        let smart = collect(&config_with_tool("true")).await;
        assert!(smart.available);
        assert!(smart.devices.is_empty());
    }

    #[tokio::test]
    async fn benign_scan_exit_is_accepted() {
        // `false` exits 1, which the scan accepts, and prints nothing.
        if !tool_exists("false") {
            return;
        }
        let smart = collect(&config_with_tool("false")).await;
        assert!(smart.available);
        assert!(smart.devices.is_empty());
    }

    #[tokio::test]
    async fn unreachable_device_degrades_to_unknown() {
        let cfg = config_with_tool("hostpulse-missing-smartctl");
        let dev = query_device(&cfg, "/dev/sdz").await;
        assert_eq!(dev.device, "/dev/sdz");
        assert_eq!(dev.health, HealthVerdict::Unknown);
        assert_eq!(dev.temperature, None);
    }

    #[tokio::test]
    async fn scanned_devices_are_each_queried() {
        let dir = tempfile::tempdir().unwrap();
        let smartctl = stub_script(
            dir.path(),
            "smartctl",
            r#"if [ "$1" = "--scan" ]; then
  echo "/dev/sda -d sat # /dev/sda [SAT], ATA device"
  echo "/dev/nvme0 -d nvme # /dev/nvme0, NVMe device"
  exit 1
fi
if [ "$2" = "/dev/nvme0" ]; then
  exit 2
fi
echo "SMART overall-health self-assessment test result: PASSED"
echo "Current Drive Temperature:     38 Celsius"
exit 4"#,
        );

        let smart = collect(&config_with_tool(&smartctl)).await;
        assert!(smart.available);
        assert_eq!(smart.devices.len(), 2);

        let sda = &smart.devices[0];
        assert_eq!(sda.device, "/dev/sda");
        assert_eq!(sda.health, HealthVerdict::Passed);
        assert_eq!(sda.temperature, Some(38));

        let nvme = &smart.devices[1];
        assert_eq!(nvme.device, "/dev/nvme0");
        assert_eq!(nvme.health, HealthVerdict::Unknown);
        assert_eq!(nvme.temperature, None);
    }
}
