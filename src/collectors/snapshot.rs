//! The six public query operations. Each one always returns a complete,
//! typed value; unreadable sources show up as absent or default fields.

use crate::collectors::{
    cpu, memory, smart, storage, system, CpuSnapshot, FullSnapshot, MemorySnapshot, SmartReport,
    StorageSnapshot, SystemInfo, Timestamp,
};
use crate::config::CollectConfig;
use tokio::task;
use tokio::time;
use tracing::debug;

/// Runs every aggregator and stamps the result after all of them finish.
pub async fn all_metrics(cfg: &CollectConfig) -> FullSnapshot {
    let (system_info, cpu, memory, storage, smart) = if cfg.parallel {
        tokio::join!(
            system_info(cfg),
            cpu_metrics(cfg),
            memory_metrics(cfg),
            storage_metrics(cfg),
            smart_data(cfg)
        )
    } else {
        (
            system_info(cfg).await,
            cpu_metrics(cfg).await,
            memory_metrics(cfg).await,
            storage_metrics(cfg).await,
            smart_data(cfg).await,
        )
    };
    debug!(
        parallel = cfg.parallel,
        partitions = storage.partitions.len(),
        smart_devices = smart.devices.len(),
        "snapshot collected"
    );

    FullSnapshot {
        system_info,
        cpu,
        memory,
        storage,
        smart,
        timestamp: Timestamp::now(),
    }
}

pub async fn cpu_metrics(cfg: &CollectConfig) -> CpuSnapshot {
    cpu::collect(cfg).await
}

pub async fn memory_metrics(cfg: &CollectConfig) -> MemorySnapshot {
    memory::collect(cfg)
}

/// `statvfs` blocks for as long as the filesystem does, so the pass runs on
/// the blocking pool under a deadline. A pass that misses the deadline
/// reports no partitions and no I/O counters.
pub async fn storage_metrics(cfg: &CollectConfig) -> StorageSnapshot {
    let owned = cfg.clone();
    let pass = task::spawn_blocking(move || storage::collect(&owned));
    match time::timeout(cfg.timeouts.storage(), pass).await {
        Ok(Ok(snap)) => snap,
        Ok(Err(err)) => {
            debug!(error = %err, "storage collection task failed");
            storage_unavailable()
        }
        Err(_elapsed) => {
            debug!(timeout = ?cfg.timeouts.storage(), "storage collection timed out");
            storage_unavailable()
        }
    }
}

fn storage_unavailable() -> StorageSnapshot {
    StorageSnapshot {
        partitions: Vec::new(),
        io_counters: None,
        timestamp: Timestamp::now(),
    }
}

pub async fn system_info(cfg: &CollectConfig) -> SystemInfo {
    system::collect(cfg).await
}

pub async fn smart_data(cfg: &CollectConfig) -> SmartReport {
    smart::collect(cfg).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collectors::{ThrottleFlags, NOT_AVAILABLE};
    use crate::config::{SourcesConfig, TimeoutsConfig};

    /// Every file and program points somewhere that does not exist.
    pub(crate) fn offline_config() -> CollectConfig {
        let missing = |name: &str| format!("/nonexistent/hostpulse/{name}");
        CollectConfig {
            parallel: true,
            sources: SourcesConfig {
                thermal_zone_path: missing("temp").into(),
                cpufreq_dir: missing("cpufreq").into(),
                vcgencmd: "hostpulse-missing-vcgencmd".to_string(),
                vcgencmd_volts: missing("vcgencmd"),
                smartctl: "hostpulse-missing-smartctl".to_string(),
                resolvectl: "hostpulse-missing-resolvectl".to_string(),
                route_table_path: missing("route").into(),
                resolv_conf_path: missing("resolv.conf").into(),
                mounts_path: missing("mounts").into(),
                filesystems_path: missing("filesystems").into(),
                diskstats_path: missing("diskstats").into(),
                meminfo_path: missing("meminfo").into(),
                ..SourcesConfig::default()
            },
            timeouts: TimeoutsConfig {
                cpu_sample_millis: 100,
                ..TimeoutsConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn every_source_missing_still_yields_full_snapshot() {
        let snap = all_metrics(&offline_config()).await;

        assert!(snap.cpu.logical_cores >= 1);
        assert_eq!(snap.cpu.per_core_usage.len(), snap.cpu.logical_cores);
        assert_eq!(snap.cpu.temperature, None);
        assert_eq!(snap.cpu.voltage, None);
        assert_eq!(snap.cpu.throttling, ThrottleFlags::default());
        assert_eq!(snap.cpu.min_freq_hz, 0);
        assert_eq!(snap.cpu.max_freq_hz, 0);

        assert_eq!(snap.memory.ram_buffers, 0);
        assert_eq!(snap.memory.ram_cached, 0);

        assert!(snap.storage.partitions.is_empty());
        assert_eq!(snap.storage.io_counters, None);

        assert!(!snap.smart.available);
        assert!(snap.smart.devices.is_empty());

        assert_eq!(snap.system_info.network.gateway, NOT_AVAILABLE);
        assert_eq!(snap.system_info.network.dns, NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn snapshot_is_stamped_after_its_parts() {
        let mut cfg = offline_config();
        cfg.parallel = false;
        let snap = all_metrics(&cfg).await;
        assert!(snap.timestamp >= snap.cpu.timestamp);
        assert!(snap.timestamp >= snap.memory.timestamp);
        assert!(snap.timestamp >= snap.storage.timestamp);
        assert!(snap.timestamp >= snap.smart.timestamp);
    }

    #[tokio::test]
    async fn storage_pass_reads_mounts_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = dir.path().join("mounts");
        std::fs::write(&mounts, format!("/dev/sda1 {} ext4 rw 0 0\n", dir.path().display()))
            .unwrap();
        let mut cfg = offline_config();
        cfg.sources.mounts_path = mounts;

        let snap = storage_metrics(&cfg).await;
        assert_eq!(snap.partitions.len(), 1);
        assert_eq!(snap.partitions[0].mountpoint, dir.path().display().to_string());
    }

    #[tokio::test]
    async fn snapshot_serializes_with_all_sections() {
        let snap = all_metrics(&offline_config()).await;
        let json = serde_json::to_value(&snap).unwrap();
        for key in ["system_info", "cpu", "memory", "storage", "smart", "timestamp"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["smart"]["available"], false);
        assert_eq!(json["system_info"]["network"]["dns"], NOT_AVAILABLE);
    }
}
