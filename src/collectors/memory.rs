use crate::collectors::source::{degrade, read_source};
use crate::collectors::{percent_of, MemorySnapshot, Timestamp};
use crate::config::CollectConfig;
use sysinfo::{RefreshKind, System, SystemExt};

/// Swap usage above this share of total swap is flagged as excessive.
const EXCESSIVE_SWAP_PERCENT: f64 = 50.0;

pub fn collect(cfg: &CollectConfig) -> MemorySnapshot {
    let mut sys = System::new_with_specifics(RefreshKind::new().with_memory());
    sys.refresh_memory();

    let meminfo = degrade("meminfo", read_source(&cfg.sources.meminfo_path)).unwrap_or_default();

    build(MemoryReading {
        ram_total: sys.total_memory(),
        ram_used: sys.used_memory(),
        ram_available: sys.available_memory(),
        ram_free: sys.free_memory(),
        ram_buffers: meminfo_bytes(&meminfo, "Buffers").unwrap_or(0),
        ram_cached: meminfo_bytes(&meminfo, "Cached").unwrap_or(0),
        swap_total: sys.total_swap(),
        swap_used: sys.used_swap(),
        swap_free: sys.free_swap(),
    })
}

struct MemoryReading {
    ram_total: u64,
    ram_used: u64,
    ram_available: u64,
    ram_free: u64,
    ram_buffers: u64,
    ram_cached: u64,
    swap_total: u64,
    swap_used: u64,
    swap_free: u64,
}

fn build(r: MemoryReading) -> MemorySnapshot {
    let swap_percent = percent_of(r.swap_used, r.swap_total);
    MemorySnapshot {
        ram_total: r.ram_total,
        ram_used: r.ram_used,
        ram_available: r.ram_available,
        ram_free: r.ram_free,
        ram_buffers: r.ram_buffers,
        ram_cached: r.ram_cached,
        ram_percent: percent_of(r.ram_used, r.ram_total),
        swap_total: r.swap_total,
        swap_used: r.swap_used,
        swap_free: r.swap_free,
        swap_percent,
        excessive_swap: excessive_swap(r.swap_total, swap_percent),
        timestamp: Timestamp::now(),
    }
}

fn excessive_swap(swap_total: u64, swap_percent: Option<f64>) -> bool {
    swap_total > 0 && swap_percent.is_some_and(|p| p > EXCESSIVE_SWAP_PERCENT)
}

/// Reads a `Key:   1234 kB` line from the meminfo pseudo-file as bytes.
fn meminfo_bytes(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kb.saturating_mul(1024))
    })
}
