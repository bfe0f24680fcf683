use crate::collectors::source::{degrade, read_source, SourceError};
use crate::collectors::{percent_of, IoCounters, PartitionInfo, StorageSnapshot, Timestamp};
use crate::config::CollectConfig;
use nix::sys::statvfs::statvfs;
use std::collections::HashSet;
use std::io;
use tracing::debug;

const SECTOR_BYTES: u64 = 512;

pub fn collect(cfg: &CollectConfig) -> StorageSnapshot {
    let sources = &cfg.sources;
    let mounts = degrade("mounts", read_source(&sources.mounts_path))
        .map(|text| parse_mounts(&text))
        .unwrap_or_default();
    let pseudo = degrade("filesystems", read_source(&sources.filesystems_path))
        .map(|text| parse_nodev_filesystems(&text))
        .unwrap_or_default();

    let candidates = mounts
        .into_iter()
        .filter(|m| !m.fstype.is_empty() && !pseudo.contains(&m.fstype))
        .collect();
    let partitions = collect_partitions(candidates, usage_of);

    let io_counters = degrade("diskstats", read_source(&sources.diskstats_path))
        .and_then(|text| parse_diskstats(&text));

    StorageSnapshot {
        partitions,
        io_counters,
        timestamp: Timestamp::now(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Looks up usage for each mount. A mount whose lookup fails is left out;
/// permission errors are expected for some mounts and are not reported.
fn collect_partitions<F>(mounts: Vec<MountEntry>, mut usage: F) -> Vec<PartitionInfo>
where
    F: FnMut(&str) -> Result<Usage, SourceError>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in mounts {
        if !seen.insert(m.mountpoint.clone()) {
            continue;
        }
        let u = match usage(&m.mountpoint) {
            Ok(u) => u,
            Err(err) if err.is_permission_denied() => continue,
            Err(err) => {
                debug!(mountpoint = %m.mountpoint, error = %err, "partition usage unavailable");
                continue;
            }
        };
        out.push(PartitionInfo {
            device: m.device,
            mountpoint: m.mountpoint,
            fstype: m.fstype,
            total: u.total,
            used: u.used,
            free: u.free,
            percent: percent_of(u.used, u.used.saturating_add(u.free)),
        });
    }
    out
}

/// `free` counts blocks available to unprivileged users, so
/// `used + free` can be less than `total` on filesystems with reserved blocks.
fn usage_of(mountpoint: &str) -> Result<Usage, SourceError> {
    let st = statvfs(mountpoint).map_err(|errno| SourceError::Io {
        what: mountpoint.to_string(),
        source: io::Error::from(errno),
    })?;
    let frsize = st.fragment_size() as u64;
    let blocks = st.blocks() as u64;
    let total = blocks.saturating_mul(frsize);
    let free = (st.blocks_available() as u64).saturating_mul(frsize);
    let used = blocks
        .saturating_sub(st.blocks_free() as u64)
        .saturating_mul(frsize);
    Ok(Usage { total, used, free })
}

/// Parses the mount table (`device mountpoint fstype options dump pass`).
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = unescape_mount_field(fields.next()?);
            let mountpoint = unescape_mount_field(fields.next()?);
            let fstype = fields.next().unwrap_or_default().to_string();
            Some(MountEntry {
                device,
                mountpoint,
                fstype,
            })
        })
        .collect()
}

/// The kernel writes space, tab, newline and backslash in mount fields as
/// three-digit octal escapes.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let octal = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(v) = octal {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Filesystem types flagged `nodev` (proc, sysfs, tmpfs, cgroup, ...).
fn parse_nodev_filesystems(text: &str) -> HashSet<String> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nodev"), Some(name)) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Sums whole-disk rows of the diskstats table. Partition rows are skipped so
/// sectors are not counted twice, and so are loop and ram devices.
pub fn parse_diskstats(text: &str) -> Option<IoCounters> {
    let rows: Vec<(&str, Vec<u64>)> = text
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.nth(2)?;
            let values: Vec<u64> = fields.take(8).filter_map(|v| v.parse().ok()).collect();
            (values.len() == 8).then_some((name, values))
        })
        .collect();
    if rows.is_empty() {
        return None;
    }

    let names: Vec<&str> = rows.iter().map(|(name, _)| *name).collect();
    let mut total = IoCounters::default();
    for (name, v) in &rows {
        if name.starts_with("loop") || name.starts_with("ram") || is_partition(name, &names) {
            continue;
        }
        // reads, reads merged, sectors read, ms reading, then the same four for writes
        total.read_count += v[0];
        total.read_bytes += v[2] * SECTOR_BYTES;
        total.read_time += v[3];
        total.write_count += v[4];
        total.write_bytes += v[6] * SECTOR_BYTES;
        total.write_time += v[7];
    }
    Some(total)
}

/// Kernel naming: a disk whose name ends in a digit numbers its partitions
/// `<disk>p<N>` (mmcblk0p1, nvme0n1p2, md1p1); any other disk uses
/// `<disk><N>` (sda1).
fn is_partition(name: &str, all: &[&str]) -> bool {
    all.iter().any(|disk| {
        let Some(rest) = name.strip_prefix(disk) else {
            return false;
        };
        let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
            match rest.strip_prefix('p') {
                Some(digits) => digits,
                None => return false,
            }
        } else {
            rest
        };
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    })
}
