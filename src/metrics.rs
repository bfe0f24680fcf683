use crate::collectors::{FullSnapshot, HealthVerdict};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub cpu_usage_percent: Gauge,
    pub cpu_core_usage_percent: GaugeVec,
    pub cpu_frequency_hz: Gauge,
    pub cpu_temperature_celsius: GaugeVec,
    pub cpu_voltage_volts: GaugeVec,
    pub cpu_throttled: GaugeVec,
    pub ram_used_bytes: Gauge,
    pub ram_total_bytes: Gauge,
    pub ram_usage_percent: Gauge,
    pub swap_used_bytes: Gauge,
    pub swap_total_bytes: Gauge,
    pub disk_used_bytes: GaugeVec,
    pub disk_total_bytes: GaugeVec,
    pub disk_usage_percent: GaugeVec,
    pub smart_healthy: GaugeVec,
    pub smart_temperature_celsius: GaugeVec,
    pub uptime_seconds: Gauge,
    pub last_collect_timestamp_seconds: Gauge,
    pub scrape_count_total: Counter,
    pub api_requests_total: CounterVec,
    pub power_actions_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let cpu_usage_percent = Gauge::with_opts(opts!(
            "hostpulse_cpu_usage_percent",
            "Average CPU usage over all logical cores"
        ))?;
        let cpu_core_usage_percent = GaugeVec::new(
            opts!("hostpulse_cpu_core_usage_percent", "CPU usage by logical core"),
            &["core"],
        )?;
        let cpu_frequency_hz = Gauge::with_opts(opts!(
            "hostpulse_cpu_frequency_hz",
            "Current CPU frequency in Hz"
        ))?;
        // Label-less vecs so an unknown reading can be withdrawn with reset().
        let cpu_temperature_celsius = GaugeVec::new(
            opts!("hostpulse_cpu_temperature_celsius", "SoC temperature in Celsius"),
            &[],
        )?;
        let cpu_voltage_volts = GaugeVec::new(
            opts!("hostpulse_cpu_voltage_volts", "Core voltage in volts"),
            &[],
        )?;
        let cpu_throttled = GaugeVec::new(
            opts!("hostpulse_cpu_throttled", "Firmware throttle flag 0/1"),
            &["flag"],
        )?;
        let ram_used_bytes =
            Gauge::with_opts(opts!("hostpulse_ram_used_bytes", "Used RAM in bytes"))?;
        let ram_total_bytes =
            Gauge::with_opts(opts!("hostpulse_ram_total_bytes", "Total RAM in bytes"))?;
        let ram_usage_percent =
            Gauge::with_opts(opts!("hostpulse_ram_usage_percent", "RAM usage in percent"))?;
        let swap_used_bytes =
            Gauge::with_opts(opts!("hostpulse_swap_used_bytes", "Used swap in bytes"))?;
        let swap_total_bytes =
            Gauge::with_opts(opts!("hostpulse_swap_total_bytes", "Total swap in bytes"))?;
        let disk_used_bytes = GaugeVec::new(
            opts!("hostpulse_disk_used_bytes", "Disk used bytes by mount"),
            &["mount"],
        )?;
        let disk_total_bytes = GaugeVec::new(
            opts!("hostpulse_disk_total_bytes", "Disk total bytes by mount"),
            &["mount"],
        )?;
        let disk_usage_percent = GaugeVec::new(
            opts!("hostpulse_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount"],
        )?;
        let smart_healthy = GaugeVec::new(
            opts!(
                "hostpulse_smart_healthy",
                "S.M.A.R.T. self-assessment: 1 passed, 0 failed, -1 unknown"
            ),
            &["device"],
        )?;
        let smart_temperature_celsius = GaugeVec::new(
            opts!(
                "hostpulse_smart_temperature_celsius",
                "Drive temperature reported by S.M.A.R.T."
            ),
            &["device"],
        )?;
        let uptime_seconds =
            Gauge::with_opts(opts!("hostpulse_uptime_seconds", "Host uptime in seconds"))?;
        let last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "hostpulse_last_collect_timestamp_seconds",
            "Unix time of the most recent snapshot"
        ))?;
        let scrape_count_total = Counter::with_opts(opts!(
            "hostpulse_scrape_count_total",
            "Number of Prometheus scrapes served"
        ))?;
        let api_requests_total = CounterVec::new(
            opts!("hostpulse_api_requests_total", "API requests by endpoint"),
            &["endpoint"],
        )?;
        let power_actions_total = CounterVec::new(
            opts!(
                "hostpulse_power_actions_total",
                "Power actions by action and result"
            ),
            &["action", "result"],
        )?;

        register(&registry, &cpu_usage_percent)?;
        register(&registry, &cpu_core_usage_percent)?;
        register(&registry, &cpu_frequency_hz)?;
        register(&registry, &cpu_temperature_celsius)?;
        register(&registry, &cpu_voltage_volts)?;
        register(&registry, &cpu_throttled)?;
        register(&registry, &ram_used_bytes)?;
        register(&registry, &ram_total_bytes)?;
        register(&registry, &ram_usage_percent)?;
        register(&registry, &swap_used_bytes)?;
        register(&registry, &swap_total_bytes)?;
        register(&registry, &disk_used_bytes)?;
        register(&registry, &disk_total_bytes)?;
        register(&registry, &disk_usage_percent)?;
        register(&registry, &smart_healthy)?;
        register(&registry, &smart_temperature_celsius)?;
        register(&registry, &uptime_seconds)?;
        register(&registry, &last_collect_timestamp_seconds)?;
        register(&registry, &scrape_count_total)?;
        register(&registry, &api_requests_total)?;
        register(&registry, &power_actions_total)?;

        Ok(Arc::new(Self {
            registry,
            cpu_usage_percent,
            cpu_core_usage_percent,
            cpu_frequency_hz,
            cpu_temperature_celsius,
            cpu_voltage_volts,
            cpu_throttled,
            ram_used_bytes,
            ram_total_bytes,
            ram_usage_percent,
            swap_used_bytes,
            swap_total_bytes,
            disk_used_bytes,
            disk_total_bytes,
            disk_usage_percent,
            smart_healthy,
            smart_temperature_celsius,
            uptime_seconds,
            last_collect_timestamp_seconds,
            scrape_count_total,
            api_requests_total,
            power_actions_total,
        }))
    }

    /// Replaces every gauge with the values in `snap`. Series from a previous
    /// snapshot (unmounted disks, removed drives) are dropped, and a reading
    /// that is now unknown disappears from the output instead of going stale.
    pub fn update_from_snapshot(&self, snap: &FullSnapshot) {
        let cpu = &snap.cpu;
        self.cpu_usage_percent.set(cpu.average_usage);
        self.cpu_core_usage_percent.reset();
        for (core, usage) in cpu.per_core_usage.iter().enumerate() {
            self.cpu_core_usage_percent
                .with_label_values(&[&core.to_string()])
                .set(*usage);
        }
        self.cpu_frequency_hz.set(cpu.current_freq_hz as f64);
        self.cpu_temperature_celsius.reset();
        if let Some(t) = cpu.temperature {
            self.cpu_temperature_celsius.with_label_values(&[]).set(t);
        }
        self.cpu_voltage_volts.reset();
        if let Some(v) = cpu.voltage {
            self.cpu_voltage_volts.with_label_values(&[]).set(v);
        }
        let t = &cpu.throttling;
        for (flag, on) in [
            ("under_voltage", t.under_voltage),
            ("arm_freq_capped", t.arm_freq_capped),
            ("throttling", t.throttling),
            ("soft_temp_limit", t.soft_temp_limit),
            ("currently_throttled", t.currently_throttled),
            ("under_voltage_now", t.under_voltage_now),
            ("arm_freq_capped_now", t.arm_freq_capped_now),
            ("throttling_now", t.throttling_now),
            ("soft_temp_limit_now", t.soft_temp_limit_now),
        ] {
            self.cpu_throttled
                .with_label_values(&[flag])
                .set(if on { 1.0 } else { 0.0 });
        }

        let mem = &snap.memory;
        self.ram_used_bytes.set(mem.ram_used as f64);
        self.ram_total_bytes.set(mem.ram_total as f64);
        self.ram_usage_percent.set(mem.ram_percent.unwrap_or(0.0));
        self.swap_used_bytes.set(mem.swap_used as f64);
        self.swap_total_bytes.set(mem.swap_total as f64);

        self.disk_used_bytes.reset();
        self.disk_total_bytes.reset();
        self.disk_usage_percent.reset();
        for p in &snap.storage.partitions {
            let mount = p.mountpoint.as_str();
            self.disk_used_bytes
                .with_label_values(&[mount])
                .set(p.used as f64);
            self.disk_total_bytes
                .with_label_values(&[mount])
                .set(p.total as f64);
            if let Some(pct) = p.percent {
                self.disk_usage_percent.with_label_values(&[mount]).set(pct);
            }
        }

        self.smart_healthy.reset();
        self.smart_temperature_celsius.reset();
        for d in &snap.smart.devices {
            let healthy = match d.health {
                HealthVerdict::Passed => 1.0,
                HealthVerdict::Failed => 0.0,
                HealthVerdict::Unknown => -1.0,
            };
            self.smart_healthy
                .with_label_values(&[&d.device])
                .set(healthy);
            if let Some(temp) = d.temperature {
                self.smart_temperature_celsius
                    .with_label_values(&[&d.device])
                    .set(f64::from(temp));
            }
        }

        self.uptime_seconds
            .set(snap.system_info.uptime_seconds as f64);
        self.last_collect_timestamp_seconds
            .set(snap.timestamp.unix_secs() as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn inc_api_request(&self, endpoint: &str) {
        self.api_requests_total.with_label_values(&[endpoint]).inc();
    }

    pub fn inc_power_action(&self, action: &str, result: &str) {
        self.power_actions_total
            .with_label_values(&[action, result])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
