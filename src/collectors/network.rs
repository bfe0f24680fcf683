use crate::collectors::source::{degrade, read_source, run_checked, SourceError};
use crate::collectors::{scrape, NetworkInfo, NOT_AVAILABLE};
use crate::config::CollectConfig;
use nix::ifaddrs::getifaddrs;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

pub async fn collect(cfg: &CollectConfig) -> NetworkInfo {
    let sources = &cfg.sources;

    let ip_address = degrade("getifaddrs", interface_addresses())
        .and_then(|ifaces| select_address(&ifaces, &sources.preferred_interfaces))
        .map(|ip| ip.to_string());

    let gateway = degrade("route table", read_source(&sources.route_table_path))
        .and_then(|text| parse_default_gateway(&text))
        .map(|gw| gw.to_string());

    let mut dns = degrade("resolv.conf", read_source(&sources.resolv_conf_path))
        .and_then(|text| parse_resolv_conf(&text).into_iter().next());
    if dns.is_none() {
        let status = run_checked(
            &sources.resolvectl,
            &["status"],
            cfg.timeouts.resolver_command(),
        )
        .await;
        dns = degrade("resolvectl status", status).and_then(|out| scrape::resolvectl_dns(&out));
    }

    let or_na = |v: Option<String>| v.unwrap_or_else(|| NOT_AVAILABLE.to_string());
    NetworkInfo {
        ip_address: or_na(ip_address),
        gateway: or_na(gateway),
        dns: or_na(dns),
    }
}

/// Interface names in enumeration order, each with its IPv4 addresses.
type InterfaceTable = Vec<(String, Vec<Ipv4Addr>)>;

fn interface_addresses() -> Result<InterfaceTable, SourceError> {
    let addrs = getifaddrs().map_err(|errno| SourceError::Io {
        what: "interface addresses".to_string(),
        source: io::Error::from(errno),
    })?;

    let mut table: InterfaceTable = Vec::new();
    for ifaddr in addrs {
        let ipv4 = ifaddr
            .address
            .as_ref()
            .and_then(|addr| addr.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip());

        let idx = match table.iter().position(|(name, _)| *name == ifaddr.interface_name) {
            Some(idx) => idx,
            None => {
                table.push((ifaddr.interface_name.clone(), Vec::new()));
                table.len() - 1
            }
        };
        if let Some(ip) = ipv4 {
            table[idx].1.push(ip);
        }
    }
    Ok(table)
}

/// The first preferred interface that exists and carries an IPv4 address
/// wins. Otherwise the first non-loopback address on any interface is used.
fn select_address(ifaces: &InterfaceTable, preferred: &[String]) -> Option<Ipv4Addr> {
    let from_preferred = preferred.iter().find_map(|want| {
        ifaces
            .iter()
            .find(|(name, _)| name == want)
            .and_then(|(_, addrs)| addrs.first().copied())
    });

    from_preferred.or_else(|| {
        ifaces
            .iter()
            .flat_map(|(_, addrs)| addrs.iter())
            .find(|ip| !ip.is_loopback())
            .copied()
    })
}

/// Finds the first default route (destination `00000000`) with a non-zero
/// gateway. Addresses in the route table are little-endian hex.
pub fn parse_default_gateway(route_table: &str) -> Option<Ipv4Addr> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.get(1) != Some(&"00000000") {
            return None;
        }
        let raw = u32::from_str_radix(fields.get(2)?, 16).ok()?;
        let gateway = Ipv4Addr::from(raw.to_le_bytes());
        (!gateway.is_unspecified()).then_some(gateway)
    })
}

/// Every `nameserver` entry in file order. Commented-out entries are ignored.
pub fn parse_resolv_conf(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            if fields.next()? != "nameserver" {
                return None;
            }
            let addr = fields.next()?;
            (!addr.starts_with('#')).then(|| addr.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::source::tests::stub_tool;
    use crate::config::SourcesConfig;

    fn table(rows: Vec<(&str, Vec<Ipv4Addr>)>) -> InterfaceTable {
        rows.into_iter()
            .map(|(name, addrs)| (name.to_string(), addrs))
            .collect()
    }

    fn preferred() -> Vec<String> {
        SourcesConfig::default().preferred_interfaces
    }

    #[test]
    fn default_gateway_is_decoded_little_endian() {
        let route = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0001A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101080A\t0003\t0\t0\t0\t00000000\t0\t0\t0
";
        assert_eq!(parse_default_gateway(route), Some(Ipv4Addr::new(10, 8, 1, 1)));
    }

    #[test]
    fn unspecified_gateway_keeps_scanning() {
        let route = "\
Iface\tDestination\tGateway
wg0\t00000000\t00000000\t0001
wlan0\t00000000\t0101A8C0\t0003
";
        assert_eq!(
            parse_default_gateway(route),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(parse_default_gateway("Iface\tDestination\tGateway\n"), None);
    }

    #[test]
    fn resolv_conf_ignores_commented_servers() {
        let text = "# Generated by NetworkManager\n# nameserver 1.1.1.1\nsearch lan\nnameserver 8.8.8.8\nnameserver 8.8.4.4\n";
        assert_eq!(parse_resolv_conf(text), vec!["8.8.8.8", "8.8.4.4"]);
        assert!(parse_resolv_conf("search lan\n").is_empty());
    }

    #[test]
    fn resolv_conf_accepts_tab_separated_entries() {
        let text = "nameserver\t1.1.1.1\n  nameserver   9.9.9.9  \nnameservers 8.8.8.8\n";
        assert_eq!(parse_resolv_conf(text), vec!["1.1.1.1", "9.9.9.9"]);
    }

    #[test]
    fn preferred_interface_wins_over_enumeration_order() {
        let ifaces = table(vec![
            ("lo", vec![Ipv4Addr::LOCALHOST]),
            ("docker0", vec![Ipv4Addr::new(172, 17, 0, 1)]),
            ("wlan0", vec![Ipv4Addr::new(192, 168, 1, 50)]),
        ]);
        assert_eq!(
            select_address(&ifaces, &preferred()),
            Some(Ipv4Addr::new(192, 168, 1, 50))
        );
    }

    #[test]
    fn preferred_interface_without_ipv4_is_passed_over() {
        let ifaces = table(vec![
            ("lo", vec![Ipv4Addr::LOCALHOST]),
            ("eth0", vec![]),
            ("docker0", vec![Ipv4Addr::new(172, 17, 0, 1)]),
            ("wlan0", vec![Ipv4Addr::new(192, 168, 1, 50)]),
        ]);
        assert_eq!(
            select_address(&ifaces, &preferred()),
            Some(Ipv4Addr::new(192, 168, 1, 50))
        );
    }

    #[test]
    fn no_preferred_address_falls_back_to_first_non_loopback() {
        let ifaces = table(vec![
            ("lo", vec![Ipv4Addr::LOCALHOST]),
            ("eth0", vec![]),
            ("docker0", vec![Ipv4Addr::new(172, 17, 0, 1)]),
            ("br0", vec![Ipv4Addr::new(10, 0, 0, 1)]),
        ]);
        assert_eq!(
            select_address(&ifaces, &preferred()),
            Some(Ipv4Addr::new(172, 17, 0, 1))
        );

        let loopback_only = table(vec![("lo", vec![Ipv4Addr::LOCALHOST])]);
        assert_eq!(select_address(&loopback_only, &preferred()), None);
    }

    #[tokio::test]
    async fn unreadable_sources_report_not_available() {
        let cfg = CollectConfig {
            sources: SourcesConfig {
                route_table_path: "/nonexistent/hostpulse/route".into(),
                resolv_conf_path: "/nonexistent/hostpulse/resolv.conf".into(),
                resolvectl: "hostpulse-missing-resolvectl".to_string(),
                ..SourcesConfig::default()
            },
            ..CollectConfig::default()
        };
        let net = collect(&cfg).await;
        assert_eq!(net.gateway, NOT_AVAILABLE);
        assert_eq!(net.dns, NOT_AVAILABLE);
        assert!(!net.ip_address.is_empty());
    }

    #[tokio::test]
    async fn empty_resolv_conf_falls_back_to_resolvectl() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolv.conf");
        std::fs::write(&resolv, "# managed elsewhere\nsearch lan\n").unwrap();
        let route = dir.path().join("route");
        std::fs::write(
            &route,
            "Iface\tDestination\tGateway\neth0\t00000000\t0101A8C0\t0003\n",
        )
        .unwrap();
        let resolvectl = stub_tool(
            dir.path(),
            "resolvectl",
            "Global\n  Current DNS Server: 9.9.9.9\n         DNS Servers: 9.9.9.9 149.112.112.112",
        );
        let cfg = CollectConfig {
            sources: SourcesConfig {
                route_table_path: route,
                resolv_conf_path: resolv,
                resolvectl,
                ..SourcesConfig::default()
            },
            ..CollectConfig::default()
        };

        let net = collect(&cfg).await;
        assert_eq!(net.dns, "9.9.9.9");
        assert_eq!(net.gateway, "192.168.1.1");
    }

    #[tokio::test]
    async fn resolv_conf_wins_over_resolvectl() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolv.conf");
        std::fs::write(&resolv, "nameserver 8.8.8.8\n").unwrap();
        let cfg = CollectConfig {
            sources: SourcesConfig {
                resolv_conf_path: resolv,
                resolvectl: stub_tool(dir.path(), "resolvectl", "DNS Servers: 9.9.9.9"),
                ..SourcesConfig::default()
            },
            ..CollectConfig::default()
        };
        assert_eq!(collect(&cfg).await.dns, "8.8.8.8");
    }
}
