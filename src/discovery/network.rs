//! Subnet resolution and host enumeration

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;

use ipnetwork::Ipv4Network;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Parse `a.b.c.d/nn` or a bare address (treated as /32) into its network
pub fn parse_subnet(subnet: &str) -> std::result::Result<Ipv4Network, String> {
    let subnet = subnet.trim();
    let net = if subnet.contains('/') {
        subnet
            .parse::<Ipv4Network>()
            .map_err(|e| format!("Invalid subnet {}: {}", subnet, e))?
    } else {
        let ip: Ipv4Addr = subnet
            .parse()
            .map_err(|e| format!("Invalid IP {}: {}", subnet, e))?;
        Ipv4Network::new(ip, 32).map_err(|e| e.to_string())?
    };
    Ipv4Network::new(net.network(), net.prefix()).map_err(|e| e.to_string())
}

/// Number of scannable hosts before any cap
pub fn host_count(net: Ipv4Network) -> u64 {
    let size = 1u64 << (32 - u32::from(net.prefix()));
    if net.prefix() <= 30 {
        size - 2
    } else {
        size
    }
}

/// Scannable hosts of a subnet, network/broadcast excluded for /30 and larger.
/// At most `limit`, in address order.
pub fn hosts(net: Ipv4Network, limit: usize) -> Vec<IpAddr> {
    let network = net.network();
    let broadcast = net.broadcast();
    let skip_edges = net.prefix() <= 30;

    let total = host_count(net);
    if total > limit as u64 {
        tracing::warn!(
            subnet = %net,
            limit,
            skipped = total - limit as u64,
            "Subnet exceeds host cap, scanning the first hosts only"
        );
    }

    net.iter()
        .filter(|ip| !skip_edges || (*ip != network && *ip != broadcast))
        .take(limit)
        .map(IpAddr::V4)
        .collect()
}

/// IPv4 networks of every non-loopback interface
pub async fn local_subnets() -> Result<Vec<Ipv4Network>> {
    let output = Command::new("ip")
        .args(["-o", "-4", "addr", "show"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::Discovery(format!("Failed to enumerate interfaces: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Discovery(format!(
            "Interface enumeration exited with {}",
            output.status
        )));
    }

    let subnets = parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(count = subnets.len(), "Local subnets enumerated");
    Ok(subnets)
}

/// Parse `ip -o -4 addr show` lines:
/// `2: eth0    inet 192.168.1.23/24 brd 192.168.1.255 scope global eth0 ...`
pub fn parse_ip_addr_output(output: &str) -> Vec<Ipv4Network> {
    let mut subnets: Vec<Ipv4Network> = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(interface) = fields.get(1) else {
            continue;
        };
        if interface.starts_with("lo") {
            continue;
        }
        let Some(cidr) = fields
            .iter()
            .position(|f| *f == "inet")
            .and_then(|i| fields.get(i + 1))
        else {
            continue;
        };
        let Ok(net) = parse_subnet(cidr) else {
            continue;
        };
        if net.network().is_loopback() || subnets.contains(&net) {
            continue;
        }
        subnets.push(net);
    }

    subnets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subnet_normalizes_network() {
        let net = parse_subnet("192.168.1.77/24").unwrap();
        assert_eq!(net.to_string(), "192.168.1.0/24");
        assert_eq!(parse_subnet("10.0.0.5").unwrap().to_string(), "10.0.0.5/32");
        assert!(parse_subnet("10.0.0.0/33").is_err());
        assert!(parse_subnet("camera").is_err());
    }

    #[test]
    fn test_hosts_exclude_network_and_broadcast() {
        let hosts = hosts(parse_subnet("10.0.0.0/30").unwrap(), 1024);
        assert_eq!(
            hosts,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse().unwrap()
            ]
        );
    }

    #[test]
    fn test_hosts_point_to_point_and_single() {
        assert_eq!(super::hosts(parse_subnet("10.0.0.4/31").unwrap(), 1024).len(), 2);
        assert_eq!(super::hosts(parse_subnet("10.0.0.9").unwrap(), 1024).len(), 1);
    }

    #[test]
    fn test_hosts_capped() {
        let hosts = hosts(parse_subnet("10.0.0.0/16").unwrap(), 1024);
        assert_eq!(hosts.len(), 1024);
        assert_eq!(hosts[0], "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_host_count() {
        assert_eq!(host_count(parse_subnet("10.0.0.0/16").unwrap()), 65534);
        assert_eq!(host_count(parse_subnet("10.0.0.0/30").unwrap()), 2);
        assert_eq!(host_count(parse_subnet("10.0.0.4/31").unwrap()), 2);
        assert_eq!(host_count(parse_subnet("10.0.0.9").unwrap()), 1);
        assert_eq!(host_count(parse_subnet("0.0.0.0/0").unwrap()), (1u64 << 32) - 2);
    }

    #[test]
    fn test_parse_ip_addr_output() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.1.23/24 brd 192.168.1.255 scope global dynamic eth0\\       valid_lft 86000sec
3: wlan0    inet 192.168.1.40/24 brd 192.168.1.255 scope global wlan0\\       valid_lft forever
4: docker0    inet 172.17.0.1/16 brd 172.17.255.255 scope global docker0\\       valid_lft forever
";
        let subnets: Vec<String> = parse_ip_addr_output(output)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(subnets, vec!["192.168.1.0/24", "172.17.0.0/16"]);
    }
}
