//! NO_PROXY bypass rules.

use std::net::IpAddr;
use url::Url;

/// Parsed NO_PROXY list.
///
/// Follows curl's conventions: comma separated, `*` bypasses everything,
/// bare or dot-prefixed domains match themselves and their subdomains,
/// IP addresses and CIDR blocks match numerically.
#[derive(Debug, Clone, Default)]
pub struct ProxyMatcher {
    everything: bool,
    domains: Vec<String>,
    networks: Vec<(IpAddr, u8)>,
}

impl ProxyMatcher {
    pub fn from_env() -> Self {
        std::env::var("NO_PROXY")
            .or_else(|_| std::env::var("no_proxy"))
            .map(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    pub fn parse(no_proxy: &str) -> Self {
        let mut matcher = Self::default();
        for rule in no_proxy.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            if rule == "*" {
                matcher.everything = true;
            } else if let Some(net) = parse_network(rule) {
                matcher.networks.push(net);
            } else {
                let domain = rule.trim_start_matches('.').to_ascii_lowercase();
                matcher.domains.push(domain);
            }
        }
        matcher
    }

    pub fn is_empty(&self) -> bool {
        !self.everything && self.domains.is_empty() && self.networks.is_empty()
    }

    pub fn bypasses(&self, host: &str) -> bool {
        if self.everything {
            return true;
        }
        let host = host.trim_start_matches('[').trim_end_matches(']');
        match host.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|&(net, prefix)| cidr_contains(net, prefix, ip)),
            Err(_) => {
                let host = host.to_ascii_lowercase();
                self.domains.iter().any(|domain| {
                    host == *domain
                        || host
                            .strip_suffix(domain.as_str())
                            .is_some_and(|rest| rest.ends_with('.'))
                })
            }
        }
    }

    pub fn bypasses_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|h| self.bypasses(h))
    }
}

fn parse_network(rule: &str) -> Option<(IpAddr, u8)> {
    match rule.split_once('/') {
        Some((ip, prefix)) => Some((ip.parse().ok()?, prefix.parse().ok()?)),
        None => {
            let ip: IpAddr = rule.trim_start_matches('[').trim_end_matches(']').parse().ok()?;
            let full = if ip.is_ipv4() { 32 } else { 128 };
            Some((ip, full))
        }
    }
}

fn cidr_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}
