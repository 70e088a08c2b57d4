//! Provides functions to turn a user supplied host into the address to probe.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use log::debug;
use tokio::fs;
use tokio::io;

use crate::error::ScanError;

/// Resolves `host` to the single address a module will talk to.
///
/// IP literals (bracketed IPv6 included) are returned as is. Names go through
/// the system resolver first and, if that fails, through a DNS resolver built
/// from `resolver` (see [`get_resolver`]). An IPv4 result is preferred when
/// the name has both families.
///
/// ```rust
/// # use lmv_modules::address::resolve_host;
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let ip = rt.block_on(resolve_host("127.0.0.1", None)).unwrap();
/// assert!(ip.is_loopback());
/// ```
pub async fn resolve_host(host: &str, resolver: Option<&str>) -> Result<IpAddr, ScanError> {
    let host = host.trim();
    if let Some(ip) = parse_ip_literal(host) {
        return Ok(ip);
    }

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ScanError::Resolution(host.to_owned()));
    }

    let addrs = resolve_ips_from_host(host, resolver).await;
    debug!("Host {host} resolved to {addrs:?}");

    pick_address(&addrs).ok_or_else(|| ScanError::Resolution(host.to_owned()))
}

fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    IpAddr::from_str(unbracketed).ok()
}

fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Uses DNS to get the IPs associated with host
async fn resolve_ips_from_host(source: &str, resolver: Option<&str>) -> Vec<IpAddr> {
    if let Ok(addrs) = tokio::net::lookup_host((source, 80)).await {
        let ips: Vec<IpAddr> = addrs.map(|x| x.ip()).collect();
        if !ips.is_empty() {
            return ips;
        }
    }

    debug!("System lookup of {source} failed, trying the backup resolver");
    let backup_resolver = get_resolver(resolver).await;
    match backup_resolver.lookup_ip(source).await {
        Ok(addrs) => addrs.iter().collect(),
        Err(e) => {
            debug!("Backup resolver could not resolve {source}: {e}");
            Vec::new()
        }
    }
}

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver (default
///       behaviour).
pub async fn get_resolver(resolver: Option<&str>) -> TokioAsyncResolver {
    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            let resolver_ips = match read_resolver_from_file(r).await {
                Ok(ips) => ips,
                Err(_) => parse_resolver_list(r),
            };
            for ip in resolver_ips {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        }
        None => TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
        }),
    }
}

fn parse_resolver_list(list: &str) -> Vec<IpAddr> {
    list.split(',')
        .filter_map(|r| IpAddr::from_str(r.trim()).ok())
        .collect()
}

/// Parses and input file of IPs for use in DNS resolution.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::{parse_resolver_list, pick_address, resolve_host};
    use crate::error::ScanError;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn literals_skip_dns() {
        assert_eq!(
            resolve_host("192.168.0.1", None).await,
            Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)))
        );
        assert_eq!(
            resolve_host("[::1]", None).await,
            Ok(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
        assert_eq!(
            resolve_host(" ::1 ", None).await,
            Ok(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let ip = resolve_host("localhost", None).await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn malformed_hosts_do_not_resolve() {
        assert_eq!(
            resolve_host("not a host", None).await,
            Err(ScanError::Resolution("not a host".to_owned()))
        );
        assert_eq!(
            resolve_host("", None).await,
            Err(ScanError::Resolution(String::new()))
        );
    }

    #[tokio::test]
    async fn reserved_invalid_tld_does_not_resolve() {
        let err = resolve_host("im-wrong.invalid", None).await.unwrap_err();
        assert!(matches!(err, ScanError::Resolution(_)));
    }

    #[test]
    fn prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert_eq!(pick_address(&[v6, v4]), Some(v4));
        assert_eq!(pick_address(&[v6]), Some(v6));
        assert_eq!(pick_address(&[]), None);
    }

    #[test]
    fn resolver_list_skips_garbage() {
        assert_eq!(
            parse_resolver_list("8.8.8.8, nope ,1.1.1.1"),
            vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))
            ]
        );
    }
}
