//! Thumbnail URLs come from archive records, so they are checked before any fetch.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use tracing::warn;

use super::MediaError;

const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Host name resolution used by the private-address check.
pub trait DnsResolver {
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, MediaError>;
}

pub struct TokioDnsResolver;

impl DnsResolver for TokioDnsResolver {
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, MediaError> {
        let addrs = tokio::time::timeout(
            DNS_LOOKUP_TIMEOUT,
            tokio::net::lookup_host(format!("{host}:{port}")),
        )
        .await
        .map_err(|_| MediaError::DnsResolution("DNS lookup timed out".to_string()))?
        .map_err(|e| MediaError::DnsResolution(e.to_string()))?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Rejects non-HTTP URLs and, unless `allow_private`, hosts that are or
/// resolve to internal addresses.
///
/// DNS may still change between this check and the connection; the
/// download re-checks the final URL after redirects.
pub async fn check_media_url(
    raw: &str,
    allow_private: bool,
    resolver: &impl DnsResolver,
) -> Result<url::Url, MediaError> {
    let parsed = validate_url_sync(raw, allow_private)?;
    if allow_private {
        return Ok(parsed);
    }

    if let Some(url::Host::Domain(domain)) = parsed.host() {
        let port = parsed
            .port()
            .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
        for ip in resolver.lookup(domain, port).await? {
            if is_private_ip(ip) {
                warn!(host = %domain, ip = %ip, "media host resolves to private IP");
                return Err(MediaError::InternalHost);
            }
        }
    }
    Ok(parsed)
}

fn validate_url_sync(raw: &str, allow_private: bool) -> Result<url::Url, MediaError> {
    let parsed = url::Url::parse(raw).map_err(|e| MediaError::InvalidUrl(format!("{raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MediaError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    }
    if !allow_private && is_blocked_host(&parsed) {
        warn!(host = ?parsed.host_str(), "blocked media fetch to internal host");
        return Err(MediaError::InternalHost);
    }
    Ok(parsed)
}

fn is_blocked_host(parsed: &url::Url) -> bool {
    match parsed.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(IpAddr::V6(v6)),
        Some(url::Host::Domain(domain)) => {
            let lower = domain.to_ascii_lowercase();
            lower == "localhost"
                || lower.ends_with(".localhost")
                || lower.ends_with(".local")
                || lower.ends_with(".internal")
                || lower.ends_with(".arpa")
        }
        None => true,
    }
}

fn is_cgn(v4: Ipv4Addr) -> bool {
    let octets = v4.octets();
    octets[0] == 100 && (64..=127).contains(&octets[1])
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
                || v4.is_broadcast()
                || is_cgn(v4)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || is_ipv6_link_local(&v6)
                || is_ipv6_unique_local(&v6)
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

fn is_ipv6_link_local(v6: &Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

fn is_ipv6_unique_local(v6: &Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}
