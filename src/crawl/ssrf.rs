//! Pre-fetch SSRF validation
//!
//! Every outbound request URL passes through `SsrfGuard::validate` before
//! the first request and again after each redirect hop. Validation fails
//! fast, in order: parse, protocol allow-list, hostname block-list, literal
//! IP range checks, then DNS resolution with a blocked-range check on every
//! resolved address (DNS-rebinding defense).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use tokio::net::lookup_host;
use url::{Host, Url};

/// Hostnames that are always refused, regardless of what they resolve to.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
];

/// The IPv4 cloud metadata endpoint.
const METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// The IPv6 EC2 metadata endpoint (fd00:ec2::254).
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Why a URL was refused by the guard.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SsrfBlock {
    #[error("URL could not be parsed: {0}")]
    Unparseable(String),
    #[error("protocol '{0}' is not in the allow-list")]
    ProtocolDenied(String),
    #[error("URL has no host")]
    NoHost,
    #[error("hostname '{0}' is blocked")]
    HostnameBlocked(String),
    #[error("address {0} is in a blocked range ({1})")]
    AddressBlocked(IpAddr, &'static str),
    #[error("DNS resolution failed for '{0}': {1}")]
    DnsFailed(String, String),
}

/// A validated fetch target: the URL's host together with the addresses it
/// resolved to (empty for literal-IP hosts, which need no resolution).
#[derive(Debug, Clone)]
pub struct SafeTarget {
    pub host: String,
    pub addresses: Vec<IpAddr>,
}

/// Name of the blocked range containing `ip`, or `None` when the address is
/// publicly routable.
fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => {
            if v4 == METADATA_V4 {
                Some("cloud metadata")
            } else if v4.is_loopback() {
                Some("loopback 127.0.0.0/8")
            } else if v4.is_private() {
                Some("private (RFC 1918)")
            } else if v4.is_link_local() {
                Some("link-local 169.254.0.0/16")
            } else if v4.octets()[0] == 0 {
                Some("current network 0.0.0.0/8")
            } else if v4.is_broadcast() {
                Some("broadcast")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            if v6 == METADATA_V6 {
                Some("cloud metadata")
            } else if v6.is_loopback() {
                Some("loopback ::1")
            } else if v6.is_unspecified() {
                Some("unspecified ::")
            } else if (v6.segments()[0] & 0xfe00) == 0xfc00 {
                Some("unique-local fc00::/7")
            } else if (v6.segments()[0] & 0xffc0) == 0xfe80 {
                Some("link-local fe80::/10")
            } else if let Some(mapped) = v6.to_ipv4_mapped() {
                blocked_range(IpAddr::V4(mapped))
            } else {
                None
            }
        }
    }
}

/// SSRF guard with a configurable protocol allow-list.
#[derive(Debug, Clone)]
pub struct SsrfGuard {
    allowed_protocols: Vec<String>,
}

impl SsrfGuard {
    pub fn new(allowed_protocols: Vec<String>) -> Self {
        Self { allowed_protocols }
    }

    /// Validate a URL for outbound fetching. Resolves A/AAAA records via the
    /// system resolver for hostname targets and rejects if ANY resolved
    /// address falls in a blocked range.
    pub async fn validate(&self, url: &Url) -> Result<SafeTarget, SsrfBlock> {
        let scheme = url.scheme().to_ascii_lowercase();
        if !self.allowed_protocols.iter().any(|p| p == &scheme) {
            return Err(SsrfBlock::ProtocolDenied(scheme));
        }

        let host = url.host().ok_or(SsrfBlock::NoHost)?;

        match host {
            Host::Ipv4(ip) => {
                let addr = IpAddr::V4(ip);
                if let Some(range) = blocked_range(addr) {
                    return Err(SsrfBlock::AddressBlocked(addr, range));
                }
                Ok(SafeTarget {
                    host: ip.to_string(),
                    addresses: vec![addr],
                })
            }
            Host::Ipv6(ip) => {
                let addr = IpAddr::V6(ip);
                if let Some(range) = blocked_range(addr) {
                    return Err(SsrfBlock::AddressBlocked(addr, range));
                }
                Ok(SafeTarget {
                    host: ip.to_string(),
                    addresses: vec![addr],
                })
            }
            Host::Domain(name) => {
                let name = name.to_ascii_lowercase();
                if BLOCKED_HOSTNAMES.contains(&name.as_str()) {
                    return Err(SsrfBlock::HostnameBlocked(name));
                }

                let port = url.port_or_known_default().unwrap_or(80);
                let addrs = lookup_host((name.as_str(), port))
                    .await
                    .map_err(|e| SsrfBlock::DnsFailed(name.clone(), e.to_string()))?;

                let resolved: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                if resolved.is_empty() {
                    return Err(SsrfBlock::DnsFailed(
                        name,
                        "no addresses returned".to_string(),
                    ));
                }

                for addr in &resolved {
                    if let Some(range) = blocked_range(*addr) {
                        return Err(SsrfBlock::AddressBlocked(*addr, range));
                    }
                }

                Ok(SafeTarget {
                    host: name,
                    addresses: resolved,
                })
            }
        }
    }

    /// Parse-then-validate convenience for string URLs.
    pub async fn validate_str(&self, url: &str) -> Result<SafeTarget, SsrfBlock> {
        let parsed =
            Url::parse(url).map_err(|e| SsrfBlock::Unparseable(format!("{}: {}", url, e)))?;
        self.validate(&parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SsrfGuard {
        SsrfGuard::new(vec!["http".to_string(), "https".to_string()])
    }

    #[tokio::test]
    async fn test_protocol_allow_list() {
        let g = guard();
        let err = g.validate_str("ftp://example.com/file").await.unwrap_err();
        assert_eq!(err, SsrfBlock::ProtocolDenied("ftp".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_hostnames() {
        let g = guard();
        assert!(matches!(
            g.validate_str("http://localhost/admin").await.unwrap_err(),
            SsrfBlock::HostnameBlocked(_)
        ));
        assert!(matches!(
            g.validate_str("http://metadata.google.internal/computeMetadata")
                .await
                .unwrap_err(),
            SsrfBlock::HostnameBlocked(_)
        ));
    }

    #[tokio::test]
    async fn test_literal_ipv4_ranges() {
        let g = guard();
        for blocked in [
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://172.16.0.9/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://0.0.0.12/",
            "http://255.255.255.255/",
        ] {
            assert!(
                matches!(
                    g.validate_str(blocked).await.unwrap_err(),
                    SsrfBlock::AddressBlocked(_, _)
                ),
                "expected {} to be blocked",
                blocked
            );
        }
    }

    #[tokio::test]
    async fn test_literal_ipv6_metadata() {
        let g = guard();
        let err = g.validate_str("http://[fd00:ec2::254]/").await.unwrap_err();
        assert!(matches!(err, SsrfBlock::AddressBlocked(_, _)));
        let err = g.validate_str("http://[::1]/").await.unwrap_err();
        assert!(matches!(err, SsrfBlock::AddressBlocked(_, _)));
    }

    #[tokio::test]
    async fn test_public_literal_passes() {
        let g = guard();
        let target = g.validate_str("https://93.184.216.34/").await.unwrap();
        assert_eq!(target.addresses.len(), 1);
    }

    #[test]
    fn test_blocked_range_table() {
        assert!(blocked_range(IpAddr::V4(Ipv4Addr::new(172, 31, 255, 255))).is_some());
        assert!(blocked_range(IpAddr::V4(Ipv4Addr::new(172, 32, 0, 1))).is_none());
        assert!(blocked_range(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))).is_none());
        // IPv4-mapped IPv6 addresses inherit the IPv4 verdict
        let mapped: Ipv6Addr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(blocked_range(IpAddr::V6(mapped)).is_some());
    }
}
