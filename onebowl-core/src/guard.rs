//! SSRF guard for user-supplied URLs.
//!
//! A URL is accepted only if its scheme is http or https and every address its
//! host resolves to is globally routable. The approved addresses travel with the
//! [`ValidatedUrl`] so the fetcher can connect to exactly those addresses.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::{Host, Url};

use crate::error::GuardError;

/// Hostname resolution, abstracted so tests can run without DNS.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a hostname to every address it maps to (both families).
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system's name service.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Fixed host table for tests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addrs`.
    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_ascii_lowercase(), addrs.to_vec());
        self
    }

    /// Number of lookups performed so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.hosts.get(&host.to_ascii_lowercase()).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown host {}", host))
        })
    }
}

/// A URL that passed the guard, with the addresses that were approved for it.
#[derive(Debug, Clone)]
pub struct ValidatedUrl {
    url: Url,
    host: String,
    addrs: Vec<IpAddr>,
}

impl ValidatedUrl {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Hostname as it appears in the URL (brackets stripped for IPv6 literals).
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    /// Approved addresses paired with the URL's effective port.
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        let port = self.url.port_or_known_default().unwrap_or(0);
        self.addrs.iter().map(|ip| SocketAddr::new(*ip, port)).collect()
    }
}

/// Validates URLs before anything is fetched from them.
#[derive(Clone)]
pub struct UrlGuard {
    resolver: Arc<dyn Resolver>,
    resolve_timeout: Duration,
    /// Non-public addresses that are nevertheless accepted.
    allowed: Vec<IpAddr>,
}

impl UrlGuard {
    pub fn new(resolver: Arc<dyn Resolver>, resolve_timeout: Duration) -> Self {
        Self {
            resolver,
            resolve_timeout,
            allowed: Vec::new(),
        }
    }

    /// Accept these exact addresses even though they fall in blocked ranges,
    /// e.g. a local proxy. Every other non-public address stays blocked.
    pub fn allow_addrs(mut self, addrs: &[IpAddr]) -> Self {
        self.allowed.extend_from_slice(addrs);
        self
    }

    /// Guard using system DNS.
    pub fn system(resolve_timeout: Duration) -> Self {
        Self::new(Arc::new(SystemResolver), resolve_timeout)
    }

    /// Parse and validate a URL string.
    pub async fn validate(&self, url: &str) -> Result<ValidatedUrl, GuardError> {
        let parsed = Url::parse(url).map_err(|e| GuardError::InvalidUrl(e.to_string()))?;
        self.validate_url(parsed).await
    }

    /// Validate an already-parsed URL (used for redirect targets).
    pub async fn validate_url(&self, url: Url) -> Result<ValidatedUrl, GuardError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(GuardError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        let (host, addrs) = match url.host() {
            None => return Err(GuardError::InvalidUrl("no hostname found".to_string())),
            Some(Host::Ipv4(ip)) => (ip.to_string(), vec![IpAddr::V4(ip)]),
            Some(Host::Ipv6(ip)) => (ip.to_string(), vec![IpAddr::V6(ip)]),
            Some(Host::Domain(domain)) => {
                if domain.is_empty() {
                    return Err(GuardError::InvalidUrl("no hostname found".to_string()));
                }
                let addrs = self.resolve(domain).await?;
                (domain.to_string(), addrs)
            }
        };

        if let Some(addr) = addrs
            .iter()
            .find(|ip| is_blocked_ip(**ip) && !self.allowed.contains(ip))
        {
            tracing::warn!(
                host = %host,
                addr = %addr,
                "blocked URL resolving to non-public address"
            );
            return Err(GuardError::BlockedNetwork { host, addr: *addr });
        }

        tracing::debug!(host = %host, addrs = ?addrs, "URL passed SSRF guard");
        Ok(ValidatedUrl { url, host, addrs })
    }

    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, GuardError> {
        let lookup = tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(host)).await;

        let addrs = match lookup {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => return Err(GuardError::ResolutionFailed(format!("{}: {}", host, e))),
            Err(_) => {
                return Err(GuardError::ResolutionFailed(format!(
                    "{}: timed out after {:?}",
                    host, self.resolve_timeout
                )))
            }
        };

        if addrs.is_empty() {
            return Err(GuardError::ResolutionFailed(format!(
                "{}: no addresses returned",
                host
            )));
        }

        Ok(addrs)
    }
}

/// True if `ip` is not a globally routable unicast address.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    o[0] == 0 // "this network", includes 0.0.0.0
        || ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_documentation()
        || (o[0] == 100 && (o[1] & 0xc0) == 64) // shared address space 100.64.0.0/10
        || (o[0] == 192 && o[1] == 0 && o[2] == 0) // IETF protocol assignments
        || (o[0] == 198 && (o[1] & 0xfe) == 18) // benchmarking 198.18.0.0/15
        || o[0] >= 240 // reserved, includes broadcast
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
        return true;
    }

    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }

    let s = ip.segments();

    // IPv4-compatible ::a.b.c.d (deprecated, still routed by some stacks)
    if s[..6].iter().all(|&seg| seg == 0) {
        return is_blocked_ipv4(embedded_ipv4(s[6], s[7]));
    }

    // NAT64 64:ff9b::/96
    if s[0] == 0x64 && s[1] == 0xff9b && s[2..6].iter().all(|&seg| seg == 0) {
        return is_blocked_ipv4(embedded_ipv4(s[6], s[7]));
    }

    // 6to4 2002::/16 carries an IPv4 address in the next 32 bits
    if s[0] == 0x2002 {
        return is_blocked_ipv4(embedded_ipv4(s[1], s[2]));
    }

    (s[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
        || (s[0] & 0xffc0) == 0xfe80 // link-local fe80::/10
        || (s[0] & 0xffc0) == 0xfec0 // site-local fec0::/10
        || (s[0] == 0x2001 && s[1] == 0x0db8) // documentation
        || (s[0] == 0x2001 && s[1] < 0x0200) // IETF protocol assignments 2001::/23
        || (s[0] == 0x0100 && s[1..4].iter().all(|&seg| seg == 0)) // discard-only 100::/64
}

fn embedded_ipv4(hi: u16, lo: u16) -> Ipv4Addr {
    Ipv4Addr::new(
        (hi >> 8) as u8,
        (hi & 0xff) as u8,
        (lo >> 8) as u8,
        (lo & 0xff) as u8,
    )
}
