//! Host name resolution for probes

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use trust_dns_resolver::{system_conf, TokioAsyncResolver};

/// Resolves host names to IP addresses.
///
/// Probes resolve exactly once per run and do not retry.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host` to every address it maps to
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system's DNS configuration
#[derive(Clone)]
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Create a resolver from the system DNS configuration
    pub fn new() -> Result<Self> {
        let (config, opts) = system_conf::read_system_conf()
            .map_err(|e| AppError::dns_resolution(format!("Failed to read system DNS config: {}", e)))?;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        })
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| AppError::dns_resolution(format!("DNS lookup failed for {}: {}", host, e)))?;

        let ips: Vec<IpAddr> = response.iter().collect();
        if ips.is_empty() {
            return Err(AppError::dns_resolution(format!("No addresses found for {}", host)));
        }
        Ok(ips)
    }
}

/// Fixed host table, for tests and pinned endpoints
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addresses`
    pub fn with_host(mut self, host: &str, addresses: Vec<IpAddr>) -> Self {
        self.entries.insert(host.to_string(), addresses);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        match self.entries.get(host) {
            Some(addresses) if !addresses.is_empty() => Ok(addresses.clone()),
            _ => Err(AppError::dns_resolution(format!("No addresses found for {}", host))),
        }
    }
}

/// First IPv4 address if any, else the first address
pub fn preferred_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
}

/// Resolve and pick the preferred address in one step
pub async fn resolve_preferred(resolver: &dyn HostResolver, host: &str) -> Result<IpAddr> {
    let addresses = resolver.resolve(host).await?;
    preferred_address(&addresses)
        .ok_or_else(|| AppError::dns_resolution(format!("No addresses found for {}", host)))
}

/// Outcome of a timed lookup, as listed by the endpoint sweep
#[derive(Debug, Clone)]
pub struct Resolution {
    pub host: String,
    pub addresses: Vec<IpAddr>,
    pub duration: Duration,
}

/// Resolve `host` and record how long the lookup took
pub async fn timed_resolve(resolver: &dyn HostResolver, host: &str) -> Result<Resolution> {
    let start = Instant::now();
    let addresses = resolver.resolve(host).await?;
    Ok(Resolution {
        host: host.to_string(),
        addresses,
        duration: start.elapsed(),
    })
}
