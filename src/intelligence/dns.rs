//! DNS lookups: forward (A / AAAA), reverse (PTR) and zone authority (SOA)

use crate::core::{ForwardResolver, ReverseResolver};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use log::debug;
use std::net::IpAddr;
use std::time::Duration;

/// Resolver backed by hickory, either against the system configuration or
/// a single explicitly configured server
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    pub fn new(server: Option<IpAddr>, timeout: Duration) -> Result<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;

        let builder = match server {
            Some(ip) => {
                let config = ResolverConfig::from_parts(
                    None,
                    Vec::new(),
                    NameServerConfigGroup::from_ips_clear(&[ip], 53, true),
                );
                TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            }
            None => TokioResolver::builder_tokio().map_err(|e| {
                ReconError::ConfigError(format!("cannot read system DNS configuration: {}", e))
            })?,
        };

        Ok(Self {
            resolver: builder.with_options(opts).build(),
        })
    }
}

fn display_name(name: impl ToString) -> String {
    let name = name.to_string();
    match name.strip_suffix('.') {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => name,
    }
}

/// Merge A and AAAA answers, IPv4 first.
///
/// A family without records is not an error as long as the other family
/// answered; only when both lookups fail is the A error reported.
pub fn merge_families(
    v4: Result<Vec<IpAddr>>,
    v6: Result<Vec<IpAddr>>,
    name: &str,
) -> Result<Vec<IpAddr>> {
    let addresses: Vec<IpAddr> = match (v4, v6) {
        (Err(e), Err(_)) => return Err(e),
        (v4, v6) => v4
            .unwrap_or_default()
            .into_iter()
            .chain(v6.unwrap_or_default())
            .collect(),
    };

    if addresses.is_empty() {
        return Err(ReconError::LookupError(format!("no A or AAAA records for {}", name)));
    }
    Ok(addresses)
}

#[async_trait]
impl ForwardResolver for DnsResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        let (v4, v6) = tokio::join!(
            self.resolver.ipv4_lookup(name),
            self.resolver.ipv6_lookup(name)
        );

        let v4 = v4
            .map(|lookup| lookup.iter().map(|a| IpAddr::V4(a.0)).collect())
            .map_err(ReconError::from);
        let v6 = v6
            .map(|lookup| lookup.iter().map(|aaaa| IpAddr::V6(aaaa.0)).collect())
            .map_err(ReconError::from);
        if let Err(e) = &v6 {
            debug!("AAAA lookup for {} failed: {}", name, e);
        }

        merge_families(v4, v6, name)
    }

    async fn authority(&self, name: &str) -> Result<String> {
        let lookup = self.resolver.soa_lookup(name).await?;
        lookup
            .iter()
            .next()
            .map(|soa| display_name(soa.mname()))
            .ok_or_else(|| ReconError::LookupError(format!("SOA record not found for {}", name)))
    }
}

#[async_trait]
impl ReverseResolver for DnsResolver {
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>> {
        let lookup = self.resolver.reverse_lookup(ip).await?;
        let names: Vec<String> = lookup.iter().map(display_name).collect();
        if names.is_empty() {
            return Err(ReconError::LookupError("ptr record not found".to_string()));
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_merge_keeps_ipv4_first() {
        let merged = merge_families(
            Ok(ips(&["192.0.2.1", "192.0.2.2"])),
            Ok(ips(&["2001:db8::1"])),
            "example.com",
        )
        .unwrap();
        assert_eq!(merged, ips(&["192.0.2.1", "192.0.2.2", "2001:db8::1"]));
    }

    #[test]
    fn test_merge_tolerates_one_missing_family() {
        let merged = merge_families(
            Err(ReconError::LookupError("no records".into())),
            Ok(ips(&["2001:db8::1"])),
            "v6only.example",
        )
        .unwrap();
        assert_eq!(merged, ips(&["2001:db8::1"]));
    }

    #[test]
    fn test_merge_reports_a_error_when_both_fail() {
        let err = merge_families(
            Err(ReconError::LookupError("NXDOMAIN".into())),
            Err(ReconError::LookupError("other".into())),
            "missing.example",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "lookup failed: NXDOMAIN");
    }

    #[test]
    fn test_merge_empty_is_error() {
        assert!(merge_families(Ok(Vec::new()), Ok(Vec::new()), "empty.example").is_err());
    }

    #[test]
    fn test_display_name_trims_root() {
        assert_eq!(display_name("dns.google."), "dns.google");
        assert_eq!(display_name("."), ".");
    }
}
