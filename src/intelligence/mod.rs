//! Intelligence sources consulted for every target
//!
//! Each source implements one of the collaborator traits from
//! [`crate::core`]; [`build_collaborators`] wires them up from configuration.

pub mod dns;
pub mod geo;
pub mod port_scan;
pub mod threat;

pub use dns::DnsResolver;
pub use geo::IpInfoLocator;
pub use port_scan::{parse_nmap_xml, NmapConfig, NmapScanner};
pub use threat::ShodanClient;

use crate::config::ReconConfig;
use crate::scanner::Collaborators;
use crate::Result;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Build the production collaborators described by `config`
pub fn build_collaborators(config: &ReconConfig) -> Result<Collaborators> {
    let dns = Arc::new(DnsResolver::new(
        config.dns.server,
        Duration::from_millis(config.dns.timeout_ms),
    )?);

    let geo = IpInfoLocator::new(
        config.geo.endpoint.clone(),
        config.geo.token.clone(),
        Duration::from_millis(config.geo.timeout_ms),
    )?;

    let ports = NmapScanner::new(NmapConfig {
        nmap_path: config.port_scan.nmap_path.clone(),
        extra_args: config.port_scan.extra_args.clone(),
        timeout: Duration::from_millis(config.port_scan.timeout_ms),
    });

    let threat = ShodanClient::new(
        config.threat_intel.api_endpoint.clone(),
        config.threat_intel.host_page.clone(),
        config.threat_intel.token.clone(),
        Duration::from_millis(config.threat_intel.timeout_ms),
    )?;

    let echo = config.echo.transport.build();
    debug!("Echo transport: {}", echo.name());

    Ok(Collaborators {
        forward: dns.clone(),
        reverse: dns,
        geo: Arc::new(geo),
        ports: Arc::new(ports),
        threat: Arc::new(threat),
        echo,
    })
}
