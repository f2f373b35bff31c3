// Argus collaborator trait system
// Every external diagnostic source is consumed through one of these traits

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Geolocation data for one address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub hostname: Option<String>,
    pub city: String,
    pub region: String,
    pub country: String,
    pub org: String,
    pub timezone: String,
    /// Address belongs to a private or reserved range
    pub is_private: bool,
}

impl GeoInfo {
    pub fn summary(&self) -> String {
        if self.is_private {
            return "private or reserved address range".to_string();
        }
        format!(
            "city: {}, region: {}\norg: {}",
            self.city, self.region, self.org
        )
    }
}

/// One port reported by a port scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub id: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortScanReport {
    pub warnings: Vec<String>,
    pub ports: Vec<PortEntry>,
}

impl PortScanReport {
    pub fn summary(&self) -> String {
        let mut lines = self.warnings.clone();
        lines.extend(self.ports.iter().map(|port| {
            format!("{}/{} {} {}", port.id, port.protocol, port.state, port.service)
        }));
        lines.join("\n")
    }
}

/// A service exposed by an address, as seen by a threat intelligence source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedService {
    pub id: u16,
    pub protocol: String,
    #[serde(default)]
    pub tls_versions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub external_link: Option<String>,
    pub services: Vec<ExposedService>,
}

impl ThreatReport {
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .services
            .iter()
            .map(|service| format!("{}/{}", service.id, service.protocol))
            .collect();
        if let Some(link) = &self.external_link {
            lines.push(link.clone());
        }
        lines.join("\n")
    }
}

/// What an echo transport hands back for one successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoReply {
    /// Transport measured the reply itself
    Measured {
        rtt: Duration,
        hop_count: Option<u32>,
    },
    /// Free text from an external ping utility, still to be parsed
    Text(String),
}

/// Forward name resolution
#[async_trait]
pub trait ForwardResolver: Send + Sync {
    /// Resolve a name to its addresses, IPv4 first
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>>;

    /// Primary name server from the zone's SOA record
    async fn authority(&self, name: &str) -> Result<String>;
}

/// Reverse (PTR) name resolution
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>>;
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<GeoInfo>;
}

#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, ip: IpAddr) -> Result<PortScanReport>;
}

#[async_trait]
pub trait ThreatIntel: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<ThreatReport>;
}

/// Sends exactly one echo probe
#[async_trait]
pub trait EchoTransport: Send + Sync {
    async fn echo_once(&self, ip: IpAddr, timeout: Duration) -> Result<EchoReply>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_scan_summary() {
        let report = PortScanReport {
            warnings: vec!["Host seems down".to_string()],
            ports: vec![
                PortEntry {
                    id: 22,
                    protocol: "tcp".to_string(),
                    state: "open".to_string(),
                    service: "ssh".to_string(),
                },
                PortEntry {
                    id: 443,
                    protocol: "tcp".to_string(),
                    state: "filtered".to_string(),
                    service: "https".to_string(),
                },
            ],
        };
        assert_eq!(
            report.summary(),
            "Host seems down\n22/tcp open ssh\n443/tcp filtered https"
        );
    }

    #[test]
    fn test_threat_summary_with_link() {
        let report = ThreatReport {
            external_link: Some("https://www.shodan.io/host/192.0.2.1".to_string()),
            services: vec![ExposedService {
                id: 80,
                protocol: "tcp".to_string(),
                tls_versions: Vec::new(),
            }],
        };
        assert_eq!(report.summary(), "80/tcp\nhttps://www.shodan.io/host/192.0.2.1");
    }

    #[test]
    fn test_geo_summary() {
        let geo = GeoInfo {
            city: "Tokyo".to_string(),
            region: "Tokyo".to_string(),
            org: "AS2497 Internet Initiative Japan Inc.".to_string(),
            ..Default::default()
        };
        assert_eq!(
            geo.summary(),
            "city: Tokyo, region: Tokyo\norg: AS2497 Internet Initiative Japan Inc."
        );

        let private = GeoInfo {
            is_private: true,
            ..Default::default()
        };
        assert_eq!(private.summary(), "private or reserved address range");
    }
}
