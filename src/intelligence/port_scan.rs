//! Port scanning through an external nmap process
//!
//! nmap is asked for an XML report on stdout (`-oX -`), which is read with
//! quick-xml's serde support. Lines nmap prints on stderr are kept as
//! warnings.

use crate::core::{PortEntry, PortScanReport, PortScanner};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// nmap specific configuration
#[derive(Debug, Clone)]
pub struct NmapConfig {
    /// Path to nmap binary
    pub nmap_path: String,
    /// Arguments added before the target
    pub extra_args: Vec<String>,
    /// Maximum execution time for nmap
    pub timeout: Duration,
}

impl Default for NmapConfig {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(80),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    #[serde(rename = "address", default)]
    addresses: Vec<NmapAddress>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
}

#[derive(Debug, Default, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    id: u16,
    state: NmapState,
    #[serde(default)]
    service: Option<NmapService>,
}

#[derive(Debug, Deserialize)]
struct NmapState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct NmapService {
    #[serde(rename = "@name")]
    name: String,
}

/// Extract the ports of `target` from an nmap XML report.
///
/// Only the host whose first address matches the target is considered.
pub fn parse_nmap_xml(xml: &str, target: IpAddr) -> Result<Vec<PortEntry>> {
    let run: NmapRun = quick_xml::de::from_str(xml)
        .map_err(|e| ReconError::ScanError(format!("invalid nmap XML: {}", e)))?;

    let wanted = target.to_string();
    let ports = run
        .hosts
        .into_iter()
        .filter(|host| host.addresses.first().map(|a| a.addr == wanted).unwrap_or(false))
        .flat_map(|host| host.ports.unwrap_or_default().ports)
        .map(|port| PortEntry {
            id: port.id,
            protocol: port.protocol,
            state: port.state.state,
            service: port.service.map(|s| s.name).unwrap_or_default(),
        })
        .collect();

    Ok(ports)
}

fn warnings_from(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Port scanner that shells out to nmap
pub struct NmapScanner {
    config: NmapConfig,
}

impl NmapScanner {
    pub fn new(config: NmapConfig) -> Self {
        Self { config }
    }

    /// Arguments for scanning `target`: skip host discovery, XML to stdout
    pub fn arguments(&self, target: IpAddr) -> Vec<String> {
        let mut args = vec!["-Pn".to_string(), "-oX".to_string(), "-".to_string()];
        if target.is_ipv6() {
            args.push("-6".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(target.to_string());
        args
    }
}

#[async_trait]
impl PortScanner for NmapScanner {
    async fn scan(&self, ip: IpAddr) -> Result<PortScanReport> {
        let args = self.arguments(ip);
        debug!("Executing nmap with args: {:?}", args);

        let run = Command::new(&self.config.nmap_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.config.timeout, run)
            .await
            .map_err(|_| {
                ReconError::ScanError(format!("nmap timed out after {:?}", self.config.timeout))
            })?
            .map_err(|e| ReconError::ScanError(format!("failed to execute nmap: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let detail = stderr.trim();
            return Err(ReconError::ScanError(if detail.is_empty() {
                format!("nmap {}", output.status)
            } else {
                detail.to_string()
            }));
        }

        let ports = parse_nmap_xml(&String::from_utf8_lossy(&output.stdout), ip)?;
        info!("nmap reported {} ports for {}", ports.len(), ip);
        Ok(PortScanReport {
            warnings: warnings_from(&stderr),
            ports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -Pn -oX - 192.0.2.1" start="1700000000" version="7.94">
<scaninfo type="syn" protocol="tcp" numservices="1000" services="1-1000"/>
<verbose level="0"/>
<debugging level="0"/>
<host starttime="1700000000" endtime="1700000005">
<status state="up" reason="user-set" reason_ttl="0"/>
<address addr="192.0.2.1" addrtype="ipv4"/>
<hostnames><hostname name="host.example" type="PTR"/></hostnames>
<ports>
<extraports state="closed" count="997"><extrareasons reason="reset" count="997"/></extraports>
<port protocol="tcp" portid="22"><state state="open" reason="syn-ack" reason_ttl="57"/>
<service name="ssh" method="table" conf="3"/></port>
<port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="57"/>
<service name="http" method="table" conf="3"/></port>
<port protocol="tcp" portid="9999">
<state state="filtered" reason="no-response" reason_ttl="0"/></port>
</ports>
<times srtt="1000" rttvar="500" to="100000"/>
</host>
<runstats><finished time="1700000005" elapsed="5.00"/><hosts up="1" down="0" total="1"/></runstats>
</nmaprun>
"#;

    #[test]
    fn test_parse_ports_of_target() {
        let ports = parse_nmap_xml(REPORT, "192.0.2.1".parse().unwrap()).unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(
            ports[0],
            PortEntry {
                id: 22,
                protocol: "tcp".to_string(),
                state: "open".to_string(),
                service: "ssh".to_string(),
            }
        );
        assert_eq!(ports[2].state, "filtered");
        assert_eq!(ports[2].service, "");
    }

    #[test]
    fn test_other_hosts_ignored() {
        let ports = parse_nmap_xml(REPORT, "192.0.2.99".parse().unwrap()).unwrap();
        assert!(ports.is_empty());
    }

    #[test]
    fn test_host_without_ports() {
        let xml = r#"<nmaprun><host><address addr="192.0.2.5" addrtype="ipv4"/></host></nmaprun>"#;
        assert!(parse_nmap_xml(xml, "192.0.2.5".parse().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_xml() {
        assert!(matches!(
            parse_nmap_xml("<nmaprun><host>", "192.0.2.1".parse().unwrap()),
            Err(ReconError::ScanError(_))
        ));
    }

    #[test]
    fn test_arguments() {
        let scanner = NmapScanner::new(NmapConfig::default());
        assert_eq!(
            scanner.arguments("192.0.2.1".parse().unwrap()),
            vec!["-Pn", "-oX", "-", "192.0.2.1"]
        );
        assert!(scanner
            .arguments("2001:db8::1".parse().unwrap())
            .contains(&"-6".to_string()));
    }

    #[test]
    fn test_warnings_from_stderr() {
        let warnings =
            warnings_from("WARNING: No targets were specified\n\n  RTTVAR has grown  \n");
        assert_eq!(
            warnings,
            vec!["WARNING: No targets were specified", "RTTVAR has grown"]
        );
    }
}
