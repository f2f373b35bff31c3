//! Configuration module for argus
//!
//! Loaded from a TOML file; every section and key is optional.
//!
//! ```toml
//! [dns]
//! server = "1.1.1.1"
//!
//! [threat_intel]
//! token = "..."
//!
//! [echo]
//! count = 10
//! interval_ms = 100
//! transport = "system"
//! ```

use crate::error::ReconError;
use crate::network::TransportKind;
use crate::scanner::ProbeSettings;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override file settings
pub const ENV_DNS_SERVER: &str = "ARGUS_DNS_SERVER";
pub const ENV_IPINFO_TOKEN: &str = "ARGUS_IPINFO_TOKEN";
pub const ENV_SHODAN_TOKEN: &str = "ARGUS_SHODAN_TOKEN";

/// Upper bound for `echo.interval_ms`
pub const MAX_ECHO_INTERVAL_MS: u64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub dns: DnsConfig,
    pub geo: GeoConfig,
    pub threat_intel: ThreatIntelConfig,
    pub port_scan: PortScanConfig,
    pub echo: EchoConfig,
    pub probes: ProbeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Explicit DNS server; the system resolver configuration when unset
    pub server: Option<IpAddr>,
    pub timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            server: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ipinfo.io".to_string(),
            token: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatIntelConfig {
    pub api_endpoint: String,
    /// Base URL of the public per-host page
    pub host_page: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ThreatIntelConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.shodan.io".to_string(),
            host_page: "https://www.shodan.io/host".to_string(),
            token: None,
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortScanConfig {
    pub nmap_path: String,
    pub extra_args: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            extra_args: Vec::new(),
            timeout_ms: 80_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub count: usize,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub transport: TransportKind,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            count: 10,
            interval_ms: 100,
            timeout_ms: 1_000,
            transport: TransportKind::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound for any single probe
    pub timeout_ms: u64,
    /// Upper bound for an address-level probe set
    pub join_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 90_000,
            join_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl ReconConfig {
    /// `<config dir>/argus/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("argus").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| ReconError::ConfigError(format!("invalid config: {}", e)))
    }

    /// Load from an explicit path, or from the default path when it exists.
    /// A missing default file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => {
                    debug!("Loading configuration from {}", path.display());
                    Self::from_file(path)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    /// Apply `ARGUS_*` environment overrides
    pub fn apply_env(mut self) -> crate::Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup(ENV_DNS_SERVER).filter(|v| !v.is_empty()) {
            let ip = server.parse().map_err(|_| {
                ReconError::ConfigError(format!(
                    "{} is not an IP address: {}",
                    ENV_DNS_SERVER, server
                ))
            })?;
            self.dns.server = Some(ip);
        }
        if let Some(token) = lookup(ENV_IPINFO_TOKEN).filter(|v| !v.is_empty()) {
            self.geo.token = Some(token);
        }
        if let Some(token) = lookup(ENV_SHODAN_TOKEN).filter(|v| !v.is_empty()) {
            self.threat_intel.token = Some(token);
        }
        Ok(())
    }

    /// Timing settings for the probe orchestrator
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            echo_count: self.echo.count,
            echo_interval: Duration::from_millis(self.echo.interval_ms),
            echo_timeout: Duration::from_millis(self.echo.timeout_ms),
            probe_timeout: Duration::from_millis(self.probes.timeout_ms),
            join_timeout: Duration::from_millis(self.probes.join_timeout_ms),
        }
    }
}

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Human readable problems with `config`; empty when valid
    pub fn validate(config: &ReconConfig) -> Vec<String> {
        let mut errors = Vec::new();

        if config.echo.timeout_ms == 0 {
            errors.push("echo.timeout_ms must be greater than 0".to_string());
        }
        if config.echo.count > 1000 {
            errors.push("echo.count is too high (max 1000)".to_string());
        }
        if config.echo.interval_ms > MAX_ECHO_INTERVAL_MS {
            errors.push(format!(
                "echo.interval_ms is too high (max {})",
                MAX_ECHO_INTERVAL_MS
            ));
        }
        if config.probes.timeout_ms == 0 {
            errors.push("probes.timeout_ms must be greater than 0".to_string());
        }
        if Self::launch_span_ms(config) > config.probes.timeout_ms {
            errors.push(
                "echo.count * echo.interval_ms must not exceed probes.timeout_ms".to_string(),
            );
        }
        if config.probes.join_timeout_ms < config.probes.timeout_ms {
            errors.push(
                "probes.join_timeout_ms must not be shorter than probes.timeout_ms".to_string(),
            );
        }
        if config.port_scan.nmap_path.trim().is_empty() {
            errors.push("port_scan.nmap_path cannot be empty".to_string());
        }
        if config.geo.endpoint.trim().is_empty() {
            errors.push("geo.endpoint cannot be empty".to_string());
        }

        errors
    }

    /// Non fatal observations about `config`
    pub fn warnings(config: &ReconConfig) -> Vec<String> {
        let mut warnings = Vec::new();

        if config.threat_intel.token.is_none() {
            warnings.push(format!(
                "No threat intel token configured; set threat_intel.token or {}",
                ENV_SHODAN_TOKEN
            ));
        }
        if config.echo.transport.requires_raw_socket()
            && !crate::network::RawIcmpTransport::is_privileged()
        {
            warnings.push("Raw echo transport selected without root privileges".to_string());
        }
        let echo_span = Self::launch_span_ms(config).saturating_add(config.echo.timeout_ms);
        if echo_span > config.probes.timeout_ms {
            warnings.push("Echo measurement may exceed probes.timeout_ms".to_string());
        }

        warnings
    }

    /// Time between the first and the last echo launch
    fn launch_span_ms(config: &ReconConfig) -> u64 {
        let count = u64::try_from(config.echo.count).unwrap_or(u64::MAX);
        config.echo.interval_ms.saturating_mul(count)
    }
}
