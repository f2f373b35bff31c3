//! Threat intelligence over the Shodan host API

use crate::core::{ExposedService, ThreatIntel, ThreatReport};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostResponse {
    #[serde(default)]
    pub data: Vec<ServiceBanner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceBanner {
    pub port: u16,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub ssl: Option<TlsInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsInfo {
    #[serde(default)]
    pub versions: Vec<String>,
}

fn default_transport() -> String {
    "tcp".to_string()
}

impl From<ServiceBanner> for ExposedService {
    fn from(banner: ServiceBanner) -> Self {
        ExposedService {
            id: banner.port,
            protocol: banner.transport,
            tls_versions: banner.ssl.map(|ssl| ssl.versions).unwrap_or_default(),
        }
    }
}

pub struct ShodanClient {
    client: reqwest::Client,
    api_endpoint: String,
    host_page: String,
    token: Option<String>,
}

impl ShodanClient {
    pub fn new(
        api_endpoint: impl Into<String>,
        host_page: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("argus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconError::ConfigError(e.to_string()))?;
        Ok(Self {
            client,
            api_endpoint: api_endpoint.into(),
            host_page: host_page.into(),
            token,
        })
    }

    pub fn host_page_url(&self, ip: IpAddr) -> String {
        format!("{}/{}", self.host_page.trim_end_matches('/'), ip)
    }

    /// The public host page is only linked when it can actually be fetched
    async fn reachable_host_page(&self, ip: IpAddr) -> Option<String> {
        let url = self.host_page_url(ip);
        match self.client.get(&url).send().await {
            Ok(_) => Some(url),
            Err(e) => {
                debug!("Host page {} unavailable: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl ThreatIntel for ShodanClient {
    async fn lookup(&self, ip: IpAddr) -> Result<ThreatReport> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| {
                ReconError::LookupError("threat intel token not configured".to_string())
            })?;

        let url = format!("{}/shodan/host/{}", self.api_endpoint.trim_end_matches('/'), ip);
        debug!("GET {}", url);
        let host: HostResponse = self
            .client
            .get(&url)
            .query(&[("key", token)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ThreatReport {
            external_link: self.reachable_host_page(ip).await,
            services: host.data.into_iter().map(ExposedService::from).collect(),
        })
    }
}
