//! Geolocation over an ipinfo-style HTTP API

use crate::core::{GeoInfo, GeoLocator};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Response body of `GET {endpoint}/{ip}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpInfoResponse {
    pub hostname: Option<String>,
    pub city: String,
    pub region: String,
    pub country: String,
    pub org: String,
    pub timezone: String,
    pub bogon: bool,
}

impl From<IpInfoResponse> for GeoInfo {
    fn from(resp: IpInfoResponse) -> Self {
        GeoInfo {
            hostname: resp.hostname,
            city: resp.city,
            region: resp.region,
            country: resp.country,
            org: resp.org,
            timezone: resp.timezone,
            is_private: resp.bogon,
        }
    }
}

pub struct IpInfoLocator {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl IpInfoLocator {
    pub fn new(
        endpoint: impl Into<String>,
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
            endpoint: endpoint.into(),
            token,
        })
    }

    pub fn url_for(&self, ip: IpAddr) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), ip)
    }
}

#[async_trait]
impl GeoLocator for IpInfoLocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoInfo> {
        let url = self.url_for(ip);
        debug!("GET {}", url);

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await?.error_for_status()?;
        let body: IpInfoResponse = response.json().await?;
        Ok(body.into())
    }
}
