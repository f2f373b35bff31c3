//! Scanner module: report types, the echo statistics engine and the probe
//! orchestrator

pub mod echo;
pub mod engine;

use crate::core::{GeoInfo, PortScanReport, ThreatReport};
use crate::error::ReconError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub use echo::{EchoEngine, EchoStep, EchoSummary};
pub use engine::{Collaborators, ProbeSettings, ReconEngine};

/// The five probes run against every address, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Icmp,
    ReverseDns,
    Geolocation,
    PortScan,
    ThreatIntel,
}

impl ProbeKind {
    /// Fixed slot order of an [`AddressReport`]
    pub const ALL: [ProbeKind; 5] = [
        ProbeKind::Icmp,
        ProbeKind::ReverseDns,
        ProbeKind::Geolocation,
        ProbeKind::PortScan,
        ProbeKind::ThreatIntel,
    ];

    pub fn slot(&self) -> usize {
        match self {
            ProbeKind::Icmp => 0,
            ProbeKind::ReverseDns => 1,
            ProbeKind::Geolocation => 2,
            ProbeKind::PortScan => 3,
            ProbeKind::ThreatIntel => 4,
        }
    }

    /// Probe identifier used in reports
    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::Icmp => "ping",
            ProbeKind::ReverseDns => "ptr",
            ProbeKind::Geolocation => "geo",
            ProbeKind::PortScan => "portscan",
            ProbeKind::ThreatIntel => "threatintel",
        }
    }
}

/// Identifier of the forward resolution outcome in a [`DomainReport`]
pub const RESOLUTION_PROBE: &str = "dig";
/// Identifier of the SOA outcome in a [`DomainReport`]
pub const AUTHORITY_PROBE: &str = "soa";

/// Typed payload behind a successful outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProbeDetail {
    Echo(EchoSummary),
    Names(Vec<String>),
    Addresses(Vec<IpAddr>),
    Geo(GeoInfo),
    Ports(PortScanReport),
    Threat(ThreatReport),
}

/// Result of one probe against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub name: String,
    pub succeeded: bool,
    /// Human readable payload, or the error text on failure
    pub value: String,
    pub raw_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProbeDetail>,
}

impl ProbeOutcome {
    pub fn success(name: impl Into<String>, value: impl Into<String>, detail: ProbeDetail) -> Self {
        Self {
            name: name.into(),
            succeeded: true,
            value: value.into(),
            raw_error: None,
            detail: Some(detail),
        }
    }

    pub fn failure(name: impl Into<String>, error: &ReconError) -> Self {
        Self {
            name: name.into(),
            succeeded: false,
            value: error.to_string(),
            raw_error: Some(error.detail()),
            detail: None,
        }
    }
}

/// The five probe outcomes for one address, in [`ProbeKind::ALL`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressReport {
    pub address: IpAddr,
    pub outcomes: [ProbeOutcome; 5],
}

impl AddressReport {
    pub fn outcome(&self, kind: ProbeKind) -> &ProbeOutcome {
        &self.outcomes[kind.slot()]
    }

    /// Report whose every slot carries the same error
    pub fn failed(address: IpAddr, error: &ReconError) -> Self {
        Self {
            address,
            outcomes: ProbeKind::ALL.map(|kind| ProbeOutcome::failure(kind.name(), error)),
        }
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.succeeded).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainReport {
    pub name: String,
    pub resolution: ProbeOutcome,
    pub authority: ProbeOutcome,
    pub resolved_addresses: Vec<IpAddr>,
    /// One report per entry of `resolved_addresses`, same index
    pub per_address: Vec<AddressReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Report {
    Domain(DomainReport),
    Address(AddressReport),
}

impl Report {
    /// Address-level reports contained in this report, in order
    pub fn address_reports(&self) -> Vec<&AddressReport> {
        match self {
            Report::Domain(domain) => domain.per_address.iter().collect(),
            Report::Address(address) => vec![address],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_all_order() {
        for (index, kind) in ProbeKind::ALL.iter().enumerate() {
            assert_eq!(kind.slot(), index);
        }
    }

    #[test]
    fn test_failed_report_keeps_slot_names() {
        let report = AddressReport::failed("192.0.2.1".parse().unwrap(), &ReconError::Cancelled);
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "ptr", "geo", "portscan", "threatintel"]);
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.outcome(ProbeKind::Geolocation).value, "cancelled");
    }

    #[test]
    fn test_outcome_failure_fields() {
        let err = ReconError::TransportError {
            message: "ping exit status: 2".to_string(),
            diagnostic: Some("ping: sendmsg: Network is unreachable".to_string()),
        };
        let outcome = ProbeOutcome::failure("ping", &err);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.value, "echo transport error: ping exit status: 2");
        assert_eq!(
            outcome.raw_error.as_deref(),
            Some("ping: sendmsg: Network is unreachable")
        );
    }
}
