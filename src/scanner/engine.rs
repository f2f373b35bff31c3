//! Probe orchestrator
//!
//! Fans a target out to the five address-level probes, and for domains to
//! one probe set per resolved address. Every probe runs as its own task and
//! writes into a fixed slot, so reports come out in the same order no matter
//! which probe finishes first.

use super::echo::{EchoEngine, EchoSummary};
use super::{
    AddressReport, DomainReport, ProbeDetail, ProbeKind, ProbeOutcome, Report, AUTHORITY_PROBE,
    RESOLUTION_PROBE,
};
use crate::core::{
    EchoTransport, ForwardResolver, GeoInfo, GeoLocator, PortScanReport, PortScanner,
    ReverseResolver, ThreatIntel, ThreatReport,
};
use crate::error::ReconError;
use crate::utils::target_parser::Target;
use crate::Result;
use log::{debug, info, warn};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Extra time the domain-level join grants on top of the address-level one
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// External sources consulted for every target
#[derive(Clone)]
pub struct Collaborators {
    pub forward: Arc<dyn ForwardResolver>,
    pub reverse: Arc<dyn ReverseResolver>,
    pub geo: Arc<dyn GeoLocator>,
    pub ports: Arc<dyn PortScanner>,
    pub threat: Arc<dyn ThreatIntel>,
    pub echo: Arc<dyn EchoTransport>,
}

/// Timing knobs for an investigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Number of echo probes per address
    pub echo_count: usize,
    /// Delay between echo launches
    pub echo_interval: Duration,
    /// Wait for a single echo reply
    pub echo_timeout: Duration,
    /// Upper bound for any single probe
    pub probe_timeout: Duration,
    /// Upper bound for waiting on an address-level probe set
    pub join_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            echo_count: 10,
            echo_interval: Duration::from_millis(100),
            echo_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(90),
            join_timeout: Duration::from_secs(120),
        }
    }
}

/// Converts a collaborator result into the text and typed detail of an outcome
trait ProbePayload {
    fn summary(&self) -> String;

    fn into_detail(self) -> ProbeDetail;

    /// Detail text when a payload was produced but still counts as failure
    fn failure_detail(&self) -> Option<String> {
        None
    }
}

impl ProbePayload for EchoSummary {
    fn summary(&self) -> String {
        EchoSummary::summary(self)
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Echo(self)
    }

    fn failure_detail(&self) -> Option<String> {
        if self.total_sent > 0 && self.success_count == 0 {
            Some(self.first_error().unwrap_or("no echo replies").to_string())
        } else {
            None
        }
    }
}

impl ProbePayload for Vec<String> {
    fn summary(&self) -> String {
        self.join("\n")
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Names(self)
    }
}

impl ProbePayload for String {
    fn summary(&self) -> String {
        self.clone()
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Names(vec![self])
    }
}

impl ProbePayload for Vec<IpAddr> {
    fn summary(&self) -> String {
        self.iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Addresses(self)
    }
}

impl ProbePayload for GeoInfo {
    fn summary(&self) -> String {
        GeoInfo::summary(self)
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Geo(self)
    }
}

impl ProbePayload for PortScanReport {
    fn summary(&self) -> String {
        PortScanReport::summary(self)
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Ports(self)
    }
}

impl ProbePayload for ThreatReport {
    fn summary(&self) -> String {
        ThreatReport::summary(self)
    }

    fn into_detail(self) -> ProbeDetail {
        ProbeDetail::Threat(self)
    }
}

fn settle<T: ProbePayload>(name: &str, result: Result<T>) -> ProbeOutcome {
    match result {
        Ok(payload) => {
            let failure = payload.failure_detail();
            let mut outcome = ProbeOutcome::success(name, payload.summary(), payload.into_detail());
            if failure.is_some() {
                outcome.succeeded = false;
                outcome.raw_error = failure;
            }
            outcome
        }
        Err(e) => {
            debug!("{} probe failed: {}", name, e);
            ProbeOutcome::failure(name, &e)
        }
    }
}

/// Run `probe` under a deadline, giving up early on cancellation
async fn guarded<T, F>(cancel: &CancellationToken, deadline: Duration, probe: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconError::Cancelled),
        result = timeout(deadline, probe) => {
            result.unwrap_or(Err(ReconError::TimeoutError(deadline)))
        }
    }
}

/// Reconnaissance engine: classification result in, ordered report out
#[derive(Clone)]
pub struct ReconEngine {
    collaborators: Collaborators,
    settings: ProbeSettings,
    echo: EchoEngine,
    cancel: CancellationToken,
}

impl ReconEngine {
    pub fn new(collaborators: Collaborators, settings: ProbeSettings) -> Self {
        let cancel = CancellationToken::new();
        let echo = EchoEngine::new(Arc::clone(&collaborators.echo), settings.echo_timeout)
            .with_cancellation(cancel.clone());
        Self {
            collaborators,
            settings,
            echo,
            cancel,
        }
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.echo = self.echo.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Investigate a classified target. Never fails: every error ends up in
    /// the slot of the probe that hit it.
    pub async fn investigate(&self, target: &Target) -> Report {
        let started = std::time::Instant::now();
        info!("Investigating {} {}", target.kind(), target);

        let report = match target {
            Target::Address(ip) | Target::Network(ip) => {
                Report::Address(self.probe_address(*ip).await)
            }
            Target::Domain(name) => Report::Domain(self.investigate_domain(name).await),
        };

        info!("Finished {} in {:.2}s", target, started.elapsed().as_secs_f64());
        report
    }

    async fn investigate_domain(&self, name: &str) -> DomainReport {
        let forward = &self.collaborators.forward;
        let deadline = self.settings.probe_timeout;

        let (resolution, authority) = tokio::join!(
            guarded(&self.cancel, deadline, forward.resolve(name)),
            guarded(&self.cancel, deadline, forward.authority(name)),
        );
        let authority = settle(AUTHORITY_PROBE, authority);

        let addresses = match resolution {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("Resolution of {} failed: {}", name, e);
                return DomainReport {
                    name: name.to_string(),
                    resolution: ProbeOutcome::failure(RESOLUTION_PROBE, &e),
                    authority,
                    resolved_addresses: Vec::new(),
                    per_address: Vec::new(),
                };
            }
        };
        debug!("{} resolved to {:?}", name, addresses);

        let probe_sets: Vec<(IpAddr, JoinHandle<AddressReport>)> = addresses
            .iter()
            .map(|&ip| {
                let engine = self.clone();
                (ip, tokio::spawn(async move { engine.probe_address(ip).await }))
            })
            .collect();

        let join_deadline = Instant::now() + self.settings.join_timeout + JOIN_GRACE;
        let mut per_address = Vec::with_capacity(probe_sets.len());
        for (ip, mut handle) in probe_sets {
            let report = match timeout_at(join_deadline, &mut handle).await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => AddressReport::failed(ip, &ReconError::TaskError(e.to_string())),
                Err(_) => {
                    handle.abort();
                    AddressReport::failed(
                        ip,
                        &ReconError::TimeoutError(self.settings.join_timeout + JOIN_GRACE),
                    )
                }
            };
            per_address.push(report);
        }

        DomainReport {
            name: name.to_string(),
            resolution: settle(RESOLUTION_PROBE, Ok(addresses.clone())),
            authority,
            resolved_addresses: addresses,
            per_address,
        }
    }

    /// Run the five address-level probes concurrently and wait for all of them
    pub async fn probe_address(&self, ip: IpAddr) -> AddressReport {
        debug!(
            "Launching probe set for {} (echo via {})",
            ip,
            self.echo.transport_name()
        );

        let echo = self.echo.clone();
        let (count, interval) = (self.settings.echo_count, self.settings.echo_interval);
        let icmp = self.spawn_probe(ProbeKind::Icmp, async move {
            Ok::<_, ReconError>(echo.measure(count, interval, ip).await)
        });

        let reverse = Arc::clone(&self.collaborators.reverse);
        let ptr = self.spawn_probe(ProbeKind::ReverseDns, async move { reverse.reverse(ip).await });

        let locator = Arc::clone(&self.collaborators.geo);
        let geo = self.spawn_probe(ProbeKind::Geolocation, async move { locator.locate(ip).await });

        let scanner = Arc::clone(&self.collaborators.ports);
        let ports = self.spawn_probe(ProbeKind::PortScan, async move { scanner.scan(ip).await });

        let intel = Arc::clone(&self.collaborators.threat);
        let threat =
            self.spawn_probe(ProbeKind::ThreatIntel, async move { intel.lookup(ip).await });

        let deadline = Instant::now() + self.settings.join_timeout;
        let outcomes = [
            self.collect(ProbeKind::Icmp, icmp, deadline).await,
            self.collect(ProbeKind::ReverseDns, ptr, deadline).await,
            self.collect(ProbeKind::Geolocation, geo, deadline).await,
            self.collect(ProbeKind::PortScan, ports, deadline).await,
            self.collect(ProbeKind::ThreatIntel, threat, deadline).await,
        ];

        let report = AddressReport { address: ip, outcomes };
        debug!("{}: {}/5 probes succeeded", ip, report.success_count());
        report
    }

    fn spawn_probe<T, F>(&self, kind: ProbeKind, probe: F) -> JoinHandle<ProbeOutcome>
    where
        T: ProbePayload + Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let deadline = self.settings.probe_timeout;
        tokio::spawn(async move { settle(kind.name(), guarded(&cancel, deadline, probe).await) })
    }

    async fn collect(
        &self,
        kind: ProbeKind,
        mut handle: JoinHandle<ProbeOutcome>,
        deadline: Instant,
    ) -> ProbeOutcome {
        match timeout_at(deadline, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ProbeOutcome::failure(kind.name(), &ReconError::TaskError(e.to_string())),
            Err(_) => {
                handle.abort();
                ProbeOutcome::failure(
                    kind.name(),
                    &ReconError::TimeoutError(self.settings.join_timeout),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::EchoStep;

    #[test]
    fn test_settle_success() {
        let outcome = settle("ptr", Ok(vec!["a.example.".to_string(), "b.example.".to_string()]));
        assert!(outcome.succeeded);
        assert_eq!(outcome.value, "a.example.\nb.example.");
        assert_eq!(outcome.raw_error, None);
    }

    #[test]
    fn test_settle_error() {
        let outcome = settle::<GeoInfo>("geo", Err(ReconError::LookupError("403".into())));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.value, "lookup failed: 403");
        assert!(outcome.detail.is_none());
    }

    #[test]
    fn test_echo_without_replies_is_failure() {
        let summary = EchoSummary::from_steps(vec![
            EchoStep::failed(0, "Destination Host Unreachable"),
            EchoStep::failed(1, "Destination Host Unreachable"),
        ]);
        let outcome = settle("ping", Ok(summary));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.value, "0/2 replies");
        assert_eq!(outcome.raw_error.as_deref(), Some("Destination Host Unreachable"));
        assert!(matches!(outcome.detail, Some(ProbeDetail::Echo(_))));
    }

    #[test]
    fn test_default_settings() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.echo_count, 10);
        assert_eq!(settings.echo_interval, Duration::from_millis(100));
        assert!(settings.join_timeout >= settings.probe_timeout);
    }
}
