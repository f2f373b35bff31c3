//! Echo statistics engine
//!
//! Issues a paced series of echo probes against one address. Probes are
//! launched `interval` apart but are not serialized: a probe may still be in
//! flight when the next one starts. Each result lands in the slot of its
//! sequence number, so the step order never depends on reply timing.

use crate::core::{EchoReply, EchoTransport};
use crate::error::ReconError;
use crate::network::reply::{parse_reply, ParsedReply};
use crate::Result;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Extra time granted on top of the transport timeout before a probe is
/// abandoned. The ping utility enforces its own wait and needs to exit.
const TRANSPORT_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one echo probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoStep {
    pub sequence: usize,
    pub rtt: Option<Duration>,
    pub hop_count: Option<u32>,
    pub error: Option<String>,
}

impl EchoStep {
    pub fn succeeded(sequence: usize, reply: ParsedReply) -> Self {
        Self {
            sequence,
            rtt: Some(reply.rtt),
            hop_count: reply.hop_count,
            error: None,
        }
    }

    pub fn failed(sequence: usize, error: impl Into<String>) -> Self {
        Self {
            sequence,
            rtt: None,
            hop_count: None,
            error: Some(error.into()),
        }
    }

    fn from_result(sequence: usize, result: Result<ParsedReply>) -> Self {
        match result {
            Ok(reply) => Self::succeeded(sequence, reply),
            Err(e) => Self::failed(sequence, e.detail()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a full measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoSummary {
    pub total_sent: usize,
    pub success_count: usize,
    pub steps: Vec<EchoStep>,
}

impl EchoSummary {
    pub fn from_steps(steps: Vec<EchoStep>) -> Self {
        let success_count = steps.iter().filter(|step| step.is_success()).count();
        Self {
            total_sent: steps.len(),
            success_count,
            steps,
        }
    }

    fn rtts(&self) -> impl Iterator<Item = Duration> + '_ {
        self.steps.iter().filter_map(|step| step.rtt)
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.rtts().min()
    }

    pub fn max_rtt(&self) -> Option<Duration> {
        self.rtts().max()
    }

    pub fn avg_rtt(&self) -> Option<Duration> {
        let (total, count) = self
            .rtts()
            .fold((Duration::ZERO, 0u32), |(total, count), rtt| (total + rtt, count + 1));
        (count > 0).then(|| total / count)
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.total_sent == 0 {
            return 0.0;
        }
        let lost = self.total_sent - self.success_count;
        (lost as f64 / self.total_sent as f64) * 100.0
    }

    /// First failure in sequence order, if any
    pub fn first_error(&self) -> Option<&str> {
        self.steps.iter().find_map(|step| step.error.as_deref())
    }

    pub fn summary(&self) -> String {
        let mut text = format!("{}/{} replies", self.success_count, self.total_sent);
        let stats = (self.min_rtt(), self.avg_rtt(), self.max_rtt());
        if let (Some(min), Some(avg), Some(max)) = stats {
            text.push_str(&format!(
                "\nrtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
                millis(min),
                millis(avg),
                millis(max)
            ));
        }
        text
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Paced echo measurement over an [`EchoTransport`]
#[derive(Clone)]
pub struct EchoEngine {
    transport: Arc<dyn EchoTransport>,
    probe_timeout: Duration,
    cancel: CancellationToken,
}

impl EchoEngine {
    pub fn new(transport: Arc<dyn EchoTransport>, probe_timeout: Duration) -> Self {
        Self {
            transport,
            probe_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Send `count` probes to `ip`, `interval` apart, and wait for all of them.
    ///
    /// The returned summary always holds exactly `count` steps in launch
    /// order. Probes that were never launched because of cancellation are
    /// reported as cancelled.
    pub async fn measure(&self, count: usize, interval: Duration, ip: IpAddr) -> EchoSummary {
        debug!("Measuring {} echoes to {} via {}", count, ip, self.transport.name());

        let mut slots: Vec<Option<EchoStep>> = vec![None; count];
        let mut probes = JoinSet::new();
        let start = Instant::now();

        for sequence in 0..count {
            let launch_at = start + interval.saturating_mul(sequence as u32);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep_until(launch_at) => {}
            }

            let transport = Arc::clone(&self.transport);
            let cancel = self.cancel.clone();
            let probe_timeout = self.probe_timeout;
            probes.spawn(async move {
                let step = probe_once(transport, ip, probe_timeout, cancel, sequence).await;
                (sequence, step)
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((sequence, step)) => slots[sequence] = Some(step),
                Err(e) => warn!("Echo probe task to {} failed: {}", ip, e),
            }
        }

        let steps = slots
            .into_iter()
            .enumerate()
            .map(|(sequence, slot)| {
                slot.unwrap_or_else(|| {
                    let reason = if self.cancel.is_cancelled() {
                        ReconError::Cancelled.to_string()
                    } else {
                        "echo probe task aborted".to_string()
                    };
                    EchoStep::failed(sequence, reason)
                })
            })
            .collect();

        EchoSummary::from_steps(steps)
    }
}

async fn probe_once(
    transport: Arc<dyn EchoTransport>,
    ip: IpAddr,
    probe_timeout: Duration,
    cancel: CancellationToken,
    sequence: usize,
) -> EchoStep {
    let deadline = probe_timeout + TRANSPORT_GRACE;
    let result = tokio::select! {
        _ = cancel.cancelled() => Err(ReconError::Cancelled),
        reply = timeout(deadline, transport.echo_once(ip, probe_timeout)) => {
            reply.unwrap_or(Err(ReconError::TimeoutError(deadline)))
        }
    };

    EchoStep::from_result(sequence, result.and_then(normalize_reply))
}

fn normalize_reply(reply: EchoReply) -> Result<ParsedReply> {
    match reply {
        EchoReply::Measured { rtt, hop_count } => Ok(ParsedReply { rtt, hop_count }),
        EchoReply::Text(output) => parse_reply(&output),
    }
}
