//! Integration tests for the echo statistics engine

use argus::{
    core::{EchoReply, EchoTransport},
    scanner::EchoEngine,
    ReconError,
};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

type Script = Box<dyn Fn(usize) -> (Duration, argus::Result<EchoReply>) + Send + Sync>;

/// Transport whose reply to the n-th call is decided by a script
struct ScriptedTransport {
    calls: AtomicUsize,
    launched_at: Mutex<Vec<Instant>>,
    script: Script,
}

impl ScriptedTransport {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(usize) -> (Duration, argus::Result<EchoReply>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            launched_at: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }
}

#[async_trait]
impl EchoTransport for ScriptedTransport {
    async fn echo_once(&self, _ip: IpAddr, _timeout: Duration) -> argus::Result<EchoReply> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.launched_at.lock().unwrap().push(Instant::now());
        let (delay, reply) = (self.script)(call);
        sleep(delay).await;
        reply
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn reply_line(millis: usize) -> EchoReply {
    EchoReply::Text(format!(
        "64 bytes from 192.0.2.1: icmp_seq={} ttl=57 time={} ms",
        millis, millis
    ))
}

fn target() -> IpAddr {
    "192.0.2.1".parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_step_count_matches_request() {
    for count in 0..=12 {
        let transport = ScriptedTransport::new(|call| {
            if call % 3 == 0 {
                (Duration::ZERO, Err(ReconError::transport("no route to host")))
            } else {
                (Duration::from_millis(5), Ok(reply_line(call)))
            }
        });
        let engine = EchoEngine::new(transport, Duration::from_secs(1));
        let summary = engine.measure(count, Duration::from_millis(10), target()).await;

        assert_eq!(summary.steps.len(), count);
        assert_eq!(summary.total_sent, count);
        let failures = summary.steps.iter().filter(|s| !s.is_success()).count();
        assert_eq!(summary.success_count + failures, count);
        assert_eq!(failures, (count + 2) / 3);
        for (index, step) in summary.steps.iter().enumerate() {
            assert_eq!(step.sequence, index);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_steps_follow_launch_order_not_reply_order() {
    let count = 5;
    // earlier probes take longer, so replies arrive in reverse order
    let transport = ScriptedTransport::new(move |call| {
        let delay = Duration::from_millis(50 * (count - call) as u64);
        (delay, Ok(reply_line(call)))
    });
    let engine = EchoEngine::new(transport, Duration::from_secs(1));

    let started = Instant::now();
    let summary = engine.measure(count, Duration::from_millis(10), target()).await;
    let elapsed = started.elapsed();

    let rtts: Vec<Option<Duration>> = summary.steps.iter().map(|s| s.rtt).collect();
    let expected: Vec<Option<Duration>> = (0..count)
        .map(|ms| Some(Duration::from_millis(ms as u64)))
        .collect();
    assert_eq!(rtts, expected);
    assert_eq!(summary.success_count, count);

    // probes overlap: serial execution would need 750ms of delays alone
    assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_launches_are_paced() {
    let transport = ScriptedTransport::new(|call| (Duration::from_millis(1), Ok(reply_line(call))));
    let engine = EchoEngine::new(transport.clone(), Duration::from_secs(1));
    let interval = Duration::from_millis(100);

    engine.measure(4, interval, target()).await;

    let launched = transport.launched_at.lock().unwrap();
    assert_eq!(launched.len(), 4);
    for (index, at) in launched.iter().enumerate() {
        let offset = *at - launched[0];
        assert!(offset >= interval * index as u32, "probe {} at {:?}", index, offset);
        assert!(offset < interval * index as u32 + interval / 2, "probe {} at {:?}", index, offset);
    }
}

#[tokio::test(start_paused = true)]
async fn test_transport_diagnostic_is_surfaced() {
    let transport = ScriptedTransport::new(|_| {
        (
            Duration::ZERO,
            Err(ReconError::TransportError {
                message: "ping exit status: 2".to_string(),
                diagnostic: Some("ping: sendmsg: Network is unreachable\n".to_string()),
            }),
        )
    });
    let engine = EchoEngine::new(transport, Duration::from_secs(1));
    let summary = engine.measure(2, Duration::from_millis(10), target()).await;

    assert_eq!(summary.success_count, 0);
    for step in &summary.steps {
        assert_eq!(step.error.as_deref(), Some("ping: sendmsg: Network is unreachable"));
        assert_eq!(step.rtt, None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_reply_keeps_raw_output() {
    let raw = "PING 192.0.2.1 (192.0.2.1): 56 data bytes";
    let transport = ScriptedTransport::new(move |_| {
        (Duration::ZERO, Ok(EchoReply::Text(format!("{}\n", raw))))
    });
    let engine = EchoEngine::new(transport, Duration::from_secs(1));
    let summary = engine.measure(1, Duration::from_millis(10), target()).await;

    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.steps[0].error.as_deref(), Some(raw));
}

#[tokio::test(start_paused = true)]
async fn test_measured_reply_without_hop_count() {
    let transport = ScriptedTransport::new(|_| {
        (
            Duration::ZERO,
            Ok(EchoReply::Measured {
                rtt: Duration::from_micros(2_500),
                hop_count: None,
            }),
        )
    });
    let engine = EchoEngine::new(transport, Duration::from_secs(1));
    let summary = engine.measure(1, Duration::from_millis(10), target()).await;

    assert_eq!(summary.steps[0].rtt, Some(Duration::from_micros(2_500)));
    assert_eq!(summary.steps[0].hop_count, None);
    assert!(summary.steps[0].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_slow_transport_times_out_per_probe() {
    let transport = ScriptedTransport::new(|call| {
        if call == 1 {
            (Duration::from_secs(30), Ok(reply_line(call)))
        } else {
            (Duration::ZERO, Ok(reply_line(call)))
        }
    });
    let engine = EchoEngine::new(transport, Duration::from_secs(1));
    let summary = engine.measure(3, Duration::from_millis(10), target()).await;

    assert_eq!(summary.success_count, 2);
    assert!(summary.steps[0].is_success());
    assert_eq!(summary.steps[1].error.as_deref(), Some("timed out after 1.5s"));
    assert!(summary.steps[2].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_reports_remaining_steps() {
    let transport = ScriptedTransport::new(|call| (Duration::ZERO, Ok(reply_line(call))));
    let cancel = CancellationToken::new();
    let engine = EchoEngine::new(transport.clone(), Duration::from_secs(1))
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        sleep(Duration::from_millis(250)).await;
        cancel.cancel();
    });
    let summary = engine.measure(10, Duration::from_millis(100), target()).await;

    assert_eq!(summary.steps.len(), 10);
    assert_eq!(summary.success_count, 3);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    for step in &summary.steps[3..] {
        assert_eq!(step.error.as_deref(), Some("cancelled"));
    }
}

#[test]
fn test_engine_reports_transport_name() {
    let transport = ScriptedTransport::new(|call| (Duration::ZERO, Ok(reply_line(call))));
    let engine = EchoEngine::new(transport, Duration::from_secs(1));
    assert_eq!(engine.transport_name(), "scripted");
}
