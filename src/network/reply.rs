//! Echo reply parsing
//!
//! Ping utilities print a reply line such as
//!
//! ```text
//! 64 bytes from 192.0.2.1: icmp_seq=1 ttl=57 time=12.4 ms
//! 16 bytes from 2001:db8::1, icmp_seq=0 hlim=57 time=12.4 ms
//! ```
//!
//! Latency is printed either as a real number or as an integer, always in
//! milliseconds. The hop count is printed as `ttl=` or `hlim=`. Each field is
//! extracted by trying an ordered table of patterns until one matches.

use crate::error::ReconError;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Canonical form of one echo reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedReply {
    pub rtt: Duration,
    pub hop_count: Option<u32>,
}

type Extractor<T> = fn(&str) -> Option<T>;

struct FieldPattern<T> {
    pattern: Regex,
    extract: Extractor<T>,
}

impl<T> FieldPattern<T> {
    fn new(pattern: &str, extract: Extractor<T>) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("echo reply pattern"),
            extract,
        }
    }
}

static LATENCY_PATTERNS: Lazy<Vec<FieldPattern<Duration>>> = Lazy::new(|| {
    vec![
        FieldPattern::new(r"time=(\d+\.\d+)", fractional_millis),
        FieldPattern::new(r"time=(\d+)", whole_millis),
    ]
});

static HOP_PATTERNS: Lazy<Vec<FieldPattern<u32>>> = Lazy::new(|| {
    vec![
        FieldPattern::new(r"ttl=(\d+)", hop_count),
        FieldPattern::new(r"hlim=(\d+)", hop_count),
    ]
});

fn fractional_millis(raw: &str) -> Option<Duration> {
    let millis: f64 = raw.parse().ok()?;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_micros((millis * 1000.0).round() as u64))
}

fn whole_millis(raw: &str) -> Option<Duration> {
    raw.parse().ok().map(Duration::from_millis)
}

fn hop_count(raw: &str) -> Option<u32> {
    raw.parse().ok()
}

fn first_match<T>(table: &[FieldPattern<T>], output: &str) -> Option<T> {
    table.iter().find_map(|field| {
        let caps = field.pattern.captures(output)?;
        (field.extract)(caps.get(1)?.as_str())
    })
}

/// Parse the textual output of a single successful echo.
///
/// Output without a latency token is a [`ReconError::ParseError`] carrying
/// the raw output. A missing hop count is not an error.
pub fn parse_reply(output: &str) -> Result<ParsedReply> {
    let rtt = first_match(&LATENCY_PATTERNS, output)
        .ok_or_else(|| ReconError::ParseError(output.trim().to_string()))?;

    Ok(ParsedReply {
        rtt,
        hop_count: first_match(&HOP_PATTERNS, output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_V4: &str = "PING 192.0.2.1 (192.0.2.1) 56(84) bytes of data.\n\
        64 bytes from 192.0.2.1: icmp_seq=1 ttl=57 time=12.4 ms\n\n\
        --- 192.0.2.1 ping statistics ---\n\
        1 packets transmitted, 1 received, 0% packet loss, time 0ms\n\
        rtt min/avg/max/mdev = 12.400/12.400/12.400/0.000 ms\n";

    const DARWIN_V6: &str = "PING6(56=40+8+8 bytes) 2001:db8::2 --> 2001:db8::1\n\
        16 bytes from 2001:db8::1, icmp_seq=0 hlim=57 time=12.4 ms\n";

    #[test]
    fn test_ttl_dialect() {
        let reply = parse_reply(LINUX_V4).unwrap();
        assert_eq!(reply.rtt, Duration::from_micros(12_400));
        assert_eq!(reply.hop_count, Some(57));
    }

    #[test]
    fn test_hlim_dialect() {
        let reply = parse_reply(DARWIN_V6).unwrap();
        assert_eq!(reply.rtt, Duration::from_micros(12_400));
        assert_eq!(reply.hop_count, Some(57));
    }

    #[test]
    fn test_dialects_are_equivalent() {
        assert_eq!(parse_reply(LINUX_V4).unwrap(), parse_reply(DARWIN_V6).unwrap());
    }

    #[test]
    fn test_integer_latency() {
        let reply = parse_reply("64 bytes from 192.0.2.1: icmp_seq=1 ttl=118 time=9 ms").unwrap();
        assert_eq!(reply.rtt, Duration::from_millis(9));
        assert_eq!(reply.hop_count, Some(118));
    }

    #[test]
    fn test_integer_and_fractional_forms_agree() {
        let whole = parse_reply("ttl=64 time=3 ms").unwrap();
        let fractional = parse_reply("hlim=64 time=3.000 ms").unwrap();
        assert_eq!(whole, fractional);
    }

    #[test]
    fn test_missing_latency_is_parse_error() {
        let output = "PING 192.0.2.1 (192.0.2.1) 56(84) bytes of data.\n";
        match parse_reply(output) {
            Err(ReconError::ParseError(raw)) => assert!(raw.starts_with("PING 192.0.2.1")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_hop_count() {
        let reply = parse_reply("reply from 192.0.2.1 time=1.250 ms").unwrap();
        assert_eq!(reply.rtt, Duration::from_micros(1_250));
        assert_eq!(reply.hop_count, None);
    }
}
