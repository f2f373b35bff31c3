//! Raw socket ICMP echo transport
//!
//! Sends an echo request over a raw IPv4 socket and measures the reply
//! directly, so no text parsing is involved. Needs root or CAP_NET_RAW.

use crate::core::{EchoReply, EchoTransport};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use log::debug;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

const ECHO_HEADER_LEN: usize = 8;
const ECHO_PAYLOAD_LEN: usize = 56;

/// Echo transport on a raw ICMPv4 socket
pub struct RawIcmpTransport {
    identifier: u16,
    sequence: AtomicU16,
}

impl Default for RawIcmpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RawIcmpTransport {
    pub fn new() -> Self {
        Self {
            identifier: rand::thread_rng().gen::<u16>(),
            sequence: AtomicU16::new(0),
        }
    }

    /// Whether the current process can open raw sockets at all
    #[cfg(unix)]
    pub fn is_privileged() -> bool {
        // SAFETY: geteuid has no preconditions
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    pub fn is_privileged() -> bool {
        false
    }

    fn open_socket(timeout: Duration) -> Result<Socket> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                ReconError::transport("permission denied for raw ICMP socket")
            } else {
                ReconError::transport(e.to_string())
            }
        })?;
        socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(|e| ReconError::transport(e.to_string()))?;
        Ok(socket)
    }
}

/// Build an echo request with the given identifier and sequence number
pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD_LEN];
    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_checksum(0);
    }
    if let Some(view) = IcmpPacket::new(&buffer) {
        let checksum = icmp::checksum(&view);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    buffer
}

/// Match a received IPv4 datagram against the request we sent.
///
/// Returns the remaining TTL when the datagram is the echo reply for
/// `identifier`/`sequence` from `target`.
pub fn match_echo_reply(
    datagram: &[u8],
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
) -> Option<u8> {
    let ip_packet = Ipv4Packet::new(datagram)?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp
        || ip_packet.get_source() != target
    {
        return None;
    }

    let offset = (ip_packet.get_header_length() as usize) * 4;
    let reply = EchoReplyPacket::new(datagram.get(offset..)?)?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply
        || reply.get_identifier() != identifier
        || reply.get_sequence_number() != sequence
    {
        return None;
    }

    Some(ip_packet.get_ttl())
}

fn echo_blocking(
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<EchoReply> {
    let socket = RawIcmpTransport::open_socket(timeout)?;
    let request = build_echo_request(identifier, sequence);
    let destination = SockAddr::from(SocketAddr::new(IpAddr::V4(target), 0));

    let start = Instant::now();
    socket
        .send_to(&request, &destination)
        .map_err(|e| ReconError::transport(e.to_string()))?;

    let mut buffer = [0u8; 1500];
    loop {
        if start.elapsed() >= timeout {
            return Err(ReconError::TimeoutError(timeout));
        }
        match (&socket).read(&mut buffer) {
            Ok(received) => {
                let reply = &buffer[..received];
                if let Some(ttl) = match_echo_reply(reply, target, identifier, sequence) {
                    return Ok(EchoReply::Measured {
                        rtt: start.elapsed(),
                        hop_count: Some(u32::from(ttl)),
                    });
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ReconError::TimeoutError(timeout));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReconError::transport(e.to_string())),
        }
    }
}

#[async_trait]
impl EchoTransport for RawIcmpTransport {
    async fn echo_once(&self, ip: IpAddr, timeout: Duration) -> Result<EchoReply> {
        let target = match ip {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                return Err(ReconError::transport("raw ICMP transport supports IPv4 only"))
            }
        };
        let identifier = self.identifier;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        debug!("Raw echo to {} id={} seq={}", target, identifier, sequence);

        tokio::task::spawn_blocking(move || echo_blocking(target, identifier, sequence, timeout))
            .await
            .map_err(|e| ReconError::transport(format!("echo task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "raw-icmp"
    }
}
