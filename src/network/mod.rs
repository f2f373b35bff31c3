//! Network module: echo transports and echo reply parsing

pub mod icmp;
pub mod ping_cmd;
pub mod reply;

use crate::core::EchoTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use icmp::RawIcmpTransport;
pub use ping_cmd::SystemPingTransport;
pub use reply::{parse_reply, ParsedReply};

/// Available echo transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Platform ping utility, output parsed from text
    #[default]
    System,
    /// Raw ICMPv4 socket
    Raw,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::System => "system",
            TransportKind::Raw => "raw",
        }
    }

    /// Check if the transport requires raw sockets
    pub fn requires_raw_socket(&self) -> bool {
        matches!(self, TransportKind::Raw)
    }

    pub fn build(&self) -> Arc<dyn EchoTransport> {
        match self {
            TransportKind::System => Arc::new(SystemPingTransport::new()),
            TransportKind::Raw => Arc::new(RawIcmpTransport::new()),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" | "ping" => Ok(TransportKind::System),
            "raw" | "icmp" => Ok(TransportKind::Raw),
            _ => Err(format!("Unknown echo transport: {}", s)),
        }
    }
}
