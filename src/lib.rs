//! Argus - chat-driven network reconnaissance
//!
//! A single token goes in (a domain, an address or a CIDR block) and an
//! ordered diagnostic report comes out: resolution, echo statistics,
//! reverse DNS, geolocation, open ports and threat intelligence for every
//! address involved.

pub mod config;
pub mod core;
pub mod error;
pub mod intelligence;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigValidator, ReconConfig};
pub use error::ReconError;
pub use intelligence::build_collaborators;
pub use network::TransportKind;
pub use scanner::{Collaborators, ProbeSettings, ReconEngine, Report};
pub use utils::target_parser::{classify, Target};

pub type Result<T> = std::result::Result<T, ReconError>;
