//! Echo transport backed by the platform ping utility
//!
//! Each call runs the utility for exactly one echo and hands its stdout back
//! unparsed; [`crate::network::reply`] turns it into a measurement.

use crate::core::{EchoReply, EchoTransport};
use crate::error::ReconError;
use crate::Result;
use async_trait::async_trait;
use log::debug;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Command line for one echo on the current platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Runs `ping` / `ping6` once per echo
#[derive(Debug, Clone, Default)]
pub struct SystemPingTransport {
    /// Override for the IPv4 utility, mostly useful in tests
    ipv4_program: Option<String>,
    ipv6_program: Option<String>,
}

impl SystemPingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(ipv4: impl Into<String>, ipv6: impl Into<String>) -> Self {
        Self {
            ipv4_program: Some(ipv4.into()),
            ipv6_program: Some(ipv6.into()),
        }
    }

    /// Build the invocation for `ip`, or fail on platforms without a known
    /// ping dialect.
    pub fn invocation(&self, ip: IpAddr, timeout: Duration) -> Result<PingInvocation> {
        let (program, mut args) = platform_command(ip, timeout)?;
        let program = match ip {
            IpAddr::V4(_) => self.ipv4_program.clone().unwrap_or(program),
            IpAddr::V6(_) => self.ipv6_program.clone().unwrap_or(program),
        };
        args.push(ip.to_string());
        Ok(PingInvocation { program, args })
    }
}

#[cfg(target_os = "linux")]
fn platform_command(ip: IpAddr, timeout: Duration) -> Result<(String, Vec<String>)> {
    let wait_secs = timeout.as_secs().max(1).to_string();
    Ok(match ip {
        IpAddr::V4(_) => (
            "ping".to_string(),
            vec!["-W".to_string(), wait_secs, "-c".to_string(), "1".to_string()],
        ),
        IpAddr::V6(_) => (
            "ping6".to_string(),
            vec!["-W".to_string(), wait_secs, "-c".to_string(), "1".to_string()],
        ),
    })
}

#[cfg(target_os = "macos")]
fn platform_command(ip: IpAddr, timeout: Duration) -> Result<(String, Vec<String>)> {
    Ok(match ip {
        IpAddr::V4(_) => (
            "ping".to_string(),
            vec![
                "-W".to_string(),
                timeout.as_millis().max(1).to_string(),
                "-c".to_string(),
                "1".to_string(),
            ],
        ),
        IpAddr::V6(_) => (
            "ping6".to_string(),
            vec!["-i".to_string(), "1".to_string(), "-c".to_string(), "1".to_string()],
        ),
    })
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_command(_ip: IpAddr, _timeout: Duration) -> Result<(String, Vec<String>)> {
    Err(ReconError::transport(format!(
        "unsupported platform: {}",
        std::env::consts::OS
    )))
}

#[async_trait]
impl EchoTransport for SystemPingTransport {
    async fn echo_once(&self, ip: IpAddr, timeout: Duration) -> Result<EchoReply> {
        let invocation = self.invocation(ip, timeout)?;
        debug!("Running {} {:?}", invocation.program, invocation.args);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ReconError::transport(format!("failed to run {}: {}", invocation.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(ReconError::TransportError {
                message: format!("{} {}", invocation.program, output.status),
                diagnostic: if stderr.trim().is_empty() { None } else { Some(stderr) },
            });
        }

        Ok(EchoReply::Text(String::from_utf8_lossy(&output.stdout).to_string()))
    }

    fn name(&self) -> &str {
        "system-ping"
    }
}
