//! Dev server port discovery.
//!
//! A project's dev script is mined for a candidate port, then the candidate
//! and the ports just above it are probed one at a time for a live server.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::net::TcpListener;
use tracing::{debug, info};

static EXPLICIT_PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:--port(?:=|\s+)|(?:^|\s)-p\s+|\bPORT=)(\d{1,5})\b").unwrap()
});

static BARE_PORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":(\d{4,5})\b").unwrap());

static PORT_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bport:\s*(\d{1,5})\b").unwrap());

static SERVE_PORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"serve\D*?(\d{4,5})\b").unwrap());

/// Well-known tools and the port they serve on when none is given.
const TOOL_DEFAULTS: &[(&[&str], u16)] = &[
    (&["vite"], 5173),
    (&["webpack-dev-server", "webpack serve", "dev-server"], 8080),
    (&["next"], 3000),
    (&["react-scripts"], 3000),
];

/// Guess the port a dev script serves on.
///
/// Patterns are tried in priority order: explicit flags (`--port N`,
/// `--port=N`, `-p N`, `PORT=N`), a bare `:NNNN`, a `port: N` key, a
/// `serve ... NNNN` pattern, then tool defaults.
pub fn extract_port(script: &str) -> Option<u16> {
    for re in [&*EXPLICIT_PORT_RE, &*BARE_PORT_RE, &*PORT_KEY_RE, &*SERVE_PORT_RE] {
        let port = re
            .captures(script)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .filter(|p| *p != 0);
        if port.is_some() {
            return port;
        }
    }
    TOOL_DEFAULTS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| script.contains(k)))
        .map(|(_, port)| *port)
}

/// Finds free ports.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// The first free port at or above `port`.
    async fn next_free_port(&self, port: u16) -> Result<u16>;
}

/// Probes by binding TCP listeners on a set of interfaces.
///
/// A port is taken if any host refuses the bind with `AddrInUse`. Hosts that
/// cannot be bound at all (no IPv6, say) are skipped.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    hosts: Vec<IpAddr>,
}

impl TcpPortProbe {
    pub fn new(hosts: impl IntoIterator<Item = IpAddr>) -> Self {
        Self { hosts: hosts.into_iter().collect() }
    }

    async fn is_taken(&self, port: u16) -> Result<bool> {
        let mut bound = 0usize;
        for host in &self.hosts {
            match TcpListener::bind((*host, port)).await {
                Ok(listener) => {
                    drop(listener);
                    bound += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => return Ok(true),
                Err(e) => debug!(%host, port, error = %e, "Cannot bind; skipping host"),
            }
        }
        if bound == 0 {
            bail!("no interface could bind port {port}");
        }
        Ok(false)
    }
}

impl Default for TcpPortProbe {
    /// Loopback and unspecified addresses, IPv4 and IPv6.
    fn default() -> Self {
        Self::new([
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        ])
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn next_free_port(&self, port: u16) -> Result<u16> {
        for candidate in port..=u16::MAX {
            if !self.is_taken(candidate).await? {
                return Ok(candidate);
            }
        }
        bail!("no free port at or above {port}")
    }
}

/// Whether something already listens on `port`. Probe errors count as free.
pub async fn is_port_in_use(probe: &dyn PortProbe, port: u16) -> bool {
    match probe.next_free_port(port).await {
        Ok(free) => free != port,
        Err(e) => {
            debug!(port, error = %e, "Port probe failed; treating as free");
            false
        }
    }
}

/// First occupied port in `base ..= base + span`, probed in order.
pub async fn find_running_port(probe: &dyn PortProbe, base: u16, span: u16, project: &str) -> Option<u16> {
    for offset in 0..=span {
        let Some(port) = base.checked_add(offset) else {
            break;
        };
        if is_port_in_use(probe, port).await {
            info!(project, port, candidate = base, "Found running dev server");
            return Some(port);
        }
    }
    debug!(project, base, span, "No running dev server");
    None
}
