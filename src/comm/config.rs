use crate::comm::protocol::RESPONSE_ENVELOPE_BYTES;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, warn};

/// Slack between the longest run and giving up on its reply
const RESPONSE_MARGIN_SECS: u64 = 5;

/// Comm module configuration
#[derive(Debug, Clone)]
pub struct CommConfig {
    /// Listen address (default: 127.0.0.1)
    pub listen_addr: String,
    /// Listen port (default: 9710)
    pub listen_port: u16,
    /// Maximum request payload size in bytes (default: 65536)
    pub max_payload_bytes: usize,
    /// Largest response datagram the server will send (default: 65000)
    pub max_response_bytes: usize,
    /// Deduplication table capacity per client (default: 256)
    pub dedup_capacity: usize,
    /// Deduplication entry TTL in seconds (default: 600)
    pub dedup_ttl_secs: u64,
    /// How long to wait for the dispatch loop (default: 360)
    pub response_timeout_secs: u64,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9710,
            max_payload_bytes: 65536,
            max_response_bytes: 65000,
            dedup_capacity: 256,
            dedup_ttl_secs: 600,
            response_timeout_secs: 360,
        }
    }
}

impl CommConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = CommConfig::default();
        if let Ok(addr) = std::env::var("SANDEXEC_LISTEN_ADDR")
            && !addr.trim().is_empty()
        {
            config.listen_addr = addr.trim().to_string();
        }
        if let Ok(port) = std::env::var("SANDEXEC_LISTEN_PORT") {
            match port.trim().parse() {
                Ok(p) => config.listen_port = p,
                Err(_) => warn!(var = "SANDEXEC_LISTEN_PORT", value = %port, "Invalid env var value, using default"),
            }
        }
        config
    }

    /// Longest content string that still fits one response datagram
    pub fn max_content_bytes(&self) -> usize {
        self.max_response_bytes.saturating_sub(RESPONSE_ENVELOPE_BYTES)
    }

    /// Wait long enough for a dispatch that may take up to `run`
    pub fn covering_runs_of(mut self, run: Duration) -> Self {
        let needed = run
            .as_secs()
            .saturating_add(u64::from(run.subsec_nanos() > 0))
            .saturating_add(RESPONSE_MARGIN_SECS);
        if needed > self.response_timeout_secs {
            debug!(from = self.response_timeout_secs, to = needed, "Raising response timeout");
            self.response_timeout_secs = needed;
        }
        self
    }

    /// Returns the socket address to bind to
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self.listen_addr.parse().unwrap_or_else(|_| {
            warn!(addr = %self.listen_addr, "Invalid listen address, using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        SocketAddr::new(ip, self.listen_port)
    }
}
