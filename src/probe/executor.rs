//! Local probe execution for `TargetSelection::Server` (spec §4.5 point 1:
//! "execute locally on the control plane, used for HTTP/TCP targets
//! reachable from here").
//!
//! Icmp/Dns/Tls checks need OS-level sockets, DNS resolvers, or a raw TLS
//! handshake this crate's dependency stack doesn't carry, and the spec only
//! names `server` selection as a fit for "HTTP/TCP targets" — so those
//! probe types report an error result rather than silently pretending to
//! succeed when run locally. An agent-dispatched probe of the same types is
//! unaffected; that path lives entirely on the agent side, outside this
//! crate.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::model::ProbeType;

pub struct LocalProbeOutcome {
    pub up: bool,
    pub latency_ms: u32,
    pub error: Option<String>,
}

/// Execute `probe_type` against `target` locally, bounded by `timeout_ms`.
pub async fn execute(probe_type: ProbeType, target: &str, timeout_ms: u32) -> LocalProbeOutcome {
    let timeout = Duration::from_millis(u64::from(timeout_ms));
    let started = Instant::now();

    let result = match probe_type {
        ProbeType::Tcp => tokio::time::timeout(timeout, tcp_connect(target)).await,
        ProbeType::Http => tokio::time::timeout(timeout, http_get(target, timeout)).await,
        ProbeType::Icmp | ProbeType::Dns | ProbeType::Tls => {
            return LocalProbeOutcome {
                up: false,
                latency_ms: 0,
                error: Some(format!("{} probes require agent dispatch, not local execution", probe_type.as_str())),
            };
        }
    };

    let latency_ms = started.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;

    match result {
        Ok(Ok(())) => LocalProbeOutcome { up: true, latency_ms, error: None },
        Ok(Err(error)) => LocalProbeOutcome { up: false, latency_ms, error: Some(error) },
        Err(_) => LocalProbeOutcome { up: false, latency_ms, error: Some("timed out".to_string()) },
    }
}

async fn tcp_connect(target: &str) -> Result<(), String> {
    TcpStream::connect(target).await.map(|_| ()).map_err(|e| e.to_string())
}

/// GET `target` and treat a 2xx/3xx status as `up`. `target` may be a full
/// URL (`https://host/path`) or a bare `host:port`/`host:port/path`, in
/// which case `http://` is assumed. `reqwest` (rustls) owns TLS, redirects,
/// and status parsing — a hand-rolled client can't make a `server`-strategy
/// HTTPS health check (spec §4.5 point 1) succeed.
async fn http_get(target: &str, timeout: Duration) -> Result<(), String> {
    let url = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{target}")
    };

    let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| e.to_string())?;

    let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else {
        Err(format!("HTTP status {}", status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_connect_to_closed_port_fails() {
        let outcome = execute(ProbeType::Tcp, "127.0.0.1:1", 200).await;
        assert!(!outcome.up);
    }

    #[tokio::test]
    async fn icmp_is_rejected_locally() {
        let outcome = execute(ProbeType::Icmp, "127.0.0.1", 200).await;
        assert!(!outcome.up);
        assert!(outcome.error.unwrap().contains("agent dispatch"));
    }
}
