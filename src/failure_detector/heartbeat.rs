//! # Heartbeat probe (C2)
//!
//! Periodically probes a remote endpoint and feeds arrivals into a
//! [`super::FailureDetector`]. TCP probes propagate connect failures
//! nowhere except by *not* recording an arrival; the UDP variant is
//! fully failure-silent per design, since a dropped or unanswered
//! datagram carries no delivery guarantee worth erroring over.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use super::FailureDetector;

/// The transport a heartbeat probe uses to reach the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatMode {
    /// Open and immediately close a short-lived TCP connection each
    /// tick; a successful connect is an arrival.
    Tcp,
    /// Send a single datagram each tick; arrivals are recorded
    /// optimistically on send (the protocol has no reply to await).
    Udp,
}

/// Drives periodic probes against one endpoint on a dedicated task.
pub struct HeartbeatProbe {
    handle: JoinHandle<()>,
}

impl HeartbeatProbe {
    /// Spawn the probe loop. Dropping the returned handle's owner does
    /// not stop the task; call [`HeartbeatProbe::stop`] explicitly,
    /// mirroring the sender owning (and closing) its detector.
    pub fn spawn(
        addr: SocketAddr,
        mode: HeartbeatMode,
        interval: Duration,
        detector: Arc<FailureDetector>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match mode {
                    HeartbeatMode::Tcp => {
                        if TcpStream::connect(addr).await.is_ok() {
                            detector.record_arrival();
                        } else {
                            tracing::trace!(%addr, "heartbeat tcp connect failed");
                        }
                    }
                    HeartbeatMode::Udp => {
                        if let Ok(sent) = send_udp_probe(addr).await {
                            if sent {
                                detector.record_arrival();
                            }
                        }
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stop the probe loop. Idempotent: calling this twice, or after
    /// the task has already finished, is a no-op.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

async fn send_udp_probe(addr: SocketAddr) -> std::io::Result<bool> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    match socket.send_to(&[0u8], addr).await {
        Ok(_) => Ok(true),
        Err(e) => {
            tracing::trace!(%addr, error = %e, "heartbeat udp send failed");
            Ok(false)
        }
    }
}
