//! # Single network sender (C3)
//!
//! Owns one lazily-opened TCP connection to an upstream aggregator.
//! Writes are serialized by a send-mutex so concurrent flush calls
//! never interleave frames on the wire; any I/O failure drops the
//! connection so the next send reconnects from scratch.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::SenderConfig;
use crate::error::{Error, Result};
use crate::failure_detector::{FailureDetector, HeartbeatMode, HeartbeatProbe};

use super::{Frame, Sender};

/// The ack response is a small MessagePack map; this bounds the read
/// so a misbehaving upstream can't make the sender buffer unbounded
/// bytes waiting for a terminator that never comes.
const MAX_ACK_RESPONSE_BYTES: usize = 256;

/// A sender backed by exactly one TCP connection.
pub struct SingleSender {
    addr: SocketAddr,
    config: SenderConfig,
    conn: AsyncMutex<Option<TcpStream>>,
    detector: Arc<FailureDetector>,
    heartbeat: std::sync::Mutex<Option<HeartbeatProbe>>,
    closed: AtomicBool,
}

impl SingleSender {
    /// Build a sender for `addr`. The failure detector and its
    /// heartbeat probe are owned here; [`SingleSender::close`] tears
    /// both down along with the socket.
    pub fn new(
        addr: SocketAddr,
        config: SenderConfig,
        detector_config: crate::config::FailureDetectorConfig,
        heartbeat_mode: HeartbeatMode,
    ) -> Self {
        let detector = Arc::new(FailureDetector::new(detector_config.clone()));
        let heartbeat = HeartbeatProbe::spawn(
            addr,
            heartbeat_mode,
            detector_config.heartbeat_interval,
            detector.clone(),
        );
        Self {
            addr,
            config,
            conn: AsyncMutex::new(None),
            detector,
            heartbeat: std::sync::Mutex::new(Some(heartbeat)),
            closed: AtomicBool::new(false),
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(
            self.config.connection_timeout,
            TcpStream::connect(self.addr),
        )
        .await
        .map_err(|_| Error::TransientIo(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(Error::TransientIo)?;
        Ok(stream)
    }

    async fn write_frame(&self, stream: &mut TcpStream, frame: &Frame) -> Result<()> {
        let bufs = [std::io::IoSlice::new(&frame.bytes)];
        if stream.is_write_vectored() {
            stream.write_vectored(&bufs).await.map_err(Error::TransientIo)?;
        } else {
            stream.write_all(&frame.bytes).await.map_err(Error::TransientIo)?;
        }
        stream.flush().await.map_err(Error::TransientIo)?;
        Ok(())
    }

    async fn read_and_verify_ack(&self, stream: &mut TcpStream, expected: &str) -> Result<()> {
        let mut buf = vec![0u8; MAX_ACK_RESPONSE_BYTES];
        let n = tokio::time::timeout(self.config.read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| Error::AckTimeout)?
            .map_err(Error::TransientIo)?;

        if n == 0 {
            return Err(Error::TransientIo(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upstream closed before sending an ack",
            )));
        }

        crate::framing::verify_ack_response(&buf[..n], expected)
    }
}

#[async_trait]
impl Sender for SingleSender {
    async fn send(&self, frame: &Frame) -> Result<()> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let result = async {
            let stream = guard.as_mut().expect("just ensured Some");
            self.write_frame(stream, frame).await?;
            if let Some(expected) = &frame.ack_token {
                self.read_and_verify_ack(stream, expected).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        if result.is_err() {
            *guard = None;
            self.detector.record_failure();
        }
        result
    }

    fn is_available(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.detector.is_available()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(probe) = self.heartbeat.lock().expect("heartbeat mutex poisoned").take() {
            probe.stop();
        }
        tokio::time::sleep(self.config.wait_before_close).await;
        let mut guard = self.conn.lock().await;
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await;
        }
    }
}
