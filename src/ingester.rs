//! # Ingester façade (C8)
//!
//! The public surface a producer links against: `emit*`/`flush`/`close`
//! plus the small set of observability accessors the spec's testable
//! properties lean on. Everything else in the crate — the buffer, the
//! flusher, the sender stack — is assembled here from one
//! [`IngesterConfig`] and owned for the lifetime of the `Ingester`.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Ingester::new(config)                                        │
//! │    ├─ Buffer::new_with_rehydration  (C6, spill replay)        │
//! │    ├─ SingleSender × N              (C3, one per endpoint)    │
//! │    │    └─ wrapped in MultiSender   (C4, round-robin)         │
//! │    │         └─ wrapped in RetrySender (C5, backoff)          │
//! │    └─ PeriodicFlusher or SyncFlusher (C7, per flush_mode)     │
//! │                                                                │
//! │  emit_map/emit_map_at/emit_bytes → Buffer::append (sync)      │
//! │  flush()        → nudges the flusher, never blocks            │
//! │  close()        → drains, spills, joins the flusher task      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::Buffer;
use crate::config::{
    BufferConfig, FailureDetectorConfig, FlusherConfig, RetryConfig, SenderConfig,
};
use crate::error::{Error, Result};
use crate::event_time::Timestamp;
use crate::failure_detector::HeartbeatMode;
use crate::flusher::{PeriodicFlusher, SyncFlusher};
use crate::record::{default_serializer, MsgpackMap, Serializer};
use crate::sender::{MultiSender, RetrySender, Sender, SingleSender};

/// Which flusher variant drives `buffer.flush` — a dedicated
/// background task on a fixed schedule, or inline from the caller's
/// own thread whenever a deadline has elapsed (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// A single worker task wakes every `flush_interval` (or on
    /// request) and drives the buffer; `close` joins it.
    Periodic,
    /// No worker task; `emit` performs a flush inline once retention
    /// or the periodic deadline has elapsed.
    Synchronous,
}

/// Aggregates every sub-component's configuration plus the two seams
/// spec.md Design Note 9 calls out: an injectable serializer and an
/// optional `RetryOver` error callback. Plain value type, no
/// builder/instantiator indirection.
pub struct IngesterConfig {
    /// Per-tag chunk buffer configuration (C6).
    pub buffer: BufferConfig,
    /// Flusher configuration (C7); `flush_interval` is shared by both
    /// `FlushMode` variants.
    pub flusher: FlusherConfig,
    /// One entry per upstream endpoint. A single entry is the common
    /// case; more than one builds a round-robin `MultiSender`.
    pub senders: Vec<SenderConfig>,
    /// Retry/backoff policy wrapping the whole sender stack (C5).
    pub retry: RetryConfig,
    /// φ-accrual failure detector configuration, shared by every
    /// endpoint's heartbeat probe (C1/C2).
    pub failure_detector: FailureDetectorConfig,
    /// Transport the heartbeat probe uses to reach each endpoint.
    pub heartbeat_mode: HeartbeatMode,
    /// Which flusher variant to run.
    pub flush_mode: FlushMode,
    /// The `record -> bytes` encoder. Defaults to the `rmpv`-based
    /// map encoder; callers may inject their own.
    pub serializer: Serializer,
    /// Invoked, in addition to the caller's `Result`, whenever the
    /// retry layer exhausts `max_retry_count` attempts.
    pub on_retry_over: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            flusher: FlusherConfig::default(),
            senders: vec![SenderConfig::default()],
            retry: RetryConfig::default(),
            failure_detector: FailureDetectorConfig::default(),
            heartbeat_mode: HeartbeatMode::Tcp,
            flush_mode: FlushMode::Periodic,
            serializer: default_serializer(),
            on_retry_over: None,
        }
    }
}

enum FlusherHandle {
    Periodic(PeriodicFlusher),
    Sync(Arc<SyncFlusher>),
}

/// The public emit/flush/close surface. Cheap to hold behind an
/// `Arc` if multiple producer threads need to share one instance —
/// every method here takes `&self`.
pub struct Ingester {
    buffer: Arc<Buffer>,
    sender: Arc<dyn Sender>,
    serializer: Serializer,
    flusher: FlusherHandle,
    flusher_wait: Duration,
    terminated: AtomicBool,
}

impl Ingester {
    /// Resolve every configured endpoint, assemble the sender stack
    /// (single senders under a multi-sender under a retry wrapper),
    /// rehydrate any spilled chunks, and start the flusher.
    ///
    /// Async because endpoint resolution and spill rehydration are
    /// both I/O: spec.md's pseudocode constructor is synchronous, but
    /// this crate is Tokio-based throughout (see DESIGN.md), so a
    /// constructor that touches the filesystem and DNS is written as
    /// an `async fn` rather than forced onto a blocking thread.
    pub async fn new(config: IngesterConfig) -> Result<Self> {
        if config.senders.is_empty() {
            return Err(Error::NonRetryable(
                "IngesterConfig::senders must list at least one endpoint".to_string(),
            ));
        }

        let mut children: Vec<Box<dyn Sender>> = Vec::with_capacity(config.senders.len());
        for sender_config in &config.senders {
            let addr = resolve_endpoint(&sender_config.host, sender_config.port).await?;
            children.push(Box::new(SingleSender::new(
                addr,
                sender_config.clone(),
                config.failure_detector.clone(),
                config.heartbeat_mode,
            )));
        }

        let multi = MultiSender::new(children);
        let mut retryable = RetrySender::new(multi, config.retry.clone());
        if let Some(callback) = config.on_retry_over.clone() {
            retryable = retryable.on_retry_over(callback);
        }
        let sender: Arc<dyn Sender> = Arc::new(retryable);

        let buffer = Arc::new(Buffer::new_with_rehydration(config.buffer.clone()).await?);

        let flusher = match config.flush_mode {
            FlushMode::Periodic => FlusherHandle::Periodic(PeriodicFlusher::spawn(
                buffer.clone(),
                sender.clone(),
                config.flusher.clone(),
            )),
            FlushMode::Synchronous => {
                FlusherHandle::Sync(Arc::new(SyncFlusher::new(config.flusher.clone())))
            }
        };

        Ok(Self {
            buffer,
            sender,
            serializer: config.serializer,
            flusher,
            flusher_wait: config.flusher.wait_until_buffer_flushed,
            terminated: AtomicBool::new(false),
        })
    }

    /// Emit a structured record under `tag`, stamped with the current
    /// wall-clock time (plain seconds resolution).
    pub fn emit_map(&self, tag: impl Into<String>, record: MsgpackMap) -> Result<()> {
        self.emit_map_at(tag, Timestamp::now_seconds(), record)
    }

    /// Emit a structured record under `tag` at an explicit timestamp
    /// (seconds or full `EventTime`).
    pub fn emit_map_at(&self, tag: impl Into<String>, time: Timestamp, record: MsgpackMap) -> Result<()> {
        let tag = tag.into();
        validate_tag(&tag)?;
        self.buffer.append(&tag, time, &record, &self.serializer)?;
        self.maybe_sync_flush();
        Ok(())
    }

    /// Emit a record whose MessagePack map bytes are already encoded
    /// by the caller (the `emit(tag, preSerializedBytes, ...)` fast
    /// path in spec.md §6).
    pub fn emit_bytes(&self, tag: impl Into<String>, time: Timestamp, packed_map: &[u8]) -> Result<()> {
        let tag = tag.into();
        validate_tag(&tag)?;
        self.buffer.append_pre_encoded_record(&tag, time, packed_map)?;
        self.maybe_sync_flush();
        Ok(())
    }

    /// In `FlushMode::Synchronous`, kick off a flush if the flusher's
    /// deadline has elapsed since the last one. A no-op under
    /// `FlushMode::Periodic`, where the background task owns that
    /// decision. `emit` itself stays synchronous (per spec.md's
    /// non-blocking append); the actual send is necessarily async, so
    /// it runs as a detached task rather than blocking the caller's
    /// thread — `maybe_flush`'s own due-check keeps this cheap to call
    /// on every emit, and a failed opportunistic flush is logged, not
    /// surfaced, matching the periodic flusher's same treatment of a
    /// failed scheduled flush.
    fn maybe_sync_flush(&self) {
        if let FlusherHandle::Sync(sync) = &self.flusher {
            let sync = sync.clone();
            let buffer = self.buffer.clone();
            let sender = self.sender.clone();
            tokio::spawn(async move {
                if let Err(e) = sync.maybe_flush(&buffer, sender.as_ref(), false).await {
                    tracing::warn!(error = %e, "inline synchronous flush failed");
                }
            });
        }
    }

    /// Request an immediate, non-forced flush. Never blocks: under
    /// `FlushMode::Periodic` this nudges the worker task; under
    /// `FlushMode::Synchronous` it flags the next `emit` to flush
    /// regardless of whether its own deadline has elapsed yet.
    pub fn flush(&self) -> Result<()> {
        match &self.flusher {
            FlusherHandle::Periodic(periodic) => periodic.request_flush_nonblocking(),
            FlusherHandle::Sync(sync) => sync.request_flush(),
        }
        Ok(())
    }

    /// Drain and shut down: forces a full flush, spills anything
    /// still unsent if file backup is configured, and joins the
    /// flusher's background task (if any). Idempotent — a second
    /// `close()` is a no-op `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let join_result = match &self.flusher {
            FlusherHandle::Periodic(periodic) => {
                periodic.wait_until_terminated(self.flusher_wait).await;
                Ok(())
            }
            FlusherHandle::Sync(sync) => sync.close(&self.buffer, self.sender.as_ref()).await,
        };

        let close_result = self.buffer.close(self.sender.as_ref()).await;
        self.sender.close().await;

        join_result.and(close_result)
    }

    /// Block (up to `seconds`) until `buffered_chunks() == 0`, polling
    /// at a short fixed interval and nudging a flush each time.
    /// Returns whether the buffer drained within the deadline.
    pub async fn wait_until_all_buffer_flushed(&self, seconds: u64) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
        loop {
            if self.buffer.buffered_chunks() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            let _ = self.flush();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Block (up to `seconds`) until the flusher has finished its
    /// shutdown drain. Does not itself request shutdown — pair with
    /// `close()`.
    pub async fn wait_until_flusher_terminated(&self, seconds: u64) -> bool {
        match &self.flusher {
            FlusherHandle::Periodic(periodic) => {
                periodic.wait_until_terminated(Duration::from_secs(seconds)).await
            }
            FlusherHandle::Sync(sync) => {
                let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
                while !sync.is_terminated() && tokio::time::Instant::now() < deadline {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                sync.is_terminated()
            }
        }
    }

    /// Whether `close()` has completed shutdown of the flusher.
    /// Monotonic: `false` until `close()` finishes.
    pub fn is_terminated(&self) -> bool {
        match &self.flusher {
            FlusherHandle::Periodic(periodic) => periodic.is_terminated(),
            FlusherHandle::Sync(sync) => sync.is_terminated(),
        }
    }

    /// Total bytes outstanding across current + queued chunks; the
    /// same quantity `append` checks against `max_buffer_size`.
    pub fn allocated_buffer_size(&self) -> usize {
        self.buffer.allocated_bytes()
    }

    /// Number of sealed chunks waiting in the flush queue.
    pub fn buffered_chunks(&self) -> usize {
        self.buffer.buffered_chunks()
    }

    /// Remove any spill files left by a previous `close()`, without
    /// rehydrating them.
    pub async fn clear_backup_files(&self) -> Result<()> {
        self.buffer.clear_backup_files().await
    }
}

/// Tags are non-empty dot-separated strings (spec.md §3); everything
/// else about their shape is the upstream's concern, not ours.
fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::NonRetryable("tag must not be empty".to_string()));
    }
    Ok(())
}

async fn resolve_endpoint(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(Error::TransientIo)?
        .next()
        .ok_or_else(|| Error::NonRetryable(format!("could not resolve {host}:{port}")))
}
