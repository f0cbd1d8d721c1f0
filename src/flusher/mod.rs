//! # Flusher (C7)
//!
//! Drives the buffer to hand sealed chunks to the sender, either on a
//! fixed schedule via a dedicated task (`PeriodicFlusher`) or inline
//! from the caller's own thread (`SyncFlusher`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::buffer::Buffer;
use crate::config::FlusherConfig;
use crate::error::Result;
use crate::sender::Sender;

/// A request sent to the periodic flusher's worker task.
enum FlushSignal {
    /// Flush now, without forcing unsealed chunks to close early.
    Requested,
    /// Drain everything and exit.
    Shutdown,
}

/// A dedicated task that wakes on a timer (or on request) and drives
/// `buffer.flush(sender, force=false)`, grounded in the same
/// `tokio::select!` shape as the teacher's network event loop.
pub struct PeriodicFlusher {
    handle: Option<JoinHandle<()>>,
    signal_tx: mpsc::Sender<FlushSignal>,
    terminated: Arc<AtomicBool>,
    terminated_notify: Arc<Notify>,
}

impl PeriodicFlusher {
    /// Spawn the worker task over `buffer`/`sender`.
    pub fn spawn(buffer: Arc<Buffer>, sender: Arc<dyn Sender>, config: FlusherConfig) -> Self {
        let (signal_tx, mut signal_rx) = mpsc::channel(16);
        let terminated = Arc::new(AtomicBool::new(false));
        let terminated_notify = Arc::new(Notify::new());

        let terminated_for_task = terminated.clone();
        let notify_for_task = terminated_notify.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.flush_interval);
            ticker.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = buffer.flush(sender.as_ref(), false).await {
                            tracing::warn!(error = %e, "periodic flush failed");
                        }
                    }
                    signal = signal_rx.recv() => {
                        match signal {
                            Some(FlushSignal::Requested) => {
                                if let Err(e) = buffer.flush(sender.as_ref(), false).await {
                                    tracing::warn!(error = %e, "requested flush failed");
                                }
                            }
                            Some(FlushSignal::Shutdown) | None => break,
                        }
                    }
                }
            }

            let deadline = tokio::time::Instant::now() + config.wait_until_buffer_flushed;
            while buffer.buffered_chunks() > 0 && tokio::time::Instant::now() < deadline {
                if let Err(e) = buffer.flush(sender.as_ref(), true).await {
                    tracing::warn!(error = %e, "final drain flush failed");
                    break;
                }
            }

            terminated_for_task.store(true, Ordering::SeqCst);
            notify_for_task.notify_waiters();
        });

        Self {
            handle: Some(handle),
            signal_tx,
            terminated,
            terminated_notify,
        }
    }

    /// Ask the worker to flush as soon as it next runs, without
    /// blocking for that flush to complete.
    pub async fn request_flush(&self) {
        let _ = self.signal_tx.send(FlushSignal::Requested).await;
    }

    /// Same as [`PeriodicFlusher::request_flush`], but synchronous: a
    /// request already queued (channel full) is treated as "nudge
    /// already pending" rather than awaited, so the public facade's
    /// `flush()` can stay a plain, never-blocking `fn`.
    pub fn request_flush_nonblocking(&self) {
        use tokio::sync::mpsc::error::TrySendError;
        match self.signal_tx.try_send(FlushSignal::Requested) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Whether the worker has finished its shutdown drain.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait up to `config.wait_until_terminated`
    /// for the worker task to finish its drain and exit.
    pub async fn wait_until_terminated(&self, timeout: std::time::Duration) -> bool {
        if self.is_terminated() {
            return true;
        }
        let _ = self.signal_tx.send(FlushSignal::Shutdown).await;
        tokio::time::timeout(timeout, self.terminated_notify.notified())
            .await
            .is_ok()
            || self.is_terminated()
    }
}

impl Drop for PeriodicFlusher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// No dedicated task: the caller's own thread performs a flush inline
/// whenever retention or a periodic deadline has elapsed.
pub struct SyncFlusher {
    config: FlusherConfig,
    last_flush: parking_lot::Mutex<std::time::Instant>,
    requested: AtomicBool,
    terminated: AtomicBool,
}

impl SyncFlusher {
    /// Build a synchronous flusher from `config`.
    pub fn new(config: FlusherConfig) -> Self {
        Self {
            config,
            last_flush: parking_lot::Mutex::new(std::time::Instant::now()),
            requested: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    /// Flag the next `maybe_flush` call as due regardless of elapsed
    /// time, mirroring the periodic flusher's `request_flush` nudge.
    pub fn request_flush(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Flush `buffer` through `sender` if `flush_interval` has
    /// elapsed since the last flush, a flush was explicitly
    /// requested, or `force` is set.
    pub async fn maybe_flush(&self, buffer: &Buffer, sender: &dyn Sender, force: bool) -> Result<()> {
        let due = force
            || self.requested.swap(false, Ordering::SeqCst)
            || self.last_flush.lock().elapsed() >= self.config.flush_interval;
        if !due {
            return Ok(());
        }
        buffer.flush(sender, force).await?;
        *self.last_flush.lock() = std::time::Instant::now();
        Ok(())
    }

    /// A single final flush, then mark terminated.
    pub async fn close(&self, buffer: &Buffer, sender: &dyn Sender) -> Result<()> {
        let result = buffer.flush(sender, true).await;
        self.terminated.store(true, Ordering::SeqCst);
        result
    }

    /// Whether `close` has run.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}
