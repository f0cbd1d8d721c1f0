//! # Per-tag chunk buffer (C6)
//!
//! Concurrent appenders coalesce MessagePack-encoded events into
//! per-tag chunks under a shared byte budget, with backpressure via
//! `BufferFull`, safe hand-off to the flusher, and crash-resilient
//! spill to disk.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  append(tag, ts, record)                                     │
//! │    └─ tag-local lock → current[tag] (grow/seal/create)       │
//! │         └─ allocated_bytes (global atomic)                   │
//! │  flush(sender, force)                                         │
//! │    └─ seal eligible current chunks → sealed queue             │
//! │         └─ drain sealed queue → sender, FIFO                  │
//! │  close(sender)                                                 │
//! │    └─ force flush → spill remainder to disk                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod spill;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rmpv::Value;

use crate::chunk::Chunk;
use crate::config::BufferConfig;
use crate::error::{Error, Result};
use crate::event_time::Timestamp;
use crate::framing::{build_forward_request, chunk_id_to_token};
use crate::record::{MsgpackMap, Serializer};
use crate::sender::{Frame, Sender};

/// A tag's current (still-open) chunk, one per distinct tag, guarded
/// by its own lock so unrelated tags never contend.
type TagSlot = Mutex<Option<Chunk>>;

/// The per-tag chunk buffer.
pub struct Buffer {
    config: BufferConfig,
    current: DashMap<String, TagSlot>,
    sealed: Mutex<VecDeque<Chunk>>,
    allocated_bytes: AtomicUsize,
}

impl Buffer {
    /// Build an empty buffer from `config`.
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            current: DashMap::new(),
            sealed: Mutex::new(VecDeque::new()),
            allocated_bytes: AtomicUsize::new(0),
        }
    }

    /// Bring up a buffer and rehydrate any chunks spilled to
    /// `file_backup_dir` by a previous process, enqueuing them ahead
    /// of new events.
    pub async fn new_with_rehydration(config: BufferConfig) -> Result<Self> {
        let buffer = Self::new(config);
        if let (Some(dir), Some(prefix)) = (&buffer.config.file_backup_dir, &buffer.config.file_backup_prefix) {
            let chunks = spill::rehydrate(dir, prefix).await?;
            if !chunks.is_empty() {
                tracing::info!(count = chunks.len(), "rehydrated spilled chunks");
            }
            let mut sealed = buffer.sealed.lock();
            for chunk in chunks {
                buffer.allocated_bytes.fetch_add(chunk.capacity(), Ordering::SeqCst);
                sealed.push_back(chunk);
            }
        }
        Ok(buffer)
    }

    /// Total bytes (current + queued chunk capacity) counted against
    /// `max_buffer_size`.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::SeqCst)
    }

    /// Number of chunks waiting in the sealed queue (not counting any
    /// still-open current chunks).
    pub fn buffered_chunks(&self) -> usize {
        self.sealed.lock().len()
    }

    /// Encode `map` with `serializer`, wrap it with `timestamp` into a
    /// `[ts, record]` pair, and append it to `tag`'s current chunk.
    pub fn append(
        &self,
        tag: &str,
        timestamp: Timestamp,
        map: &MsgpackMap,
        serializer: &Serializer,
    ) -> Result<()> {
        let record_bytes = serializer(map)?;
        self.append_pre_encoded_record(tag, timestamp, &record_bytes)
    }

    /// Append a `[ts, record]` pair where `record` is already an
    /// encoded MessagePack map (the `emit_bytes` fast path).
    pub fn append_pre_encoded_record(
        &self,
        tag: &str,
        timestamp: Timestamp,
        packed_map: &[u8],
    ) -> Result<()> {
        let record_value =
            rmpv::decode::read_value(&mut &packed_map[..]).map_err(|e| Error::Decode(e.to_string()))?;
        let pair = Value::Array(vec![timestamp.to_value(), record_value]);
        let mut encoded = Vec::new();
        rmpv::encode::write_value(&mut encoded, &pair).map_err(|e| Error::Encode(e.to_string()))?;
        self.append_encoded(tag, &encoded)
    }

    /// Grow or replace `tag`'s current chunk so `additional` more
    /// bytes will fit, sealing and enqueueing the old chunk if it had
    /// to be replaced. A sealed-but-unsent chunk's capacity stays
    /// counted in `allocated_bytes` until it is actually sent (spec.md
    /// §3: `allocatedBytes` sums over current *and queued* chunks), so
    /// this returns only the capacity of the newly allocated chunk,
    /// never netted against what was sealed.
    fn make_room(&self, tag: &str, guard: &mut Option<Chunk>, additional: usize) -> usize {
        if let Some(chunk) = guard.as_mut() {
            if chunk.len() + additional <= chunk.capacity() {
                return 0;
            }
            if chunk.capacity() < self.config.chunk_retention_size {
                let before = chunk.capacity();
                chunk.reserve_for_growth(additional, self.config.chunk_expand_ratio);
                if chunk.len() + additional <= chunk.capacity() {
                    return chunk.capacity().saturating_sub(before);
                }
            }
        }

        if let Some(sealed) = guard.take() {
            tracing::debug!(tag, bytes = sealed.len(), "chunk sealed (capacity exhausted)");
            self.sealed.lock().push_back(sealed);
        }

        let initial = self.config.chunk_initial_size.max(additional);
        let new_chunk = Chunk::new(tag, initial);
        let added = new_chunk.capacity();
        *guard = Some(new_chunk);

        added
    }

    fn append_encoded(&self, tag: &str, encoded_pair: &[u8]) -> Result<()> {
        let additional = encoded_pair.len();
        let slot = self
            .current
            .entry(tag.to_string())
            .or_insert_with(|| Mutex::new(None));
        let mut guard = slot.lock();

        let growth_delta = self.make_room(tag, &mut guard, additional);

        let projected = self.allocated_bytes.load(Ordering::SeqCst) + growth_delta;
        if projected > self.config.max_buffer_size {
            return Err(Error::BufferFull {
                tag: tag.to_string(),
                attempted: additional,
            });
        }
        self.allocated_bytes.fetch_add(growth_delta, Ordering::SeqCst);

        let chunk = guard.as_mut().expect("make_room always leaves a current chunk");
        chunk.append(encoded_pair);

        if chunk.should_seal(self.config.chunk_retention_size, self.config.chunk_retention_time) {
            let sealed = guard.take().expect("current chunk just appended to");
            tracing::debug!(tag, bytes = sealed.len(), "chunk sealed (retention reached)");
            self.sealed.lock().push_back(sealed);
        }

        Ok(())
    }

    /// Seal every current chunk that is due (or all of them, if
    /// `force`), then hand the whole sealed queue to `sender` in FIFO
    /// order. Chunks that fail to send are pushed back to the front
    /// of the queue for the next flush attempt.
    pub async fn flush(&self, sender: &dyn Sender, force: bool) -> Result<()> {
        self.seal_due_current_chunks(force);

        loop {
            let chunk = {
                let mut sealed = self.sealed.lock();
                sealed.pop_front()
            };
            let Some(chunk) = chunk else { break };

            let tag = chunk.tag().to_string();
            let chunk_id = chunk.chunk_id();
            let record_count = chunk.record_count();
            let capacity = chunk.capacity();
            let ack_token = self.config.ack_response_mode.then(|| chunk_id_to_token(chunk_id));
            let payload: Bytes = chunk.into_bytes();

            let bytes = build_forward_request(&tag, payload.clone(), record_count, ack_token.as_deref())?;
            let frame = Frame {
                bytes,
                ack_token: ack_token.clone(),
            };

            match sender.send(&frame).await {
                Ok(()) => {
                    self.allocated_bytes.fetch_sub(capacity, Ordering::SeqCst);
                }
                Err(e) => {
                    tracing::warn!(tag, error = %e, "flush failed, re-queueing chunk");
                    let rebuilt = Chunk::from_spilled(tag, chunk_id, payload);
                    self.sealed.lock().push_front(rebuilt);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn seal_due_current_chunks(&self, force: bool) {
        for entry in self.current.iter() {
            let mut guard = entry.value().lock();
            let should_seal = match guard.as_ref() {
                Some(chunk) => {
                    force || chunk.should_seal(self.config.chunk_retention_size, self.config.chunk_retention_time)
                }
                None => false,
            };
            if should_seal {
                if let Some(chunk) = guard.take() {
                    self.sealed.lock().push_back(chunk);
                }
            }
        }
    }

    /// Force a full flush, then, if a file-backup directory is
    /// configured, spill anything still unsent to disk.
    pub async fn close(&self, sender: &dyn Sender) -> Result<()> {
        let flush_result = self.flush(sender, true).await;

        if let (Some(dir), Some(prefix)) = (&self.config.file_backup_dir, &self.config.file_backup_prefix) {
            let remaining: Vec<Chunk> = {
                let mut sealed = self.sealed.lock();
                sealed.drain(..).collect()
            };
            for chunk in remaining {
                let tag = chunk.tag().to_string();
                let chunk_id = chunk.chunk_id();
                let bytes = chunk.into_bytes();
                spill::write_chunk(dir, prefix, &tag, chunk_id, &bytes).await?;
            }
        }

        flush_result
    }

    /// Remove any spill files left by a previous `close()`.
    pub async fn clear_backup_files(&self) -> Result<()> {
        if let (Some(dir), Some(prefix)) = (&self.config.file_backup_dir, &self.config.file_backup_prefix) {
            spill::clear(dir, prefix).await?;
        }
        Ok(())
    }

    /// The configured backup directory, if file spill is enabled.
    pub fn file_backup_dir(&self) -> Option<&PathBuf> {
        self.config.file_backup_dir.as_ref()
    }
}
