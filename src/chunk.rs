//! # Chunks
//!
//! A `Chunk` is the unit of buffering and of sending: a growable
//! byte buffer holding zero or more concatenated `[timestamp, record]`
//! pairs for a single tag, plus the metadata (id, age, record count)
//! the sealing and ack logic needs.

use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// A single tag's in-progress (or just-sealed) buffer of packed
/// `[timestamp, record]` pairs.
#[derive(Debug)]
pub struct Chunk {
    tag: String,
    buf: BytesMut,
    created_at: Instant,
    chunk_id: [u8; 16],
    record_count: u64,
}

impl Chunk {
    /// Start a new, empty chunk for `tag` with `initial_size` bytes of
    /// spare capacity. The chunk id is minted now, at creation time,
    /// not lazily when the chunk is first sent — so retries of the
    /// same chunk always present the same ack token.
    pub fn new(tag: impl Into<String>, initial_size: usize) -> Self {
        Self {
            tag: tag.into(),
            buf: BytesMut::with_capacity(initial_size),
            created_at: Instant::now(),
            chunk_id: *Uuid::new_v4().as_bytes(),
            record_count: 0,
        }
    }

    /// The tag this chunk accumulates events for.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The 16 raw id bytes minted for this chunk (base64-encoded by
    /// the framing layer to build the ack token).
    pub fn chunk_id(&self) -> [u8; 16] {
        self.chunk_id
    }

    /// How many bytes are currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the chunk holds no records.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// How many `[timestamp, record]` pairs have been appended.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// How long ago this chunk was created.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Append one already-encoded `[timestamp, record]` pair's bytes.
    pub fn append(&mut self, encoded_pair: &[u8]) {
        self.buf.put_slice(encoded_pair);
        self.record_count += 1;
    }

    /// Ensure at least `additional` bytes of spare capacity, growing
    /// the buffer by `expand_ratio` at a time (never shrinking below
    /// what's needed) until `retention_size` would be exceeded, at
    /// which point the caller is expected to seal the chunk instead.
    pub fn reserve_for_growth(&mut self, additional: usize, expand_ratio: f64) {
        let wanted = self.buf.len() + additional;
        if self.buf.capacity() >= wanted {
            return;
        }
        let mut target = self.buf.capacity().max(1);
        while target < wanted {
            target = ((target as f64) * expand_ratio).ceil() as usize;
        }
        self.buf.reserve(target - self.buf.len());
    }

    /// Whether this chunk should be sealed: it has reached
    /// `retention_size` bytes or `retention_time` age.
    pub fn should_seal(&self, retention_size: usize, retention_time: std::time::Duration) -> bool {
        self.buf.len() >= retention_size || self.age() >= retention_time
    }

    /// Consume the chunk, returning its buffered bytes as the
    /// `PackedForward` binary payload.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Borrow the buffered bytes without consuming the chunk (used by
    /// the spill writer, which needs the chunk's other metadata too).
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The spare-plus-used capacity currently reserved for this
    /// chunk, the quantity the global `allocated_bytes` budget tracks.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Rebuild a sealed chunk from spilled bytes (file backup
    /// rehydration): `tag` and `chunk_id` come from the filename,
    /// `record_count` is recovered by scanning the payload for
    /// `[ts, record]` pairs.
    pub fn from_spilled(tag: String, chunk_id: [u8; 16], bytes: Bytes) -> Self {
        let mut record_count = 0u64;
        let mut cursor = &bytes[..];
        while !cursor.is_empty() {
            match rmpv::decode::read_value(&mut cursor) {
                Ok(_) => record_count += 1,
                Err(_) => break,
            }
        }

        Self {
            tag,
            buf: BytesMut::from(&bytes[..]),
            created_at: Instant::now(),
            chunk_id,
            record_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn new_chunk_is_empty_and_has_a_unique_id() {
        let a = Chunk::new("app.log", 1024);
        let b = Chunk::new("app.log", 1024);
        assert!(a.is_empty());
        assert_eq!(a.record_count(), 0);
        assert_ne!(a.chunk_id(), b.chunk_id());
    }

    #[test]
    fn append_tracks_length_and_record_count() {
        let mut chunk = Chunk::new("app.log", 64);
        chunk.append(&[1, 2, 3]);
        chunk.append(&[4, 5]);
        assert_eq!(chunk.len(), 5);
        assert_eq!(chunk.record_count(), 2);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn should_seal_on_size() {
        let mut chunk = Chunk::new("app.log", 16);
        chunk.append(&[0; 10]);
        assert!(!chunk.should_seal(20, Duration::from_secs(3600)));
        chunk.append(&[0; 10]);
        assert!(chunk.should_seal(20, Duration::from_secs(3600)));
    }

    #[test]
    fn should_seal_on_age() {
        let chunk = Chunk::new("app.log", 16);
        sleep(Duration::from_millis(5));
        assert!(chunk.should_seal(usize::MAX, Duration::from_millis(1)));
    }

    #[test]
    fn reserve_for_growth_doubles_until_it_fits() {
        let mut chunk = Chunk::new("app.log", 4);
        chunk.reserve_for_growth(100, 2.0);
        assert!(chunk.buf.capacity() >= 100);
    }

    #[test]
    fn into_bytes_yields_the_concatenated_payload() {
        let mut chunk = Chunk::new("app.log", 16);
        chunk.append(&[9, 9]);
        let bytes = chunk.into_bytes();
        assert_eq!(&bytes[..], &[9, 9]);
    }

    #[test]
    fn from_spilled_recovers_the_record_count_by_scanning_pairs() {
        let mut buf = Vec::new();
        let pair = rmpv::Value::Array(vec![rmpv::Value::from(1), rmpv::Value::from(2)]);
        rmpv::encode::write_value(&mut buf, &pair).unwrap();
        rmpv::encode::write_value(&mut buf, &pair).unwrap();

        let chunk = Chunk::from_spilled("app.log".to_string(), [3u8; 16], Bytes::from(buf));
        assert_eq!(chunk.record_count(), 2);
        assert_eq!(chunk.tag(), "app.log");
        assert_eq!(chunk.chunk_id(), [3u8; 16]);
    }
}
