//! # Configuration
//!
//! Plain value-typed configuration structs, each with a `Default` impl
//! giving the defaults documented in spec. No builder/instantiator
//! indirection: callers construct these directly, optionally using
//! struct-update syntax (`BufferConfig { max_buffer_size: 1 << 20, ..Default::default() }`).

use std::time::Duration;

/// Configuration for the per-tag chunk buffer (C6).
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Global byte budget across all current + queued chunks.
    pub max_buffer_size: usize,
    /// Capacity a freshly created chunk starts with.
    pub chunk_initial_size: usize,
    /// A chunk is sealed once it reaches this size.
    pub chunk_retention_size: usize,
    /// Growth factor applied when a chunk needs more room but hasn't
    /// hit `chunk_retention_size` yet.
    pub chunk_expand_ratio: f64,
    /// A chunk is sealed once it is this old, regardless of size.
    pub chunk_retention_time: Duration,
    /// Whether the sender should request and verify a per-chunk ack.
    pub ack_response_mode: bool,
    /// Directory to spill unsent chunks to on close; `None` disables
    /// file backup.
    pub file_backup_dir: Option<std::path::PathBuf>,
    /// Filename prefix for spilled chunk files.
    pub file_backup_prefix: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 512 * 1024 * 1024,
            chunk_initial_size: 1024 * 1024,
            chunk_retention_size: 4 * 1024 * 1024,
            chunk_expand_ratio: 2.0,
            chunk_retention_time: Duration::from_millis(1000),
            ack_response_mode: false,
            file_backup_dir: None,
            file_backup_prefix: None,
        }
    }
}

/// Configuration for the flusher (C7).
#[derive(Debug, Clone)]
pub struct FlusherConfig {
    /// How often the periodic flusher wakes to flush.
    pub flush_interval: Duration,
    /// How long `close()` waits for the buffer to drain before giving
    /// up and spilling the remainder.
    pub wait_until_buffer_flushed: Duration,
    /// How long `close()` waits for the worker task to exit.
    pub wait_until_terminated: Duration,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(600),
            wait_until_buffer_flushed: Duration::from_secs(60),
            wait_until_terminated: Duration::from_secs(60),
        }
    }
}

/// Configuration for a single network sender (C3).
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Upstream hostname or IP.
    pub host: String,
    /// Upstream TCP port.
    pub port: u16,
    /// Timeout for establishing the TCP connection.
    pub connection_timeout: Duration,
    /// Timeout for reading an ack response.
    pub read_timeout: Duration,
    /// How long to wait before closing the socket on shutdown, to let
    /// an in-flight ack arrive.
    pub wait_before_close: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 24224,
            connection_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(5000),
            wait_before_close: Duration::from_millis(1000),
        }
    }
}

/// Configuration for the retry strategy wrapping a sender (C5).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before raising `RetryOver`.
    pub max_retry_count: u32,
    /// Base interval for exponential backoff.
    pub base_interval: Duration,
    /// Ceiling the backoff interval is clamped to.
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 7,
            base_interval: Duration::from_millis(400),
            max_interval: Duration::from_millis(30000),
        }
    }
}

/// Configuration for the φ-accrual failure detector (C1) and its
/// heartbeat probe (C2).
#[derive(Debug, Clone)]
pub struct FailureDetectorConfig {
    /// An endpoint is considered unavailable once `phi` has stayed
    /// above `phi_threshold` for at least this long.
    pub failure_interval: Duration,
    /// Suspicion level beyond which an endpoint starts being
    /// considered for unavailability.
    pub phi_threshold: f64,
    /// How often the heartbeat probe fires.
    pub heartbeat_interval: Duration,
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        Self {
            failure_interval: Duration::from_millis(3000),
            phi_threshold: 16.0,
            heartbeat_interval: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let buf = BufferConfig::default();
        assert_eq!(buf.max_buffer_size, 512 * 1024 * 1024);
        assert_eq!(buf.chunk_initial_size, 1024 * 1024);
        assert_eq!(buf.chunk_retention_size, 4 * 1024 * 1024);
        assert_eq!(buf.chunk_expand_ratio, 2.0);
        assert_eq!(buf.chunk_retention_time, Duration::from_millis(1000));
        assert!(!buf.ack_response_mode);

        let flusher = FlusherConfig::default();
        assert_eq!(flusher.flush_interval, Duration::from_millis(600));
        assert_eq!(flusher.wait_until_buffer_flushed, Duration::from_secs(60));
        assert_eq!(flusher.wait_until_terminated, Duration::from_secs(60));

        let sender = SenderConfig::default();
        assert_eq!(sender.host, "127.0.0.1");
        assert_eq!(sender.port, 24224);

        let retry = RetryConfig::default();
        assert_eq!(retry.max_retry_count, 7);
        assert_eq!(retry.base_interval, Duration::from_millis(400));
        assert_eq!(retry.max_interval, Duration::from_millis(30000));

        let fd = FailureDetectorConfig::default();
        assert_eq!(fd.failure_interval, Duration::from_millis(3000));
        assert_eq!(fd.phi_threshold, 16.0);
        assert_eq!(fd.heartbeat_interval, Duration::from_millis(1000));
    }

    #[test]
    fn struct_update_syntax_overrides_single_field() {
        let buf = BufferConfig {
            max_buffer_size: 256,
            ..Default::default()
        };
        assert_eq!(buf.max_buffer_size, 256);
        assert_eq!(buf.chunk_initial_size, 1024 * 1024);
    }
}
