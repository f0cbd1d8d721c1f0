//! # Error Handling
//!
//! A single error type for the whole pipeline, grouped by the subsystem
//! that raises it.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error                                                                  │
//! │  │                                                                      │
//! │  ├── BufferFull        - producer backpressure (C6)                    │
//! │  ├── TransientIo       - socket write/read failure (C3)                │
//! │  ├── AckMismatch       - upstream echoed the wrong chunk id (C3/C9)    │
//! │  ├── AckTimeout        - no ack within readTimeoutMilli (C3)           │
//! │  ├── RetryOver         - terminal, all retries exhausted (C5)          │
//! │  ├── NoAvailableSender - every child sender reported unavailable (C4)  │
//! │  ├── NonRetryable      - programmer error: bad tag, bad config         │
//! │  ├── Interrupted       - a blocking wait was cancelled                 │
//! │  ├── Encode / Decode   - MessagePack (de)serialization failure         │
//! │  └── Io                - filesystem error (spill files)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for every fallible operation in the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The global byte budget would be exceeded and an opportunistic
    /// flush did not free enough space. Producer backpressure — the
    /// caller may retry after the flusher drains space.
    #[error("buffer full: tag {tag:?} attempted to append {attempted} bytes")]
    BufferFull {
        /// Tag of the event that could not be appended.
        tag: String,
        /// Size of the encoded event that did not fit.
        attempted: usize,
    },

    /// A socket write or read failed.
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    /// The ack response echoed a different chunk id than was sent.
    #[error("ack mismatch: expected {expected}, got {got}")]
    AckMismatch {
        /// Base64 chunk id we expected to see echoed back.
        expected: String,
        /// Base64 chunk id actually observed.
        got: String,
    },

    /// No ack arrived within `read_timeout`.
    #[error("ack timed out")]
    AckTimeout,

    /// The retry strategy exhausted `max_retry_count` attempts.
    #[error("retry exhausted after {attempts} attempts: {last}")]
    RetryOver {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<Error>,
    },

    /// A multi-sender had no available child to try.
    #[error("no available sender")]
    NoAvailableSender,

    /// A caller-facing programmer error (invalid tag, invalid config).
    /// Never retried.
    #[error("non-retryable error: {0}")]
    NonRetryable(String),

    /// A blocking wait was interrupted; the buffer remains consistent.
    #[error("operation interrupted")]
    Interrupted,

    /// Failed to MessagePack-encode a record or frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to MessagePack-decode an ack response.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Whether this error represents a condition the retry layer (C5)
    /// should retry, as opposed to a terminal or caller-facing error.
    ///
    /// Mirrors the propagation policy in the pipeline's error handling
    /// design: `TransientIo`, `AckMismatch`, and `AckTimeout` are
    /// recoverable by retrying the send; everything else is either
    /// already terminal (`RetryOver`) or not the retry layer's concern
    /// (`BufferFull`, `NonRetryable`, `Interrupted`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientIo(_) | Error::AckMismatch { .. } | Error::AckTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_io_and_ack_errors_are_retryable() {
        assert!(Error::TransientIo(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_retryable());
        assert!(Error::AckTimeout.is_retryable());
        assert!(Error::AckMismatch {
            expected: "a".into(),
            got: "b".into()
        }
        .is_retryable());
    }

    #[test]
    fn buffer_full_and_terminal_errors_are_not_retryable() {
        assert!(!Error::BufferFull {
            tag: "t".into(),
            attempted: 10
        }
        .is_retryable());
        assert!(!Error::NonRetryable("bad config".into()).is_retryable());
        assert!(!Error::Interrupted.is_retryable());
        assert!(!Error::RetryOver {
            attempts: 3,
            last: Box::new(Error::AckTimeout)
        }
        .is_retryable());
    }

    #[test]
    fn encode_and_decode_errors_are_not_retryable() {
        assert!(!Error::Encode("bad map".into()).is_retryable());
        assert!(!Error::Decode("truncated".into()).is_retryable());
    }

    #[test]
    fn retry_over_displays_attempt_count_and_cause() {
        let err = Error::RetryOver {
            attempts: 7,
            last: Box::new(Error::AckTimeout),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("ack timed out"));
    }
}
