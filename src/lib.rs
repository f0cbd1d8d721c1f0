//! # Flowline
//!
//! A client-side buffering, flushing, and sending pipeline for the
//! Fluentd Forward Protocol: producers hand structured records to an
//! [`Ingester`], which coalesces them into per-tag MessagePack chunks
//! under a shared byte budget and ships them to an upstream log
//! aggregator — retrying through a failure-aware, multi-endpoint
//! sender stack, with file-backed spill when every endpoint is down.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           PIPELINE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  producer                                                               │
//! │     │ emit_map / emit_map_at / emit_bytes                               │
//! │     ▼                                                                   │
//! │  ┌─────────────┐   append    ┌──────────────┐   seal    ┌────────────┐ │
//! │  │  ingester   │────────────►│    buffer    │──────────►│ spill (C6) │ │
//! │  │    (C8)     │             │ per-tag (C6) │           │  disk I/O  │ │
//! │  └──────┬──────┘             └──────┬───────┘           └────────────┘ │
//! │         │                           │ flush(sender)                    │
//! │         │ drives                    ▼                                  │
//! │  ┌──────▼──────┐             ┌──────────────┐                          │
//! │  │  flusher    │────────────►│ framing (C9) │                          │
//! │  │ periodic/   │             │ [tag, bytes, │                          │
//! │  │ sync  (C7)  │             │   options]   │                          │
//! │  └─────────────┘             └──────┬───────┘                          │
//! │                                     ▼                                  │
//! │                              ┌──────────────┐   backoff  ┌────────────┐│
//! │                              │ retry sender │───────────►│  terminal  ││
//! │                              │    (C5)      │            │ RetryOver  ││
//! │                              └──────┬───────┘            └────────────┘│
//! │                                     ▼                                  │
//! │                              ┌──────────────┐                          │
//! │                              │ multi sender │  round-robin, skipping   │
//! │                              │    (C4)      │  unavailable children    │
//! │                              └──────┬───────┘                          │
//! │                                     ▼                                  │
//! │                              ┌──────────────┐   heartbeat  ┌──────────┐│
//! │                              │ single sender│─────────────►│ φ-accrual││
//! │                              │    (C3)      │              │ detector ││
//! │                              └──────┬───────┘              │ (C1/C2)  ││
//! │                                     ▼                      └──────────┘│
//! │                                  upstream                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module map
//!
//! - [`ingester`] — the public `emit`/`flush`/`close` surface (C8)
//! - [`buffer`] — per-tag chunk buffer and file spill (C6)
//! - [`chunk`] — the growable per-tag byte region
//! - [`flusher`] — periodic and synchronous flush drivers (C7)
//! - [`sender`] — single, multi, and retryable senders (C3/C4/C5)
//! - [`failure_detector`] — φ-accrual detector and heartbeat probe (C1/C2)
//! - [`framing`] — the Forward wire format and ack tokens (C9)
//! - [`record`] — the serializer seam and `MsgpackMap` type
//! - [`event_time`] — seconds and `EventTime` timestamp encoding
//! - [`config`] — plain value-typed configuration structs
//! - [`error`] — the crate-wide error type
//!
//! ## Non-goals
//!
//! This crate does not attempt exactly-once delivery, does not
//! preserve ordering across a failover boundary, does not search or
//! transform buffered events, and has no server-side component. See
//! `DESIGN.md` in the repository root for the full list of decisions
//! and their grounding.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod error;
pub mod event_time;
pub mod failure_detector;
pub mod flusher;
pub mod framing;
pub mod ingester;
pub mod record;
pub mod sender;

pub use error::{Error, Result};
pub use event_time::Timestamp;
pub use ingester::{FlushMode, Ingester, IngesterConfig};
pub use record::{MsgpackMap, Serializer};

/// The crate's version, as declared in `Cargo.toml`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build metadata useful for diagnostics and bug reports.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version.
    pub version: &'static str,
    /// Build profile (`"debug"` or `"release"`).
    pub profile: &'static str,
}

/// Returns [`BuildInfo`] for the running binary.
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        profile: if cfg!(debug_assertions) { "debug" } else { "release" },
    }
}
