//! # Sender stack
//!
//! The capability-contract a sealed chunk is handed off to: a single
//! TCP sender (C3), a round-robin multi-sender over several of those
//! (C4), and a retry wrapper (C5) that can sit in front of either.
//!
//! Polymorphism is done with a plain async trait rather than a
//! Builder/Instantiator hierarchy: anything implementing `Sender` can
//! be composed under `RetrySender` or listed inside `MultiSender`.

mod multi;
mod retry;
mod single;

pub use multi::MultiSender;
pub use retry::RetrySender;
pub use single::SingleSender;

use async_trait::async_trait;

use crate::error::Result;

/// A framed request ready to go on the wire: the 3-element Forward
/// array, already MessagePack-encoded, plus the ack token expected
/// back if `ack` is `Some`.
pub struct Frame {
    /// The encoded `[tag, payload, options]` array.
    pub bytes: Vec<u8>,
    /// Base64 chunk id to verify against the ack response, if the
    /// buffer is running in ack mode.
    pub ack_token: Option<String>,
}

/// The capability every sender in the stack exposes. Single, multi,
/// and retry senders all implement it, so they compose freely.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Write `frame` to the upstream, awaiting and verifying its ack
    /// token first if `frame.ack_token` is set.
    async fn send(&self, frame: &Frame) -> Result<()>;

    /// Whether this sender currently believes its upstream (or, for a
    /// multi-sender, at least one child) is reachable.
    fn is_available(&self) -> bool;

    /// Release any held connection/resources. Idempotent.
    async fn close(&self);
}
