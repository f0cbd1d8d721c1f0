//! # Multi sender (C4)
//!
//! Round-robins a frame across an ordered list of child senders,
//! skipping any that report themselves unavailable, and surfaces the
//! last error if every child is unavailable or every attempt fails.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{Frame, Sender};

/// A sender that fans out to a fixed list of children, advancing a
/// round-robin hint on every call so load (and failover) spreads
/// evenly rather than always preferring the first child.
pub struct MultiSender {
    children: Vec<Box<dyn Sender>>,
    next_hint: AtomicUsize,
}

impl MultiSender {
    /// Build a multi-sender over `children`, tried starting from index
    /// 0 and advancing round-robin on each subsequent call.
    pub fn new(children: Vec<Box<dyn Sender>>) -> Self {
        Self {
            children,
            next_hint: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Sender for MultiSender {
    async fn send(&self, frame: &Frame) -> Result<()> {
        if self.children.is_empty() {
            return Err(Error::NoAvailableSender);
        }

        let start = self.next_hint.fetch_add(1, Ordering::SeqCst) % self.children.len();
        let mut last_err: Option<Error> = None;
        let mut tried_any = false;

        for offset in 0..self.children.len() {
            let idx = (start + offset) % self.children.len();
            let child = &self.children[idx];
            if !child.is_available() {
                continue;
            }
            tried_any = true;
            match child.send(frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(child = idx, error = %e, "multi sender child failed");
                    last_err = Some(e);
                }
            }
        }

        if !tried_any {
            return Err(Error::NoAvailableSender);
        }
        Err(last_err.unwrap_or(Error::NoAvailableSender))
    }

    fn is_available(&self) -> bool {
        self.children.iter().any(|c| c.is_available())
    }

    async fn close(&self) {
        for child in &self.children {
            child.close().await;
        }
    }
}
