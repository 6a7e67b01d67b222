//! Reconnect buffer: a FIFO of user publishes held while the connection is
//! not CONNECTED, per SPEC_FULL.md §4.F. Grounded on the
//! `Mutex<VecDeque<Bytes>>` backlog in `riverdb::pg::connection::Connection`
//! (`write_or_buffer`/`write_backlog`), generalized from "buffer until the
//! socket is writable" to "buffer until the transport is reconnected", with
//! an explicit byte budget instead of unbounded growth.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::OutboundMsg;

pub struct ReconnectBuffer {
    inner: Mutex<Inner>,
    /// Bytes held for user publishes while disconnected. 0 disables
    /// buffering outright; negative-as-sentinel "unlimited" is represented
    /// as `None`.
    limit: Option<usize>,
}

struct Inner {
    messages: VecDeque<OutboundMsg>,
    bytes: usize,
}

impl ReconnectBuffer {
    /// `limit_bytes`: `Some(0)` disables buffering, `None` is unlimited,
    /// `Some(n)` bounds aggregate buffered bytes to `n`.
    pub fn new(limit_bytes: Option<usize>) -> Self {
        ReconnectBuffer {
            inner: Mutex::new(Inner { messages: VecDeque::new(), bytes: 0 }),
            limit: limit_bytes,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.limit == Some(0)
    }

    /// Appends `msg` unless doing so would exceed the configured limit, in
    /// which case it fails synchronously with `IllegalState` and leaves
    /// previously-buffered messages untouched (SPEC_FULL.md §8 invariant).
    pub fn push(&self, msg: OutboundMsg) -> Result<()> {
        if self.is_disabled() {
            return Err(Error::illegal_state("reconnect buffering is disabled (reconnect_buffer_size = 0)"));
        }
        let mut inner = self.inner.lock().unwrap();
        let added = msg.encoded_len();
        if let Some(limit) = self.limit {
            if inner.bytes + added > limit {
                return Err(Error::illegal_state(format!(
                    "reconnect buffer would exceed {} byte limit",
                    limit
                )));
            }
        }
        inner.bytes += added;
        inner.messages.push_back(msg);
        Ok(())
    }

    /// Drains the buffer in FIFO order, for splicing onto the reconnect
    /// queue ahead of further user publishes (SPEC_FULL.md §4.F step 3).
    pub fn drain(&self) -> Vec<OutboundMsg> {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes = 0;
        inner.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
