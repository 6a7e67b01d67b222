//! Component C: the primary write queue that `Connection::publish` (and
//! friends) push onto, and that the Writer (Component D) drains in batches.
//!
//! Grounded on `riverdb::pg::connection::Connection::write_or_buffer`'s
//! `Mutex<VecDeque<Bytes>>` backlog, generalized in two ways: the teacher's
//! backlog exists purely for backpressure (data it couldn't write
//! immediately), whereas this queue is the *only* path data takes on the way
//! out, so it needs its own overflow policy (SPEC_FULL.md §4.C); and instead
//! of polling `try_write_backlog` from the same task that calls
//! `write_or_buffer`, producer and consumer here run on different tasks and
//! hand off via `tokio::sync::Notify`, the same primitive
//! `riverdb::common::spsc::SpscQueue` uses for its full/empty waits.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::config::{DiscardPolicy, Options};
use crate::error::Result;
use crate::protocol::OutboundMsg;

struct Inner {
    messages: VecDeque<OutboundMsg>,
    bytes: usize,
    paused: bool,
}

pub struct WriteQueue {
    inner: Mutex<Inner>,
    notify_nonempty: Notify,
    notify_drained: Notify,
    max_messages: Option<usize>,
    max_bytes: Option<usize>,
    discard_policy: DiscardPolicy,
}

impl WriteQueue {
    pub fn new(options: &Options) -> Self {
        WriteQueue {
            inner: Mutex::new(Inner { messages: VecDeque::new(), bytes: 0, paused: false }),
            notify_nonempty: Notify::new(),
            notify_drained: Notify::new(),
            max_messages: options.max_messages_in_outgoing_queue,
            max_bytes: options.max_bytes_in_outgoing_queue,
            discard_policy: options.discard_messages_when_outgoing_queue_full,
        }
    }

    fn is_full(&self, inner: &Inner) -> bool {
        self.max_messages.is_some_and(|m| inner.messages.len() >= m)
            || self.max_bytes.is_some_and(|b| inner.bytes >= b)
    }

    /// Enqueues a user-originated message, subject to the configured
    /// overflow policy. Returns `Ok(false)` if the message was dropped
    /// under `DiscardPolicy::DiscardNew`; `Ok(true)` otherwise.
    pub async fn push(&self, msg: OutboundMsg) -> Result<bool> {
        loop {
            {
                let mut inner = self.inner.lock()?;
                if !self.is_full(&inner) {
                    self.enqueue_locked(&mut inner, msg);
                    self.notify_nonempty.notify_one();
                    return Ok(true);
                }
                if self.discard_policy == DiscardPolicy::DiscardNew {
                    return Ok(false);
                }
            }
            self.notify_drained.notified().await;
        }
    }

    /// Enqueues internal protocol traffic (CONNECT, SUB/UNSUB replay,
    /// PING/PONG), bypassing the overflow policy entirely (SPEC_FULL.md
    /// §4.C: control traffic must never be discarded).
    pub fn push_internal(&self, msg: OutboundMsg) -> Result<()> {
        let mut inner = self.inner.lock()?;
        self.enqueue_locked(&mut inner, msg);
        self.notify_nonempty.notify_one();
        Ok(())
    }

    fn enqueue_locked(&self, inner: &mut Inner, msg: OutboundMsg) {
        inner.bytes += msg.encoded_len();
        inner.messages.push_back(msg);
    }

    /// Waits until at least one message is available and the queue is not
    /// paused, then drains up to `max_count` messages or `max_bytes` bytes,
    /// whichever comes first (always taking at least one message so the
    /// Writer makes progress).
    pub async fn accumulate(&self, max_count: usize, max_bytes: usize) -> Vec<OutboundMsg> {
        loop {
            {
                let mut inner = self.inner.lock().expect("write queue lock poisoned");
                if !inner.paused && !inner.messages.is_empty() {
                    let mut batch = Vec::new();
                    let mut taken_bytes = 0usize;
                    while let Some(front) = inner.messages.front() {
                        let len = front.encoded_len();
                        if !batch.is_empty() && (batch.len() >= max_count || taken_bytes + len > max_bytes) {
                            break;
                        }
                        let msg = inner.messages.pop_front().unwrap();
                        taken_bytes += len;
                        inner.bytes -= len;
                        batch.push(msg);
                    }
                    if !batch.is_empty() {
                        self.notify_drained.notify_waiters();
                        return batch;
                    }
                }
            }
            self.notify_nonempty.notified().await;
        }
    }

    /// Stops the Writer from draining further batches, used while the
    /// transport is disconnected so in-flight publishes accumulate for
    /// replay rather than racing a dead socket.
    pub fn pause(&self) {
        self.inner.lock().expect("write queue lock poisoned").paused = true;
    }

    pub fn resume(&self) {
        self.inner.lock().expect("write queue lock poisoned").paused = false;
        self.notify_nonempty.notify_waiters();
    }

    /// Drops queued messages for which `predicate` returns false, used to
    /// discard stale keepalive PINGs queued before a reconnect.
    pub fn retain(&self, predicate: impl Fn(&OutboundMsg) -> bool) {
        let mut inner = self.inner.lock().expect("write queue lock poisoned");
        let mut kept_bytes = 0usize;
        inner.messages.retain(|m| {
            let keep = predicate(m);
            if keep {
                kept_bytes += m.encoded_len();
            }
            keep
        });
        inner.bytes = kept_bytes;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("write queue lock poisoned").messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pub_msg() -> OutboundMsg {
        OutboundMsg::new_pub("foo", None, Bytes::from("x"), false)
    }

    #[tokio::test]
    async fn push_then_accumulate_round_trips() {
        let queue = WriteQueue::new(&Options::default());
        queue.push(pub_msg()).await.unwrap();
        queue.push(pub_msg()).await.unwrap();
        let batch = queue.accumulate(10, 1 << 20).await;
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn discard_new_drops_once_message_cap_reached() {
        let mut options = Options::default();
        options.max_messages_in_outgoing_queue = Some(1);
        options.discard_messages_when_outgoing_queue_full = DiscardPolicy::DiscardNew;
        let queue = WriteQueue::new(&options);
        assert!(queue.push(pub_msg()).await.unwrap());
        assert!(!queue.push(pub_msg()).await.unwrap());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn paused_queue_withholds_batches_until_resumed() {
        let queue = WriteQueue::new(&Options::default());
        queue.pause();
        queue.push_internal(pub_msg()).unwrap();
        let accumulate = queue.accumulate(10, 1 << 20);
        tokio::pin!(accumulate);
        assert!(futures::poll!(&mut accumulate).is_pending());
        queue.resume();
        let batch = accumulate.await;
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn retain_drops_stale_pings() {
        let queue = WriteQueue::new(&Options::default());
        queue.push_internal(OutboundMsg::new_ping()).unwrap();
        queue.push_internal(pub_msg()).unwrap();
        queue.retain(|m| !m.is_ping());
        assert_eq!(queue.len(), 1);
    }
}
