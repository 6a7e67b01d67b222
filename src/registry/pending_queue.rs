//! Bounded per-subscription delivery queue for push dispatch (component E).
//! Grounded on `queue::WriteQueue`'s `Mutex<VecDeque>` + `Notify` shape,
//! adapted so the producer (`Subscription::dispatch`) can evict the oldest
//! pending message in place instead of blocking or rejecting the newest one:
//! SPEC_FULL.md's slow-consumer policy drops oldest on overflow rather than
//! discarding the new delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::protocol::InboundMessage;

struct Inner {
    messages: VecDeque<InboundMessage>,
    bytes: usize,
    closed: bool,
}

pub struct PendingQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    max_messages: Option<usize>,
    max_bytes: Option<usize>,
    dropped: AtomicU64,
}

impl PendingQueue {
    pub fn new(max_messages: Option<usize>, max_bytes: Option<usize>) -> Self {
        PendingQueue {
            inner: Mutex::new(Inner { messages: VecDeque::new(), bytes: 0, closed: false }),
            notify: Notify::new(),
            max_messages,
            max_bytes,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues `msg`, evicting the oldest pending message first for as long
    /// as the configured message/byte cap would otherwise be exceeded.
    /// Returns `true` if an older message had to be dropped to make room.
    pub fn push(&self, msg: InboundMessage) -> bool {
        let mut inner = self.inner.lock().expect("pending queue lock poisoned");
        if inner.closed {
            return false;
        }
        let len = msg.encoded_len();
        let mut dropped_any = false;
        while !inner.messages.is_empty()
            && (self.max_messages.is_some_and(|m| inner.messages.len() >= m)
                || self.max_bytes.is_some_and(|b| inner.bytes + len > b))
        {
            if let Some(old) = inner.messages.pop_front() {
                inner.bytes -= old.encoded_len();
                dropped_any = true;
            }
        }
        inner.bytes += len;
        inner.messages.push_back(msg);
        if dropped_any {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        dropped_any
    }

    /// Total number of messages ever dropped to make room for a newer one.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Marks the queue closed and wakes any pending `recv`, which then
    /// returns `None` once drained.
    pub fn close(&self) {
        self.inner.lock().expect("pending queue lock poisoned").closed = true;
        self.notify.notify_waiters();
    }

    pub async fn recv(&self) -> Option<InboundMessage> {
        loop {
            {
                let mut inner = self.inner.lock().expect("pending queue lock poisoned");
                if let Some(msg) = inner.messages.pop_front() {
                    inner.bytes -= msg.encoded_len();
                    return Some(msg);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn msg(payload: &str) -> InboundMessage {
        InboundMessage { subject: "foo".to_string(), sid: 1, reply_to: None, headers: None, payload: Bytes::from(payload.to_string()) }
    }

    #[tokio::test]
    async fn push_then_recv_round_trips() {
        let queue = PendingQueue::new(Some(8), None);
        assert!(!queue.push(msg("a")));
        let received = queue.recv().await.unwrap();
        assert_eq!(&received.payload[..], b"a");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_instead_of_rejecting_newest() {
        let queue = PendingQueue::new(Some(2), None);
        queue.push(msg("a"));
        queue.push(msg("b"));
        assert!(queue.push(msg("c")));
        assert_eq!(queue.dropped_count(), 1);
        let first = queue.recv().await.unwrap();
        assert_eq!(&first.payload[..], b"b");
        let second = queue.recv().await.unwrap();
        assert_eq!(&second.payload[..], b"c");
    }

    #[tokio::test]
    async fn byte_cap_evicts_until_new_message_fits() {
        let queue = PendingQueue::new(None, Some(2));
        queue.push(msg("a"));
        queue.push(msg("bb"));
        let first = queue.recv().await.unwrap();
        assert_eq!(&first.payload[..], b"bb");
    }

    #[tokio::test]
    async fn closed_queue_drains_then_returns_none() {
        let queue = PendingQueue::new(Some(8), None);
        queue.push(msg("a"));
        queue.close();
        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
        assert!(!queue.push(msg("b")));
    }
}
