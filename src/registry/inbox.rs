//! Request/reply routing. Rather than creating a fresh subscription per
//! `request()` call, a single wildcard subscription on `_INBOX.<conn>.*` is
//! made once, and each request's unique token (the wildcard token) is
//! mapped to a `oneshot::Sender` waiting for the one reply that matches it.
//! This is the same "one registry, many waiters" shape as
//! `SubscriptionRegistry`, just keyed by a string token instead of a sid.

use std::sync::RwLock;

use fnv::FnvHashMap;
use tokio::sync::oneshot;

use crate::common::inbox_token;
use crate::error::{Error, Result};
use crate::protocol::InboundMessage;

pub struct Inbox {
    prefix: String,
    waiters: RwLock<FnvHashMap<String, oneshot::Sender<InboundMessage>>>,
}

impl Inbox {
    /// `conn_id` is a per-connection token mixed into the subject so that
    /// multiple `Connection`s sharing a process never collide on inbox
    /// subjects.
    pub fn new(conn_id: &str) -> Self {
        Inbox { prefix: format!("_INBOX.{}.", conn_id), waiters: RwLock::new(FnvHashMap::default()) }
    }

    /// The wildcard subject to `SUB` once: `_INBOX.<conn>.*`.
    pub fn wildcard_subject(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Allocates a fresh reply-to subject and registers a waiter for it,
    /// returning both so the caller can `PUB` with this reply-to and then
    /// await the returned receiver (optionally with a timeout).
    pub fn register(&self) -> (String, oneshot::Receiver<InboundMessage>) {
        let token = inbox_token();
        let subject = format!("{}{}", self.prefix, token);
        let (tx, rx) = oneshot::channel();
        self.waiters.write().expect("inbox lock poisoned").insert(token, tx);
        (subject, rx)
    }

    /// Routes a delivered inbox message to its waiter by extracting the
    /// token (the final subject segment) and completing the matching
    /// oneshot. Returns `Ok(false)` if the token has no registered waiter
    /// (already timed out, or a duplicate delivery).
    pub fn complete(&self, msg: InboundMessage) -> Result<bool> {
        let token = msg
            .subject
            .strip_prefix(&self.prefix)
            .ok_or_else(|| Error::protocol_error(format!("message subject {:?} doesn't match inbox prefix", msg.subject)))?
            .to_string();
        let waiter = self.waiters.write().expect("inbox lock poisoned").remove(&token);
        match waiter {
            Some(tx) => Ok(tx.send(msg).is_ok()),
            None => Ok(false),
        }
    }

    /// Drops a waiter that timed out, so it doesn't linger in the map
    /// forever if no reply ever arrives.
    pub fn cancel(&self, subject: &str) {
        if let Some(token) = subject.strip_prefix(&self.prefix) {
            self.waiters.write().expect("inbox lock poisoned").remove(token);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.read().expect("inbox lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn register_then_complete_delivers_to_waiter() {
        let inbox = Inbox::new("abc123");
        let (subject, mut rx) = inbox.register();
        let msg = InboundMessage { subject: subject.clone(), sid: 1, reply_to: None, headers: None, payload: Bytes::from("hi") };
        assert!(inbox.complete(msg).unwrap());
        let received = rx.try_recv().unwrap();
        assert_eq!(&received.payload[..], b"hi");
    }

    #[test]
    fn complete_for_unknown_token_is_not_an_error() {
        let inbox = Inbox::new("abc123");
        let msg = InboundMessage { subject: "_INBOX.abc123.deadbeef".to_string(), sid: 1, reply_to: None, headers: None, payload: Bytes::new() };
        assert!(!inbox.complete(msg).unwrap());
    }

    #[test]
    fn cancel_removes_pending_waiter() {
        let inbox = Inbox::new("abc123");
        let (subject, _rx) = inbox.register();
        assert_eq!(inbox.pending_count(), 1);
        inbox.cancel(&subject);
        assert_eq!(inbox.pending_count(), 0);
    }
}
