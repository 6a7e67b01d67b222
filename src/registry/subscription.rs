//! A single client-side subscription: the sid the server was told about via
//! `SUB`, the subject/queue group needed to replay that `SUB` after a
//! reconnect, and where delivered messages go.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::InboundMessage;
use crate::registry::{Inbox, PendingQueue};

/// Where a subscription's messages are delivered: either the push
/// subscriber's own bounded queue, or the shared request/reply `Inbox`, for
/// the one wildcard subscription `Connection::request` sets up lazily.
pub enum Dispatcher {
    Channel(Arc<PendingQueue>),
    Inbox(Arc<Inbox>),
}

/// What happened when a message was handed to a subscription's dispatcher.
pub enum SubDispatch {
    Delivered,
    /// The push subscriber's pending queue was full; the oldest message was
    /// dropped to make room for this one (SPEC_FULL.md 4.E).
    SlowConsumer,
}

pub struct Subscription {
    pub sid: u64,
    pub subject: String,
    pub queue_group: Option<String>,
    dispatcher: Dispatcher,
    /// `Some(n)` once `unsubscribe(Some(n))` is called: after `n` more
    /// deliveries the subscription auto-removes itself (SPEC_FULL.md §4.E).
    max_msgs: Option<u64>,
    delivered: AtomicU64,
}

impl Subscription {
    pub fn new(sid: u64, subject: String, queue_group: Option<String>, dispatcher: Dispatcher) -> Self {
        Subscription { sid, subject, queue_group, dispatcher, max_msgs: None, delivered: AtomicU64::new(0) }
    }

    pub fn set_max_msgs(&mut self, max_msgs: Option<u64>) {
        self.max_msgs = max_msgs;
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// True once this subscription has delivered its configured
    /// `max_msgs` and should be dropped from the registry.
    pub fn is_exhausted(&self) -> bool {
        self.max_msgs.is_some_and(|max| self.delivered_count() >= max)
    }

    /// Hands `msg` to the subscriber without blocking. A full push queue
    /// never rejects the delivery outright: it drops its oldest pending
    /// message and reports `SlowConsumer` so the caller can surface that to
    /// the error listener, leaving the subscription itself intact.
    pub fn dispatch(&self, msg: InboundMessage) -> Result<SubDispatch> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        match &self.dispatcher {
            Dispatcher::Channel(queue) => {
                Ok(if queue.push(msg) { SubDispatch::SlowConsumer } else { SubDispatch::Delivered })
            }
            Dispatcher::Inbox(inbox) => inbox.complete(msg).map(|_| SubDispatch::Delivered),
        }
    }

    /// Closes the subscriber's delivery queue, if it has one, so a pending
    /// `Subscriber::next()` wakes with `None` instead of hanging once this
    /// subscription is removed from the registry.
    pub fn close(&self) {
        if let Dispatcher::Channel(queue) = &self.dispatcher {
            queue.close();
        }
    }
}
