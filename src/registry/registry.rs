//! Component E: the SID registry. Grounded on `riverdb::pg::client::ClientConn`'s
//! `FnvHashMap` keyed lookup table, generalized from "map a backend id to a
//! client connection" to "map a locally-assigned subscription id to a
//! `Subscription`." fnv's non-cryptographic hash is a good fit for both:
//! keys are small integers assigned by us, not attacker-controlled input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use fnv::FnvHashMap;

use crate::error::Result;
use crate::protocol::InboundMessage;
use crate::registry::subscription::SubDispatch;
use crate::registry::Subscription;

/// What `SubscriptionRegistry::dispatch` did with an inbound message.
pub enum DispatchOutcome {
    /// No subscription is registered for this sid (the server can race an
    /// UNSUB that is still in flight).
    Unknown,
    Delivered,
    /// The target subscription's pending queue overflowed and dropped its
    /// oldest message; the subscription itself was not removed.
    SlowConsumer { sid: u64 },
}

pub struct SubscriptionRegistry {
    subs: RwLock<FnvHashMap<u64, Subscription>>,
    next_sid: AtomicU64,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        SubscriptionRegistry { subs: RwLock::new(FnvHashMap::default()), next_sid: AtomicU64::new(1) }
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sid(&self) -> u64 {
        self.next_sid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, sub: Subscription) {
        self.subs.write().expect("registry lock poisoned").insert(sub.sid, sub);
    }

    /// Marks a subscription for auto-removal after `max_msgs` further
    /// deliveries, used by `unsubscribe(sid, Some(n))`. No-op if the sid is
    /// already gone.
    pub fn set_max_msgs(&self, sid: u64, max_msgs: Option<u64>) {
        if let Some(sub) = self.subs.write().expect("registry lock poisoned").get_mut(&sid) {
            sub.set_max_msgs(max_msgs);
        }
    }

    pub fn remove(&self, sid: u64) -> Option<Subscription> {
        let removed = self.subs.write().expect("registry lock poisoned").remove(&sid);
        if let Some(sub) = &removed {
            sub.close();
        }
        removed
    }

    pub fn contains(&self, sid: u64) -> bool {
        self.subs.read().expect("registry lock poisoned").contains_key(&sid)
    }

    pub fn len(&self) -> usize {
        self.subs.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes a delivered message to its subscription by sid. A slow
    /// consumer drops its oldest pending message rather than tearing the
    /// subscription down; only a genuine dispatch error (not a full queue)
    /// removes it.
    pub fn dispatch(&self, msg: InboundMessage) -> Result<DispatchOutcome> {
        let sid = msg.sid;
        let result = {
            let subs = self.subs.read().expect("registry lock poisoned");
            subs.get(&sid).map(|sub| sub.dispatch(msg))
        };
        match result {
            None => Ok(DispatchOutcome::Unknown),
            Some(Ok(SubDispatch::Delivered)) => {
                let exhausted = self.subs.read().expect("registry lock poisoned").get(&sid).is_some_and(|s| s.is_exhausted());
                if exhausted {
                    self.remove(sid);
                }
                Ok(DispatchOutcome::Delivered)
            }
            Some(Ok(SubDispatch::SlowConsumer)) => Ok(DispatchOutcome::SlowConsumer { sid }),
            Some(Err(e)) => {
                self.remove(sid);
                Err(e)
            }
        }
    }

    /// Snapshot of `(sid, subject, queue_group)` for every live subscription,
    /// used by the Reconnector to replay `SUB` after reconnecting.
    pub fn snapshot_for_resubscribe(&self) -> Vec<(u64, String, Option<String>)> {
        self.subs
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|s| (s.sid, s.subject.clone(), s.queue_group.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Dispatcher, PendingQueue};
    use bytes::Bytes;
    use std::sync::Arc;

    fn msg(sid: u64) -> InboundMessage {
        InboundMessage { subject: "foo".to_string(), sid, reply_to: None, headers: None, payload: Bytes::new() }
    }

    #[tokio::test]
    async fn dispatch_routes_to_matching_sid() {
        let registry = SubscriptionRegistry::new();
        let queue = Arc::new(PendingQueue::new(Some(8), None));
        let sid = registry.next_sid();
        registry.insert(Subscription::new(sid, "foo".to_string(), None, Dispatcher::Channel(queue.clone())));
        assert!(matches!(registry.dispatch(msg(sid)).unwrap(), DispatchOutcome::Delivered));
        assert!(queue.recv().await.is_some());
    }

    #[test]
    fn dispatch_to_unknown_sid_is_not_an_error() {
        let registry = SubscriptionRegistry::new();
        assert!(matches!(registry.dispatch(msg(999)).unwrap(), DispatchOutcome::Unknown));
    }

    #[tokio::test]
    async fn slow_consumer_overflow_keeps_subscription_registered() {
        let registry = SubscriptionRegistry::new();
        let queue = Arc::new(PendingQueue::new(Some(1), None));
        let sid = registry.next_sid();
        registry.insert(Subscription::new(sid, "foo".to_string(), None, Dispatcher::Channel(queue.clone())));
        registry.dispatch(msg(sid)).unwrap();
        assert!(matches!(registry.dispatch(msg(sid)).unwrap(), DispatchOutcome::SlowConsumer { .. }));
        assert!(registry.contains(sid));
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn exhausted_subscription_is_removed_after_delivery() {
        let registry = SubscriptionRegistry::new();
        let queue = Arc::new(PendingQueue::new(Some(8), None));
        let sid = registry.next_sid();
        let mut sub = Subscription::new(sid, "foo".to_string(), None, Dispatcher::Channel(queue));
        sub.set_max_msgs(Some(1));
        registry.insert(sub);
        registry.dispatch(msg(sid)).unwrap();
        assert!(!registry.contains(sid));
    }
}
