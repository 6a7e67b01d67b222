//! Component G: the public connection handle. Owns the supervisor task and
//! exposes the operations SPEC_FULL.md §4.G calls for — the rest of the
//! crate (A-F) exists to make these five methods behave correctly across
//! reconnects.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::common::AtomicCell;
use crate::config::Options;
use crate::connection::events::{ErrorBus, EventBus};
use crate::connection::state::{ConnectionState, Event};
use crate::connection::supervisor::{self, Shared, SupervisorSignal};
use crate::error::{Error, Result};
use crate::pool::{EndpointPool, Reconnector, ReconnectBuffer};
use crate::protocol::{HeaderBlock, InboundMessage, OutboundMsg};
use crate::queue::WriteQueue;
use crate::registry::{Dispatcher, Inbox, PendingQueue, Subscription, SubscriptionRegistry};

/// A handle to one subscription's delivery queue, returned by
/// `Connection::subscribe`.
pub struct Subscriber {
    sid: u64,
    subject: String,
    queue: Arc<PendingQueue>,
}

impl Subscriber {
    pub fn sid(&self) -> u64 {
        self.sid
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub async fn next(&mut self) -> Option<InboundMessage> {
        self.queue.recv().await
    }
}

pub struct Connection {
    shared: Arc<Shared>,
    control_tx: mpsc::Sender<SupervisorSignal>,
    supervisor: AsyncMutex<Option<JoinHandle<()>>>,
    default_pending_capacity: usize,
}

impl Connection {
    /// Dials the configured endpoint pool and waits for the first successful
    /// handshake before returning. Ongoing reconnects after that happen in
    /// the background; callers observe them via `events()`.
    pub async fn connect(options: Options) -> Result<Self> {
        if options.servers.is_empty() {
            return Err(Error::no_servers());
        }
        let pool = EndpointPool::new(options.servers.clone(), !options.no_randomize);
        let reconnector = Reconnector::new(pool, &options);
        let queue = Arc::new(WriteQueue::new(&options));
        let registry = Arc::new(SubscriptionRegistry::new());
        let inbox = Arc::new(Inbox::new(&crate::common::inbox_token()));
        let reconnect_buffer = ReconnectBuffer::new(options.reconnect_buffer_size);
        let default_pending_capacity = options.max_pending_msgs.unwrap_or(65_536);

        let shared = Arc::new(Shared {
            state: AtomicCell::new(ConnectionState::Disconnected),
            reconnector,
            queue,
            registry,
            inbox,
            reconnect_buffer,
            events: EventBus::default(),
            errors: ErrorBus::default(),
            ping_waiters: std::sync::Mutex::new(std::collections::VecDeque::new()),
            server_info: std::sync::Mutex::new(None),
            inbox_subscribed: std::sync::Mutex::new(false),
            options,
        });

        let (control_tx, control_rx) = mpsc::channel(8);
        let (initial_tx, initial_rx) = oneshot::channel();
        let handle = tokio::spawn(supervisor::run(shared.clone(), control_rx, initial_tx));

        match initial_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::closed()),
        }

        Ok(Connection { shared, control_tx, supervisor: AsyncMutex::new(Some(handle)), default_pending_capacity })
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// Non-fatal conditions reported out-of-band: slow consumers and
    /// non-fatal server `-ERR` lines.
    pub fn errors(&self) -> broadcast::Receiver<Arc<Error>> {
        self.shared.errors.subscribe()
    }

    fn check_open(&self) -> Result<()> {
        if self.shared.state.load() == ConnectionState::Closed {
            Err(Error::closed())
        } else {
            Ok(())
        }
    }

    async fn enqueue_publish(&self, msg: OutboundMsg) -> Result<()> {
        self.check_open()?;
        match self.shared.state.load() {
            ConnectionState::Connected => {
                if self.shared.queue.push(msg).await? {
                    Ok(())
                } else {
                    Err(Error::message_discarded())
                }
            }
            ConnectionState::Closed => Err(Error::closed()),
            _ => self.shared.reconnect_buffer.push(msg),
        }
    }

    pub async fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> Result<()> {
        crate::common::validate_subject(subject)?;
        self.enqueue_publish(OutboundMsg::new_pub(subject, None, payload.into(), false)).await
    }

    pub async fn publish_with_reply(&self, subject: &str, reply_to: &str, payload: impl Into<Bytes>) -> Result<()> {
        crate::common::validate_subject(subject)?;
        crate::common::validate_subject(reply_to)?;
        self.enqueue_publish(OutboundMsg::new_pub(subject, Some(reply_to), payload.into(), false)).await
    }

    pub async fn publish_with_headers(
        &self,
        subject: &str,
        reply_to: Option<&str>,
        headers: HeaderBlock,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        crate::common::validate_subject(subject)?;
        let payload = payload.into();
        let encoded_headers = headers.encode();
        self.enqueue_publish(OutboundMsg::new_hpub(subject, reply_to, encoded_headers, payload, false)).await
    }

    pub async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<Subscriber> {
        self.check_open()?;
        crate::common::validate_subject(subject)?;
        let sid = self.shared.registry.next_sid();
        let queue = Arc::new(PendingQueue::new(Some(self.default_pending_capacity), self.shared.options.max_pending_bytes));
        let sub = Subscription::new(sid, subject.to_string(), queue_group.map(str::to_string), Dispatcher::Channel(queue.clone()));
        self.shared.registry.insert(sub);
        self.shared.queue.push_internal(OutboundMsg::new_sub(subject, queue_group, sid))?;
        Ok(Subscriber { sid, subject: subject.to_string(), queue })
    }

    pub async fn unsubscribe(&self, subscriber: &Subscriber, max_msgs: Option<u64>) -> Result<()> {
        self.check_open()?;
        self.shared.queue.push_internal(OutboundMsg::new_unsub(subscriber.sid, max_msgs))?;
        match max_msgs {
            Some(n) => self.shared.registry.set_max_msgs(subscriber.sid, Some(n)),
            None => {
                self.shared.registry.remove(subscriber.sid);
            }
        }
        Ok(())
    }

    /// Ensures the shared wildcard inbox subscription exists, subscribing
    /// lazily on the first `request()` call rather than at `connect()` time.
    async fn ensure_inbox_subscribed(&self) -> Result<()> {
        let mut subscribed = self.shared.inbox_subscribed.lock().expect("inbox_subscribed lock poisoned");
        if *subscribed {
            return Ok(());
        }
        let sid = self.shared.registry.next_sid();
        let subject = self.shared.inbox.wildcard_subject();
        let sub = Subscription::new(sid, subject.clone(), None, Dispatcher::Inbox(self.shared.inbox.clone()));
        self.shared.registry.insert(sub);
        self.shared.queue.push_internal(OutboundMsg::new_sub(&subject, None, sid))?;
        *subscribed = true;
        Ok(())
    }

    pub async fn request(&self, subject: &str, payload: impl Into<Bytes>, timeout: Duration) -> Result<InboundMessage> {
        self.check_open()?;
        crate::common::validate_subject(subject)?;
        self.ensure_inbox_subscribed().await?;
        let (reply_to, receiver) = self.shared.inbox.register();
        self.enqueue_publish(OutboundMsg::new_pub(subject, Some(&reply_to), payload.into(), false)).await?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(Error::closed()),
            Err(_) => {
                self.shared.inbox.cancel(&reply_to);
                Err(Error::timeout(timeout))
            }
        }
    }

    /// Round-trips a `PING`/`PONG` to confirm every message enqueued before
    /// this call has actually been written to the transport.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.check_open()?;
        let (tx, rx) = oneshot::channel();
        self.shared.send_ping(Some(tx))?;
        tokio::time::timeout(timeout, rx).await.map_err(|_| Error::timeout(timeout))?.map_err(|_| Error::closed())
    }

    /// Stops accepting new publishes, waits for the outgoing queue to empty,
    /// then closes the connection without reconnecting.
    pub async fn drain(&self) -> Result<()> {
        self.check_open()?;
        let (tx, rx) = oneshot::channel();
        self.control_tx.send(SupervisorSignal::Drain(tx)).await.map_err(|_| Error::closed())?;
        rx.await.map_err(|_| Error::closed())?;
        self.join_supervisor().await;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        let _ = self.control_tx.send(SupervisorSignal::Shutdown).await;
        self.join_supervisor().await;
        Ok(())
    }

    async fn join_supervisor(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            let _ = handle.await;
        }
    }
}
