//! The background task that owns the reconnect loop: dial, handshake,
//! resubscribe, flush the reconnect buffer, then run the steady-state
//! read/write/keepalive loop until the transport fails or the caller asks
//! to shut down.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::common::AtomicCell;
use crate::config::Options;
use crate::connection::events::{ErrorBus, EventBus};
use crate::connection::state::{ConnectionState, Event};
use crate::error::{Error, ErrorKind, Result};
use crate::pool::{Endpoint, Reconnector, ReconnectBuffer, Scheme};
use crate::protocol::{ConnectOp, LineReader, OutboundMsg, ServerInfo, ServerOp};
use crate::queue::WriteQueue;
use crate::registry::{DispatchOutcome, Inbox, SubscriptionRegistry};
use crate::transport::Transport;

pub enum SupervisorSignal {
    Shutdown,
    Drain(oneshot::Sender<()>),
}

/// State shared between the public `Connection` handle and the supervisor
/// task. Everything here is reachable from both sides without going through
/// the supervisor's mailbox, since `publish`/`subscribe`/etc. need to act
/// immediately rather than round-trip through the supervisor loop.
pub struct Shared {
    pub options: Options,
    pub state: AtomicCell<ConnectionState>,
    pub reconnector: Reconnector,
    pub queue: Arc<WriteQueue>,
    pub registry: Arc<SubscriptionRegistry>,
    pub inbox: Arc<Inbox>,
    pub reconnect_buffer: ReconnectBuffer,
    pub events: EventBus,
    /// Non-fatal conditions reported out-of-band: slow consumers and
    /// non-fatal server `-ERR` lines (SPEC_FULL.md's error-listener policy).
    pub errors: ErrorBus,
    /// FIFO of pending `PING`s: `None` for a keepalive ping, `Some` for a
    /// `flush()` caller waiting on this specific PONG. Its length doubles as
    /// the outstanding-ping count for the `max_pings_out` check.
    pub ping_waiters: Mutex<VecDeque<Option<oneshot::Sender<()>>>>,
    pub server_info: Mutex<Option<ServerInfo>>,
    pub inbox_subscribed: Mutex<bool>,
}

impl Shared {
    pub fn send_ping(&self, waiter: Option<oneshot::Sender<()>>) -> Result<()> {
        self.ping_waiters.lock()?.push_back(waiter);
        self.queue.push_internal(OutboundMsg::new_ping())
    }
}

pub async fn run(shared: Arc<Shared>, mut control_rx: mpsc::Receiver<SupervisorSignal>, initial: oneshot::Sender<Result<()>>) {
    let mut initial = Some(initial);
    let mut first_connect = true;

    loop {
        let (endpoint, wait) = match shared.reconnector.next_attempt() {
            Ok(v) => v,
            Err(e) => {
                shared.state.store(ConnectionState::Closed);
                shared.events.emit(Event::Closed);
                if let Some(tx) = initial.take() {
                    let _ = tx.send(Err(e));
                }
                return;
            }
        };

        shared.state.store(if first_connect { ConnectionState::Connecting } else { ConnectionState::Reconnecting });

        if !wait.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                signal = control_rx.recv() => {
                    if shutdown_requested(signal, &shared) {
                        return;
                    }
                }
            }
        }

        shared.reconnector.record_attempt(&endpoint);
        let tls_config = tls_config_for(&shared.options, &endpoint);
        let transport = match Transport::dial(&endpoint, tls_config, shared.options.connection_timeout).await {
            Ok(t) => t,
            Err(e) => {
                warn!(?e, endpoint = %endpoint.authority(), "connect attempt failed");
                continue;
            }
        };

        let (mut read_half, mut write_half) = tokio::io::split(transport);
        let mut line_reader = LineReader::new(0);
        let info = match handshake(&mut read_half, &mut write_half, &mut line_reader, &shared.options).await {
            Ok(info) => info,
            Err(e) => {
                warn!(?e, endpoint = %endpoint.authority(), "handshake failed");
                continue;
            }
        };
        line_reader.set_max_payload(info.max_payload);

        shared.reconnector.record_success(&endpoint);
        *shared.server_info.lock().expect("server_info lock poisoned") = Some(info.clone());

        let discovered = parse_discovered_endpoints(&info.connect_urls, endpoint.scheme);
        if shared.reconnector.merge_discovered(&discovered) {
            shared.events.emit(Event::DiscoveredServers);
        }

        for (sid, subject, queue_group) in shared.registry.snapshot_for_resubscribe() {
            let _ = shared.queue.push_internal(OutboundMsg::new_sub(&subject, queue_group.as_deref(), sid));
        }
        shared.events.emit(Event::Resubscribed);

        for msg in shared.reconnect_buffer.drain() {
            let _ = shared.queue.push_internal(msg);
        }

        shared.ping_waiters.lock().expect("ping_waiters lock poisoned").clear();
        shared.state.store(ConnectionState::Connected);
        shared.queue.resume();
        shared.events.emit(if first_connect { Event::Connected } else { Event::Reconnected });
        if let Some(tx) = initial.take() {
            let _ = tx.send(Ok(()));
        }
        first_connect = false;

        if info.lame_duck_mode {
            shared.events.emit(Event::LameDuck);
        }

        let (ops_tx, ops_rx) = mpsc::channel(1024);
        let reader_handle = tokio::spawn(crate::reader::run(read_half, line_reader, ops_tx));
        let mut writer_handle =
            tokio::spawn(crate::writer::run(write_half, shared.queue.clone(), shared.options.buffer_size));

        let outcome = steady_state(&shared, &mut control_rx, ops_rx, &mut writer_handle).await;

        reader_handle.abort();
        writer_handle.abort();

        match outcome {
            Outcome::Shutdown => return,
            Outcome::FatalServerError(e) => {
                shared.state.store(ConnectionState::Closed);
                shared.events.emit(Event::Closed);
                warn!(?e, "fatal server error, closing connection");
                return;
            }
            Outcome::TransportLost => {
                shared.queue.pause();
                shared.state.store(ConnectionState::Reconnecting);
                shared.events.emit(Event::Disconnected);
                info!("transport lost, reconnecting");
            }
        }
    }
}

enum Outcome {
    TransportLost,
    Shutdown,
    FatalServerError(Error),
}

async fn steady_state(
    shared: &Arc<Shared>,
    control_rx: &mut mpsc::Receiver<SupervisorSignal>,
    mut ops_rx: mpsc::Receiver<ServerOp>,
    writer_handle: &mut tokio::task::JoinHandle<Result<()>>,
) -> Outcome {
    let mut ping_timer = tokio::time::interval(shared.options.ping_interval);
    ping_timer.tick().await; // interval fires immediately; skip the spurious first tick

    loop {
        tokio::select! {
            signal = control_rx.recv() => {
                match signal {
                    None | Some(SupervisorSignal::Shutdown) => return Outcome::Shutdown,
                    Some(SupervisorSignal::Drain(done)) => {
                        while !shared.queue.is_empty() {
                            tokio::task::yield_now().await;
                        }
                        let _ = done.send(());
                        return Outcome::Shutdown;
                    }
                }
            }
            _ = ping_timer.tick() => {
                let outstanding = shared.ping_waiters.lock().expect("ping_waiters lock poisoned").len();
                if outstanding as u32 >= shared.options.max_pings_out {
                    warn!(outstanding, "too many unanswered pings, treating transport as dead");
                    return Outcome::TransportLost;
                }
                if shared.send_ping(None).is_err() {
                    return Outcome::TransportLost;
                }
            }
            op = ops_rx.recv() => {
                match op {
                    None => return Outcome::TransportLost,
                    Some(op) => {
                        if let Some(outcome) = handle_op(shared, op) {
                            return outcome;
                        }
                    }
                }
            }
            _ = &mut *writer_handle => {
                return Outcome::TransportLost;
            }
        }
    }
}

fn handle_op(shared: &Arc<Shared>, op: ServerOp) -> Option<Outcome> {
    match op {
        ServerOp::Ping => {
            let _ = shared.queue.push_internal(OutboundMsg::new_pong());
            None
        }
        ServerOp::Pong => {
            if let Some(waiter) = shared.ping_waiters.lock().expect("ping_waiters lock poisoned").pop_front() {
                if let Some(tx) = waiter {
                    let _ = tx.send(());
                }
            }
            None
        }
        ServerOp::Message(msg) => {
            match shared.registry.dispatch(msg) {
                Ok(DispatchOutcome::SlowConsumer { sid }) => {
                    warn!(sid, "push subscriber fell behind, dropped oldest pending message");
                    shared.errors.emit(Error::new(ErrorKind::SlowConsumer { sid }));
                }
                Ok(_) => {}
                Err(e) => warn!(?e, "failed to route inbound message"),
            }
            None
        }
        ServerOp::Err(reason) => {
            let err = Error::from_server_err(&reason);
            if err.is_fatal() {
                Some(Outcome::FatalServerError(err))
            } else {
                warn!(%reason, "server reported a non-fatal error");
                shared.errors.emit(err);
                None
            }
        }
        ServerOp::Info(json) => {
            if let Ok(info) = ServerInfo::parse(&json) {
                let discovered = parse_discovered_endpoints(&info.connect_urls, Scheme::Plain);
                if shared.reconnector.merge_discovered(&discovered) {
                    shared.events.emit(Event::DiscoveredServers);
                }
                if info.lame_duck_mode {
                    shared.events.emit(Event::LameDuck);
                }
                *shared.server_info.lock().expect("server_info lock poisoned") = Some(info);
            }
            None
        }
        ServerOp::Ok => None,
    }
}

fn shutdown_requested(signal: Option<SupervisorSignal>, shared: &Arc<Shared>) -> bool {
    match signal {
        None | Some(SupervisorSignal::Shutdown) => {
            shared.state.store(ConnectionState::Closed);
            shared.events.emit(Event::Closed);
            true
        }
        Some(SupervisorSignal::Drain(done)) => {
            let _ = done.send(());
            shared.state.store(ConnectionState::Closed);
            shared.events.emit(Event::Closed);
            true
        }
    }
}

async fn handshake(
    read_half: &mut ReadHalf<Transport>,
    write_half: &mut WriteHalf<Transport>,
    line_reader: &mut LineReader,
    options: &Options,
) -> Result<ServerInfo> {
    let mut buf = vec![0u8; 8192];

    let info = loop {
        if let Some(op) = line_reader.next_op()? {
            match op {
                ServerOp::Info(json) => break ServerInfo::parse(&json)?,
                ServerOp::Err(reason) => return Err(Error::from_server_err(&reason)),
                _ => continue,
            }
        }
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::disconnected());
        }
        line_reader.feed(&buf[..n]);
    };

    let connect_op = build_connect_op(options, &info);
    let mut out = BytesMut::new();
    OutboundMsg::new_connect(&connect_op.to_json()).write_into(&mut out);
    OutboundMsg::new_ping().write_into(&mut out);
    write_half.write_all(&out).await?;

    loop {
        if let Some(op) = line_reader.next_op()? {
            match op {
                ServerOp::Pong => return Ok(info),
                ServerOp::Err(reason) => return Err(Error::from_server_err(&reason)),
                _ => continue,
            }
        }
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::disconnected());
        }
        line_reader.feed(&buf[..n]);
    }
}

fn build_connect_op(options: &Options, info: &ServerInfo) -> ConnectOp {
    let (user, pass) = options.user_info.clone().map_or((None, None), |(u, p)| (Some(u), Some(p)));
    let (jwt, nkey) = options.credentials.clone().map_or((None, None), |(jwt, seed)| (Some(jwt), Some(seed)));
    ConnectOp {
        verbose: false,
        pedantic: false,
        tls_required: info.tls_required,
        name: options.name.clone(),
        lang: "rust",
        version: env!("CARGO_PKG_VERSION"),
        protocol: 1,
        echo: !options.no_echo,
        headers: true,
        user,
        pass,
        auth_token: options.token.clone(),
        jwt,
        nkey,
        sig: None,
    }
}

fn tls_config_for(options: &Options, endpoint: &Endpoint) -> Option<Arc<rustls::ClientConfig>> {
    match options.tls_mode {
        crate::config::TlsMode::Disabled => None,
        crate::config::TlsMode::Opportunistic if !endpoint.scheme.requires_tls() => None,
        crate::config::TlsMode::Opportunistic | crate::config::TlsMode::Required => options
            .tls_config
            .clone()
            .or_else(|| Some(crate::transport::build_tls_connector(endpoint.scheme.verify_certificate()))),
    }
}

fn parse_discovered_endpoints(connect_urls: &[String], scheme: Scheme) -> Vec<Endpoint> {
    connect_urls
        .iter()
        .filter_map(|url| {
            let (host, port) = url.rsplit_once(':')?;
            let port: u16 = port.parse().ok()?;
            let mut endpoint = Endpoint::new(scheme, host, port);
            endpoint.learned = true;
            Some(endpoint)
        })
        .collect()
}
