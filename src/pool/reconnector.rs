//! Component F: reconnection supervisor. Owns the `EndpointPool` and the
//! backoff/state bookkeeping around it; actual dialing and resubscribe
//! replay are driven by `Connection`, which calls back into this type for
//! "which endpoint, after how long" and "did that attempt succeed."
//!
//! Grounded on `riverdb::pg::backend::reconnect`'s retry-with-backoff loop
//! around `riverdb::pool::Cluster`, generalized to TLS-aware jitter
//! (SPEC_FULL.md §4.F: plain connections use `reconnect_jitter`, TLS
//! upgrades use the wider `reconnect_jitter_tls` since the handshake itself
//! adds latency variance) and to a state machine exposed for `Connection`'s
//! event dispatch rather than being purely internal.

use std::time::Duration;

use crate::common::{jitter, AtomicCell};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::pool::{Endpoint, EndpointPool};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconnectorState {
    /// No connection has ever been attempted.
    Idle,
    /// Dialing and performing the protocol handshake (INFO/CONNECT/PING).
    Connecting,
    /// Handshake complete; replaying buffered SUB/UNSUB before declaring the
    /// connection usable again.
    Resubscribing,
    /// Fully usable.
    Connected,
    /// Transport lost; waiting out backoff before the next attempt.
    Disconnected,
    /// A `drain()` call is in progress: no new work is accepted, outstanding
    /// work is being flushed.
    Draining,
    /// Closed by the caller; will never attempt to reconnect again.
    Closed,
}

impl From<ReconnectorState> for u8 {
    fn from(s: ReconnectorState) -> u8 {
        match s {
            ReconnectorState::Idle => 0,
            ReconnectorState::Connecting => 1,
            ReconnectorState::Resubscribing => 2,
            ReconnectorState::Connected => 3,
            ReconnectorState::Disconnected => 4,
            ReconnectorState::Draining => 5,
            ReconnectorState::Closed => 6,
        }
    }
}

impl From<u8> for ReconnectorState {
    fn from(v: u8) -> ReconnectorState {
        match v {
            0 => ReconnectorState::Idle,
            1 => ReconnectorState::Connecting,
            2 => ReconnectorState::Resubscribing,
            3 => ReconnectorState::Connected,
            4 => ReconnectorState::Disconnected,
            5 => ReconnectorState::Draining,
            _ => ReconnectorState::Closed,
        }
    }
}

pub struct Reconnector {
    pool: EndpointPool,
    state: AtomicCell<ReconnectorState>,
    max_reconnects: Option<u32>,
    reconnect_wait: Duration,
    reconnect_jitter: Duration,
    reconnect_jitter_tls: Duration,
}

impl Reconnector {
    pub fn new(pool: EndpointPool, options: &Options) -> Self {
        Reconnector {
            pool,
            state: AtomicCell::new(ReconnectorState::Idle),
            max_reconnects: options.max_reconnects,
            reconnect_wait: options.reconnect_wait,
            reconnect_jitter: options.reconnect_jitter,
            reconnect_jitter_tls: options.reconnect_jitter_tls,
        }
    }

    pub fn state(&self) -> ReconnectorState {
        self.state.load()
    }

    pub fn set_state(&self, state: ReconnectorState) {
        self.state.store(state);
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Picks the next endpoint to dial and the backoff to wait before doing
    /// so. Returns `NoServers` once every endpoint in the pool has exhausted
    /// `max_reconnects` (SPEC_FULL.md §8 scenario 6).
    pub fn next_attempt(&self) -> Result<(Endpoint, Duration)> {
        if self.pool.is_empty() {
            return Err(Error::no_servers());
        }
        if let Some(max) = self.max_reconnects {
            let below_limit = self.pool.attempts_snapshot().into_iter().any(|(_, attempts)| attempts < max);
            if !below_limit {
                return Err(Error::no_servers());
            }
        }
        let (endpoint, attempts) = self.pool.next_candidate().ok_or_else(Error::no_servers)?;
        if let Some(max) = self.max_reconnects {
            if attempts >= max {
                // this endpoint is spent but the exhaustion check above found
                // capacity elsewhere in the pool; roll to the next candidate.
                return self.next_attempt();
            }
        }
        let max_jitter = if endpoint.scheme.requires_tls() { self.reconnect_jitter_tls } else { self.reconnect_jitter };
        let wait = if attempts == 0 { Duration::ZERO } else { jitter(self.reconnect_wait, max_jitter) };
        Ok((endpoint, wait))
    }

    pub fn record_attempt(&self, endpoint: &Endpoint) {
        self.pool.record_attempt(endpoint);
    }

    pub fn record_success(&self, endpoint: &Endpoint) {
        self.pool.record_success(endpoint);
        self.state.store(ReconnectorState::Connected);
    }

    /// Merges server-advertised peers discovered via `INFO connect_urls`.
    pub fn merge_discovered(&self, discovered: &[Endpoint]) -> bool {
        self.pool.merge_discovered(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Scheme;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(Scheme::Plain, "127.0.0.1", port)
    }

    #[test]
    fn first_attempt_has_no_backoff() {
        let pool = EndpointPool::new(vec![ep(1)], false);
        let reconnector = Reconnector::new(pool, &Options::default());
        let (endpoint, wait) = reconnector.next_attempt().unwrap();
        assert_eq!(endpoint.port, 1);
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn single_endpoint_exhausts_after_max_reconnects() {
        let pool = EndpointPool::new(vec![ep(1)], false);
        let mut options = Options::default();
        options.max_reconnects = Some(2);
        let reconnector = Reconnector::new(pool, &options);
        let (endpoint, _) = reconnector.next_attempt().unwrap();
        reconnector.record_attempt(&endpoint);
        let (endpoint, _) = reconnector.next_attempt().unwrap();
        reconnector.record_attempt(&endpoint);
        assert!(reconnector.next_attempt().is_err());
    }

    #[test]
    fn success_resets_backoff_state() {
        let pool = EndpointPool::new(vec![ep(1)], false);
        let reconnector = Reconnector::new(pool, &Options::default());
        let (endpoint, _) = reconnector.next_attempt().unwrap();
        reconnector.record_attempt(&endpoint);
        reconnector.record_success(&endpoint);
        assert_eq!(reconnector.state(), ReconnectorState::Connected);
        let (_, wait) = reconnector.next_attempt().unwrap();
        assert_eq!(wait, Duration::ZERO);
    }
}
