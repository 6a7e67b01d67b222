//! Endpoint pool: the set of candidate servers the Reconnector dials.
//!
//! Grounded on `riverdb::pool::Cluster`/`riverdb::pg::PostgresCluster` (a
//! cluster is "a collection of nodes", built once from config and then
//! consulted by connection-acquisition code); generalized from a fixed list
//! of replica-group nodes to a pool that also grows at runtime as the server
//! advertises more peers via INFO `connect_urls` (SPEC_FULL.md §4.F).

use std::sync::Mutex;

use crate::common::shuffle;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scheme {
    Plain,
    Tls,
    /// TLS is attempted but certificate verification is skipped. Named after
    /// the historical NATS `opentls://` scheme.
    OpenTls,
}

impl Scheme {
    pub fn requires_tls(self) -> bool {
        matches!(self, Scheme::Tls | Scheme::OpenTls)
    }

    pub fn verify_certificate(self) -> bool {
        matches!(self, Scheme::Tls)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Set for endpoints discovered via server INFO rather than configured
    /// directly, so a future rediscovery can supersede them.
    pub learned: bool,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Endpoint { scheme, host: host.into(), port, learned: false }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Holds the ordered (or once-shuffled) list of candidate endpoints plus
/// per-endpoint attempt counters used by the Reconnector's `max_reconnects`
/// check.
pub struct EndpointPool {
    inner: Mutex<Inner>,
}

struct Inner {
    endpoints: Vec<Endpoint>,
    attempts: Vec<u32>,
    cursor: usize,
}

impl EndpointPool {
    pub fn new(mut endpoints: Vec<Endpoint>, randomize: bool) -> Self {
        if randomize {
            shuffle(&mut endpoints);
        }
        let attempts = vec![0; endpoints.len()];
        EndpointPool { inner: Mutex::new(Inner { endpoints, attempts, cursor: 0 }) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.inner.lock().unwrap().endpoints.clone()
    }

    /// Pairs each endpoint with its current attempt counter, for the
    /// Reconnector's `max_reconnects` exhaustion check.
    pub fn attempts_snapshot(&self) -> Vec<(Endpoint, u32)> {
        let inner = self.inner.lock().unwrap();
        inner.endpoints.iter().cloned().zip(inner.attempts.iter().copied()).collect()
    }

    /// Returns the next candidate in round-robin order along with its
    /// current attempt count, or `None` if the pool is empty.
    pub fn next_candidate(&self) -> Option<(Endpoint, u32)> {
        let mut inner = self.inner.lock().unwrap();
        let len = inner.endpoints.len();
        if len == 0 {
            return None;
        }
        let idx = inner.cursor % len;
        inner.cursor = inner.cursor.wrapping_add(1);
        Some((inner.endpoints[idx].clone(), inner.attempts[idx]))
    }

    pub fn record_attempt(&self, endpoint: &Endpoint) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.endpoints.iter().position(|e| e == endpoint) {
            inner.attempts[idx] += 1;
        }
    }

    pub fn record_success(&self, endpoint: &Endpoint) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.endpoints.iter().position(|e| e == endpoint) {
            inner.attempts[idx] = 0;
        }
    }

    /// Merges endpoints discovered via server INFO `connect_urls`, per
    /// SPEC_FULL.md §4.F: deduplicated by authority, existing (user
    /// configured) entries are retained as-is, and truly new entries are
    /// appended with `learned = true`. Returns true if the pool actually
    /// grew.
    pub fn merge_discovered(&self, discovered: &[Endpoint]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let mut grew = false;
        for candidate in discovered {
            let exists = inner.endpoints.iter().any(|e| e.authority() == candidate.authority());
            if !exists {
                inner.endpoints.push(candidate.clone());
                inner.attempts.push(0);
                grew = true;
            }
        }
        grew
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(Scheme::Plain, "127.0.0.1", port)
    }

    #[test]
    fn round_robins_candidates() {
        let pool = EndpointPool::new(vec![ep(1), ep(2)], false);
        let (first, _) = pool.next_candidate().unwrap();
        let (second, _) = pool.next_candidate().unwrap();
        let (third, _) = pool.next_candidate().unwrap();
        assert_eq!(first.port, 1);
        assert_eq!(second.port, 2);
        assert_eq!(third.port, 1);
    }

    #[test]
    fn merge_discovered_deduplicates_and_marks_learned() {
        let pool = EndpointPool::new(vec![ep(1)], false);
        let mut discovered = ep(1);
        discovered.learned = true;
        let grew = pool.merge_discovered(&[discovered, ep(2)]);
        assert!(grew);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.len(), 2);
        // the pre-existing entry for port 1 is untouched (not replaced by the learned copy)
        assert!(!snapshot[0].learned);
        assert!(snapshot[1].learned);
    }

    #[test]
    fn attempt_counters_reset_on_success() {
        let pool = EndpointPool::new(vec![ep(1)], false);
        pool.record_attempt(&ep(1));
        pool.record_attempt(&ep(1));
        let (_, attempts) = pool.next_candidate().unwrap();
        assert_eq!(attempts, 2);
        pool.record_success(&ep(1));
        let (_, attempts) = pool.next_candidate().unwrap();
        assert_eq!(attempts, 0);
    }
}
