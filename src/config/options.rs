//! Connection options: a plain data struct the caller builds and hands to
//! `Connection::connect`. Per SPEC_FULL.md's non-goals, loading this from a
//! config file or builder DSL is out of scope here — `Options` is the output
//! type a surrounding application is expected to construct however it likes,
//! mirroring how `riverdb::config::Config` is consumed by `riverdb` without
//! this crate owning the parsing step.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DiscardPolicy, TlsMode};
use crate::pool::Endpoint;

#[derive(Debug, Clone)]
pub struct Options {
    /// Candidate endpoints to connect to, in the order the caller supplied
    /// them (subject to `no_randomize`).
    pub servers: Vec<Endpoint>,
    /// Skip the initial shuffle of `servers`, connecting in the given order.
    pub no_randomize: bool,
    /// Maximum number of reconnect attempts per endpoint before giving up.
    /// `None` means retry forever.
    pub max_reconnects: Option<u32>,
    pub reconnect_wait: Duration,
    pub reconnect_jitter: Duration,
    pub reconnect_jitter_tls: Duration,
    pub connection_timeout: Duration,

    /// Aggregate byte budget for the reconnect buffer; `Some(0)` disables
    /// buffering outright, `None` is unlimited.
    pub reconnect_buffer_size: Option<usize>,

    pub max_messages_in_outgoing_queue: Option<usize>,
    pub max_bytes_in_outgoing_queue: Option<usize>,
    pub discard_messages_when_outgoing_queue_full: DiscardPolicy,

    /// Max serialized batch bytes the Writer accumulates before flushing to
    /// the transport.
    pub buffer_size: usize,

    pub ping_interval: Duration,
    pub max_pings_out: u32,

    pub tls_mode: TlsMode,
    /// Pre-built TLS client configuration; required when any endpoint or
    /// `tls_mode` calls for an upgrade.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,

    pub user_info: Option<(String, String)>,
    pub token: Option<String>,
    /// Pre-resolved credentials (user JWT + NKey seed), already decoded from
    /// a `.creds` file by the caller.
    pub credentials: Option<(String, String)>,

    /// Suppress delivery of a client's own publishes back to itself.
    pub no_echo: bool,
    /// Advertised client name, sent in `CONNECT`.
    pub name: Option<String>,

    /// Per-subscription push-delivery caps: once either is hit, the oldest
    /// undelivered message is dropped to make room for the newest.
    pub max_pending_bytes: Option<usize>,
    pub max_pending_msgs: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            servers: Vec::new(),
            no_randomize: false,
            max_reconnects: Some(60),
            reconnect_wait: Duration::from_millis(2000),
            reconnect_jitter: Duration::from_millis(100),
            reconnect_jitter_tls: Duration::from_millis(1000),
            connection_timeout: Duration::from_secs(2),
            reconnect_buffer_size: Some(8 * 1024 * 1024),
            max_messages_in_outgoing_queue: None,
            max_bytes_in_outgoing_queue: None,
            discard_messages_when_outgoing_queue_full: DiscardPolicy::default(),
            buffer_size: 32 * 1024,
            ping_interval: Duration::from_secs(120),
            max_pings_out: 2,
            tls_mode: TlsMode::default(),
            tls_config: None,
            user_info: None,
            token: None,
            credentials: None,
            no_echo: false,
            name: None,
            max_pending_bytes: None,
            max_pending_msgs: None,
        }
    }
}

impl Options {
    pub fn new(servers: Vec<Endpoint>) -> Self {
        Options { servers, ..Options::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = Options::default();
        assert!(opts.servers.is_empty());
        assert_eq!(opts.max_pings_out, 2);
        assert_eq!(opts.discard_messages_when_outgoing_queue_full, DiscardPolicy::Block);
    }
}
