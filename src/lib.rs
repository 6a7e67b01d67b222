//! Connection runtime for a text-line publish/subscribe messaging broker
//! client: dialing, the wire protocol, reconnection, and the subscription
//! and request/reply bookkeeping layered on top of it.
//!
//! `Connection` (see [`connection::Connection`]) is the entry point; most
//! callers only need it and [`config::Options`].

pub mod common;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod queue;
mod reader;
pub mod registry;
pub mod transport;
mod writer;

pub use config::Options;
pub use connection::{Connection, ConnectionState, Event, Subscriber};
pub use error::{Error, ErrorKind, Result};
pub use pool::{Endpoint, Scheme};
pub use protocol::{HeaderBlock, InboundMessage};
