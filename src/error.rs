//! Error type for the connection runtime.
//!
//! Mirrors the shape of `riverdb::common::errors`: a single boxed enum behind
//! a thin newtype, kept small so `Result<T, Error>` stays cheap to pass
//! around even though the enum itself carries a few string payloads.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::sync::{MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
}

#[derive(Debug)]
pub enum ErrorKind {
    /// The connection was explicitly closed by the caller.
    Closed,
    /// The connection is not currently connected (e.g. mid-reconnect) and the
    /// operation cannot proceed without buffering.
    Disconnected,
    /// A caller-supplied deadline elapsed before the operation completed.
    Timeout(Duration),
    /// The endpoint pool was exhausted without ever reaching max_reconnects.
    NoServers,
    /// The server rejected authentication; reconnection is aborted.
    AuthFailed(String),
    /// The server reported an authorization violation on an otherwise live
    /// connection.
    AuthViolation(String),
    /// A push subscription's or dispatcher's pending queue overflowed.
    SlowConsumer { sid: u64 },
    /// `publish` was dropped under `DiscardPolicy::DiscardNew` because the
    /// outgoing write queue was full.
    MessageDiscarded,
    /// The wire protocol could not be framed (malformed header, bad verb).
    ProtocolError(String),
    /// A message's encoded size exceeds the server-advertised max_payload.
    MaxPayloadExceeded { size: usize, max: usize },
    /// An operation is invalid in the connection's current state (e.g.
    /// publish after close, reconnect buffer overflow).
    IllegalState(String),
    /// A subject failed local validation (empty, contains whitespace, etc).
    BadSubject(String),
    Tls(rustls::Error),
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind: Box::new(kind) }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed)
    }

    pub fn disconnected() -> Self {
        Self::new(ErrorKind::Disconnected)
    }

    pub fn timeout(d: Duration) -> Self {
        Self::new(ErrorKind::Timeout(d))
    }

    pub fn no_servers() -> Self {
        Self::new(ErrorKind::NoServers)
    }

    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::IllegalState(msg.into()))
    }

    pub fn bad_subject<S: Into<String>>(subject: S) -> Self {
        Self::new(ErrorKind::BadSubject(subject.into()))
    }

    pub fn protocol_error<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::ProtocolError(msg.into()))
    }

    pub fn message_discarded() -> Self {
        Self::new(ErrorKind::MessageDiscarded)
    }

    /// Classifies a server `-ERR <reason>` line per the resolved open
    /// question in SPEC_FULL.md §9: auth-flavored reasons are fatal, the rest
    /// are reported but non-fatal.
    pub fn from_server_err(reason: &str) -> Self {
        let lower = reason.to_ascii_lowercase();
        if lower.contains("authorization") || lower.contains("authentication") || lower.contains("account") {
            Self::new(ErrorKind::AuthFailed(reason.to_string()))
        } else {
            Self::new(ErrorKind::AuthViolation(reason.to_string()))
        }
    }

    /// True if this error should abort reconnection and move the connection
    /// to CLOSED rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(&*self.kind, ErrorKind::AuthFailed(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::new(ErrorKind::Io(err))
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::new(ErrorKind::Tls(err))
    }
}

impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Error::new(ErrorKind::IllegalState("lock poisoned".to_string()))
    }
}

impl<T> From<TryLockError<MutexGuard<'_, T>>> for Error {
    fn from(_: TryLockError<MutexGuard<'_, T>>) -> Self {
        Error::new(ErrorKind::IllegalState("lock contended".to_string()))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.kind, f)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Closed => f.write_str("connection is closed"),
            ErrorKind::Disconnected => f.write_str("not connected"),
            ErrorKind::Timeout(d) => write!(f, "operation timed out after {:?}", d),
            ErrorKind::NoServers => f.write_str("no servers available to connect to"),
            ErrorKind::AuthFailed(reason) => write!(f, "authentication failed: {}", reason),
            ErrorKind::AuthViolation(reason) => write!(f, "authorization violation: {}", reason),
            ErrorKind::SlowConsumer { sid } => write!(f, "slow consumer on subscription {}", sid),
            ErrorKind::MessageDiscarded => f.write_str("message discarded: outgoing queue full"),
            ErrorKind::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            ErrorKind::MaxPayloadExceeded { size, max } => {
                write!(f, "message of {} bytes exceeds max_payload of {} bytes", size, max)
            }
            ErrorKind::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            ErrorKind::BadSubject(subject) => write!(f, "invalid subject: {:?}", subject),
            ErrorKind::Tls(e) => Display::fmt(e, f),
            ErrorKind::Io(e) => Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Error {}
