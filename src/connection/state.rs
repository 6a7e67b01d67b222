//! Connection-level state and the event stream listeners can subscribe to.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl From<ConnectionState> for u8 {
    fn from(s: ConnectionState) -> u8 {
        match s {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Closed => 4,
        }
    }
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> ConnectionState {
        match v {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lifecycle notifications a caller can subscribe to via
/// `Connection::events`. SPEC_FULL.md §4.H adds `LameDuck`; the rest mirror
/// §4.G's event list.
#[derive(Debug, Clone)]
pub enum Event {
    Connected,
    Disconnected,
    Reconnected,
    Resubscribed,
    Closed,
    DiscoveredServers,
    LameDuck,
}
