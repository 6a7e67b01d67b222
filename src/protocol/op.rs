use crate::protocol::InboundMessage;

/// A single parsed server-to-client protocol operation, as recognized by the
/// Line Reader (SPEC_FULL.md §4.B). `Msg`/`Hmsg` headers and bodies are
/// already fully assembled into an `InboundMessage` by the time this is
/// produced.
#[derive(Debug)]
pub enum ServerOp {
    /// Raw JSON payload of an `INFO` line, decoded lazily by the caller into
    /// a `ServerInfo` — the core only needs a handful of its fields (§1).
    Info(String),
    Message(InboundMessage),
    Ping,
    Pong,
    Ok,
    Err(String),
}
