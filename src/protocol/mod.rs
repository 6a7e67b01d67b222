mod connect;
mod headers;
mod info;
mod line_reader;
mod message;
mod op;
mod outbound;

pub use connect::ConnectOp;
pub use headers::HeaderBlock;
pub use info::ServerInfo;
pub use line_reader::LineReader;
pub use message::InboundMessage;
pub use op::ServerOp;
pub use outbound::OutboundMsg;
