use bytes::Bytes;

use crate::protocol::HeaderBlock;

/// A fully assembled inbound `MSG`/`HMSG` delivery.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub sid: u64,
    pub reply_to: Option<String>,
    pub headers: Option<HeaderBlock>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + self.headers.as_ref().map_or(0, |h| h.encode().len())
    }
}
