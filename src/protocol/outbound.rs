//! Outbound protocol messages, pre-encoded at enqueue time so the Writer
//! (§4.D) never has to re-serialize anything — it only concatenates already-
//! built `Bytes` slices into its batch buffer.
//!
//! SPEC_FULL.md's design notes describe these as forming "a singly-linked
//! chain (intrusive next pointer) so the Writer can walk a batch without
//! per-node allocation." This crate realizes that shape with a safe
//! `VecDeque<OutboundMsg>` in `queue::WriteQueue` rather than a raw
//! intrusive pointer list — `VecDeque` already gives O(1) push/pop at both
//! ends without a separate array copy during `accumulate`, which is the
//! actual property the design note is after; see DESIGN.md for why the
//! unsafe pointer-chasing primitives elsewhere in the teacher were not
//! reproduced here.

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone)]
pub struct OutboundMsg {
    /// The already-formatted protocol line, e.g. `PUB subj  5\r\n`, `SUB subj 7\r\n`, `PING\r\n`.
    pub prefix: Bytes,
    /// Present only for `HPUB`: the `NATS/1.0\r\n...\r\n\r\n` block.
    pub header_block: Option<Bytes>,
    /// Message payload; empty for control operations.
    pub payload: Bytes,
    /// Internal protocol traffic (SUB/UNSUB replay, CONNECT, PING/PONG)
    /// bypasses the write queue's byte-cap check (SPEC_FULL.md §4.C).
    pub internal: bool,
}

impl OutboundMsg {
    pub fn raw(prefix: Bytes, header_block: Option<Bytes>, payload: Bytes, internal: bool) -> Self {
        OutboundMsg { prefix, header_block, payload, internal }
    }

    pub fn encoded_len(&self) -> usize {
        let trailing_crlf = if self.payload.is_empty() && self.header_block.is_none() { 0 } else { 2 };
        self.prefix.len() + self.header_block.as_ref().map_or(0, |h| h.len()) + self.payload.len() + trailing_crlf
    }

    /// Appends this message's wire form to `buf`: prefix, then (for
    /// PUB/HPUB) header block + payload + trailing CRLF.
    pub fn write_into(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.prefix);
        if let Some(headers) = &self.header_block {
            buf.put_slice(headers);
        }
        if !self.payload.is_empty() || self.header_block.is_some() {
            buf.put_slice(&self.payload);
            buf.put_slice(b"\r\n");
        }
    }

    pub fn new_pub(subject: &str, reply: Option<&str>, payload: Bytes, internal: bool) -> Self {
        let prefix = match reply {
            Some(r) => format!("PUB {} {} {}\r\n", subject, r, payload.len()),
            None => format!("PUB {} {}\r\n", subject, payload.len()),
        };
        OutboundMsg::raw(Bytes::from(prefix), None, payload, internal)
    }

    pub fn new_hpub(subject: &str, reply: Option<&str>, header_block: Bytes, payload: Bytes, internal: bool) -> Self {
        let total = header_block.len() + payload.len();
        let prefix = match reply {
            Some(r) => format!("HPUB {} {} {} {}\r\n", subject, r, header_block.len(), total),
            None => format!("HPUB {} {} {}\r\n", subject, header_block.len(), total),
        };
        OutboundMsg::raw(Bytes::from(prefix), Some(header_block), payload, internal)
    }

    pub fn new_sub(subject: &str, queue: Option<&str>, sid: u64) -> Self {
        let prefix = match queue {
            Some(q) => format!("SUB {} {} {}\r\n", subject, q, sid),
            None => format!("SUB {} {}\r\n", subject, sid),
        };
        OutboundMsg::raw(Bytes::from(prefix), None, Bytes::new(), true)
    }

    pub fn new_unsub(sid: u64, max_msgs: Option<u64>) -> Self {
        let prefix = match max_msgs {
            Some(n) => format!("UNSUB {} {}\r\n", sid, n),
            None => format!("UNSUB {}\r\n", sid),
        };
        OutboundMsg::raw(Bytes::from(prefix), None, Bytes::new(), true)
    }

    pub fn new_connect(json: &str) -> Self {
        OutboundMsg::raw(Bytes::from(format!("CONNECT {}\r\n", json)), None, Bytes::new(), true)
    }

    pub fn new_ping() -> Self {
        OutboundMsg::raw(Bytes::from_static(b"PING\r\n"), None, Bytes::new(), true)
    }

    pub fn new_pong() -> Self {
        OutboundMsg::raw(Bytes::from_static(b"PONG\r\n"), None, Bytes::new(), true)
    }

    /// True if this is a PING, used by the write queue's `filter` to drop
    /// stale keepalive/flush pings that were queued before a reconnect
    /// (SPEC_FULL.md §4.C).
    pub fn is_ping(&self) -> bool {
        self.prefix.as_ref() == b"PING\r\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_without_reply() {
        let msg = OutboundMsg::new_pub("foo.bar", None, Bytes::from("hello"), false);
        let mut buf = BytesMut::new();
        msg.write_into(&mut buf);
        assert_eq!(&buf[..], b"PUB foo.bar 5\r\nhello\r\n");
    }

    #[test]
    fn pub_with_reply() {
        let msg = OutboundMsg::new_pub("foo.bar", Some("_INBOX.abc"), Bytes::from("hi"), false);
        let mut buf = BytesMut::new();
        msg.write_into(&mut buf);
        assert_eq!(&buf[..], b"PUB foo.bar _INBOX.abc 2\r\nhi\r\n");
    }

    #[test]
    fn sub_and_unsub_are_internal() {
        let sub = OutboundMsg::new_sub("foo.*", Some("workers"), 7);
        assert!(sub.internal);
        let mut buf = BytesMut::new();
        sub.write_into(&mut buf);
        assert_eq!(&buf[..], b"SUB foo.* workers 7\r\n");

        let unsub = OutboundMsg::new_unsub(7, Some(3));
        let mut buf = BytesMut::new();
        unsub.write_into(&mut buf);
        assert_eq!(&buf[..], b"UNSUB 7 3\r\n");
    }

    #[test]
    fn empty_payload_pub_still_gets_trailing_crlf() {
        let msg = OutboundMsg::new_pub("foo", None, Bytes::new(), false);
        let mut buf = BytesMut::new();
        msg.write_into(&mut buf);
        assert_eq!(&buf[..], b"PUB foo 0\r\n\r\n");
    }
}
