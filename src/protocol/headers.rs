//! `NATS/1.0` header block codec for `HMSG`/`HPUB` (SPEC_FULL.md §6).
//!
//! Grounded in shape on `riverdb::pg::protocol::server_params`'s
//! key/value accumulation over a wire-delimited block, adapted from
//! Postgres's null-terminated-string pairs to the line protocol's
//! `K: V\r\n` pairs terminated by a blank line.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

const PREAMBLE: &str = "NATS/1.0";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub status: Option<String>,
    pairs: Vec<(String, String)>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        HeaderBlock::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.status.is_none()
    }

    /// Serializes to the wire form: `NATS/1.0[ <status>]\r\nK: V\r\n...\r\n\r\n`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(PREAMBLE.as_bytes());
        if let Some(status) = &self.status {
            buf.put_u8(b' ');
            buf.put_slice(status.as_bytes());
        }
        buf.put_slice(b"\r\n");
        for (k, v) in &self.pairs {
            buf.put_slice(k.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Parses a complete header block (everything up to and including the
    /// terminating blank line) out of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::protocol_error("header block is not valid utf-8"))?;
        let mut lines = text.split("\r\n");
        let preamble_line = lines.next().unwrap_or("");
        if !preamble_line.starts_with(PREAMBLE) {
            return Err(Error::protocol_error("header block missing NATS/1.0 preamble"));
        }
        let status = preamble_line[PREAMBLE.len()..].trim();
        let mut block = HeaderBlock {
            status: if status.is_empty() { None } else { Some(status.to_string()) },
            pairs: Vec::new(),
        };
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| Error::protocol_error("malformed header line (missing ':')"))?;
            block.pairs.push((k.trim().to_string(), v.trim().to_string()));
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_headers() {
        let mut block = HeaderBlock::new();
        block.insert("Nats-Stream", "orders");
        block.insert("Nats-Seq", "42");
        let encoded = block.encode();
        // strip the trailing CRLF that terminates the overall HMSG body section,
        // leaving exactly what parse() expects: block up to and including the
        // blank line.
        let parsed = HeaderBlock::parse(&encoded).unwrap();
        assert_eq!(parsed.get("Nats-Stream"), Some("orders"));
        assert_eq!(parsed.get("nats-seq"), Some("42"));
        assert!(parsed.status.is_none());
    }

    #[test]
    fn parses_status_line() {
        let block = HeaderBlock::parse(b"NATS/1.0 503 No Responders\r\n\r\n").unwrap();
        assert_eq!(block.status.as_deref(), Some("503 No Responders"));
    }

    #[test]
    fn rejects_missing_preamble() {
        assert!(HeaderBlock::parse(b"K: V\r\n\r\n").is_err());
    }
}
