//! Server `INFO` fields the core consumes. Per SPEC_FULL.md §1, JSON
//! parsing of INFO is "specified only as the fields consumed" — this is a
//! plain `serde`-derived struct, not a general-purpose protocol model.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub server_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub max_payload: usize,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub tls_required: bool,
    #[serde(default)]
    pub tls_verify: bool,
    #[serde(default)]
    pub headers: bool,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub connect_urls: Vec<String>,
    #[serde(default)]
    pub lame_duck_mode: bool,
}

impl ServerInfo {
    pub fn parse(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::Error::protocol_error(format!("malformed INFO json: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_info() {
        let info = ServerInfo::parse(r#"{"server_id":"abc","max_payload":1048576}"#).unwrap();
        assert_eq!(info.server_id, "abc");
        assert_eq!(info.max_payload, 1048576);
        assert!(!info.auth_required);
    }

    #[test]
    fn parses_connect_urls() {
        let info = ServerInfo::parse(
            r#"{"server_id":"abc","connect_urls":["10.0.0.2:4222","10.0.0.3:4222"]}"#,
        )
        .unwrap();
        assert_eq!(info.connect_urls.len(), 2);
    }
}
