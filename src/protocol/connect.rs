//! The `CONNECT` handshake payload, serialized the same way `ServerInfo`
//! deserializes `INFO`: a plain serde struct with defaults, not a hand-built
//! JSON string.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectOp {
    pub verbose: bool,
    pub pedantic: bool,
    pub tls_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lang: &'static str,
    pub version: &'static str,
    pub protocol: u8,
    pub echo: bool,
    pub headers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl ConnectOp {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ConnectOp always serializes")
    }
}
