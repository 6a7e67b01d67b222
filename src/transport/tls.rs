//! TLS client configuration. The teacher hand-rolls the `rustls::Connection`
//! read/write loop itself (`transport.rs`'s `read_tls`/`write_tls`/
//! `process_new_packets` dance); this crate instead wraps the stream with
//! `tokio_rustls::TlsConnector`, which already implements `AsyncRead`/
//! `AsyncWrite` over the handshake state machine. Keeping `rustls` itself
//! (rather than dropping TLS support) preserves the crate the teacher
//! actually depends on; only the I/O-pump wiring around it changes.

use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};

/// A verifier that accepts any certificate, used only for the `opentls://`
/// scheme where the caller has explicitly opted out of verification
/// (SPEC_FULL.md §4.F `Scheme::OpenTls`). Never the default.
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn default_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
    }));
    roots
}

/// Builds a `rustls::ClientConfig` for either verified or unverified TLS.
/// Callers that already have a config (e.g. with a custom CA bundle) should
/// build it themselves and set `Options::tls_config` directly; this helper
/// covers the common case of "just use the platform trust roots."
pub fn build_tls_connector(verify_certificate: bool) -> Arc<ClientConfig> {
    let builder = ClientConfig::builder().with_safe_defaults();
    let config = if verify_certificate {
        builder.with_root_certificates(default_root_store()).with_no_client_auth()
    } else {
        let mut config = builder.with_root_certificates(default_root_store()).with_no_client_auth();
        config.dangerous().set_certificate_verifier(Arc::new(NoCertificateVerification));
        config
    };
    Arc::new(config)
}
