//! Component A: the client-only transport. Narrowed from the teacher's
//! `Transport<TlsSession>`, which is generic over `ClientConnection` and
//! `ServerConnection` because `riverdb` terminates both ends of a proxied
//! connection; this crate only ever dials out, so there is no server side to
//! keep generic over.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::pool::Endpoint;

enum Io {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A single dialed connection to one endpoint. Once constructed, `Transport`
/// is used purely through `AsyncRead`/`AsyncWrite`; the Reader and Writer
/// components don't need to know whether TLS is in play.
pub struct Transport {
    io: Io,
}

impl Transport {
    /// Resolves and connects to `endpoint`, then performs a TLS handshake if
    /// the endpoint's scheme requires one.
    pub async fn dial(
        endpoint: &Endpoint,
        tls_config: Option<Arc<rustls::ClientConfig>>,
        connect_timeout: std::time::Duration,
    ) -> Result<Self> {
        let addr = endpoint.authority();
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout(connect_timeout))??;
        stream.set_nodelay(true).ok();

        if !endpoint.scheme.requires_tls() {
            return Ok(Transport { io: Io::Plain(stream) });
        }

        let config = tls_config.ok_or_else(|| Error::illegal_state("tls required but no tls_config provided"))?;
        let connector = TlsConnector::from(config);
        let server_name = rustls::ServerName::try_from(endpoint.host.as_str())
            .map_err(|_| Error::illegal_state(format!("invalid DNS name: {}", endpoint.host)))?;
        let tls_stream = connector.connect(server_name, stream).await?;
        Ok(Transport { io: Io::Tls(Box::new(tls_stream)) })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.io, Io::Tls(_))
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        match &mut self.io {
            Io::Plain(s) => tokio::io::AsyncWriteExt::shutdown(s).await.map_err(Error::from),
            Io::Tls(s) => tokio::io::AsyncWriteExt::shutdown(s.as_mut()).await.map_err(Error::from),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            Io::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.io {
            Io::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            Io::Plain(s) => Pin::new(s).poll_flush(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            Io::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
