//! Connection wrapper used by the scanner.
//!
//! [`Conn`] abstracts over the transport: plain TCP, or TLS over **rustls**
//! when the `tls-rustls` feature is enabled. It implements
//! `AsyncRead`/`AsyncWrite` by delegating to the inner stream, projecting the
//! pinned variants with `pin_project_lite`.

use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(feature = "tls-rustls")]
pin_project! {
    /// Transport connection to an ICAP server.
    #[project = ConnProj]
    #[derive(Debug)]
    pub enum Conn {
        /// Plain TCP connection (no TLS).
        Plain { #[pin] inner: TcpStream },
        /// TLS connection using rustls.
        Rustls { #[pin] inner: tokio_rustls::client::TlsStream<TcpStream> },
    }
}

#[cfg(not(feature = "tls-rustls"))]
pin_project! {
    /// Transport connection to an ICAP server.
    #[project = ConnProj]
    #[derive(Debug)]
    pub enum Conn {
        /// Plain TCP connection (no TLS).
        Plain { #[pin] inner: TcpStream },
    }
}

impl Conn {
    pub fn plain(inner: TcpStream) -> Self {
        Conn::Plain { inner }
    }

    /// Address of the ICAP server this connection talks to.
    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        match self {
            Conn::Plain { inner } => inner.peer_addr(),
            #[cfg(feature = "tls-rustls")]
            Conn::Rustls { inner } => inner.get_ref().0.peer_addr(),
        }
    }
}

macro_rules! delegate {
    ($this:expr, $inner:ident => $e:expr) => {
        match $this.project() {
            ConnProj::Plain { inner: $inner } => $e,
            #[cfg(feature = "tls-rustls")]
            ConnProj::Rustls { inner: $inner } => $e,
        }
    };
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        delegate!(self, inner => inner.poll_read(cx, buf))
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        delegate!(self, inner => inner.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, inner => inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, inner => inner.poll_shutdown(cx))
    }
}
