//! TLS connector built on top of **rustls** (0.23) + **tokio-rustls**.
//!
//! - Loads platform root CAs via `rustls-native-certs` and appends
//!   user-provided extra roots.
//! - SNI is required: the server name must be a valid DNS name or IP address.

use std::sync::Arc;

use rustls::RootCertStore;
use rustls::client::ClientConfig;
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::error::{IcapError, IcapResult};
use crate::net::Conn;

/// Configuration for ICAPS (ICAP over TLS).
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// SNI / verification name; defaults to the configured host.
    pub server_name: Option<String>,
    /// Extra root certificates in **DER** form appended to the platform store.
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl TlsConfig {
    /// Perform a TLS client handshake over `tcp`.
    pub(crate) async fn connect(&self, tcp: TcpStream, host: &str) -> IcapResult<Conn> {
        let name = self.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(name.to_string())
            .map_err(|_| IcapError::Tls(format!("invalid SNI server name: {name}")))?;

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            warn!(error = %e, "failed to load a platform certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "platform roots loaded");
        for cert in &self.extra_roots {
            roots
                .add(cert.clone())
                .map_err(|e| IcapError::Tls(format!("extra root: {e}")))?;
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let cfg = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| IcapError::Tls(format!("protocol versions: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let tls = TlsConnector::from(Arc::new(cfg))
            .connect(server_name, tcp)
            .await
            .map_err(|e| IcapError::Tls(format!("handshake with {name} failed: {e}")))?;
        Ok(Conn::Rustls { inner: tls })
    }
}
