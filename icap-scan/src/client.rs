//! Scanner configuration and the single-exchange scan client.
//!
//! A [`ScannerConfig`] is built once and never changes. Connecting produces a
//! [`Scanner`], which owns the connection and performs exactly one RESPMOD
//! exchange: [`Scanner::scan_file`], [`Scanner::scan`] and [`Scanner::close`]
//! all consume it, so a second exchange on the same connection cannot be
//! expressed.

#[cfg(feature = "tls-rustls")]
pub mod tls;

use crate::error::{IcapError, IcapResult};
use crate::net::Conn;
use crate::parser::parse_icap_head;
use crate::parser::wire::{MIN_MESSAGE_LEN, TerminatorReader};
use crate::request::{
    RespmodTarget, display_name, encode_respmod_head, uri_host, write_chunked_body,
};
use crate::response::ScanResult;
use crate::verdict::{BlockPageExtractor, ContentDataExtractor, Verdict, classify};
use crate::{
    DEFAULT_PORT, DEFAULT_RECV_BUFFER_SIZE, DEFAULT_SEND_CHUNK_SIZE, DEFAULT_SERVICE,
    HTTP_TERMINATOR, ICAP_TERMINATOR, ICAP_VERSION,
};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Immutable connection and protocol parameters.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    host: String,
    port: u16,
    service: String,
    version: String,
    send_chunk_size: usize,
    recv_buffer_size: usize,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    #[cfg(feature = "tls-rustls")]
    tls: Option<tls::TlsConfig>,
}

impl ScannerConfig {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    /// Shortcut for `builder().from_uri(uri)?.build()`.
    pub fn from_uri(uri: &str) -> IcapResult<Self> {
        ScannerBuilder::new().from_uri(uri)?.build()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn send_chunk_size(&self) -> usize {
        self.send_chunk_size
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// `icap://host:port/service`
    pub fn icap_uri(&self) -> String {
        format!(
            "icap://{}:{}/{}",
            uri_host(&self.host),
            self.port,
            self.service
        )
    }

    pub fn target(&self) -> RespmodTarget<'_> {
        RespmodTarget {
            host: &self.host,
            port: self.port,
            service: &self.service,
            version: &self.version,
        }
    }

    /// Open the connection. Fails with [`IcapError::Connect`] if the server is
    /// unreachable, or [`IcapError::Timeout`] if a connect timeout is set and expires.
    pub async fn connect(&self) -> IcapResult<Scanner<Conn>> {
        let addr = format!("{}:{}", self.host, self.port);
        debug!(%addr, "connecting to ICAP server");

        let fut = TcpStream::connect((self.host.as_str(), self.port));
        let tcp = match self.connect_timeout {
            Some(d) => tokio::time::timeout(d, fut)
                .await
                .map_err(|_| IcapError::Timeout(d))?,
            None => fut.await,
        }
        .map_err(|source| IcapError::Connect {
            addr: addr.clone(),
            source,
        })?;

        #[cfg(feature = "tls-rustls")]
        let conn = match &self.tls {
            Some(tls) => tls.connect(tcp, &self.host).await?,
            None => Conn::plain(tcp),
        };
        #[cfg(not(feature = "tls-rustls"))]
        let conn = Conn::plain(tcp);

        debug!(%addr, peer = ?conn.peer_addr().ok(), "connected");
        Ok(Scanner::from_stream(conn, self.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct ScannerBuilder {
    host: Option<String>,
    port: u16,
    service: String,
    version: String,
    send_chunk_size: usize,
    recv_buffer_size: usize,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    #[cfg(feature = "tls-rustls")]
    tls: Option<tls::TlsConfig>,
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            service: DEFAULT_SERVICE.to_string(),
            version: ICAP_VERSION.to_string(),
            send_chunk_size: DEFAULT_SEND_CHUNK_SIZE,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            connect_timeout: None,
            read_timeout: None,
            #[cfg(feature = "tls-rustls")]
            tls: None,
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Service name placed in the request URI (default `RESPMOD`).
    pub fn service(mut self, service: &str) -> Self {
        self.service = trim_leading_slash(service).to_string();
        self
    }

    /// Protocol version string of the request line (default `ICAP/1.0`).
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Maximum payload size of one outgoing body chunk.
    pub fn send_chunk_size(mut self, n: usize) -> Self {
        self.send_chunk_size = n;
        self
    }

    /// Cap on the bytes read while looking for a response terminator.
    pub fn recv_buffer_size(mut self, n: usize) -> Self {
        self.recv_buffer_size = n;
        self
    }

    pub fn connect_timeout(mut self, dur: Option<Duration>) -> Self {
        self.connect_timeout = dur;
        self
    }

    /// Idle timeout applied to each read of the response.
    pub fn read_timeout(mut self, dur: Option<Duration>) -> Self {
        self.read_timeout = dur;
        self
    }

    /// Use ICAP over TLS.
    #[cfg(feature = "tls-rustls")]
    pub fn tls(mut self, cfg: tls::TlsConfig) -> Self {
        self.tls = Some(cfg);
        self
    }

    /// Take host, port and service from `icap://host[:port][/service]`.
    /// An `icaps://` scheme also enables TLS when the `tls-rustls` feature is on.
    pub fn from_uri(mut self, uri: &str) -> IcapResult<Self> {
        let parsed = parse_icap_uri(uri)?;
        if parsed.tls {
            #[cfg(feature = "tls-rustls")]
            {
                self.tls.get_or_insert_with(tls::TlsConfig::default);
            }
            #[cfg(not(feature = "tls-rustls"))]
            return Err(IcapError::configuration(
                "icaps:// requires the `tls-rustls` feature",
            ));
        }
        self.host = Some(parsed.host);
        self.port = parsed.port;
        if let Some(service) = parsed.service {
            self.service = service;
        }
        Ok(self)
    }

    pub fn build(self) -> IcapResult<ScannerConfig> {
        let host = self
            .host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| IcapError::configuration("host is required"))?;
        check_token("host", &host)?;
        check_token("service", &self.service)?;
        check_token("version", &self.version)?;
        if self.send_chunk_size == 0 {
            return Err(IcapError::configuration("send chunk size must be positive"));
        }
        let min_recv = HTTP_TERMINATOR.len().max(ICAP_TERMINATOR.len()) + MIN_MESSAGE_LEN;
        if self.recv_buffer_size <= min_recv {
            return Err(IcapError::configuration(format!(
                "receive buffer size must be larger than {min_recv} bytes"
            )));
        }

        Ok(ScannerConfig {
            host,
            port: self.port,
            service: self.service,
            version: self.version,
            send_chunk_size: self.send_chunk_size,
            recv_buffer_size: self.recv_buffer_size,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            #[cfg(feature = "tls-rustls")]
            tls: self.tls,
        })
    }
}

/// One connection, one RESPMOD exchange.
#[derive(Debug)]
pub struct Scanner<S> {
    stream: S,
    config: ScannerConfig,
    extractor: Box<dyn BlockPageExtractor>,
}

impl<S> Scanner<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already established stream.
    pub fn from_stream(stream: S, config: ScannerConfig) -> Self {
        Self {
            stream,
            config,
            extractor: Box::new(ContentDataExtractor::default()),
        }
    }

    /// Replace the block-page extractor used on `200` responses.
    pub fn with_extractor<E>(mut self, extractor: E) -> Self
    where
        E: BlockPageExtractor + 'static,
    {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan the file at `path`, then close the connection.
    pub async fn scan_file(self, path: impl AsRef<Path>) -> IcapResult<ScanResult> {
        let path = path.as_ref();
        let file_err = |source| IcapError::File {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(file_err)?;
        let len = file.metadata().await.map_err(file_err)?.len();
        self.scan(file, len, &display_name(path)).await
    }

    /// Scan `len` bytes read from `source`, presented to the server as `name`,
    /// then close the connection.
    pub async fn scan<R>(mut self, mut source: R, len: u64, name: &str) -> IcapResult<ScanResult>
    where
        R: AsyncRead + Unpin,
    {
        let result = self.exchange(&mut source, len, name).await;
        self.close().await;
        result
    }

    /// Shut the connection down without scanning.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            warn!(error = %e, "ICAP connection shutdown failed");
        }
    }

    async fn exchange<R>(&mut self, source: &mut R, len: u64, name: &str) -> IcapResult<ScanResult>
    where
        R: AsyncRead + Unpin,
    {
        let head = encode_respmod_head(self.config.target(), len, name, &chrono::Local::now());
        debug!(
            uri = %self.config.icap_uri(),
            file = name,
            size = len,
            res_hdr = head.res_hdr_offset(),
            res_body = head.res_body_offset(),
            "sending RESPMOD"
        );
        self.stream.write_all(head.as_bytes()).await?;

        let sent =
            write_chunked_body(source, &mut self.stream, self.config.send_chunk_size).await?;
        self.stream.flush().await?;
        if sent != len {
            warn!(declared = len, sent, "source length differs from bytes sent");
        }
        debug!(bytes = sent, "body sent");

        let limit = self.config.recv_buffer_size;
        let mut reader = TerminatorReader::new(&mut self.stream, self.config.read_timeout);
        let raw = reader.read_until(ICAP_TERMINATOR, limit).await?;
        let headers = parse_icap_head(&raw);
        debug!(status = ?headers.raw_status(), headers = headers.len(), "ICAP response head");

        match classify(&headers)? {
            Verdict::Clean => Ok(ScanResult::clean()),
            Verdict::Modified => {
                let page = reader.read_until(HTTP_TERMINATOR, limit).await?;
                let message = self.extractor.extract(&page)?;
                debug!(%message, "content blocked");
                Ok(ScanResult::blocked(message))
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct IcapUri {
    tls: bool,
    host: String,
    port: u16,
    service: Option<String>,
}

fn parse_icap_uri(uri: &str) -> IcapResult<IcapUri> {
    let s = uri.trim();
    let (tls, rest) = if let Some(r) = s.strip_prefix("icap://") {
        (false, r)
    } else if let Some(r) = s.strip_prefix("icaps://") {
        (true, r)
    } else {
        return Err(IcapError::configuration(
            "authority URI must start with icap:// or icaps://",
        ));
    };

    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
        let (h, after) = v6
            .split_once(']')
            .ok_or_else(|| IcapError::configuration("unterminated IPv6 literal"))?;
        (h, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (authority, None),
        }
    };
    let port = match port {
        Some(p) => p
            .parse()
            .map_err(|_| IcapError::configuration(format!("invalid port: {p}")))?,
        None => DEFAULT_PORT,
    };
    if host.is_empty() {
        return Err(IcapError::configuration("empty host in authority"));
    }

    let service = path.split(['?', '#']).next().unwrap_or_default();
    Ok(IcapUri {
        tls,
        host: host.to_string(),
        port,
        service: (!service.is_empty()).then(|| service.to_string()),
    })
}

fn trim_leading_slash(s: &str) -> &str {
    s.strip_prefix('/').unwrap_or(s)
}

fn check_token(what: &str, value: &str) -> IcapResult<()> {
    if value.is_empty() || value.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(IcapError::configuration(format!(
            "{what} must be non-empty and contain no whitespace: {value:?}"
        )));
    }
    Ok(())
}
