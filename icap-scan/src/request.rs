//! RESPMOD request encoding.
//!
//! A scan request wraps the file in a synthetic HTTP exchange:
//!
//! ```text
//! RESPMOD icap://<host>:<port>/<service> <version>\r\n
//! Allow: 204\r\n
//! Connection: close\r\n
//! Host: <host>\r\n
//! Encapsulated: req-hdr=0, res-hdr=<a>, res-body=<a+b>\r\n
//! \r\n
//! GET http://<host>/<yyyyMMddHHmm>/<name> HTTP/1.1\r\n     <- a bytes
//! Host: <host>\r\n\r\n
//! HTTP/1.1 200 OK\r\n                                      <- b bytes
//! Transfer-Encoding: chunked\r\n
//! Content-Length: <size>\r\n\r\n
//! <hex>\r\n<bytes>\r\n ... 0\r\n\r\n
//! ```
//!
//! The `Content-Length` of the synthetic response is the file size even though
//! the body is chunked; servers in the field expect exactly this shape.

use crate::error::IcapResult;
use crate::parser::wire::write_chunk;
use chrono::{DateTime, TimeZone};
use std::borrow::Cow;
use std::fmt::Display;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Terminal chunk of the chunked file body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Everything sent before the file body, plus its encapsulated offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespmodHead {
    bytes: Vec<u8>,
    res_hdr: usize,
    res_body: usize,
}

impl RespmodHead {
    /// Raw bytes: ICAP head followed by both encapsulated HTTP header blocks.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `res-hdr` offset: length of the encapsulated HTTP request block.
    pub fn res_hdr_offset(&self) -> usize {
        self.res_hdr
    }

    /// `res-body` offset: length of both encapsulated header blocks.
    pub fn res_body_offset(&self) -> usize {
        self.res_body
    }
}

/// Parameters of one RESPMOD head.
#[derive(Debug, Clone, Copy)]
pub struct RespmodTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub service: &'a str,
    pub version: &'a str,
}

/// Host as written into URIs and `Host` headers: IPv6 literals get their
/// brackets back.
pub fn uri_host(host: &str) -> Cow<'_, str> {
    if host.contains(':') && !host.starts_with('[') {
        Cow::Owned(format!("[{host}]"))
    } else {
        Cow::Borrowed(host)
    }
}

/// Name a file is presented under: its last path component, or the whole
/// path when it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Encapsulated HTTP request block: the synthetic GET the file "came from".
pub fn encapsulated_http_request<Tz>(host: &str, timestamp: &DateTime<Tz>, name: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let host = uri_host(host);
    format!(
        "GET http://{host}/{}/{name} HTTP/1.1\r\nHost: {host}\r\n\r\n",
        timestamp.format("%Y%m%d%H%M")
    )
}

/// Encapsulated HTTP response header block announcing a chunked body.
pub fn encapsulated_http_response(file_size: u64) -> String {
    format!("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: {file_size}\r\n\r\n")
}

/// Build the full head for a file of `file_size` bytes shown to the server as `name`.
pub fn encode_respmod_head<Tz>(
    target: RespmodTarget<'_>,
    file_size: u64,
    name: &str,
    timestamp: &DateTime<Tz>,
) -> RespmodHead
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let RespmodTarget {
        host,
        port,
        service,
        version,
    } = target;
    let http_request = encapsulated_http_request(host, timestamp, name);
    let http_response = encapsulated_http_response(file_size);
    let host = uri_host(host);

    let res_hdr = http_request.len();
    let res_body = res_hdr + http_response.len();

    let icap_head = format!(
        "RESPMOD icap://{host}:{port}/{service} {version}\r\n\
         Allow: 204\r\n\
         Connection: close\r\n\
         Host: {host}\r\n\
         Encapsulated: req-hdr=0, res-hdr={res_hdr}, res-body={res_body}\r\n\
         \r\n"
    );

    let mut bytes = Vec::with_capacity(icap_head.len() + res_body);
    bytes.extend_from_slice(icap_head.as_bytes());
    bytes.extend_from_slice(http_request.as_bytes());
    bytes.extend_from_slice(http_response.as_bytes());

    RespmodHead {
        bytes,
        res_hdr,
        res_body,
    }
}

/// Stream `source` to `sink` as HTTP chunks of at most `chunk_size` bytes,
/// then write the terminal chunk. Returns the number of payload bytes sent.
///
/// A zero-length read ends the body.
pub async fn write_chunked_body<R, W>(
    source: &mut R,
    sink: &mut W,
    chunk_size: usize,
) -> IcapResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        write_chunk(sink, &buf[..n]).await?;
        total += n as u64;
        trace!(chunk = n, total, "body chunk sent");
    }
    sink.write_all(LAST_CHUNK).await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::wire::dechunk;
    use chrono::{NaiveDate, Utc};
    use rstest::rstest;

    fn ts() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 59))
            .unwrap()
            .and_utc()
    }

    fn target(host: &str) -> RespmodTarget<'_> {
        RespmodTarget {
            host,
            port: 1344,
            service: "RESPMOD",
            version: "ICAP/1.0",
        }
    }

    #[test]
    fn head_bytes_exact() {
        let head = encode_respmod_head(target("10.0.0.1"), 42, "report.pdf", &ts());
        let expected = "RESPMOD icap://10.0.0.1:1344/RESPMOD ICAP/1.0\r\n\
                        Allow: 204\r\n\
                        Connection: close\r\n\
                        Host: 10.0.0.1\r\n\
                        Encapsulated: req-hdr=0, res-hdr=72, res-body=139\r\n\
                        \r\n\
                        GET http://10.0.0.1/202403090705/report.pdf HTTP/1.1\r\n\
                        Host: 10.0.0.1\r\n\
                        \r\n\
                        HTTP/1.1 200 OK\r\n\
                        Transfer-Encoding: chunked\r\n\
                        Content-Length: 42\r\n\
                        \r\n";
        assert_eq!(String::from_utf8(head.into_bytes()).unwrap(), expected);
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let head = encode_respmod_head(target("::1"), 5, "a.txt", &ts());
        let text = String::from_utf8(head.into_bytes()).unwrap();
        assert!(text.starts_with("RESPMOD icap://[::1]:1344/RESPMOD ICAP/1.0\r\n"));
        assert!(text.contains("\r\nHost: [::1]\r\nEncapsulated:"));
        assert!(text.contains("GET http://[::1]/202403090705/a.txt HTTP/1.1\r\nHost: [::1]\r\n\r\n"));
    }

    #[rstest]
    #[case("10.0.0.1", "10.0.0.1")]
    #[case("icap.example", "icap.example")]
    #[case("::1", "[::1]")]
    #[case("fe80::1%eth0", "[fe80::1%eth0]")]
    #[case("[::1]", "[::1]")]
    fn uri_host_rendering(#[case] host: &str, #[case] expected: &str) {
        assert_eq!(uri_host(host), expected);
    }

    #[rstest]
    #[case("/tmp/scans/report.pdf", "report.pdf")]
    #[case("relative/dir/data.bin", "data.bin")]
    #[case("plain.txt", "plain.txt")]
    #[case("/", "/")]
    #[case("..", "..")]
    fn display_name_is_last_component(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(display_name(Path::new(path)), expected);
    }

    #[rstest]
    #[case("10.0.0.1", "a.txt", 0)]
    #[case("av.example.internal", "some file with spaces.docx", 123_456_789)]
    #[case("h", "x", 1)]
    fn encapsulated_offsets_match_blocks(
        #[case] host: &str,
        #[case] name: &str,
        #[case] size: u64,
    ) {
        let head = encode_respmod_head(target(host), size, name, &ts());
        let bytes = head.as_bytes();
        let body_start = memchr::memmem::find(bytes, b"\r\n\r\n").unwrap() + 4;
        let payload = std::str::from_utf8(&bytes[body_start..]).unwrap();

        let req = &payload[..head.res_hdr_offset()];
        let res = &payload[head.res_hdr_offset()..head.res_body_offset()];
        assert_eq!(req, encapsulated_http_request(host, &ts(), name));
        assert_eq!(res, encapsulated_http_response(size));
        assert_eq!(payload.len(), head.res_body_offset());

        let icap = std::str::from_utf8(&bytes[..body_start]).unwrap();
        let enc = format!(
            "Encapsulated: req-hdr=0, res-hdr={}, res-body={}\r\n",
            head.res_hdr_offset(),
            head.res_body_offset()
        );
        assert!(icap.contains(&enc));
    }

    #[rstest]
    #[case(0, 8)]
    #[case(1, 8)]
    #[case(8, 8)]
    #[case(9, 8)]
    #[case(100_000, 8024)]
    #[tokio::test]
    async fn chunked_body_roundtrip(#[case] size: usize, #[case] chunk: usize) {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let sent = write_chunked_body(&mut &data[..], &mut out, chunk)
            .await
            .unwrap();

        assert_eq!(sent, size as u64);
        assert!(out.ends_with(LAST_CHUNK));
        assert_eq!(dechunk(&out).unwrap(), data);
        if size == 0 {
            assert_eq!(out, LAST_CHUNK);
        }
    }

    #[tokio::test]
    async fn chunk_sizes_are_bounded_and_hex() {
        let data = vec![7u8; 0x1A];
        let mut out = Vec::new();
        write_chunked_body(&mut &data[..], &mut out, 0x10).await.unwrap();
        assert!(out.starts_with(b"10\r\n"));
        let second = 4 + 0x10 + 2;
        assert!(out[second..].starts_with(b"A\r\n"));
    }
}
