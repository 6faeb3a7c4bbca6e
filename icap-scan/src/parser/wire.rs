use crate::error::{IcapError, IcapResult};
use memchr::memmem;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Shortest legal status line, e.g. `ICAP/1.0 xxx\r\n`.
/// A terminator is only accepted once it starts past this many bytes.
pub const MIN_MESSAGE_LEN: usize = 13;

const READ_CHUNK: usize = 4096;

/// Reads terminator-delimited blocks off a stream that has no other framing.
///
/// Bytes read past a terminator stay buffered and are served to the next
/// [`read_until`](Self::read_until) call, so reading in large increments never
/// swallows the beginning of the following block.
#[derive(Debug)]
pub struct TerminatorReader<R> {
    stream: R,
    buf: Vec<u8>,
    read_timeout: Option<Duration>,
}

impl<R> TerminatorReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(stream: R, read_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            read_timeout,
        }
    }

    /// Read until `terminator`, accumulating at most `limit` bytes for the block.
    ///
    /// Returns the block including its terminator. Hitting `limit` first is a
    /// [`IcapError::Framing`]; EOF first is an [`IcapError::UnexpectedEof`].
    pub async fn read_until(&mut self, terminator: &'static str, limit: usize) -> IcapResult<String> {
        let t = terminator.as_bytes();
        let mut scanned = 0usize;

        loop {
            let window_start = scanned
                .saturating_sub(t.len().saturating_sub(1))
                .max(MIN_MESSAGE_LEN + 1);
            let window_end = self.buf.len().min(limit);

            if window_end > window_start
                && let Some(pos) = memmem::find(&self.buf[window_start..window_end], t)
            {
                let end = window_start + pos + t.len();
                let block: Vec<u8> = self.buf.drain(..end).collect();
                trace!(len = block.len(), terminator = ?terminator, "terminator found");
                return Ok(String::from_utf8_lossy(&block).into_owned());
            }
            scanned = window_end;

            if self.buf.len() >= limit {
                return Err(IcapError::Framing { terminator, limit });
            }

            let start = self.buf.len();
            let want = (limit - start).min(READ_CHUNK);
            self.buf.resize(start + want, 0);
            let n = match self.read_some(start).await {
                Ok(n) => n,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e);
                }
            };
            self.buf.truncate(start + n);
            if n == 0 {
                return Err(IcapError::UnexpectedEof {
                    terminator,
                    received: start,
                });
            }
        }
    }

    async fn read_some(&mut self, from: usize) -> IcapResult<usize> {
        let fut = self.stream.read(&mut self.buf[from..]);
        match self.read_timeout {
            Some(d) => tokio::time::timeout(d, fut)
                .await
                .map_err(|_| IcapError::Timeout(d))?
                .map_err(IcapError::from),
            None => fut.await.map_err(IcapError::from),
        }
    }

    /// Number of bytes received but not yet returned as part of a block.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Write one chunk to socket.
pub async fn write_chunk<S>(stream: &mut S, data: &[u8]) -> IcapResult<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(16 + data.len() + 2);
    write_chunk_into(&mut buf, data);
    stream.write_all(&buf).await?;
    Ok(())
}

/// Write one chunk into already-assembled buffer.
pub fn write_chunk_into(out: &mut Vec<u8>, data: &[u8]) {
    // Writing into a Vec cannot fail.
    let _ = write!(out, "{:X}\r\n", data.len());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Parse a single chunk: returns (next_pos, is_final_zero, size).
#[cfg(test)]
pub(crate) fn parse_one_chunk(buf: &[u8], from: usize) -> Option<(usize, bool, usize)> {
    let line_end = from + memmem::find(&buf[from..], b"\r\n")?;
    let size_str = std::str::from_utf8(&buf[from..line_end]).ok()?.trim();
    let size = usize::from_str_radix(size_str, 16).ok()?;
    let after_size = line_end + 2;
    let need = after_size + size + 2;
    if buf.len() < need || &buf[after_size + size..need] != b"\r\n" {
        return None;
    }
    Some((need, size == 0, size))
}

/// Reassemble the payload of a complete chunked body.
#[cfg(test)]
pub(crate) fn dechunk(buf: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let (next, is_final, size) = parse_one_chunk(buf, pos)?;
        if is_final {
            return (next == buf.len()).then_some(out);
        }
        let data_start = next - size - 2;
        out.extend_from_slice(&buf[data_start..data_start + size]);
        pos = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HTTP_TERMINATOR, ICAP_TERMINATOR};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_header_and_keeps_following_block() {
        let wire = b"ICAP/1.0 200 OK\r\nISTag: x\r\n\r\nHTTP/1.1 403 Forbidden\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let mut r = TerminatorReader::new(&wire[..], None);

        let head = r.read_until(ICAP_TERMINATOR, 1024).await.unwrap();
        assert_eq!(head, "ICAP/1.0 200 OK\r\nISTag: x\r\n\r\n");

        let body = r.read_until(HTTP_TERMINATOR, 1024).await.unwrap();
        assert!(body.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(body.ends_with("hello\r\n0\r\n\r\n"));
        assert_eq!(r.buffered(), 0);
    }

    #[tokio::test]
    async fn terminator_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            for part in [&b"ICAP/1.0 204 Unmodified\r"[..], b"\n", b"Server: X\r\n\r", b"\n"] {
                tx.write_all(part).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let mut r = TerminatorReader::new(rx, None);
        let head = r.read_until(ICAP_TERMINATOR, 256).await.unwrap();
        assert_eq!(head, "ICAP/1.0 204 Unmodified\r\nServer: X\r\n\r\n");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn cap_reached_is_framing_error() {
        let endless = vec![b'A'; 4096];
        let mut r = TerminatorReader::new(&endless[..], None);
        let err = r.read_until(ICAP_TERMINATOR, 64).await.unwrap_err();
        assert!(matches!(err, IcapError::Framing { limit: 64, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn terminator_past_cap_is_framing_error() {
        let wire = b"ICAP/1.0 204 Unmodified\r\nServer: X\r\n\r\n";
        let mut r = TerminatorReader::new(&wire[..], None);
        let err = r.read_until(ICAP_TERMINATOR, wire.len() - 1).await.unwrap_err();
        assert!(err.is_framing());
    }

    #[tokio::test]
    async fn eof_before_terminator() {
        let wire = b"ICAP/1.0 204 Unmodified\r\nServer: X\r\n";
        let mut r = TerminatorReader::new(&wire[..], None);
        let err = r.read_until(ICAP_TERMINATOR, 1024).await.unwrap_err();
        match err {
            IcapError::UnexpectedEof { received, .. } => assert_eq!(received, wire.len()),
            other => panic!("expected EOF framing error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminator_inside_status_line_window_is_ignored() {
        // Too short to be a status line: the early CRLFCRLF is not accepted.
        let wire = b"ICAP/1.0\r\n\r\n204 X\r\nA: b\r\n\r\n";
        let mut r = TerminatorReader::new(&wire[..], None);
        let head = r.read_until(ICAP_TERMINATOR, 1024).await.unwrap();
        assert_eq!(head.len(), wire.len());
    }

    #[tokio::test]
    async fn read_timeout_fires() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut r = TerminatorReader::new(rx, Some(Duration::from_millis(50)));
        let err = r.read_until(ICAP_TERMINATOR, 1024).await.unwrap_err();
        assert!(matches!(err, IcapError::Timeout(_)), "{err:?}");
    }

    #[test]
    fn chunk_framing() {
        let mut out = Vec::new();
        write_chunk_into(&mut out, b"hello world");
        assert_eq!(out, b"B\r\nhello world\r\n");
        out.extend_from_slice(b"0\r\n\r\n");
        assert_eq!(dechunk(&out).unwrap(), b"hello world");
    }
}
