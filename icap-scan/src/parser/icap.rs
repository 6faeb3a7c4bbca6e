use crate::response::IcapHeaders;
use tracing::{trace, warn};

/// Parse an ICAP response head (status line plus header fields).
///
/// The status code is the token between the first and the second space of the
/// status line and is stored under [`IcapHeaders::STATUS_CODE`]. A status line
/// with fewer than two spaces yields no status entry, which the verdict stage
/// rejects as "no status code".
///
/// Header names keep the case they were received with. A repeated name
/// overwrites the earlier value.
pub fn parse_icap_head(text: &str) -> IcapHeaders {
    let mut headers = IcapHeaders::new();
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    match status_token(status_line) {
        Some(code) => headers.insert(IcapHeaders::STATUS_CODE, code),
        None => warn!(line = %status_line, "malformed ICAP status line"),
    }

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            warn!(line = %line, "skipping ICAP header line without colon");
            continue;
        };
        let value = value.trim_start_matches([' ', '\t']);
        trace!(name = %name, value = %value, "icap header");
        headers.insert(name, value);
    }

    headers
}

fn status_token(line: &str) -> Option<&str> {
    let first = line.find(' ')?;
    let rest = &line[first + 1..];
    let second = rest.find(' ')?;
    Some(&rest[..second])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_status_and_headers() {
        let h = parse_icap_head("ICAP/1.0 204 Unmodified\r\nServer: X\r\n\r\n");
        assert_eq!(h.get(IcapHeaders::STATUS_CODE), Some("204"));
        assert_eq!(h.get("Server"), Some("X"));
        assert_eq!(h.status_code(), Some(204));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn parses_c_icap_sample() {
        let raw = "ICAP/1.0 204 Unmodified\r\n\
                   Server: C-ICAP/0.1.6\r\n\
                   Connection: keep-alive\r\n\
                   ISTag: CI0001-000-0978-6918203\r\n\
                   \r\n";
        let h = parse_icap_head(raw);
        assert_eq!(h.get("Server"), Some("C-ICAP/0.1.6"));
        assert_eq!(h.get("Connection"), Some("keep-alive"));
        assert_eq!(h.get("ISTag"), Some("CI0001-000-0978-6918203"));
        assert_eq!(h.get_ignore_case("istag"), Some("CI0001-000-0978-6918203"));
        assert_eq!(h.get("istag"), None);
    }

    #[test]
    fn value_keeps_later_colons() {
        let h = parse_icap_head("ICAP/1.0 200 OK\r\nX-Url: http://a:80/b\r\n\r\n");
        assert_eq!(h.get("X-Url"), Some("http://a:80/b"));
    }

    #[test]
    fn duplicate_header_last_write_wins() {
        let h = parse_icap_head("ICAP/1.0 200 OK\r\nISTag: first\r\nISTag: second\r\n\r\n");
        assert_eq!(h.get("ISTag"), Some("second"));
        assert_eq!(h.len(), 2);
    }

    #[rstest]
    #[case("ICAP/1.0 204\r\nServer: X\r\n\r\n")]
    #[case("ICAP/1.0\r\nServer: X\r\n\r\n")]
    #[case("garbage\r\n\r\n")]
    #[case("")]
    fn malformed_status_line_has_no_status(#[case] raw: &str) {
        let h = parse_icap_head(raw);
        assert_eq!(h.get(IcapHeaders::STATUS_CODE), None);
        assert_eq!(h.status_code(), None);
    }

    #[test]
    fn non_numeric_status_is_kept_raw_but_not_a_code() {
        let h = parse_icap_head("ICAP/1.0 abc Weird\r\n\r\n");
        assert_eq!(h.raw_status(), Some("abc"));
        assert_eq!(h.status_code(), None);
    }

    #[test]
    fn stops_at_blank_line() {
        let h = parse_icap_head("ICAP/1.0 200 OK\r\nA: 1\r\n\r\nB: 2\r\n");
        assert_eq!(h.get("A"), Some("1"));
        assert_eq!(h.get("B"), None);
    }

    #[test]
    fn lines_without_colon_are_skipped() {
        let h = parse_icap_head("ICAP/1.0 200 OK\r\nbogus line\r\nA: 1\r\n\r\n");
        assert_eq!(h.get("A"), Some("1"));
        assert_eq!(h.len(), 2);
    }
}
