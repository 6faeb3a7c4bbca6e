//! Verdict interpretation.
//!
//! The ICAP status code alone drives the state machine:
//!
//! - `204` ends the exchange: the file is clean.
//! - `200` means the server replaced the content with its own HTTP response,
//!   usually a block page. The page is read and a reason is extracted from it
//!   through a [`BlockPageExtractor`].
//! - anything else is a protocol error.
//!
//! Block pages are vendor specific. [`ContentDataExtractor`] understands the
//! table-cell layout used by McAfee Web Gateway and is the default; other
//! gateways need their own extractor.

use crate::error::{IcapError, IcapResult};
use crate::response::IcapHeaders;
use memchr::memmem;
use std::fmt::Debug;

/// What to do after the ICAP response head has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// `204`: unmodified, nothing more to read.
    Clean,
    /// `200`: modified content follows and must be read.
    Modified,
}

/// Map a parsed response head onto a [`Verdict`].
pub fn classify(headers: &IcapHeaders) -> IcapResult<Verdict> {
    match headers.status_code() {
        Some(204) => Ok(Verdict::Clean),
        Some(200) => Ok(Verdict::Modified),
        Some(code) => Err(IcapError::protocol(format!(
            "unrecognized status code {code} in response header"
        ))),
        None => Err(IcapError::protocol(match headers.raw_status() {
            Some(raw) => format!("unrecognized status code {raw:?} in response header"),
            None => "no status code in response header".to_string(),
        })),
    }
}

/// Pulls a human readable reason out of an encapsulated block page.
pub trait BlockPageExtractor: Send + Sync + Debug {
    fn extract(&self, body: &str) -> IcapResult<String>;
}

/// Extracts the text of the table cell tagged with a `contentData` marker.
///
/// The reason is the text between the end of the tag carrying the marker and
/// the next `</td>`, trimmed. For
/// `<td class="contentData">\nBlocked because...\n</td>` this is
/// `Blocked because...`. When the marker appears in text instead, the reason
/// starts after the last tag between it and the end tag, or right after the
/// marker if there is none; a bare `>` in the text is kept.
#[derive(Debug, Clone)]
pub struct ContentDataExtractor {
    marker: String,
    end: String,
}

impl ContentDataExtractor {
    pub const DEFAULT_MARKER: &'static str = "contentData";
    pub const DEFAULT_END: &'static str = "</td>";

    /// Use another marker / closing tag pair with the same layout rules.
    pub fn new(marker: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            end: end.into(),
        }
    }
}

impl Default for ContentDataExtractor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARKER, Self::DEFAULT_END)
    }
}

impl BlockPageExtractor for ContentDataExtractor {
    fn extract(&self, body: &str) -> IcapResult<String> {
        let bytes = body.as_bytes();
        let marker_at = memmem::find(bytes, self.marker.as_bytes()).ok_or_else(|| {
            IcapError::extraction(format!("marker {:?} not found in block page", self.marker))
        })?;
        let after_marker = marker_at + self.marker.len();

        let end_at = memmem::find(&bytes[after_marker..], self.end.as_bytes())
            .map(|i| after_marker + i)
            .ok_or_else(|| {
                IcapError::extraction(format!(
                    "{:?} not found after marker {:?}",
                    self.end, self.marker
                ))
            })?;

        let cell = &bytes[after_marker..end_at];
        let before = &bytes[..marker_at];
        let in_tag = match memchr::memrchr(b'<', before) {
            Some(lt) => memchr::memrchr(b'>', before).is_none_or(|gt| lt > gt),
            None => false,
        };
        // Marker inside a tag: skip the rest of that tag. Marker in text: skip
        // markup up to the last tag opened before the end tag.
        let skip = if in_tag {
            memchr::memchr(b'>', cell)
        } else {
            memchr::memrchr(b'<', cell)
                .and_then(|lt| memchr::memchr(b'>', &cell[lt..]).map(|gt| lt + gt))
        };
        let start = skip.map_or(after_marker, |i| after_marker + i + 1);

        let text = body
            .get(start..end_at)
            .ok_or_else(|| IcapError::extraction("block page cell is not valid text"))?;
        Ok(text.trim().to_string())
    }
}
