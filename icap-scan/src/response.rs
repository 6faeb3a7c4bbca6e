//! Scan outcome and parsed ICAP response head.
//!
//! This module defines:
//! - [`ScanResult`]: the terminal, immutable classification of one exchange.
//! - [`IcapHeaders`]: header fields of an ICAP response head, keyed by the
//!   name as received, plus the synthetic [`IcapHeaders::STATUS_CODE`] entry.
//!
//! # Examples
//!
//! ```rust
//! use icap_scan::ScanResult;
//!
//! let clean = ScanResult::clean();
//! assert!(clean.success());
//! assert_eq!(clean.icap_status_code(), 204);
//! assert_eq!(clean.message(), "File Scanned Successfully");
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Iter;
use std::fmt;

/// Message returned for a 204 verdict.
pub const CLEAN_MESSAGE: &str = "File Scanned Successfully";

/// Classification returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    success: bool,
    icap_status_code: u16,
    message: String,
}

impl ScanResult {
    /// `204 No Content`: the server left the content unmodified.
    pub fn clean() -> Self {
        Self {
            success: true,
            icap_status_code: 204,
            message: CLEAN_MESSAGE.to_string(),
        }
    }

    /// `200 OK`: the server replaced the content, `message` is its reason.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            success: false,
            icap_status_code: 200,
            message: message.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn icap_status_code(&self) -> u16 {
        self.icap_status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_blocked(&self) -> bool {
        !self.success
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.success { "CLEAN" } else { "BLOCKED" };
        write!(f, "{tag} {} {}", self.icap_status_code, self.message)
    }
}

/// Header fields of an ICAP response head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcapHeaders {
    fields: HashMap<String, String>,
}

impl IcapHeaders {
    /// Synthetic key holding the status token of the status line.
    pub const STATUS_CODE: &'static str = "StatusCode";

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field; an existing value under the same name is replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Exact-case lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// ASCII case-insensitive lookup.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            self.fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    /// The status token exactly as it appeared on the status line.
    pub fn raw_status(&self) -> Option<&str> {
        self.get(Self::STATUS_CODE)
    }

    /// The numeric status code, if the status token is a number.
    pub fn status_code(&self) -> Option<u16> {
        self.raw_status()?.trim().parse().ok()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a IcapHeaders {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
