#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

pub mod client;
pub mod error;
pub mod net;
pub mod parser;
pub mod request;
pub mod response;
pub mod verdict;

pub use client::{Scanner, ScannerBuilder, ScannerConfig};
pub use error::{IcapError, IcapResult};
pub use request::{RespmodHead, RespmodTarget, display_name, encode_respmod_head};
pub use response::{IcapHeaders, ScanResult};
pub use verdict::{BlockPageExtractor, ContentDataExtractor};

///Lib version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Default ICAP protocol version string.
pub const ICAP_VERSION: &str = "ICAP/1.0";
/// Default ICAP port.
pub const DEFAULT_PORT: u16 = 1344;
/// Default service name of the request URI.
pub const DEFAULT_SERVICE: &str = "RESPMOD";
/// Default payload size of one outgoing body chunk.
pub const DEFAULT_SEND_CHUNK_SIZE: usize = 8024;
/// Default cap on a terminator-bounded response read.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8024;
/// End of the ICAP response head.
pub const ICAP_TERMINATOR: &str = "\r\n\r\n";
/// End of the encapsulated chunked HTTP body.
pub const HTTP_TERMINATOR: &str = "0\r\n\r\n";
