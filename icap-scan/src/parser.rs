//! Wire-level pieces of the exchange: terminator-bounded reads, chunk
//! framing and response head parsing.

mod icap;
pub mod wire;

pub use icap::parse_icap_head;
pub use wire::TerminatorReader;
