//! # netkeeper parsers
//!
//! Parsers that turn unstructured probe output into structured statistics.
//!
//! ## Example
//!
//! ```rust
//! use netkeeper_parsers::PingOutputParser;
//!
//! let output = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.412 ms\n\
//!               1 packets transmitted, 1 received, 0% packet loss, time 0ms";
//!
//! let mut parser = PingOutputParser::new();
//! assert!(parser.parse(output));
//! assert_eq!(parser.packets_received(), 1);
//! ```

pub mod ping;

pub use ping::{parse_ping_output, ParserState, PingOutputParser, PingStatistics};
