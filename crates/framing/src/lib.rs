//! Strand Framing
//!
//! Turns an unframed byte (or text) stream into newline-delimited messages.
//!
//! # Components
//!
//! - **Scanner** - single-pass, quote-aware, time-boxed message framing
//! - **Channel buffer** - bounded chunk queue with overload strategies in
//!   front of one scanner, plus the channel lifecycle
//!
//! # Design Principles
//!
//! - **Zero-copy**: messages are slices of the pushed chunks
//! - **One pass**: separator offsets and the category marker are recorded
//!   while looking for boundaries
//! - **Cooperative**: every call is bounded by a time budget and resumable
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use strand_framing::{Scanner, ScannerConfig};
//! use std::time::Duration;
//!
//! let mut scanner = Scanner::<Bytes>::new(
//!     ScannerConfig::default(),
//!     Box::new(|msg| println!("{:?}", msg.to_bytes())),
//! );
//! scanner.try_push(Bytes::from_static(b"a=1,b=2\n")).unwrap();
//! scanner.process(Duration::from_millis(1), false);
//! ```

mod arena;
pub mod channel;
mod message;
pub mod payload;
pub mod ring;
pub mod scanner;
mod separators;

pub use channel::{ChannelBuffer, ChannelConfig, ChannelStats};
pub use message::Message;
pub use payload::{Payload, TextChunk};
pub use ring::OverloadStrategy;
pub use scanner::{MessageCallback, ProcessOutcome, Scanner, ScannerConfig};
