//! Payload abstraction
//!
//! The scanner works on "units": bytes for raw network data, characters for
//! already-decoded text. Both representations share one scanning loop; the
//! concrete type is picked once when the scanner is constructed, so there is
//! no per-unit dispatch.
//!
//! Only the ASCII range matters for framing. Anything outside it is reported
//! as [`NON_ASCII`] and never matches a quote, newline or separator.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

/// Unit value reported for characters outside the ASCII range
pub const NON_ASCII: u8 = 0xFF;

/// A chunk of scannable data
///
/// Implementations must be cheap to clone and to slice: message extraction
/// hands out sub-ranges of the original chunks instead of copying.
pub trait Payload: Clone {
    /// Number of scan units in the chunk
    fn unit_len(&self) -> usize;

    /// Memory footprint in bytes (used for buffer accounting)
    fn byte_len(&self) -> usize;

    /// ASCII value of the unit at `idx`, or [`NON_ASCII`]
    fn unit(&self, idx: usize) -> u8;

    /// Zero-copy sub-range, in units
    fn slice(&self, range: Range<usize>) -> Self;

    /// Whether the chunk contains the given ASCII unit
    fn contains_unit(&self, needle: u8) -> bool {
        (0..self.unit_len()).any(|i| self.unit(i) == needle)
    }
}

impl Payload for Bytes {
    #[inline]
    fn unit_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn byte_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn unit(&self, idx: usize) -> u8 {
        let b = self[idx];
        if b.is_ascii() { b } else { NON_ASCII }
    }

    #[inline]
    fn slice(&self, range: Range<usize>) -> Self {
        Bytes::slice(self, range)
    }

    fn contains_unit(&self, needle: u8) -> bool {
        self.iter().any(|&b| b == needle)
    }
}

/// Decoded text chunk
///
/// Holds shared `char` storage plus a window into it, so slicing never
/// copies and never splits a character.
#[derive(Clone)]
pub struct TextChunk {
    chars: Arc<[char]>,
    start: usize,
    end: usize,
    bytes: usize,
}

impl TextChunk {
    /// Decode a string into a text chunk
    pub fn new(text: &str) -> Self {
        let chars: Arc<[char]> = text.chars().collect();
        let end = chars.len();
        Self {
            chars,
            start: 0,
            end,
            bytes: text.len(),
        }
    }

    /// Characters covered by this chunk
    #[inline]
    pub fn as_chars(&self) -> &[char] {
        &self.chars[self.start..self.end]
    }

    /// Whether the chunk holds no characters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl PartialEq for TextChunk {
    fn eq(&self, other: &Self) -> bool {
        self.as_chars() == other.as_chars()
    }
}

impl Eq for TextChunk {}

impl From<&str> for TextChunk {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for TextChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_chars().iter().try_for_each(|c| fmt::Write::write_char(f, *c))
    }
}

impl fmt::Debug for TextChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextChunk({:?})", self.to_string())
    }
}

impl Payload for TextChunk {
    #[inline]
    fn unit_len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    fn byte_len(&self) -> usize {
        self.bytes
    }

    #[inline]
    fn unit(&self, idx: usize) -> u8 {
        let c = self.chars[self.start + idx];
        if c.is_ascii() { c as u8 } else { NON_ASCII }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        assert!(range.end <= self.unit_len(), "slice out of bounds");
        let window = &self.chars[self.start + range.start..self.start + range.end];
        Self {
            chars: Arc::clone(&self.chars),
            start: self.start + range.start,
            end: self.start + range.end,
            bytes: window.iter().map(|c| c.len_utf8()).sum(),
        }
    }
}

/// Concatenate slices into one contiguous buffer
///
/// A single slice is returned as-is without copying.
pub fn concat_bytes(slices: &[Bytes]) -> Bytes {
    match slices {
        [] => Bytes::new(),
        [only] => only.clone(),
        many => {
            let total = many.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(total);
            for s in many {
                buf.extend_from_slice(s);
            }
            buf.freeze()
        }
    }
}
