//! Framed message
//!
//! A message is an ordered list of zero-copy payload slices plus the
//! structural hints gathered while scanning it.

use bytes::Bytes;

use crate::payload::{Payload, TextChunk, concat_bytes};

/// One framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<P> {
    slices: Vec<P>,
    len: usize,
    separators: Option<Vec<u32>>,
    separators_truncated: bool,
    category_offset: Option<usize>,
}

impl<P: Payload> Message<P> {
    pub(crate) fn new(
        slices: Vec<P>,
        len: usize,
        separators: Option<Vec<u32>>,
        separators_truncated: bool,
        category_offset: Option<usize>,
    ) -> Self {
        Self {
            slices,
            len,
            separators,
            separators_truncated,
            category_offset,
        }
    }

    /// Payload slices in order (one slice when the message fit in one chunk)
    #[inline]
    pub fn slices(&self) -> &[P] {
        &self.slices
    }

    /// Length in units
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes across all slices
    pub fn byte_len(&self) -> usize {
        self.slices.iter().map(Payload::byte_len).sum()
    }

    /// Offsets of unquoted `=` / `,` separators, if the table is usable
    #[inline]
    pub fn separators(&self) -> Option<&[u32]> {
        self.separators.as_deref()
    }

    /// Whether the separator table ran out of room for this message
    #[inline]
    pub fn separators_truncated(&self) -> bool {
        self.separators_truncated
    }

    /// Offset where the category marker starts, if it fits in the message
    #[inline]
    pub fn category_offset(&self) -> Option<usize> {
        self.category_offset
    }

    /// Split into slices and hints
    pub fn into_parts(self) -> (Vec<P>, Option<Vec<u32>>, Option<usize>) {
        (self.slices, self.separators, self.category_offset)
    }
}

impl Message<Bytes> {
    /// Contiguous payload (no copy when the message is a single slice)
    pub fn to_bytes(&self) -> Bytes {
        concat_bytes(&self.slices)
    }
}

impl Message<TextChunk> {
    /// Payload as an owned string
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.byte_len());
        for slice in &self.slices {
            out.extend(slice.as_chars());
        }
        out
    }
}
