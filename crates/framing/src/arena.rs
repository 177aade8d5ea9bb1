//! Pending chunk arena
//!
//! Fixed-capacity circular store of `(payload, byte_len)` slots addressed by
//! monotonically increasing sequence numbers. Positions into the arena are
//! plain integers, so message boundaries can be described (and later sliced
//! out) without holding references into the store.
//!
//! Slots are only ever released explicitly: either everything before a
//! position once a message has been extracted, or the whole arena on reset.

use crate::payload::Payload;

/// Cursor into the arena
///
/// `chunk` is the sequence number of a stored chunk, `offset` the unit index
/// inside it and `msg_offset` the number of units between the start of the
/// current message and this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub chunk: u64,
    pub offset: usize,
    pub msg_offset: usize,
}

struct Slot<P> {
    payload: P,
    byte_len: usize,
}

/// Fixed-capacity chunk store indexed by sequence number
pub struct ChunkArena<P> {
    slots: Vec<Option<Slot<P>>>,
    /// Sequence number of the oldest retained chunk
    first: u64,
    /// Sequence number the next pushed chunk receives
    next: u64,
    bytes: usize,
}

impl<P: Payload> ChunkArena<P> {
    /// Create an arena with room for `capacity` chunks
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk arena needs at least one slot");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            first: 0,
            next: 0,
            bytes: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of retained chunks
    #[inline]
    pub fn len(&self) -> usize {
        (self.next - self.first) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == self.next
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Total bytes held by retained chunks
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Store a chunk, handing it back when every slot is taken
    pub fn push(&mut self, payload: P) -> Result<u64, P> {
        if self.is_full() {
            return Err(payload);
        }
        let seq = self.next;
        let byte_len = payload.byte_len();
        let idx = self.index(seq);
        self.slots[idx] = Some(Slot { payload, byte_len });
        self.bytes += byte_len;
        self.next += 1;
        Ok(seq)
    }

    /// Chunk stored under `seq`, if still retained
    #[inline]
    pub fn get(&self, seq: u64) -> Option<&P> {
        if seq < self.first || seq >= self.next {
            return None;
        }
        self.slots[self.index(seq)].as_ref().map(|s| &s.payload)
    }

    /// Drop every chunk older than `seq`
    pub fn release_before(&mut self, seq: u64) {
        let until = seq.min(self.next);
        while self.first < until {
            let idx = self.index(self.first);
            if let Some(slot) = self.slots[idx].take() {
                self.bytes -= slot.byte_len;
            }
            self.first += 1;
        }
    }

    /// Drop every chunk and restart sequence numbering
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.first = 0;
        self.next = 0;
        self.bytes = 0;
    }

    // -------------------------------------------------------------------------
    // Cursor operations
    // -------------------------------------------------------------------------

    /// Move `pos` off the end of exhausted chunks onto the next stored one
    #[inline]
    pub fn normalize(&self, pos: &mut Position) {
        while pos.chunk + 1 < self.next {
            match self.get(pos.chunk) {
                Some(chunk) if pos.offset < chunk.unit_len() => return,
                _ => {
                    pos.chunk += 1;
                    pos.offset = 0;
                }
            }
        }
    }

    /// Unit under the cursor, `None` at the end of stored data
    #[inline]
    pub fn current(&self, pos: &mut Position) -> Option<u8> {
        self.normalize(pos);
        let chunk = self.get(pos.chunk)?;
        if pos.offset < chunk.unit_len() {
            Some(chunk.unit(pos.offset))
        } else {
            None
        }
    }

    /// Step the cursor forward by one unit
    #[inline]
    pub fn advance(&self, pos: &mut Position) {
        pos.offset += 1;
        pos.msg_offset += 1;
        self.normalize(pos);
    }

    /// Step the cursor back by one unit; false when already at the oldest unit
    pub fn retreat(&self, pos: &mut Position) -> bool {
        let mut chunk = pos.chunk;
        let mut offset = pos.offset;
        while offset == 0 {
            if chunk <= self.first {
                return false;
            }
            chunk -= 1;
            offset = self.get(chunk).map_or(0, Payload::unit_len);
        }
        pos.chunk = chunk;
        pos.offset = offset - 1;
        pos.msg_offset = pos.msg_offset.saturating_sub(1);
        true
    }

    /// Whether no unit remains under or after the cursor
    #[inline]
    pub fn at_end(&self, pos: &Position) -> bool {
        let mut at = *pos;
        self.current(&mut at).is_none()
    }

    /// Zero-copy slices covering `[start, end)`
    pub fn slices(&self, start: Position, end: Position) -> Vec<P> {
        let mut out = Vec::with_capacity((end.chunk.saturating_sub(start.chunk) + 1) as usize);
        let mut seq = start.chunk;
        while seq <= end.chunk {
            if let Some(chunk) = self.get(seq) {
                let from = if seq == start.chunk { start.offset } else { 0 };
                let to = if seq == end.chunk {
                    end.offset
                } else {
                    chunk.unit_len()
                };
                if from < to {
                    out.push(chunk.slice(from..to));
                }
            }
            seq += 1;
        }
        out
    }

    #[inline]
    fn index(&self, seq: u64) -> usize {
        (seq % self.slots.len() as u64) as usize
    }
}
