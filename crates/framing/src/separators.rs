//! Separator table
//!
//! Records message-relative offsets of unquoted `=` and `,` characters so a
//! downstream key/value splitter can jump straight to them.
//!
//! Separators are expected to alternate `key=value,key=value`. A `,` while
//! waiting for `=` is accepted (bare token). An `=` while waiting for `,`
//! means a value contains an unquoted `=`; the offsets are then useless and
//! the table is invalidated for the rest of the message. A unit directly
//! after a `,` is never examined.
//!
//! The table holds at most `capacity` offsets; past that it is marked full
//! and stops recording, keeping what it has.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Equals,
    Comma,
}

/// Fixed-capacity per-message separator record
#[derive(Debug)]
pub struct SeparatorTable {
    offsets: Vec<u32>,
    capacity: usize,
    expect: Expect,
    /// Offset of the separator that broke the alternation
    invalid_at: Option<usize>,
    full: bool,
    after_comma: bool,
}

impl SeparatorTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            offsets: Vec::with_capacity(capacity),
            capacity,
            expect: Expect::Equals,
            invalid_at: None,
            full: false,
            after_comma: false,
        }
    }

    /// Feed one unquoted unit at `offset`
    #[inline]
    pub fn observe(&mut self, unit: u8, offset: usize) {
        let skip = self.after_comma;
        self.after_comma = unit == b',';
        if skip || self.full || self.invalid_at.is_some() {
            return;
        }

        match (unit, self.expect) {
            (b'=', Expect::Equals) => {
                self.record(offset);
                self.expect = Expect::Comma;
            }
            (b'=', Expect::Comma) => self.invalid_at = Some(offset),
            (b',', Expect::Equals) => self.record(offset),
            (b',', Expect::Comma) => {
                self.record(offset);
                self.expect = Expect::Equals;
            }
            _ => {}
        }
    }

    #[inline]
    fn record(&mut self, offset: usize) {
        if self.offsets.len() == self.capacity {
            self.full = true;
            return;
        }
        self.offsets.push(offset as u32);
    }

    /// Whether recording stopped because the table ran out of room
    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Offsets that fall inside a message of `len` units
    ///
    /// `None` when no separator was recorded or the alternation broke
    /// within the message.
    pub fn take_for(&mut self, len: usize) -> Option<Vec<u32>> {
        if self.invalid_at.is_some_and(|at| at < len) {
            return None;
        }
        let kept: Vec<u32> = self
            .offsets
            .iter()
            .copied()
            .take_while(|&off| (off as usize) < len)
            .collect();
        (!kept.is_empty()).then_some(kept)
    }

    pub fn reset(&mut self) {
        self.offsets.clear();
        self.expect = Expect::Equals;
        self.invalid_at = None;
        self.full = false;
        self.after_comma = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &[u8], capacity: usize) -> SeparatorTable {
        let mut table = SeparatorTable::with_capacity(capacity);
        for (i, &u) in input.iter().enumerate() {
            table.observe(u, i);
        }
        table
    }

    #[test]
    fn test_key_value_pairs() {
        let mut table = scan(b"a=1,b=2,c=3", 16);
        assert_eq!(table.take_for(11), Some(vec![1, 3, 5, 7, 9]));
    }

    #[test]
    fn test_leading_bare_token() {
        let mut table = scan(b"a,b=1", 16);
        assert_eq!(table.take_for(5), Some(vec![1, 3]));
    }

    #[test]
    fn test_double_equals_invalidates() {
        let mut table = scan(b"a=b=c", 16);
        assert_eq!(table.take_for(5), None);
    }

    #[test]
    fn test_invalidation_past_cut_is_ignored() {
        let mut table = scan(b"a=1,b=2=3", 16);
        assert_eq!(table.take_for(7), Some(vec![1, 3, 5]));
        assert_eq!(table.take_for(9), None);
    }

    #[test]
    fn test_unit_after_comma_is_skipped() {
        let mut table = scan(b"a=1,=x", 16);
        // '=' right after ',' is not examined, so no violation
        assert_eq!(table.take_for(6), Some(vec![1, 3]));
    }

    #[test]
    fn test_capacity_marks_full_and_keeps_prefix() {
        let mut table = scan(b"a=1,b=2,c=3", 3);
        assert!(table.is_full());
        assert_eq!(table.take_for(11), Some(vec![1, 3, 5]));
    }

    #[test]
    fn test_empty_and_reset() {
        let mut table = scan(b"plain text", 4);
        assert_eq!(table.take_for(10), None);

        let mut table = scan(b"a=b=c", 4);
        table.reset();
        table.observe(b'=', 0);
        assert_eq!(table.take_for(1), Some(vec![0]));
    }
}
