//! Scanner - quote-aware line framing
//!
//! Consumes appended chunks and emits newline-delimited messages in a single
//! forward pass. While looking for boundaries it also records, for free:
//!
//! - offsets of unquoted `=` / `,` separators (see [`SeparatorTable`])
//! - the offset of a fixed category marker literal (a two-unit prefix match
//!   during the scan, confirmed against the full literal on extraction)
//!
//! so downstream normalisation never has to walk the raw bytes again.
//!
//! # Quoting
//!
//! An unescaped `"` or `'` opens a quoted section that only the same
//! character closes. An odd run of backslashes escapes the following quote.
//! Newlines inside a quoted section do not end the message.
//!
//! # Forced cuts
//!
//! When a message reaches `max_message_size` (or the chunk arena is full and
//! no boundary is in sight) the scanner cuts at, in order of preference:
//!
//! 1. the last newline seen outside quotes
//! 2. while a quote is open, the last newline seen inside it
//! 3. the position of the open quote itself
//! 4. the size limit
//!
//! Data after a cut at (2) or (3) is rescanned with fresh state.
//!
//! # Time boxing
//!
//! [`Scanner::process`] reads the clock only every `time_check_interval`
//! units. Running out of budget keeps all partial progress; the next call
//! resumes where this one stopped. The exception is an open quote that
//! already spans a raw newline: the message is cut there first, as in (2).

use std::fmt;
use std::time::{Duration, Instant};

use crate::arena::{ChunkArena, Position};
use crate::message::Message;
use crate::payload::Payload;
use crate::separators::SeparatorTable;

/// Default maximum message size in units (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default number of chunk slots
pub const DEFAULT_CHUNK_CAPACITY: usize = 64;

/// Default number of units scanned between clock checks
pub const DEFAULT_TIME_CHECK_INTERVAL: usize = 1024;

/// Default separator table capacity
pub const DEFAULT_SEPARATOR_CAPACITY: usize = 64;

/// Default category marker literal
pub const DEFAULT_CATEGORY_MARKER: &str = "$EventCategory";

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Messages longer than this (in units) are force-split
    pub max_message_size: usize,

    /// Pending chunk slots
    pub chunk_capacity: usize,

    /// Units scanned between elapsed-time checks
    pub time_check_interval: usize,

    /// Separator offsets recorded per message
    pub separator_capacity: usize,

    /// Literal whose first occurrence is reported per message (`None` disables)
    pub category_marker: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            time_check_interval: DEFAULT_TIME_CHECK_INTERVAL,
            separator_capacity: DEFAULT_SEPARATOR_CAPACITY,
            category_marker: Some(DEFAULT_CATEGORY_MARKER.into()),
        }
    }
}

/// Result of one [`Scanner::process`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Budget ran out before all buffered data was scanned
    pub has_more_work: bool,

    /// Time spent scanning (excludes message callbacks)
    pub parse_time: Duration,

    /// Wall-clock time of the whole call
    pub total_time: Duration,

    /// Messages emitted during the call
    pub messages: usize,
}

/// Per-message callback
pub type MessageCallback<P> = Box<dyn FnMut(Message<P>)>;

/// Where a message ends and where scanning resumes
#[derive(Debug, Clone, Copy)]
struct Cut {
    end: Position,
    resume: Position,
    newline: bool,
}

/// Per-message scan state; reset at every emitted boundary
#[derive(Debug, Default)]
struct ScanState {
    escaped: bool,
    /// Position and character of the currently open quote
    open_quote: Option<(Position, u8)>,
    /// Most recent newline, quoted or not
    last_newline: Option<Position>,
    /// Most recent newline outside quotes
    last_valid_newline: Option<Position>,
    prev_unit: u8,
    /// Second unit of the first pair matching the marker's leading two
    marker_candidate: Option<Position>,
}

/// Single-pass, time-boxed line scanner
///
/// Generic over the payload representation; see [`crate::payload`].
pub struct Scanner<P: Payload> {
    config: ScannerConfig,
    marker: Option<Box<[u8]>>,
    arena: ChunkArena<P>,
    /// First unit of the message being accumulated
    start: Position,
    /// Next unit to scan
    cursor: Position,
    state: ScanState,
    separators: SeparatorTable,
    /// Units pushed but not yet scanned
    pending_units: usize,
    newline_pending: bool,
    on_message: MessageCallback<P>,
}

impl<P: Payload> Scanner<P> {
    /// Create a scanner that hands every message to `on_message`
    pub fn new(config: ScannerConfig, on_message: MessageCallback<P>) -> Self {
        let marker = config
            .category_marker
            .as_deref()
            .filter(|m| m.len() >= 2 && m.is_ascii())
            .map(|m| m.as_bytes().into());
        Self {
            arena: ChunkArena::with_capacity(config.chunk_capacity.max(1)),
            separators: SeparatorTable::with_capacity(config.separator_capacity),
            marker,
            start: Position::default(),
            cursor: Position::default(),
            state: ScanState::default(),
            pending_units: 0,
            newline_pending: false,
            on_message,
            config,
        }
    }

    /// Append a chunk
    ///
    /// Hands the chunk back when every arena slot is taken; callers should
    /// check [`free_slots`](Self::free_slots) first.
    pub fn try_push(&mut self, chunk: P) -> Result<(), P> {
        let units = chunk.unit_len();
        let has_newline = chunk.contains_unit(b'\n');
        self.arena.push(chunk)?;
        self.pending_units += units;
        self.newline_pending |= has_newline;
        Ok(())
    }

    /// Chunk slots currently available
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.arena.free_slots()
    }

    /// Whether a complete (or forced) boundary is known to exist
    pub fn is_ready(&self) -> bool {
        self.newline_pending
            || self.arena.is_full()
            || self.pending_units + self.cursor.msg_offset >= self.config.max_message_size
    }

    /// Whether buffered units remain unscanned
    pub fn has_unscanned(&self) -> bool {
        !self.arena.at_end(&self.cursor)
    }

    /// Whether nothing is buffered at all
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Bytes held by buffered chunks
    pub fn buffered_bytes(&self) -> usize {
        self.arena.byte_len()
    }

    /// Chunks held in the arena
    pub fn buffered_chunks(&self) -> usize {
        self.arena.len()
    }

    /// Discard all buffered data and scan state
    pub fn erase(&mut self) {
        self.arena.reset();
        self.start = Position::default();
        self.cursor = Position::default();
        self.pending_units = 0;
        self.newline_pending = false;
        self.reset_message_state();
    }

    /// Scan buffered data for at most `budget`
    ///
    /// With `flush`, whatever is left at the end of buffered data is emitted
    /// as one final message even without a terminating newline.
    pub fn process(&mut self, budget: Duration, flush: bool) -> ProcessOutcome {
        let started = Instant::now();
        let check_every = self.config.time_check_interval.max(1);
        let mut callback_time = Duration::ZERO;
        let mut messages = 0;
        let mut iterations = 0usize;

        'scan: loop {
            while let Some(unit) = self.arena.current(&mut self.cursor) {
                let here = self.cursor;
                let boundary = self.step(unit, here);
                self.arena.advance(&mut self.cursor);

                let cut = if boundary {
                    Some(self.resolve_cut(self.cursor))
                } else if self.cursor.msg_offset >= self.config.max_message_size {
                    tracing::trace!(
                        size = self.cursor.msg_offset,
                        quoted = self.state.open_quote.is_some(),
                        "message reached size limit, forcing cut"
                    );
                    Some(self.resolve_cut(self.cursor))
                } else {
                    None
                };

                if let Some(cut) = cut {
                    let (emitted, spent) = self.emit(cut);
                    messages += usize::from(emitted);
                    callback_time += spent;
                }

                iterations += 1;
                if iterations % check_every == 0 && started.elapsed() >= budget {
                    if self.state.open_quote.is_some() && self.state.last_newline.is_some() {
                        // Out of time inside a quote that already spans a line
                        let (emitted, spent) = self.emit(self.resolve_cut(self.cursor));
                        messages += usize::from(emitted);
                        callback_time += spent;
                    }
                    self.pending_units = self.pending_units.saturating_sub(iterations);
                    let total_time = started.elapsed();
                    return ProcessOutcome {
                        has_more_work: true,
                        parse_time: total_time.saturating_sub(callback_time),
                        total_time,
                        messages,
                    };
                }
            }

            if self.cursor.msg_offset > 0 && !flush && self.arena.is_full() {
                // No slot left for the rest of this message
                let (emitted, spent) = self.emit(self.resolve_cut(self.cursor));
                messages += usize::from(emitted);
                callback_time += spent;
                continue 'scan;
            }
            break;
        }

        self.pending_units = 0;
        self.newline_pending = false;

        if flush && self.cursor.msg_offset > 0 {
            let end = self.cursor;
            let (emitted, spent) = self.emit(Cut {
                end,
                resume: end,
                newline: false,
            });
            messages += usize::from(emitted);
            callback_time += spent;
        }

        if self.cursor.msg_offset == 0 && !self.arena.is_empty() && self.arena.at_end(&self.cursor)
        {
            // Everything consumed: release all payload references at once
            self.arena.reset();
            self.start = Position::default();
            self.cursor = Position::default();
            self.reset_message_state();
        }

        let total_time = started.elapsed();
        ProcessOutcome {
            has_more_work: false,
            parse_time: total_time.saturating_sub(callback_time),
            total_time,
            messages,
        }
    }

    /// Feed one unit through the state machine; true on a valid boundary
    #[inline]
    fn step(&mut self, unit: u8, pos: Position) -> bool {
        let state = &mut self.state;

        if state.open_quote.is_none() {
            self.separators.observe(unit, pos.msg_offset);
        }

        if let Some(marker) = &self.marker
            && state.marker_candidate.is_none()
            && pos.msg_offset > 0
            && state.prev_unit == marker[0]
            && unit == marker[1]
        {
            state.marker_candidate = Some(pos);
        }
        state.prev_unit = unit;

        let mut boundary = false;
        match unit {
            b'\\' => {
                state.escaped = !state.escaped;
                return false;
            }
            b'"' | b'\'' if !state.escaped => match state.open_quote {
                None => state.open_quote = Some((pos, unit)),
                Some((_, q)) if q == unit => state.open_quote = None,
                Some(_) => {}
            },
            b'\n' => {
                state.last_newline = Some(pos);
                if state.open_quote.is_none() {
                    state.last_valid_newline = Some(pos);
                    boundary = true;
                }
            }
            _ => {}
        }
        state.escaped = false;
        boundary
    }

    /// Pick the cut point, preferring newlines over the open quote over `limit`
    fn resolve_cut(&self, limit: Position) -> Cut {
        if let Some(nl) = self.state.last_valid_newline {
            return self.cut_at_newline(nl);
        }
        if let Some((quote, _)) = self.state.open_quote {
            if let Some(nl) = self.state.last_newline {
                return self.cut_at_newline(nl);
            }
            if quote.msg_offset > 0 {
                return Cut {
                    end: quote,
                    resume: quote,
                    newline: false,
                };
            }
        }
        Cut {
            end: limit,
            resume: limit,
            newline: false,
        }
    }

    fn cut_at_newline(&self, nl: Position) -> Cut {
        let mut resume = nl;
        self.arena.advance(&mut resume);
        Cut {
            end: nl,
            resume,
            newline: true,
        }
    }

    /// Emit `[start, cut.end)` and restart the message at `cut.resume`
    ///
    /// Returns whether a (non-empty) message was delivered and the time spent
    /// in the callback.
    fn emit(&mut self, cut: Cut) -> (bool, Duration) {
        let mut end = cut.end;
        if cut.newline && end.msg_offset > 0 {
            let mut before = end;
            if self.arena.retreat(&mut before) && self.arena.current(&mut before) == Some(b'\r') {
                end = before;
            }
        }

        let len = end.msg_offset;
        let mut spent = Duration::ZERO;
        let emitted = len > 0;
        if emitted {
            let category = self
                .state
                .marker_candidate
                .and_then(|candidate| self.find_marker(candidate, end));
            let message = Message::new(
                self.arena.slices(self.start, end),
                len,
                self.separators.take_for(len),
                self.separators.is_full(),
                category,
            );
            let callback_started = Instant::now();
            (self.on_message)(message);
            spent = callback_started.elapsed();
        }

        let mut resume = cut.resume;
        resume.msg_offset = 0;
        self.arena.normalize(&mut resume);
        self.start = resume;
        self.cursor = resume;
        self.arena.release_before(resume.chunk);
        self.reset_message_state();
        (emitted, spent)
    }

    /// Offset of the first full marker in the message, searching from the
    /// pair candidate (whose second unit is at `candidate`) up to `end`
    fn find_marker(&self, candidate: Position, end: Position) -> Option<usize> {
        let marker = self.marker.as_deref()?;
        let mut from = candidate;
        if !self.arena.retreat(&mut from) {
            return None;
        }
        while from.msg_offset + marker.len() <= end.msg_offset {
            let mut at = from;
            let matched = marker.iter().all(|&expected| {
                let unit = self.arena.current(&mut at);
                self.arena.advance(&mut at);
                unit == Some(expected)
            });
            if matched {
                return Some(from.msg_offset);
            }
            self.arena.advance(&mut from);
        }
        None
    }

    fn reset_message_state(&mut self) {
        self.state = ScanState::default();
        self.separators.reset();
    }
}

impl<P: Payload> fmt::Debug for Scanner<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("buffered_chunks", &self.arena.len())
            .field("buffered_bytes", &self.arena.byte_len())
            .field("message_offset", &self.cursor.msg_offset)
            .field("quoted", &self.state.open_quote.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "scanner_test.rs"]
mod scanner_test;
