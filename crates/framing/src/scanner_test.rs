//! Scanner tests

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use crate::message::Message;
use crate::payload::TextChunk;
use crate::scanner::{Scanner, ScannerConfig};

// ============================================================================
// Helpers
// ============================================================================

const BUDGET: Duration = Duration::from_secs(5);

type Sink<P> = Rc<RefCell<Vec<Message<P>>>>;

fn scanner_with(config: ScannerConfig) -> (Scanner<Bytes>, Sink<Bytes>) {
    let sink: Sink<Bytes> = Rc::new(RefCell::new(Vec::new()));
    let out = Rc::clone(&sink);
    let scanner = Scanner::new(config, Box::new(move |m| out.borrow_mut().push(m)));
    (scanner, sink)
}

fn scanner() -> (Scanner<Bytes>, Sink<Bytes>) {
    scanner_with(ScannerConfig::default())
}

fn small(max_message_size: usize) -> ScannerConfig {
    ScannerConfig {
        max_message_size,
        ..Default::default()
    }
}

fn push(scanner: &mut Scanner<Bytes>, data: &'static [u8]) {
    scanner.try_push(Bytes::from_static(data)).unwrap();
}

fn texts(sink: &Sink<Bytes>) -> Vec<String> {
    sink.borrow()
        .iter()
        .map(|m| String::from_utf8(m.to_bytes().to_vec()).unwrap())
        .collect()
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_two_lines_with_separators() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"a,b=1\nc,d=2\r\n");

    let outcome = scanner.process(BUDGET, false);
    assert!(!outcome.has_more_work);
    assert_eq!(outcome.messages, 2);

    assert_eq!(texts(&sink), vec!["a,b=1", "c,d=2"]);
    for m in sink.borrow().iter() {
        assert_eq!(m.separators(), Some(&[1u32, 3][..]));
        assert_eq!(m.category_offset(), None);
        assert!(!m.separators_truncated());
    }
}

#[test]
fn test_quoted_newline_stays_in_message() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"\"line1\nline2\"\n");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["\"line1\nline2\""]);
}

#[test]
fn test_single_quotes_only_closed_by_single_quote() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"msg='it \"is\nfine'\nnext\n");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["msg='it \"is\nfine'", "next"]);
}

#[test]
fn test_escaped_quote_does_not_close() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"\"a\\\"b\"\n");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["\"a\\\"b\""]);
}

#[test]
fn test_even_backslash_run_does_not_escape() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"x=\"a\\\\\"\nnext\n");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["x=\"a\\\\\"", "next"]);
}

#[test]
fn test_quoted_separators_are_ignored() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"k=\"v=1,2\",z=3\n");
    scanner.process(BUDGET, false);

    let messages = sink.borrow();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].separators(), Some(&[1u32, 9, 11][..]));
}

#[test]
fn test_out_of_order_separators_drop_table() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"a=b=c\nd=1\n");
    scanner.process(BUDGET, false);

    let messages = sink.borrow();
    assert_eq!(messages[0].separators(), None);
    assert_eq!(messages[1].separators(), Some(&[1u32][..]));
}

#[test]
fn test_separator_table_truncates_when_full() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        separator_capacity: 2,
        ..Default::default()
    });
    push(&mut scanner, b"a=1,b=2,c=3\n");
    scanner.process(BUDGET, false);

    let messages = sink.borrow();
    assert_eq!(messages[0].separators(), Some(&[1u32, 3][..]));
    assert!(messages[0].separators_truncated());
    assert_eq!(messages[0].len(), 11);
}

#[test]
fn test_empty_lines_are_skipped() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"\n\r\na\n\n");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["a"]);
}

#[test]
fn test_message_spanning_chunks_is_zero_copy_chain() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"hello ");
    push(&mut scanner, b"big ");
    push(&mut scanner, b"world\nrest");
    scanner.process(BUDGET, false);

    let messages = sink.borrow();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].slices().len(), 3);
    assert_eq!(&messages[0].to_bytes()[..], b"hello big world");
}

#[test]
fn test_chunked_input_reassembles_lines() {
    let input: &'static [u8] = b"a=1,b=2\n\"q\nq\"\nplain\r\nlast=\"x,y\"\n";
    let (mut scanner, sink) = scanner();
    for piece in input.chunks(3) {
        scanner.try_push(Bytes::copy_from_slice(piece)).unwrap();
        scanner.process(BUDGET, false);
    }

    assert_eq!(
        texts(&sink),
        vec!["a=1,b=2", "\"q\nq\"", "plain", "last=\"x,y\""]
    );
}

// ============================================================================
// Category marker
// ============================================================================

#[test]
fn test_category_marker_offset() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"ts=1,$EventCategory=LTM\nplain\n");
    scanner.process(BUDGET, false);

    let messages = sink.borrow();
    assert_eq!(messages[0].category_offset(), Some(5));
    assert_eq!(messages[1].category_offset(), None);
}

#[test]
fn test_category_marker_at_message_start() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"$EventCategory=AVR\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), Some(0));
}

#[test]
fn test_category_marker_must_fit_before_boundary() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"x,$Ev\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), None);
}

#[test]
fn test_marker_prefix_alone_is_not_a_category() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"$Exxxxxxxxxxxxxxxxxxx=1\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), None);
}

#[test]
fn test_category_marker_found_after_false_prefix() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"$Ex=1,$EventCategory=LTM\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), Some(6));
}

#[test]
fn test_category_marker_split_across_chunks() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"a=1,$E");
    push(&mut scanner, b"ventCat");
    push(&mut scanner, b"egory=X\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), Some(4));
}

#[test]
fn test_category_marker_disabled() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        category_marker: None,
        ..Default::default()
    });
    push(&mut scanner, b"$EventCategory=AVR\n");
    scanner.process(BUDGET, false);

    assert_eq!(sink.borrow()[0].category_offset(), None);
}

// ============================================================================
// Forced cuts and flush
// ============================================================================

#[test]
fn test_oversized_line_is_force_split() {
    let (mut scanner, sink) = scanner_with(small(8));
    push(&mut scanner, b"abcdefghijkl");

    let outcome = scanner.process(BUDGET, false);
    assert_eq!(outcome.messages, 1);
    assert_eq!(texts(&sink), vec!["abcdefgh"]);

    push(&mut scanner, b"mn\n");
    scanner.process(BUDGET, false);
    assert_eq!(texts(&sink), vec!["abcdefgh", "ijklmn"]);
}

#[test]
fn test_cut_prefers_newline_inside_open_quote() {
    let (mut scanner, sink) = scanner_with(small(16));
    push(&mut scanner, b"k=\"abc\ndefghijklmnop");
    scanner.process(BUDGET, false);

    assert_eq!(texts(&sink), vec!["k=\"abc"]);
    assert_eq!(sink.borrow()[0].separators(), Some(&[1u32][..]));

    scanner.process(BUDGET, true);
    assert_eq!(texts(&sink), vec!["k=\"abc", "defghijklmnop"]);
}

#[test]
fn test_cut_falls_back_to_open_quote_position() {
    let (mut scanner, sink) = scanner_with(small(8));
    push(&mut scanner, b"ab\"cdefghijklm");
    scanner.process(BUDGET, true);

    assert_eq!(texts(&sink), vec!["ab", "\"cdefghi", "jklm"]);
}

#[test]
fn test_flush_emits_trailing_message_once() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"first\nsecond");

    scanner.process(BUDGET, false);
    assert_eq!(texts(&sink), vec!["first"]);

    let outcome = scanner.process(BUDGET, true);
    assert_eq!(outcome.messages, 1);
    assert_eq!(texts(&sink), vec!["first", "second"]);

    let outcome = scanner.process(BUDGET, true);
    assert_eq!(outcome.messages, 0);
    assert!(scanner.is_empty());
}

#[test]
fn test_full_arena_forces_cut() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        chunk_capacity: 2,
        ..Default::default()
    });
    push(&mut scanner, b"abc");
    push(&mut scanner, b"def");
    assert_eq!(scanner.free_slots(), 0);
    assert!(scanner.is_ready());

    scanner.process(BUDGET, false);
    assert_eq!(texts(&sink), vec!["abcdef"]);
    assert_eq!(scanner.free_slots(), 2);
}

// ============================================================================
// Time boxing and memory
// ============================================================================

#[test]
fn test_zero_budget_keeps_partial_progress() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        time_check_interval: 1,
        ..Default::default()
    });
    push(&mut scanner, b"a=1\nb=2\n");

    let mut calls = 0;
    while scanner.process(Duration::ZERO, false).has_more_work {
        calls += 1;
        assert!(calls < 100, "scanner made no progress");
    }

    assert!(calls > 1);
    assert_eq!(texts(&sink), vec!["a=1", "b=2"]);
}

#[test]
fn test_budget_exhausted_in_quote_cuts_at_raw_newline() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        time_check_interval: 1,
        ..Default::default()
    });
    push(&mut scanner, b"a=1 \"x\nyyyyyyyy");

    let mut calls = 0;
    while scanner.process(Duration::ZERO, false).has_more_work {
        calls += 1;
        assert!(calls < 100, "scanner made no progress");
    }
    assert_eq!(texts(&sink), vec!["a=1 \"x"]);

    scanner.process(BUDGET, true);
    assert_eq!(texts(&sink), vec!["a=1 \"x", "yyyyyyyy"]);
}

#[test]
fn test_budget_exhausted_in_quote_without_newline_keeps_message() {
    let (mut scanner, sink) = scanner_with(ScannerConfig {
        time_check_interval: 1,
        ..Default::default()
    });
    push(&mut scanner, b"k=\"a b\" c\n");

    while scanner.process(Duration::ZERO, false).has_more_work {}
    assert_eq!(texts(&sink), vec!["k=\"a b\" c"]);
}

#[test]
fn test_full_drain_releases_everything() {
    let (mut scanner, _sink) = scanner();
    push(&mut scanner, b"a\n");
    push(&mut scanner, b"b\n");
    assert_eq!(scanner.buffered_bytes(), 4);

    scanner.process(BUDGET, false);
    assert!(scanner.is_empty());
    assert_eq!(scanner.buffered_chunks(), 0);
    assert_eq!(scanner.buffered_bytes(), 0);
}

#[test]
fn test_readiness_tracks_newlines() {
    let (mut scanner, _sink) = scanner();
    push(&mut scanner, b"abc");
    assert!(!scanner.is_ready());
    assert!(scanner.has_unscanned());

    push(&mut scanner, b"d\n");
    assert!(scanner.is_ready());

    scanner.process(BUDGET, false);
    assert!(!scanner.is_ready());
    assert!(!scanner.has_unscanned());
}

#[test]
fn test_erase_discards_partial_message() {
    let (mut scanner, sink) = scanner();
    push(&mut scanner, b"partial \"quoted");
    scanner.process(BUDGET, false);

    scanner.erase();
    assert!(scanner.is_empty());

    push(&mut scanner, b"fresh\n");
    scanner.process(BUDGET, false);
    assert_eq!(texts(&sink), vec!["fresh"]);
}

// ============================================================================
// Text payloads
// ============================================================================

#[test]
fn test_text_chunks_share_the_state_machine() {
    let sink: Sink<TextChunk> = Rc::new(RefCell::new(Vec::new()));
    let out = Rc::clone(&sink);
    let mut scanner: Scanner<TextChunk> =
        Scanner::new(ScannerConfig::default(), Box::new(move |m| out.borrow_mut().push(m)));

    scanner.try_push(TextChunk::new("naïve=\"é\n")).unwrap();
    scanner.try_push(TextChunk::new("ü\",x=1\nzz")).unwrap();
    scanner.process(BUDGET, true);

    let messages = sink.borrow();
    let texts: Vec<String> = messages.iter().map(Message::to_text).collect();
    assert_eq!(texts, vec!["naïve=\"é\nü\",x=1", "zz"]);
    assert_eq!(messages[0].separators(), Some(&[5u32, 11, 13][..]));
}
