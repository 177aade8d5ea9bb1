//! Tests for the channel buffer

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use super::*;
use crate::message::Message;

const BUDGET: Duration = Duration::from_secs(1);

fn collecting(config: ChannelConfig) -> (ChannelBuffer<Bytes>, Rc<RefCell<Vec<String>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&out);
    let channel = ChannelBuffer::new(
        config,
        Box::new(move |msg: Message<Bytes>| {
            sink.borrow_mut()
                .push(String::from_utf8_lossy(&msg.to_bytes()).into_owned());
        }),
    );
    (channel, out)
}

fn config(strategy: OverloadStrategy) -> ChannelConfig {
    ChannelConfig {
        idle_timeout: Duration::from_secs(3600),
        ..ChannelConfig::default()
    }
    .with_strategy(strategy)
}

fn push(channel: &mut ChannelBuffer<Bytes>, data: &'static str) -> bool {
    channel.push(Bytes::from_static(data.as_bytes()))
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_push_and_process() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Overwrite));
    assert!(push(&mut channel, "a=1\nb="));
    assert!(push(&mut channel, "2\n"));
    assert!(channel.is_ready());

    let outcome = channel.process(BUDGET, false);
    assert!(!outcome.has_more_work);
    assert_eq!(outcome.messages, 2);
    assert_eq!(*out.borrow(), vec!["a=1", "b=2"]);
    assert_eq!(channel.stats().messages, 2);
}

#[test]
fn test_counters_zero_after_full_drain() {
    let (mut channel, _out) = collecting(config(OverloadStrategy::Overwrite));
    push(&mut channel, "one\n");
    push(&mut channel, "two\nthree\n");
    assert_eq!(channel.buffered_bytes(), 14);

    channel.process(BUDGET, false);
    assert_eq!(channel.buffered_bytes(), 0);
    assert_eq!(channel.buffered_chunks(), 0);
    assert!(!channel.is_ready());
}

#[test]
fn test_more_chunks_than_scanner_slots() {
    let mut cfg = config(OverloadStrategy::Overwrite);
    cfg.scanner.chunk_capacity = 3;
    let (mut channel, out) = collecting(cfg);
    for part in ["one\ntw", "o\nthr", "ee\nfo", "ur\n"] {
        push(&mut channel, part);
    }

    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["one", "two", "three", "four"]);
    assert_eq!(channel.buffered_bytes(), 0);
}

#[test]
fn test_partial_waits_without_flush() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Overwrite));
    push(&mut channel, "done\npartial");
    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["done"]);
    assert!(channel.has_partial());

    channel.process(BUDGET, true);
    assert_eq!(*out.borrow(), vec!["done", "partial"]);
    assert!(!channel.has_partial());
}

#[test]
fn test_idle_timeout_flushes_partial() {
    let cfg = ChannelConfig {
        idle_timeout: Duration::ZERO,
        ..ChannelConfig::default()
    };
    let (mut channel, out) = collecting(cfg);
    push(&mut channel, "no newline");
    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["no newline"]);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_drains_then_done() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Overwrite));
    push(&mut channel, "a\nb");
    channel.close();
    assert!(!push(&mut channel, "ignored\n"));
    assert!(!channel.is_done());
    assert!(channel.is_ready());

    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["a", "b"]);
    assert!(channel.is_done());
}

#[test]
fn test_erase_drops_everything() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Overwrite));
    push(&mut channel, "half");
    push(&mut channel, "queued\n");
    channel.erase();

    assert!(channel.is_done());
    assert_eq!(channel.buffered_bytes(), 0);
    assert!(!push(&mut channel, "late\n"));
    channel.process(BUDGET, true);
    assert!(out.borrow().is_empty());
}

#[test]
fn test_zero_budget_still_progresses() {
    let mut cfg = config(OverloadStrategy::Overwrite);
    cfg.scanner.time_check_interval = 1;
    let (mut channel, out) = collecting(cfg);
    push(&mut channel, "x=1\n");
    push(&mut channel, "y=2\n");

    let mut calls = 0;
    while channel.process(Duration::ZERO, false).has_more_work {
        calls += 1;
        assert!(calls < 100);
    }
    assert_eq!(*out.borrow(), vec!["x=1", "y=2"]);
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_overwrite_bounded_while_disabled() {
    let (mut channel, _out) = collecting(config(OverloadStrategy::Overwrite));
    for _ in 0..4 {
        push(&mut channel, "0123456789");
    }
    channel.disable_ingress();
    let pinned = channel.buffered_bytes();
    assert_eq!(pinned, 40);

    // Processing moves queued chunks into the scanner; that must not free
    // room for more pushes while the partial message is still held there
    for _ in 0..5 {
        channel.process(BUDGET, false);
        assert!(channel.buffered_bytes() <= pinned);
        for _ in 0..4 {
            push(&mut channel, "abcdefghij");
            assert!(channel.buffered_bytes() <= pinned);
        }
    }
    assert!(channel.stats().bytes_dropped > 0);

    channel.enable_ingress();
    push(&mut channel, "more");
    assert!(channel.buffered_bytes() > pinned);
}

#[test]
fn test_reject_drops_while_disabled() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Reject));
    assert!(push(&mut channel, "kept\n"));
    channel.disable_ingress();
    let before = channel.buffered_bytes();

    assert!(!push(&mut channel, "lost\n"));
    assert!(!push(&mut channel, "lost too\n"));
    assert_eq!(channel.buffered_bytes(), before);
    assert_eq!(channel.stats().gaps, 1);
    assert_eq!(channel.stats().chunks_dropped, 2);

    channel.enable_ingress();
    assert!(push(&mut channel, "after\n"));
    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["kept", "after"]);
}

#[test]
fn test_gap_splits_partial_message() {
    let (mut channel, out) = collecting(config(OverloadStrategy::Reject));
    push(&mut channel, "before-");
    channel.disable_ingress();
    push(&mut channel, "dropped\n");
    channel.enable_ingress();
    push(&mut channel, "after\n");

    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["before-", "after"]);
}

#[test]
fn test_overwrite_eviction_inserts_gap() {
    let mut cfg = config(OverloadStrategy::Overwrite);
    cfg.max_buffered_chunks = 2;
    let (mut channel, out) = collecting(cfg);
    push(&mut channel, "aaa");
    push(&mut channel, "bbb");
    push(&mut channel, "ccc\n");

    assert_eq!(channel.stats().gaps, 1);
    channel.process(BUDGET, false);
    assert_eq!(*out.borrow(), vec!["bbbccc"]);
}
