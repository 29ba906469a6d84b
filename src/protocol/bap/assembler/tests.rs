//! Reassembly tests covering short frames, sequencing, keys and table pressure.
use super::*;
use crate::protocol::bap::OpCode;

const RX: u32 = 0x1733_2510;

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Long start frame for device 0x25 function 0x19, status opcode.
fn start(group: u8, len: u8, first: [u8; 4]) -> [u8; 8] {
    let header = BapHeader::new(OpCode::Status, 0x25, 0x19).encode();
    [
        FrameKind::start_byte(group),
        len,
        header[0],
        header[1],
        first[0],
        first[1],
        first[2],
        first[3],
    ]
}

fn cont(group: u8, index: u8, bytes: [u8; 7]) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[0] = FrameKind::continuation_byte(group, index);
    frame[1..].copy_from_slice(&bytes);
    frame
}

#[test]
/// A short frame is decoded in one call without touching the table.
fn test_short_message() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    let header = BapHeader::new(OpCode::Status, 0x25, 0x10).encode();
    let frame = [header[0], header[1], 0x01, 0x21];

    let message = assembler.feed(RX, &frame, at(0)).expect("short message");
    assert_eq!(message.function_id(), 0x10);
    assert_eq!(message.opcode(), OpCode::Status);
    assert_eq!(message.device_id(), 0x25);
    assert_eq!(message.payload(), &[0x01, 0x21]);
    assert_eq!(assembler.stats().short_messages_decoded, 1);
    assert_eq!(assembler.pending_count(), 0);
}

#[test]
/// Twenty bytes: one start frame and three continuations, in order.
fn test_long_message_reassembly() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    let payload: [u8; 20] = core::array::from_fn(|i| i as u8 + 1);

    assert!(assembler
        .feed(RX, &start(0, 20, [1, 2, 3, 4]), at(0))
        .is_none());
    assert_eq!(assembler.pending_count(), 1);
    assert!(assembler
        .feed(RX, &cont(0, 0, [5, 6, 7, 8, 9, 10, 11]), at(1))
        .is_none());
    assert!(assembler
        .feed(RX, &cont(0, 1, [12, 13, 14, 15, 16, 17, 18]), at(2))
        .is_none());
    let message = assembler
        .feed(RX, &cont(0, 2, [19, 20, 0, 0, 0, 0, 0]), at(3))
        .expect("complete message");

    assert_eq!(message.payload(), &payload);
    assert_eq!(message.function_id(), 0x19);
    assert!(!message.is_short());
    let stats = assembler.stats();
    assert_eq!(stats.long_messages_decoded, 1);
    assert_eq!(stats.long_start_frames, 1);
    assert_eq!(stats.long_continuation_frames, 3);
    assert_eq!(assembler.pending_count(), 0);
    assert_eq!(assembler.max_pending_count(), 1);
}

#[test]
/// A skipped index discards the message; later frames never complete it.
fn test_out_of_sequence_continuation() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assembler.feed(RX, &start(0, 20, [1, 2, 3, 4]), at(0));
    assert!(assembler
        .feed(RX, &cont(0, 1, [0; 7]), at(1))
        .is_none());
    assert_eq!(assembler.stats().continuation_errors, 1);
    assert_eq!(assembler.pending_count(), 0);

    for index in 0..3 {
        assert!(assembler
            .feed(RX, &cont(0, index, [0; 7]), at(2))
            .is_none());
    }
    assert_eq!(assembler.stats().continuation_errors, 4);
    assert_eq!(assembler.stats().long_messages_decoded, 0);
}

#[test]
/// A duplicated continuation is a sequence error, never a double append.
fn test_duplicated_continuation() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assembler.feed(RX, &start(0, 11, [1, 2, 3, 4]), at(0));
    assembler.feed(RX, &cont(0, 0, [5, 6, 7, 8, 9, 10, 11]), at(1));
    assert_eq!(assembler.stats().long_messages_decoded, 1);

    assembler.feed(RX, &start(1, 20, [1, 2, 3, 4]), at(2));
    assembler.feed(RX, &cont(1, 0, [0; 7]), at(3));
    assert!(assembler.feed(RX, &cont(1, 0, [0; 7]), at(4)).is_none());
    assert_eq!(assembler.stats().continuation_errors, 1);
    assert_eq!(assembler.pending_count(), 0);
}

#[test]
/// Continuation without any start frame.
fn test_orphan_continuation() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assert!(assembler.feed(RX, &cont(0, 0, [0; 7]), at(0)).is_none());
    assert_eq!(assembler.stats().continuation_errors, 1);
}

#[test]
/// Different groups and different CAN ids interleave without interference.
fn test_interleaved_keys() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    let other = 0x1733_2410;

    assembler.feed(RX, &start(0, 11, [1, 2, 3, 4]), at(0));
    assembler.feed(RX, &start(1, 11, [11, 12, 13, 14]), at(0));
    assembler.feed(other, &start(0, 11, [21, 22, 23, 24]), at(0));
    assert_eq!(assembler.pending_count(), 3);

    let b = assembler
        .feed(RX, &cont(1, 0, [15, 16, 17, 18, 19, 20, 21]), at(1))
        .expect("group 1 done");
    let c = assembler
        .feed(other, &cont(0, 0, [25, 26, 27, 28, 29, 30, 31]), at(1))
        .expect("other id done");
    let a = assembler
        .feed(RX, &cont(0, 0, [5, 6, 7, 8, 9, 10, 11]), at(1))
        .expect("group 0 done");

    assert_eq!(a.payload(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    assert_eq!(b.payload()[0], 11);
    assert_eq!(c.payload()[10], 31);
    assert_eq!(assembler.stats().continuation_errors, 0);
}

#[test]
/// A second start on a live key replaces the entry and is counted.
fn test_start_replaces_live_entry() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assembler.feed(RX, &start(0, 20, [1, 2, 3, 4]), at(0));
    assembler.feed(RX, &cont(0, 0, [0; 7]), at(1));
    assembler.feed(RX, &start(0, 11, [9, 9, 9, 9]), at(2));

    assert_eq!(assembler.pending_count(), 1);
    assert_eq!(assembler.stats().stale_replacements, 1);
    let message = assembler
        .feed(RX, &cont(0, 0, [8, 8, 8, 8, 8, 8, 8]), at(3))
        .expect("replacement completes");
    assert_eq!(message.payload(), &[9, 9, 9, 9, 8, 8, 8, 8, 8, 8, 8]);
}

#[test]
/// Full table with live entries: the oldest is evicted and counted.
fn test_pending_overflow_evicts_oldest() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    for id in 1..=5u32 {
        assembler.feed(id, &start(0, 20, [0; 4]), at(id as u64 * 10));
    }

    assert_eq!(assembler.pending_count(), 4);
    assert_eq!(assembler.stats().pending_overflows, 1);
    assert_eq!(assembler.stats().stale_evictions, 0);
    assert!(assembler.is_assembling());
    // id 1 was evicted, its continuation is now an orphan
    assembler.feed(1, &cont(0, 0, [0; 7]), at(51));
    assert_eq!(assembler.stats().continuation_errors, 1);
    assert!(assembler.feed(2, &cont(0, 0, [0; 7]), at(52)).is_none());
    assert_eq!(assembler.stats().continuation_errors, 1);
}

#[test]
/// Expired entries are never completed by a late continuation.
fn test_stale_entries() {
    let config = AssemblerConfig::default().with_stale_timeout(Duration::from_millis(100));
    let mut assembler: BapFrameAssembler = BapFrameAssembler::new(config);

    assembler.feed(1, &start(0, 11, [0; 4]), at(0));
    assert!(assembler.feed(1, &cont(0, 0, [0; 7]), at(500)).is_none());
    let stats = assembler.stats();
    assert_eq!(stats.continuation_errors, 1);
    assert_eq!(stats.stale_evictions, 1);
    assert_eq!(assembler.pending_count(), 0);
    assert!(!assembler.is_assembling());
}

#[test]
/// A full table always reports the eviction as overflow, even when the
/// oldest entry had already expired.
fn test_full_table_eviction_counts_overflow() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    for id in 1..=4u32 {
        assembler.feed(id, &start(0, 20, [0; 4]), at(0));
    }
    assert_eq!(assembler.pending_count(), 4);

    assembler.feed(5, &start(0, 20, [0; 4]), at(5_000));
    let stats = assembler.stats();
    assert_eq!(stats.pending_overflows, 1);
    assert_eq!(stats.stale_evictions, 1);
    assert_eq!(assembler.pending_count(), 4);
}

#[test]
/// Truncated and oversized frames are counted and leave other entries alone.
fn test_malformed_frames() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assembler.feed(RX, &start(0, 20, [0; 4]), at(0));

    assert!(assembler.feed(0x99, &[], at(1)).is_none());
    assert!(assembler.feed(0x99, &[0x49], at(1)).is_none());
    assert!(assembler.feed(0x99, &[0x80, 10, 0x49], at(1)).is_none());
    assert!(assembler.feed(0x99, &start(0, 200, [0; 4]), at(1)).is_none());

    let stats = assembler.stats();
    assert_eq!(stats.malformed_frames, 3);
    assert_eq!(stats.oversized_messages, 1);
    assert_eq!(assembler.pending_count(), 1);
}

#[test]
/// A long start whose length fits the first chunk completes immediately.
fn test_start_frame_complete() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    let message = assembler
        .feed(RX, &start(2, 3, [7, 8, 9, 0]), at(0))
        .expect("complete in start frame");
    assert_eq!(message.payload(), &[7, 8, 9]);
    assert_eq!(assembler.pending_count(), 0);
}

#[test]
/// Reset drops pending work but keeps the counters.
fn test_reset() {
    let mut assembler: BapFrameAssembler = BapFrameAssembler::default();
    assembler.feed(RX, &start(0, 20, [0; 4]), at(0));
    assembler.reset();
    assert!(!assembler.is_assembling());
    assert_eq!(assembler.stats().long_start_frames, 1);
}
