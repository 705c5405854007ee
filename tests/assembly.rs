use std::time::Duration;

use simbridge::bridge::{AssemblyTable, Disposition, StorageIndex};
use simbridge::pdu::{Concatenation, DecodedMessage};
use tokio::time::Instant;

const SENDER: &str = "+85291234567";

fn part(reference: u16, part_index: u8, total_parts: u8, text: &str) -> DecodedMessage {
    DecodedMessage {
        sender: SENDER.into(),
        text: text.into(),
        concatenation: Some(Concatenation { reference, total_parts, part_index }),
    }
}

fn ready(d: Disposition) -> simbridge::bridge::AssembledMessage {
    match d {
        Disposition::Ready(m) => m,
        other => panic!("expected Ready, got {:?}", other),
    }
}

#[test]
fn single_message_is_ready_immediately() {
    let mut table = AssemblyTable::default();
    let msg = DecodedMessage { sender: SENDER.into(), text: "plain".into(), concatenation: None };
    let out = ready(table.handle(msg, StorageIndex(3), Instant::now()));
    assert_eq!(out.text, "plain");
    assert_eq!(out.storage_indices, vec![StorageIndex(3)]);
    assert!(!out.is_partial());
    assert_eq!(table.active(), 0);
}

#[test]
fn out_of_order_parts_publish_once_in_part_order() {
    let mut table = AssemblyTable::default();
    let now = Instant::now();
    assert_eq!(table.handle(part(7, 2, 2, " world"), StorageIndex(11), now), Disposition::Pending);
    let out = ready(table.handle(part(7, 1, 2, "hello"), StorageIndex(10), now));
    assert_eq!(out.text, "hello world");
    assert_eq!(out.storage_indices, vec![StorageIndex(10), StorageIndex(11)]);
    assert_eq!((out.parts_received, out.parts_expected), (2, 2));
    assert_eq!(table.active(), 0);

    // a late re-listing of part 2 starts a fresh slot rather than republishing
    assert_eq!(table.handle(part(7, 2, 2, " world"), StorageIndex(11), now), Disposition::Pending);
    assert_eq!(table.active(), 1);
}

#[test]
fn duplicate_under_new_index_is_flagged_for_deletion() {
    let mut table = AssemblyTable::default();
    let now = Instant::now();
    table.handle(part(7, 1, 3, "a"), StorageIndex(1), now);
    let d = table.handle(part(7, 1, 3, "a"), StorageIndex(5), now);
    assert_eq!(d, Disposition::Duplicate(StorageIndex(5)));
    let slot = table.find(SENDER, 7).unwrap();
    assert_eq!(slot.received_parts(), 1);
    assert_eq!(slot.storage_index(1), Some(StorageIndex(1)));
}

#[test]
fn relisted_part_with_same_index_is_pending() {
    let mut table = AssemblyTable::default();
    let now = Instant::now();
    table.handle(part(7, 1, 3, "a"), StorageIndex(1), now);
    assert_eq!(table.handle(part(7, 1, 3, "a"), StorageIndex(1), now), Disposition::Pending);
    assert_eq!(table.find(SENDER, 7).unwrap().received_parts(), 1);
}

#[test]
fn stalled_message_is_published_partially_after_timeout() {
    let mut table = AssemblyTable::new(4, 10, Duration::from_secs(10));
    let t0 = Instant::now();
    table.handle(part(9, 1, 3, "only part"), StorageIndex(2), t0);

    assert!(table.sweep(t0 + Duration::from_secs(10)).is_empty());
    let flushed = table.sweep(t0 + Duration::from_millis(10_001));
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].text, "only part");
    assert_eq!(flushed[0].storage_indices, vec![StorageIndex(2)]);
    assert!(flushed[0].is_partial());
    assert_eq!(table.active(), 0);
}

#[test]
fn part_index_out_of_range_is_rejected() {
    let mut table = AssemblyTable::default();
    let now = Instant::now();
    assert_eq!(table.handle(part(1, 11, 12, "x"), StorageIndex(1), now), Disposition::Rejected);
    assert_eq!(table.handle(part(1, 0, 2, "x"), StorageIndex(1), now), Disposition::Rejected);
    assert_eq!(table.active(), 0);
}

#[test]
fn full_pool_evicts_oldest_slot() {
    let mut table = AssemblyTable::new(4, 10, Duration::from_secs(60));
    let t0 = Instant::now();
    for reference in 1..=4u16 {
        let at = t0 + Duration::from_millis(u64::from(reference));
        table.handle(part(reference, 1, 2, "x"), StorageIndex(u32::from(reference)), at);
    }
    assert_eq!(table.active(), 4);

    table.handle(part(5, 1, 2, "y"), StorageIndex(5), t0 + Duration::from_millis(10));
    assert_eq!(table.active(), 4);
    assert!(table.find(SENDER, 1).is_none(), "oldest slot evicted");
    assert!(table.find(SENDER, 2).is_some());
    assert!(table.find(SENDER, 5).is_some());
}

#[test]
fn same_reference_from_different_senders_completes_independently() {
    const OTHER: &str = "+15551234567";
    let from = |sender: &str, part_index: u8, text: &str| {
        let mut m = part(3, part_index, 2, text);
        m.sender = sender.into();
        m
    };
    let mut table = AssemblyTable::default();
    let now = Instant::now();

    assert_eq!(table.handle(from(SENDER, 2, "a2"), StorageIndex(2), now), Disposition::Pending);
    assert_eq!(table.handle(from(OTHER, 1, "b1"), StorageIndex(3), now), Disposition::Pending);
    assert_eq!(table.active(), 2);

    let first = ready(table.handle(from(SENDER, 1, "a1"), StorageIndex(1), now));
    assert_eq!(first.sender, SENDER);
    assert_eq!(first.text, "a1a2");
    assert_eq!(first.storage_indices, vec![StorageIndex(1), StorageIndex(2)]);
    assert_eq!(table.active(), 1);
    assert!(table.find(OTHER, 3).is_some());

    let second = ready(table.handle(from(OTHER, 2, "b2"), StorageIndex(4), now));
    assert_eq!(second.sender, OTHER);
    assert_eq!(second.text, "b1b2");
    assert_eq!(second.storage_indices, vec![StorageIndex(3), StorageIndex(4)]);
    assert_eq!(table.active(), 0);
}
