//! Concatenated SMS reassembly.
//!
//! A fixed pool of slots, each collecting the fragments of one multipart
//! message identified by `(sender, reference)`. Fragments are stored by part
//! index so the combined text is always in part order, whatever order the
//! modem listed them in.
use std::fmt;

use log::{debug, warn};
use tokio::time::{Duration, Instant};

use crate::metrics;
use crate::pdu::DecodedMessage;
use crate::text::BoundedText;

pub const DEFAULT_SLOTS: usize = 4;
pub const DEFAULT_MAX_FRAGMENTS: usize = 10;
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Byte capacity of a combined message.
pub const COMBINED_TEXT_CAPACITY: usize = 2047;

/// Modem-assigned storage slot of a received SMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageIndex(pub u32);

impl fmt::Display for StorageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub storage_index: StorageIndex,
}

/// One multipart message in progress.
#[derive(Debug, Clone)]
pub struct AssemblySlot {
    pub sender: String,
    pub reference: u16,
    pub total_parts: u8,
    parts: Vec<Option<Fragment>>,
    received_parts: usize,
    first_seen_at: Instant,
}

impl AssemblySlot {
    fn new(sender: &str, reference: u16, total_parts: u8, max_fragments: usize, now: Instant) -> Self {
        Self {
            sender: sender.to_string(),
            reference,
            total_parts,
            parts: vec![None; max_fragments],
            received_parts: 0,
            first_seen_at: now,
        }
    }

    pub fn received_parts(&self) -> usize { self.received_parts }

    /// Bit `n` is set when part `n` (1-indexed) is held.
    pub fn received_mask(&self) -> u32 {
        self.parts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << (i + 1)))
    }

    /// Storage index of part `part_index`, if that part has arrived.
    pub fn storage_index(&self, part_index: u8) -> Option<StorageIndex> {
        let slot = usize::from(part_index).checked_sub(1)?;
        self.parts.get(slot)?.as_ref().map(|f| f.storage_index)
    }

    fn part(&self, part_index: u8) -> Option<&Fragment> {
        self.parts.get(usize::from(part_index) - 1)?.as_ref()
    }

    fn is_complete(&self) -> bool {
        self.received_parts >= usize::from(self.total_parts)
    }

    fn into_message(self) -> AssembledMessage {
        let mut text = BoundedText::with_capacity(COMBINED_TEXT_CAPACITY);
        let mut storage_indices = Vec::with_capacity(self.received_parts);
        for fragment in self.parts.into_iter().flatten() {
            text.push_str(&fragment.text);
            storage_indices.push(fragment.storage_index);
        }
        let truncated = text.is_truncated();
        if truncated {
            warn!("Combined message from {} truncated to {} bytes", self.sender, text.len());
        }
        AssembledMessage {
            sender: self.sender,
            text: text.into_string(),
            storage_indices,
            parts_received: self.received_parts,
            parts_expected: usize::from(self.total_parts),
            truncated,
        }
    }
}

/// A message ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub sender: String,
    pub text: String,
    /// Every storage index backing the text, in ascending part order.
    pub storage_indices: Vec<StorageIndex>,
    pub parts_received: usize,
    pub parts_expected: usize,
    pub truncated: bool,
}

impl AssembledMessage {
    pub fn is_partial(&self) -> bool { self.parts_received < self.parts_expected }

    fn single(message: DecodedMessage, index: StorageIndex) -> Self {
        Self {
            sender: message.sender,
            text: message.text,
            storage_indices: vec![index],
            parts_received: 1,
            parts_expected: 1,
            truncated: false,
        }
    }
}

/// Outcome of handing one decoded record to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ready(AssembledMessage),
    /// Stored, waiting for more parts (or a re-listing of a part already held)
    Pending,
    /// A second copy of a part already held, stored under another index
    Duplicate(StorageIndex),
    Rejected,
}

pub struct AssemblyTable {
    slots: Vec<Option<AssemblySlot>>,
    max_fragments: usize,
    fragment_timeout: Duration,
}

impl Default for AssemblyTable {
    fn default() -> Self { Self::new(DEFAULT_SLOTS, DEFAULT_MAX_FRAGMENTS, DEFAULT_FRAGMENT_TIMEOUT) }
}

impl AssemblyTable {
    pub fn new(slots: usize, max_fragments: usize, fragment_timeout: Duration) -> Self {
        Self {
            slots: vec![None; slots.max(1)],
            max_fragments: max_fragments.clamp(1, 31),
            fragment_timeout,
        }
    }

    pub fn handle(&mut self, message: DecodedMessage, index: StorageIndex, now: Instant) -> Disposition {
        let Some(concat) = message.concatenation else {
            return Disposition::Ready(AssembledMessage::single(message, index));
        };
        let part = concat.part_index;
        if part == 0 || usize::from(part) > self.max_fragments {
            warn!("Rejecting fragment {} of ref {} from {}: part index out of range", part, concat.reference, message.sender);
            return Disposition::Rejected;
        }

        let pos = self.locate_or_create(&message.sender, concat.reference, concat.total_parts, now);
        let Some(slot) = self.slots[pos].as_mut() else {
            return Disposition::Rejected;
        };

        if let Some(held) = slot.part(part) {
            if held.storage_index == index {
                debug!("Part {} of ref {} already held (index {})", part, concat.reference, index);
                return Disposition::Pending;
            }
            debug!("Duplicate part {} of ref {} at index {} (held at {})", part, concat.reference, index, held.storage_index);
            return Disposition::Duplicate(index);
        }

        slot.parts[usize::from(part) - 1] = Some(Fragment { text: message.text, storage_index: index });
        slot.received_parts += 1;
        debug!(
            "Stored part {}/{} of ref {} from {} (mask {:#b})",
            part, slot.total_parts, slot.reference, slot.sender, slot.received_mask()
        );

        if slot.is_complete() {
            match self.slots[pos].take() {
                Some(done) => Disposition::Ready(done.into_message()),
                None => Disposition::Pending,
            }
        } else {
            Disposition::Pending
        }
    }

    /// Force out every slot older than the fragment timeout.
    pub fn sweep(&mut self, now: Instant) -> Vec<AssembledMessage> {
        let timeout = self.fragment_timeout;
        let mut expired = Vec::new();
        for entry in self.slots.iter_mut() {
            let stale = entry
                .as_ref()
                .is_some_and(|s| now.saturating_duration_since(s.first_seen_at) > timeout);
            if stale {
                if let Some(slot) = entry.take() {
                    warn!(
                        "Timed out waiting for ref {} from {} ({}/{} parts), publishing partial",
                        slot.reference, slot.sender, slot.received_parts, slot.total_parts
                    );
                    expired.push(slot.into_message());
                }
            }
        }
        expired
    }

    pub fn find(&self, sender: &str, reference: u16) -> Option<&AssemblySlot> {
        self.slots.iter().flatten().find(|s| s.sender == sender && s.reference == reference)
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn locate_or_create(&mut self, sender: &str, reference: u16, total_parts: u8, now: Instant) -> usize {
        if let Some(pos) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.sender == sender && s.reference == reference))
        {
            return pos;
        }
        let pos = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => self.evict_oldest(),
        };
        self.slots[pos] = Some(AssemblySlot::new(sender, reference, total_parts.max(1), self.max_fragments, now));
        pos
    }

    fn evict_oldest(&mut self) -> usize {
        let (pos, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s.first_seen_at)))
            .min_by_key(|(_, seen)| *seen)
            .unwrap_or((0, Instant::now()));
        if let Some(old) = self.slots[pos].take() {
            warn!(
                "Assembly pool full, dropping ref {} from {} with {}/{} parts",
                old.reference, old.sender, old.received_parts, old.total_parts
            );
            metrics::inc_fragments_evicted();
        }
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::Concatenation;

    fn fragment(part: u8, total: u8, text: &str) -> DecodedMessage {
        DecodedMessage {
            sender: "+85291234567".into(),
            text: text.into(),
            concatenation: Some(Concatenation { reference: 42, total_parts: total, part_index: part }),
        }
    }

    #[test]
    fn mask_tracks_parts() {
        let mut table = AssemblyTable::default();
        let now = Instant::now();
        table.handle(fragment(1, 3, "a"), StorageIndex(1), now);
        table.handle(fragment(3, 3, "c"), StorageIndex(3), now);
        let slot = table.find("+85291234567", 42).unwrap();
        assert_eq!(slot.received_mask(), 0b1010);
        assert_eq!(slot.storage_index(3), Some(StorageIndex(3)));
        assert_eq!(slot.storage_index(2), None);
        assert_eq!(slot.storage_index(0), None);
    }

    #[test]
    fn combined_text_is_bounded() {
        let mut table = AssemblyTable::default();
        let now = Instant::now();
        let big = "x".repeat(511);
        let mut last = Disposition::Pending;
        for part in 1..=5u8 {
            last = table.handle(fragment(part, 5, &big), StorageIndex(u32::from(part)), now);
        }
        match last {
            Disposition::Ready(msg) => {
                assert!(msg.truncated);
                assert_eq!(msg.text.len(), COMBINED_TEXT_CAPACITY);
                assert_eq!(msg.storage_indices.len(), 5);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }
}
