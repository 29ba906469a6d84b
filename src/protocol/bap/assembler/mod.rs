//! BAP frame assembler: turns raw frames into complete logical messages,
//! hiding the short / long distinction from the layers above.
//!
//! Every failure is a silent drop with a counter increment. A malformed frame
//! only ever affects the pending entry of its own key.
use embassy_time::{Duration, Instant};

use super::{
    BapHeader, BapMessage, FrameKind, CONTINUATION_CHUNK, MAX_LONG_PAYLOAD, START_CHUNK,
};
use crate::core::BapPayload;

//==================================================================================Constants

/// Default number of long messages reassembled in parallel.
pub const DEFAULT_MAX_PENDING: usize = 4;

/// Smallest pending table accepted, checked at compile time.
pub const MIN_PENDING: usize = 4;

/// Age after which a silent pending entry may be evicted.
pub const PENDING_STALE_TIMEOUT_MS: u64 = 1_000;

//==================================================================================Config

/// Tunables of the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    pub stale_timeout: Duration,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_millis(PENDING_STALE_TIMEOUT_MS),
        }
    }
}

impl AssemblerConfig {
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }
}

//==================================================================================Enums and Structs

/// Diagnostic counters, read from the control context for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssemblerStats {
    pub short_messages_decoded: u32,
    pub long_start_frames: u32,
    pub long_continuation_frames: u32,
    pub long_messages_decoded: u32,
    /// Continuation without a pending start, or with the wrong index.
    pub continuation_errors: u32,
    /// Start frame replacing a live entry of the same key.
    pub stale_replacements: u32,
    /// Expired entry dropped (replaced, evicted or hit by a late continuation).
    pub stale_evictions: u32,
    /// Entry evicted because the table was full, live or not.
    pub pending_overflows: u32,
    /// Frame too short for its own header.
    pub malformed_frames: u32,
    /// Start frame announcing more than the reassembly buffer holds.
    pub oversized_messages: u32,
    /// High-water mark of the pending table.
    pub max_pending_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingKey {
    can_id: u32,
    group: u8,
}

/// One in-flight long message.
#[derive(Debug, Clone, Copy)]
struct PendingReassembly {
    key: PendingKey,
    header: BapHeader,
    expected_len: usize,
    buffer: BapPayload,
    last_frame: Instant,
    next_seq: u8,
}

/// Reassembly engine owning a fixed table of `K` pending long messages.
#[derive(Debug)]
pub struct BapFrameAssembler<const K: usize = DEFAULT_MAX_PENDING> {
    pending: [Option<PendingReassembly>; K],
    config: AssemblerConfig,
    stats: AssemblerStats,
}

impl<const K: usize> Default for BapFrameAssembler<K> {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

impl<const K: usize> BapFrameAssembler<K> {
    const TABLE_CHECK: () = assert!(K >= MIN_PENDING, "BAP pending table needs at least 4 slots");

    pub const fn new(config: AssemblerConfig) -> Self {
        let () = Self::TABLE_CHECK;
        Self {
            pending: [None; K],
            config,
            stats: AssemblerStats {
                short_messages_decoded: 0,
                long_start_frames: 0,
                long_continuation_frames: 0,
                long_messages_decoded: 0,
                continuation_errors: 0,
                stale_replacements: 0,
                stale_evictions: 0,
                pending_overflows: 0,
                malformed_frames: 0,
                oversized_messages: 0,
                max_pending_count: 0,
            },
        }
    }

    //==================================================================================Process Functions
    /// Feed one frame received on `can_id`.
    ///
    /// Returns the message it completes, if any. `data` is the frame payload
    /// (`dlc` bytes); anything past eight bytes is ignored.
    pub fn feed(&mut self, can_id: u32, data: &[u8], now: Instant) -> Option<BapMessage> {
        let data = &data[..data.len().min(8)];
        let Some(&first) = data.first() else {
            self.stats.malformed_frames += 1;
            return None;
        };

        match FrameKind::classify(first) {
            FrameKind::Short => self.feed_short(data),
            FrameKind::LongStart { group, .. } => {
                self.feed_start(PendingKey { can_id, group }, data, now)
            }
            FrameKind::Continuation { group, index } => {
                self.feed_continuation(PendingKey { can_id, group }, index, data, now)
            }
        }
    }

    fn feed_short(&mut self, data: &[u8]) -> Option<BapMessage> {
        if data.len() < 2 {
            self.stats.malformed_frames += 1;
            return None;
        }
        let header = BapHeader::decode([data[0], data[1]]);
        self.stats.short_messages_decoded += 1;
        Some(BapMessage::new(header, &data[2..]))
    }

    fn feed_start(&mut self, key: PendingKey, data: &[u8], now: Instant) -> Option<BapMessage> {
        if data.len() < 4 {
            self.stats.malformed_frames += 1;
            return None;
        }
        self.stats.long_start_frames += 1;

        // A new start always supersedes whatever the key was assembling.
        if let Some(slot) = self.find(key) {
            if self.is_expired(slot, now) {
                self.stats.stale_evictions += 1;
            } else {
                self.stats.stale_replacements += 1;
                #[cfg(feature = "defmt")]
                defmt::debug!("BAP start replaces pending entry on {=u32:#x}", key.can_id);
            }
            self.pending[slot] = None;
        }

        let expected_len = data[1] as usize;
        if expected_len > MAX_LONG_PAYLOAD {
            self.stats.oversized_messages += 1;
            return None;
        }

        let header = BapHeader::decode([data[2], data[3]]);
        let chunk = &data[4..];
        let take = expected_len.min(chunk.len()).min(START_CHUNK);

        if take == expected_len {
            self.stats.long_messages_decoded += 1;
            return Some(BapMessage::new(header, &chunk[..take]));
        }

        let slot = match self.free_slot() {
            Some(slot) => slot,
            None => self.evict_oldest(now),
        };
        self.pending[slot] = Some(PendingReassembly {
            key,
            header,
            expected_len,
            buffer: BapPayload::from_slice(&chunk[..take]),
            last_frame: now,
            next_seq: 0,
        });

        let count = self.pending_count();
        if count > self.stats.max_pending_count {
            self.stats.max_pending_count = count;
        }
        None
    }

    fn feed_continuation(
        &mut self,
        key: PendingKey,
        index: u8,
        data: &[u8],
        now: Instant,
    ) -> Option<BapMessage> {
        self.stats.long_continuation_frames += 1;
        if data.len() < 2 {
            self.stats.malformed_frames += 1;
            return None;
        }

        let Some(slot) = self.find(key) else {
            self.stats.continuation_errors += 1;
            return None;
        };

        if self.is_expired(slot, now) {
            self.stats.continuation_errors += 1;
            self.stats.stale_evictions += 1;
            self.pending[slot] = None;
            return None;
        }

        let entry = self.pending[slot].as_mut()?;
        if index != entry.next_seq {
            #[cfg(feature = "defmt")]
            defmt::trace!(
                "BAP continuation out of sequence: got {}, expected {}",
                index,
                entry.next_seq
            );
            self.stats.continuation_errors += 1;
            self.pending[slot] = None;
            return None;
        }

        let remaining = entry.expected_len - entry.buffer.len();
        let chunk = &data[1..];
        let take = remaining.min(chunk.len()).min(CONTINUATION_CHUNK);
        entry.buffer.extend_from_slice(&chunk[..take]);
        entry.next_seq = (entry.next_seq + 1) & 0x0F;
        entry.last_frame = now;

        if entry.buffer.len() < entry.expected_len {
            return None;
        }

        let message = BapMessage {
            header: entry.header,
            payload: entry.buffer,
        };
        self.pending[slot] = None;
        self.stats.long_messages_decoded += 1;
        Some(message)
    }

    //==================================================================================Table management
    fn find(&self, key: PendingKey) -> Option<usize> {
        self.pending
            .iter()
            .position(|entry| matches!(entry, Some(e) if e.key == key))
    }

    fn free_slot(&self) -> Option<usize> {
        self.pending.iter().position(Option::is_none)
    }

    fn is_expired(&self, slot: usize, now: Instant) -> bool {
        match &self.pending[slot] {
            Some(entry) => now.saturating_duration_since(entry.last_frame) > self.config.stale_timeout,
            None => false,
        }
    }

    /// Free the least recently fed slot of a full table and return it.
    fn evict_oldest(&mut self, now: Instant) -> usize {
        let mut oldest = 0;
        let mut oldest_at: Option<Instant> = None;
        for (slot, entry) in self.pending.iter().enumerate() {
            if let Some(entry) = entry {
                if oldest_at.map_or(true, |at| entry.last_frame < at) {
                    oldest = slot;
                    oldest_at = Some(entry.last_frame);
                }
            }
        }

        self.stats.pending_overflows += 1;
        if self.is_expired(oldest, now) {
            self.stats.stale_evictions += 1;
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("BAP pending table full, evicting live entry");
        }
        self.pending[oldest] = None;
        oldest
    }

    //==================================================================================Diagnostics
    /// Drop every in-flight reassembly. Counters are kept.
    pub fn reset(&mut self) {
        self.pending = [None; K];
    }

    /// Number of long messages currently being assembled.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|entry| entry.is_some()).count()
    }

    /// High-water mark of [`Self::pending_count`].
    pub fn max_pending_count(&self) -> usize {
        self.stats.max_pending_count
    }

    pub fn is_assembling(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn config(&self) -> AssemblerConfig {
        self.config
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
