//! Routing of raw frames to registered device channels.
//!
//! The bus carries many BAP devices this unit does not care about. The router
//! rejects their frames with a scan of a small static table before any
//! reassembly work is done.
use embassy_time::Instant;
use heapless::Vec;

use super::assembler::{AssemblerConfig, BapFrameAssembler, DEFAULT_MAX_PENDING};
use super::channel::BapChannel;
use crate::error::RouterError;

/// Upper bound on registered channels.
pub const MAX_CHANNELS: usize = 8;

/// Routing counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterStats {
    /// Frames claimed by a channel (complete or not).
    pub frames_accepted: u32,
    /// Frames no channel claimed.
    pub frames_ignored: u32,
    pub complete_messages_routed: u32,
    pub short_messages_routed: u32,
    pub long_messages_routed: u32,
}

/// Static routing table plus the assembler shared by all channels.
pub struct BapChannelRouter<'a, const K: usize = DEFAULT_MAX_PENDING> {
    channels: Vec<&'a (dyn BapChannel + Sync), MAX_CHANNELS>,
    assembler: BapFrameAssembler<K>,
    stats: RouterStats,
}

impl<'a, const K: usize> Default for BapChannelRouter<'a, K> {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

impl<'a, const K: usize> BapChannelRouter<'a, K> {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            channels: Vec::new(),
            assembler: BapFrameAssembler::new(config),
            stats: RouterStats::default(),
        }
    }

    /// Add a channel at startup. When two channels claim the same CAN id the
    /// first registered wins.
    pub fn register_channel(
        &mut self,
        channel: &'a (dyn BapChannel + Sync),
    ) -> Result<(), RouterError> {
        self.channels
            .push(channel)
            .map_err(|_| RouterError::TableFull { max: MAX_CHANNELS })?;
        #[cfg(feature = "defmt")]
        defmt::info!(
            "BAP channel {} registered (rx {=u32:#x}, tx {=u32:#x})",
            channel.name(),
            channel.rx_can_id(),
            channel.tx_can_id()
        );
        Ok(())
    }

    /// First channel claiming `can_id`.
    pub fn find_channel(&self, can_id: u32) -> Option<&'a (dyn BapChannel + Sync)> {
        self.channels
            .iter()
            .copied()
            .find(|channel| channel.handles_can_id(can_id))
    }

    /// Route one frame. Returns `true` when a channel took responsibility for
    /// it, even if the message it belongs to is still incomplete.
    pub fn process_frame(&mut self, can_id: u32, data: &[u8], now: Instant) -> bool {
        let Some(channel) = self.find_channel(can_id) else {
            self.stats.frames_ignored += 1;
            return false;
        };
        self.stats.frames_accepted += 1;

        if let Some(message) = self.assembler.feed(can_id, data, now) {
            self.stats.complete_messages_routed += 1;
            if message.is_short() {
                self.stats.short_messages_routed += 1;
            } else {
                self.stats.long_messages_routed += 1;
            }
            channel.process_message(&message, now);
        }
        true
    }

    /// Drop in-flight reassemblies (after a reconnect or bus reset).
    pub fn reset(&mut self) {
        self.assembler.reset();
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn assembler(&self) -> &BapFrameAssembler<K> {
        &self.assembler
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}
