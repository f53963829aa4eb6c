//! Remote DIGOUT surface: per-channel level/edge state and the
//! fuse-induced lock.
//!
//! The lock stops a stale remote controller from chattering a load back
//! into a blown fuse: after a trip, rising edges are ignored until a
//! falling edge rearms the channel.

use pdm_common::types::CHANNEL_COUNT;

#[derive(Debug, Default)]
pub struct DigoutSurface {
    last_level: [bool; CHANNEL_COUNT],
    lock: [bool; CHANNEL_COUNT],
}

impl DigoutSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level seen in the previous frame.
    #[inline]
    pub fn last_level(&self, ch: usize) -> bool {
        self.last_level[ch]
    }

    #[inline]
    pub fn set_last_level(&mut self, ch: usize, level: bool) {
        self.last_level[ch] = level;
    }

    /// Whether rising edges on the channel are currently inhibited.
    #[inline]
    pub fn locked(&self, ch: usize) -> bool {
        self.lock[ch]
    }

    #[inline]
    pub fn set_locked(&mut self, ch: usize, locked: bool) {
        self.lock[ch] = locked;
    }

    /// Forget all last-seen levels (watchdog expiry): the next asserted
    /// bit reads as a fresh rising edge.
    pub fn reset_levels(&mut self) {
        self.last_level = [false; CHANNEL_COUNT];
    }
}
