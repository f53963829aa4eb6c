//! Per-channel runtime state and the channel bank every input surface
//! and supervisor routes its mutations through.
//!
//! All state here is ephemeral: it is zeroed at boot and rebuilt from
//! inputs. Group operations are plain loops over the four channels, so
//! they complete atomically within the tick that invokes them.

use pdm_common::config::PdmConfig;
use pdm_common::types::{ChannelFaults, LedState, CHANNEL_COUNT};
use tracing::debug;

/// Mutable runtime state of one output channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelState {
    /// Commanded ON state.
    pub active: bool,
    /// Monotonic stamp of the last OFF→ON transition [ms].
    pub on_since_ms: u64,
    /// Inrush-window fuse integrator, non-negative.
    pub inrush_score: f32,
    /// Steady-state fuse integrator, non-negative.
    pub oc_score: f32,
    /// Latched faults; any set flag forces the channel inactive.
    pub faults: ChannelFaults,
    /// Transient undercurrent warning, not latched.
    pub warn_undercurrent: bool,
    /// Set by a long-press clear; dropped on the next activation.
    pub cleared_just_now: bool,
    /// Indicator state derived after the fuse pass.
    pub led: LedState,
}

impl ChannelState {
    /// True when any latched fault is present.
    #[inline]
    pub fn faulted(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// The four channels plus the group-scoped operations on them.
#[derive(Debug, Default)]
pub struct ChannelBank {
    pub channels: [ChannelState; CHANNEL_COUNT],
}

impl ChannelBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command a channel ON or OFF.
    ///
    /// Activation stamps the inrush window start, zeroes both fuse
    /// integrators, and drops faults, the undercurrent warning, and the
    /// just-cleared marker.
    pub fn set_channel(&mut self, ch: usize, on: bool, now_ms: u64) {
        let c = &mut self.channels[ch];
        if on && !c.active {
            c.on_since_ms = now_ms;
            c.inrush_score = 0.0;
            c.oc_score = 0.0;
            c.faults = ChannelFaults::empty();
            c.warn_undercurrent = false;
            c.cleared_just_now = false;
        }
        c.active = on;
    }

    /// Force every member of `group` inactive and latch `fault` on it.
    pub fn shutdown_group(&mut self, cfg: &PdmConfig, group: u8, fault: ChannelFaults) {
        for ch in 0..CHANNEL_COUNT {
            if cfg.channels[ch].group == group {
                self.channels[ch].active = false;
                self.channels[ch].faults |= fault;
            }
        }
        debug!(group, ?fault, "group shutdown");
    }

    /// Long-press semantics: drop both fault kinds on every member, mark
    /// them just-cleared, and force them inactive so the next short
    /// press re-activates deliberately.
    pub fn clear_group_faults(&mut self, cfg: &PdmConfig, group: u8) {
        for ch in 0..CHANNEL_COUNT {
            if cfg.channels[ch].group == group {
                self.channels[ch].faults = ChannelFaults::empty();
                self.channels[ch].cleared_just_now = true;
                self.channels[ch].active = false;
            }
        }
        debug!(group, "group faults cleared");
    }

    /// Drop latched faults on one channel (DIGOUT falling-edge path).
    pub fn clear_channel_fault(&mut self, ch: usize) {
        let c = &mut self.channels[ch];
        c.faults = ChannelFaults::empty();
        c.warn_undercurrent = false;
        c.cleared_just_now = true;
    }

    /// True when any member of `group` carries a latched fault.
    pub fn group_has_fault(&self, cfg: &PdmConfig, group: u8) -> bool {
        (0..CHANNEL_COUNT)
            .any(|ch| cfg.channels[ch].group == group && self.channels[ch].faulted())
    }

    /// True when any member of `group` is commanded ON.
    pub fn group_any_active(&self, cfg: &PdmConfig, group: u8) -> bool {
        (0..CHANNEL_COUNT)
            .any(|ch| cfg.channels[ch].group == group && self.channels[ch].active)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
