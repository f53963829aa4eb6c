//! Indicator and telemetry emission.
//!
//! LED states are derived per channel after the fuse pass and packed
//! into one steady and one flashing frame; both are coalesced to at
//! most one transmission per tick, sent on change or on the 500 ms
//! refresh interval. Telemetry goes out at most every 250 ms.

use pdm_common::config::ChannelConfig;
use pdm_common::frame::{led_flash, led_steady, telemetry, TelemetrySample};
use pdm_common::types::{ChannelFaults, LedState, CHANNEL_COUNT};

use crate::adapters::CanBus;
use crate::state::ChannelState;

/// LED refresh interval when nothing changes [ms]; matches the keypad
/// heartbeat period.
pub const LED_REFRESH_MS: u64 = 500;

/// Minimum spacing between telemetry frames [ms] (4 Hz).
pub const TELEMETRY_MIN_INTERVAL_MS: u64 = 250;

/// Select a channel's LED state; first matching row wins.
pub fn led_for(state: &ChannelState, cfg: &ChannelConfig, current_a: f32) -> LedState {
    if !state.active {
        if state.faults.contains(ChannelFaults::THERMAL) {
            return LedState::RedFlash;
        }
        if state.faults.contains(ChannelFaults::OVERCURRENT) {
            return LedState::Red;
        }
        return LedState::Off;
    }
    if state.faults.contains(ChannelFaults::OVERCURRENT) {
        return LedState::Red;
    }
    if state.warn_undercurrent {
        return LedState::Blue;
    }
    if current_a > cfg.oc_threshold_a {
        // Over threshold but the fuse has not blown yet.
        return LedState::Amber;
    }
    LedState::Green
}

/// Coalesced LED frame transmitter.
#[derive(Debug, Default)]
pub struct LedEmitter {
    last_sent: Option<([u8; 8], [u8; 8])>,
    last_sent_ms: u64,
}

impl LedEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the steady and flashing LED frames when the packed contents
    /// changed or the refresh interval elapsed. Returns whether a
    /// transmission happened.
    pub fn step(
        &mut self,
        leds: &[LedState; CHANNEL_COUNT],
        keypad_node_id: u8,
        now_ms: u64,
        can: &mut dyn CanBus,
    ) -> bool {
        let steady = led_steady(keypad_node_id, leds);
        let flash = led_flash(keypad_node_id, leds);
        let packed = (steady.data, flash.data);

        let due = match self.last_sent {
            None => true,
            Some(prev) => prev != packed || now_ms.saturating_sub(self.last_sent_ms) >= LED_REFRESH_MS,
        };
        if !due {
            return false;
        }
        can.send(&steady);
        can.send(&flash);
        self.last_sent = Some(packed);
        self.last_sent_ms = now_ms;
        true
    }
}

/// Rate-limited telemetry transmitter.
#[derive(Debug, Default)]
pub struct TelemetryEmitter {
    last_sent_ms: Option<u64>,
}

impl TelemetryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the telemetry frame if the minimum interval elapsed.
    pub fn step(
        &mut self,
        pdm_node_id: u8,
        sample: &TelemetrySample,
        now_ms: u64,
        can: &mut dyn CanBus,
    ) -> bool {
        if let Some(last) = self.last_sent_ms {
            if now_ms.saturating_sub(last) < TELEMETRY_MIN_INTERVAL_MS {
                return false;
            }
        }
        can.send(&telemetry(pdm_node_id, sample));
        self.last_sent_ms = Some(now_ms);
        true
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
