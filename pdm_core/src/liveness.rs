//! Link-liveness supervision: two cooperative watchdogs on the
//! monotonic clock, both scoped to the last-active input surface.
//!
//! The keypad watchdog arms once a heartbeat has ever been seen and
//! only while the keypad was the last input; the DIGOUT watchdog arms
//! on every DIGOUT frame and only while DIGOUT was the last input.
//! Local buttons have no watchdog. Firing is idempotent: a lost link
//! shuts the outputs off once, then stays quiet until the link returns.

use pdm_common::types::InputMode;
use tracing::debug;

/// Keypad heartbeat timeout [ms].
pub const KEYPAD_TIMEOUT_MS: u64 = 1500;

/// DIGOUT message timeout [ms].
pub const DIGOUT_TIMEOUT_MS: u64 = 2000;

/// A watchdog expiry the control loop must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// Keypad heartbeat lost: force all channels off, mark the link
    /// degraded.
    KeypadLost,
    /// DIGOUT stream lost: force all channels off and reset the DIGOUT
    /// edge state so the next asserted bit reads as a rising edge.
    DigoutLost,
}

#[derive(Debug, Default)]
pub struct LivenessSupervisor {
    last_heartbeat_ms: Option<u64>,
    keypad_ok: bool,
    last_digout_ms: Option<u64>,
    digout_armed: bool,
    digout_watchdog_triggered: bool,
}

impl LivenessSupervisor {
    pub fn new() -> Self {
        Self {
            keypad_ok: true,
            ..Self::default()
        }
    }

    /// A keypad operational heartbeat arrived.
    pub fn heartbeat_seen(&mut self, now_ms: u64) {
        self.last_heartbeat_ms = Some(now_ms);
        if !self.keypad_ok {
            debug!("keypad link restored");
        }
        self.keypad_ok = true;
    }

    /// A DIGOUT command frame arrived (identical frames count too).
    pub fn digout_frame_seen(&mut self, now_ms: u64) {
        self.last_digout_ms = Some(now_ms);
        self.digout_armed = true;
        self.digout_watchdog_triggered = false;
    }

    /// Keypad link health, as reported by `STATUS`.
    #[inline]
    pub fn keypad_ok(&self) -> bool {
        self.keypad_ok
    }

    /// Latched DIGOUT watchdog indication, consumed by diagnostics.
    #[inline]
    pub fn digout_watchdog_triggered(&self) -> bool {
        self.digout_watchdog_triggered
    }

    /// Evaluate both watchdogs against the last-active input surface.
    ///
    /// At most one event per call; expiry of the inactive surface's
    /// watchdog is not possible because the scope check comes first.
    pub fn step(&mut self, last_input: InputMode, now_ms: u64) -> Option<LivenessEvent> {
        match last_input {
            InputMode::CanKeypad => {
                if let Some(hb) = self.last_heartbeat_ms {
                    if self.keypad_ok && now_ms.saturating_sub(hb) > KEYPAD_TIMEOUT_MS {
                        self.keypad_ok = false;
                        debug!("keypad heartbeat lost, outputs off");
                        return Some(LivenessEvent::KeypadLost);
                    }
                }
            }
            InputMode::CanDigout => {
                if let Some(last) = self.last_digout_ms {
                    if self.digout_armed && now_ms.saturating_sub(last) > DIGOUT_TIMEOUT_MS {
                        self.digout_armed = false;
                        self.digout_watchdog_triggered = true;
                        debug!("DIGOUT stream lost, outputs off");
                        return Some(LivenessEvent::DigoutLost);
                    }
                }
            }
            // Local buttons are wired to the board; nothing to watch.
            InputMode::Digital | InputMode::None => {}
        }
        None
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
