//! CAN keypad surface: edge detection over the button PDO mask.
//!
//! PDO frames arrive on change (and whenever the keypad feels like
//! repeating itself), so press/release edges come from frame deltas
//! while long-hold detection runs from the tick: a button can cross
//! the long-press threshold with no frame in flight.

use pdm_common::types::CHANNEL_COUNT;
use tracing::debug;

use super::{PressEvent, LONG_PRESS_MS};

#[derive(Debug, Default)]
pub struct KeypadSurface {
    last_mask: u8,
    press_start_ms: [u64; CHANNEL_COUNT],
    long_done: [bool; CHANNEL_COUNT],
}

impl KeypadSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A long press was consumed by the arbiter; stop re-reporting it.
    pub fn mark_long_done(&mut self, ch: usize) {
        self.long_done[ch] = true;
    }

    /// Apply a button PDO mask and emit press/release edges.
    pub fn handle_mask(&mut self, mask: u8, now_ms: u64, events: &mut Vec<PressEvent>) {
        for ch in 0..CHANNEL_COUNT {
            let bit = 1u8 << ch;
            let now_pressed = mask & bit != 0;
            let was_pressed = self.last_mask & bit != 0;

            if now_pressed && !was_pressed {
                self.press_start_ms[ch] = now_ms;
                self.long_done[ch] = false;
                debug!(ch, "keypad button pressed");
                events.push(PressEvent::Pressed(ch));
            } else if !now_pressed && was_pressed {
                debug!(
                    ch,
                    held_ms = now_ms.saturating_sub(self.press_start_ms[ch]),
                    "keypad button released"
                );
                events.push(PressEvent::Released {
                    ch,
                    was_long: self.long_done[ch],
                });
            }
        }
        self.last_mask = mask & 0x0F;
    }

    /// Emit long-hold events for buttons still pressed; called every
    /// tick so holds fire between frames.
    pub fn poll_holds(&mut self, now_ms: u64, events: &mut Vec<PressEvent>) {
        for ch in 0..CHANNEL_COUNT {
            let bit = 1u8 << ch;
            if self.last_mask & bit != 0
                && !self.long_done[ch]
                && now_ms.saturating_sub(self.press_start_ms[ch]) >= LONG_PRESS_MS
            {
                events.push(PressEvent::LongHold(ch));
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
