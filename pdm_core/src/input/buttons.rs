//! Local push-button surface: mask debouncing, press timing, and
//! long-press bookkeeping.
//!
//! The hardware adapter delivers a raw 4-bit mask each tick; a change
//! must hold for the debounce interval before any edge is reported. A
//! steady-state fuse trip can request a timing reset so that a button
//! held through the trip does not immediately read as a long press.

use pdm_common::types::CHANNEL_COUNT;
use tracing::debug;

use super::{PressEvent, LONG_PRESS_MS};

/// Mask settling time before edges are accepted [ms].
pub const DEBOUNCE_MS: u64 = 50;

#[derive(Debug, Default)]
pub struct ButtonSurface {
    last_mask: u8,
    candidate_mask: u8,
    change_ms: u64,
    press_start_ms: [u64; CHANNEL_COUNT],
    long_done: [bool; CHANNEL_COUNT],
    timing_reset: [bool; CHANNEL_COUNT],
}

impl ButtonSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart press timing for a button (fuse-trip request).
    pub fn request_timing_reset(&mut self, ch: usize) {
        self.timing_reset[ch] = true;
    }

    /// A long press was consumed by the arbiter; stop re-reporting it.
    pub fn mark_long_done(&mut self, ch: usize) {
        self.long_done[ch] = true;
    }

    /// Debounce the raw mask and emit edge events.
    pub fn poll(&mut self, raw_mask: u8, now_ms: u64, events: &mut Vec<PressEvent>) {
        for ch in 0..CHANNEL_COUNT {
            if self.timing_reset[ch] {
                self.press_start_ms[ch] = now_ms;
                self.long_done[ch] = false;
                self.timing_reset[ch] = false;
                debug!(ch, "button timing reset after fuse trip");
            }
        }

        if raw_mask != self.candidate_mask {
            self.candidate_mask = raw_mask;
            self.change_ms = now_ms;
            return;
        }
        if now_ms.saturating_sub(self.change_ms) < DEBOUNCE_MS {
            return;
        }

        for ch in 0..CHANNEL_COUNT {
            let bit = 1u8 << ch;
            let now_pressed = self.candidate_mask & bit != 0;
            let was_pressed = self.last_mask & bit != 0;

            if now_pressed && !was_pressed {
                self.press_start_ms[ch] = now_ms;
                self.long_done[ch] = false;
                debug!(ch, "button pressed");
                events.push(PressEvent::Pressed(ch));
            }

            if now_pressed
                && !self.long_done[ch]
                && now_ms.saturating_sub(self.press_start_ms[ch]) >= LONG_PRESS_MS
            {
                events.push(PressEvent::LongHold(ch));
            }

            if !now_pressed && was_pressed {
                debug!(
                    ch,
                    held_ms = now_ms.saturating_sub(self.press_start_ms[ch]),
                    "button released"
                );
                events.push(PressEvent::Released {
                    ch,
                    was_long: self.long_done[ch],
                });
            }
        }

        self.last_mask = self.candidate_mask;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(surface: &mut ButtonSurface, mask: u8, now: u64) -> Vec<PressEvent> {
        let mut events = Vec::new();
        surface.poll(mask, now, &mut events);
        events
    }

    #[test]
    fn press_edge_requires_debounce() {
        let mut s = ButtonSurface::new();
        // New mask starts the settling timer, no events.
        assert!(poll(&mut s, 0b0001, 0).is_empty());
        // Still inside the debounce window.
        assert!(poll(&mut s, 0b0001, 49).is_empty());
        // Settled.
        assert_eq!(poll(&mut s, 0b0001, 50), vec![PressEvent::Pressed(0)]);
    }

    #[test]
    fn glitch_restarts_settling() {
        let mut s = ButtonSurface::new();
        poll(&mut s, 0b0001, 0);
        poll(&mut s, 0b0000, 20); // bounce
        poll(&mut s, 0b0001, 30);
        assert!(poll(&mut s, 0b0001, 60).is_empty(), "timer restarted at 30");
        assert_eq!(poll(&mut s, 0b0001, 80), vec![PressEvent::Pressed(0)]);
    }

    #[test]
    fn long_hold_repeats_until_consumed() {
        let mut s = ButtonSurface::new();
        poll(&mut s, 0b0001, 0);
        poll(&mut s, 0b0001, 50);
        assert!(poll(&mut s, 0b0001, 900).is_empty());
        assert_eq!(poll(&mut s, 0b0001, 1050), vec![PressEvent::LongHold(0)]);
        // Unconsumed: reported again next poll.
        assert_eq!(poll(&mut s, 0b0001, 1100), vec![PressEvent::LongHold(0)]);
        s.mark_long_done(0);
        assert!(poll(&mut s, 0b0001, 1150).is_empty());
        // Release settles through the debounce window too.
        assert!(poll(&mut s, 0b0000, 1200).is_empty());
        assert_eq!(
            poll(&mut s, 0b0000, 1260),
            vec![PressEvent::Released { ch: 0, was_long: true }]
        );
    }

    #[test]
    fn short_release_reports_not_long() {
        let mut s = ButtonSurface::new();
        poll(&mut s, 0b0010, 0);
        poll(&mut s, 0b0010, 50);
        assert!(poll(&mut s, 0b0000, 300).is_empty());
        assert_eq!(
            poll(&mut s, 0b0000, 360),
            vec![PressEvent::Released { ch: 1, was_long: false }]
        );
    }

    #[test]
    fn timing_reset_defers_long_press() {
        let mut s = ButtonSurface::new();
        poll(&mut s, 0b0001, 0);
        poll(&mut s, 0b0001, 50);
        // 900 ms in, a fuse trip resets the timer.
        s.request_timing_reset(0);
        assert!(poll(&mut s, 0b0001, 900).is_empty());
        // 1000 ms after the original press would have been long; the
        // reset pushed it out.
        assert!(poll(&mut s, 0b0001, 1050).is_empty());
        assert_eq!(poll(&mut s, 0b0001, 1900), vec![PressEvent::LongHold(0)]);
    }

    #[test]
    fn two_buttons_tracked_independently() {
        let mut s = ButtonSurface::new();
        poll(&mut s, 0b0011, 0);
        let ev = poll(&mut s, 0b0011, 50);
        assert_eq!(ev, vec![PressEvent::Pressed(0), PressEvent::Pressed(1)]);
        poll(&mut s, 0b0010, 120);
        let ev = poll(&mut s, 0b0010, 180);
        assert_eq!(ev, vec![PressEvent::Released { ch: 0, was_long: false }]);
    }
}
