//! The input arbiter: consumes surface events, applies channel/group
//! command semantics against the channel bank, and tracks the
//! last-active input surface.
//!
//! Concurrent surfaces are not explicitly arbitrated: the most recent
//! event wins and `last_input_mode` reflects it. Within a tick the
//! cycle applies CAN frames before the button mask.

use pdm_common::config::PdmConfig;
use pdm_common::frame::{parse_digout, parse_keypad, CanFrame, KeypadMessage};
use pdm_common::types::{ChannelFaults, InputMode, OutputMode, CHANNEL_COUNT};
use tracing::debug;

use super::buttons::ButtonSurface;
use super::digout::DigoutSurface;
use super::keypad::KeypadSurface;
use super::{PressEvent, PressSurface};

use crate::state::ChannelBank;

/// What a received CAN frame turned out to be; the cycle feeds the
/// liveness supervisor and init sequencer from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Not addressed to us.
    Ignored,
    /// Remote digital-output command (watchdog food).
    Digout,
    /// Keypad button PDO.
    KeypadButtons,
    /// Keypad boot-up: re-run the init sequence.
    KeypadBootUp,
    /// Keypad operational heartbeat.
    KeypadHeartbeat,
}

#[derive(Debug, Default)]
pub struct InputArbiter {
    buttons: ButtonSurface,
    keypad: KeypadSurface,
    digout: DigoutSurface,
    last_input_mode: InputMode,
}

impl InputArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The surface that most recently commanded a channel.
    #[inline]
    pub fn last_input_mode(&self) -> InputMode {
        self.last_input_mode
    }

    /// Fuse-trip request: restart press timing on a local button.
    pub fn request_button_timing_reset(&mut self, ch: usize) {
        self.buttons.request_timing_reset(ch);
    }

    /// DIGOUT watchdog expiry: forget last-seen levels.
    pub fn reset_digout_levels(&mut self) {
        self.digout.reset_levels();
    }

    /// Whether DIGOUT rising edges on the channel are inhibited.
    pub fn digout_locked(&self, ch: usize) -> bool {
        self.digout.locked(ch)
    }

    /// Route one received CAN frame.
    pub fn handle_frame(
        &mut self,
        frame: &CanFrame,
        cfg: &PdmConfig,
        bank: &mut ChannelBank,
        now_ms: u64,
    ) -> FrameDisposition {
        if let Some(levels) = parse_digout(frame, cfg.digout_cob_id) {
            self.apply_digout(levels, bank, now_ms);
            return FrameDisposition::Digout;
        }
        match parse_keypad(frame, cfg.keypad_node_id) {
            Some(KeypadMessage::Buttons(mask)) => {
                if mask & 0x0F != 0 {
                    self.last_input_mode = InputMode::CanKeypad;
                }
                let mut events = Vec::new();
                self.keypad.handle_mask(mask, now_ms, &mut events);
                self.dispatch(PressSurface::Keypad, &events, cfg, bank, now_ms);
                FrameDisposition::KeypadButtons
            }
            Some(KeypadMessage::BootUp) => FrameDisposition::KeypadBootUp,
            Some(KeypadMessage::Heartbeat) => FrameDisposition::KeypadHeartbeat,
            None => FrameDisposition::Ignored,
        }
    }

    /// Debounce and apply the local button mask.
    pub fn poll_buttons(&mut self, raw_mask: u8, cfg: &PdmConfig, bank: &mut ChannelBank, now_ms: u64) {
        let mut events = Vec::new();
        self.buttons.poll(raw_mask & 0x0F, now_ms, &mut events);
        self.dispatch(PressSurface::Button, &events, cfg, bank, now_ms);
    }

    /// Long-hold detection for keypad buttons between PDO frames.
    pub fn poll_keypad_holds(&mut self, cfg: &PdmConfig, bank: &mut ChannelBank, now_ms: u64) {
        let mut events = Vec::new();
        self.keypad.poll_holds(now_ms, &mut events);
        self.dispatch(PressSurface::Keypad, &events, cfg, bank, now_ms);
    }

    // ─── Shared press semantics ─────────────────────────────────────

    fn dispatch(
        &mut self,
        surface: PressSurface,
        events: &[PressEvent],
        cfg: &PdmConfig,
        bank: &mut ChannelBank,
        now_ms: u64,
    ) {
        for ev in events {
            match *ev {
                PressEvent::Pressed(ch) => self.apply_press_edge(surface, ch, cfg, bank, now_ms),
                PressEvent::LongHold(ch) => {
                    if Self::long_press_allowed(surface, ch, cfg, bank) {
                        let group = cfg.channels[ch].group;
                        bank.clear_group_faults(cfg, group);
                        match surface {
                            PressSurface::Button => self.buttons.mark_long_done(ch),
                            PressSurface::Keypad => self.keypad.mark_long_done(ch),
                        }
                    }
                }
                PressEvent::Released { ch, was_long } => {
                    self.apply_release(surface, ch, was_long, cfg, bank, now_ms)
                }
            }
        }
    }

    /// Long-press fault clearing is unconditional from the keypad; the
    /// local path allows it in latch mode, or in momentary mode only
    /// when the group actually carries a fault.
    fn long_press_allowed(
        surface: PressSurface,
        ch: usize,
        cfg: &PdmConfig,
        bank: &ChannelBank,
    ) -> bool {
        match surface {
            PressSurface::Keypad => true,
            PressSurface::Button => {
                cfg.channels[ch].mode == OutputMode::Latch
                    || bank.group_has_fault(cfg, cfg.channels[ch].group)
            }
        }
    }

    fn apply_press_edge(
        &mut self,
        surface: PressSurface,
        ch: usize,
        cfg: &PdmConfig,
        bank: &mut ChannelBank,
        now_ms: u64,
    ) {
        // Latch mode acts on release; only momentary reacts to the edge.
        if cfg.channels[ch].mode != OutputMode::Momentary {
            return;
        }
        let group = cfg.channels[ch].group;
        for m in 0..CHANNEL_COUNT {
            if cfg.channels[m].group != group {
                continue;
            }
            if bank.channels[m].faulted() && !bank.channels[m].cleared_just_now {
                bank.set_channel(m, false, now_ms);
            } else {
                bank.set_channel(m, true, now_ms);
            }
        }
        self.last_input_mode = Self::mode_of(surface);
        debug!(ch, group, "momentary press: group on");
    }

    fn apply_release(
        &mut self,
        surface: PressSurface,
        ch: usize,
        was_long: bool,
        cfg: &PdmConfig,
        bank: &mut ChannelBank,
        now_ms: u64,
    ) {
        let group = cfg.channels[ch].group;
        if was_long {
            // The clear already ran while held; the channels stay off
            // until the next deliberate press.
            return;
        }
        match cfg.channels[ch].mode {
            OutputMode::Latch => {
                if bank.group_has_fault(cfg, group) {
                    debug!(ch, group, "short press ignored: group still faulted");
                    return;
                }
                let any_on = bank.group_any_active(cfg, group);
                for m in 0..CHANNEL_COUNT {
                    if cfg.channels[m].group == group {
                        bank.set_channel(m, !any_on, now_ms);
                    }
                }
                self.last_input_mode = Self::mode_of(surface);
                debug!(ch, group, on = !any_on, "latch short press: group toggle");
            }
            OutputMode::Momentary => {
                for m in 0..CHANNEL_COUNT {
                    if cfg.channels[m].group == group {
                        bank.set_channel(m, false, now_ms);
                    }
                }
                debug!(ch, group, "momentary release: group off");
            }
        }
    }

    fn mode_of(surface: PressSurface) -> InputMode {
        match surface {
            PressSurface::Button => InputMode::Digital,
            PressSurface::Keypad => InputMode::CanKeypad,
        }
    }

    // ─── DIGOUT semantics ───────────────────────────────────────────

    fn apply_digout(&mut self, levels: [bool; CHANNEL_COUNT], bank: &mut ChannelBank, now_ms: u64) {
        for ch in 0..CHANNEL_COUNT {
            let was = self.digout.last_level(ch);
            if levels[ch] && !was {
                if self.digout.locked(ch) {
                    debug!(ch, "DIGOUT rising edge ignored: channel locked");
                } else {
                    bank.set_channel(ch, true, now_ms);
                    self.last_input_mode = InputMode::CanDigout;
                }
            } else if !levels[ch] && was {
                bank.set_channel(ch, false, now_ms);
                self.digout.set_locked(ch, false);
                bank.clear_channel_fault(ch);
                self.last_input_mode = InputMode::CanDigout;
            }
            self.digout.set_last_level(ch, levels[ch]);
        }

        // Lock any channel the frame left faulted so the remote cannot
        // re-command it into the blown fuse; a falling edge must arrive
        // first to rearm.
        for ch in 0..CHANNEL_COUNT {
            if bank.channels[ch].faults.contains(ChannelFaults::OVERCURRENT) {
                self.digout.set_locked(ch, true);
            }
        }
    }

    /// Lock a channel after a fuse trip observed later in the same tick
    /// as, or after, the frame that commanded it on.
    pub fn lock_digout_on_fault(&mut self, bank: &ChannelBank) {
        for ch in 0..CHANNEL_COUNT {
            if bank.channels[ch].faults.contains(ChannelFaults::OVERCURRENT) {
                self.digout.set_locked(ch, true);
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
