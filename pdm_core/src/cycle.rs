//! The cooperative control tick.
//!
//! One [`Controller`] value owns the configuration and every component;
//! adapters are borrowed per tick. Step order is fixed: CAN frames →
//! buttons → temperature → liveness → per-channel fuse + switch write →
//! LED emission → telemetry. Inputs therefore apply before fuses and
//! fuses before switch writes, so a fault discovered on tick `N` is
//! visible at the outputs on tick `N`.

use pdm_common::config::PdmConfig;
use pdm_common::frame::{backlight_setting, heartbeat_enable, nmt_start, TelemetrySample};
use pdm_common::types::{ChannelFaults, LedState, CHANNEL_COUNT};
use tracing::{info, trace, warn};

use crate::adapters::{CanBus, Hardware};
use crate::fuse::{self, FuseVerdict, FuseWindow};
use crate::indicator::{led_for, LedEmitter, TelemetryEmitter};
use crate::input::arbiter::FrameDisposition;
use crate::input::InputArbiter;
use crate::liveness::{LivenessEvent, LivenessSupervisor};
use crate::state::ChannelBank;
use crate::thermal::TemperatureSupervisor;

// ─── Tick statistics ────────────────────────────────────────────────

/// O(1) per-tick timing statistics, recorded by the loop runner.
#[derive(Debug, Clone)]
pub struct TickStats {
    pub tick_count: u64,
    pub last_tick_us: u64,
    pub min_tick_us: u64,
    pub max_tick_us: u64,
    pub sum_tick_us: u64,
}

impl Default for TickStats {
    fn default() -> Self {
        Self {
            tick_count: 0,
            last_tick_us: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            sum_tick_us: 0,
        }
    }
}

impl TickStats {
    /// Record one tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_us: u64) {
        self.tick_count += 1;
        self.last_tick_us = duration_us;
        if duration_us < self.min_tick_us {
            self.min_tick_us = duration_us;
        }
        if duration_us > self.max_tick_us {
            self.max_tick_us = duration_us;
        }
        self.sum_tick_us += duration_us;
    }

    /// Average tick duration [µs] (0 before the first tick).
    #[inline]
    pub fn avg_tick_us(&self) -> u64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_us / self.tick_count
        }
    }
}

// ─── Keypad init sequencer ──────────────────────────────────────────

/// Minimum spacing between keypad bring-up frames [ms].
pub const INIT_GAP_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitStage {
    Idle,
    NmtStart,
    Backlight,
    HeartbeatEnable,
}

/// Non-blocking keypad bring-up: NMT start → backlight → heartbeat
/// enable, one frame per step with the mandated gap. Runs at boot and
/// again whenever the keypad announces a boot-up.
#[derive(Debug)]
pub struct KeypadInitSequencer {
    stage: InitStage,
    last_sent_ms: u64,
}

impl Default for KeypadInitSequencer {
    fn default() -> Self {
        Self {
            stage: InitStage::Idle,
            last_sent_ms: 0,
        }
    }
}

impl KeypadInitSequencer {
    /// (Re-)start the sequence; the first frame goes out on the next step.
    pub fn restart(&mut self) {
        self.stage = InitStage::NmtStart;
    }

    /// True while frames remain to be sent.
    pub fn in_progress(&self) -> bool {
        self.stage != InitStage::Idle
    }

    /// Emit the next pending frame if its gap has elapsed.
    pub fn step(&mut self, keypad_node_id: u8, now_ms: u64, can: &mut dyn CanBus) {
        let (frame, next) = match self.stage {
            InitStage::Idle => return,
            InitStage::NmtStart => (nmt_start(keypad_node_id), InitStage::Backlight),
            InitStage::Backlight => {
                if now_ms.saturating_sub(self.last_sent_ms) < INIT_GAP_MS {
                    return;
                }
                (backlight_setting(keypad_node_id), InitStage::HeartbeatEnable)
            }
            InitStage::HeartbeatEnable => {
                if now_ms.saturating_sub(self.last_sent_ms) < INIT_GAP_MS {
                    return;
                }
                (heartbeat_enable(keypad_node_id), InitStage::Idle)
            }
        };
        can.send(&frame);
        self.stage = next;
        self.last_sent_ms = now_ms;
    }
}

// ─── Controller ─────────────────────────────────────────────────────

/// Top-level control state: configuration plus every component, driven
/// by [`Controller::tick`].
#[derive(Debug)]
pub struct Controller {
    pub config: PdmConfig,
    pub bank: ChannelBank,
    pub arbiter: InputArbiter,
    pub thermal: TemperatureSupervisor,
    pub liveness: LivenessSupervisor,
    pub leds: LedEmitter,
    pub telemetry: TelemetryEmitter,
    pub stats: TickStats,
    init_seq: KeypadInitSequencer,
    last_tick_ms: Option<u64>,
    last_currents_a: [f32; CHANNEL_COUNT],
    last_battery_v: f32,
    last_temp_volts: f32,
    log_verbosity: u8,
}

impl Controller {
    pub fn new(config: PdmConfig) -> Self {
        Self {
            config,
            bank: ChannelBank::new(),
            arbiter: InputArbiter::new(),
            thermal: TemperatureSupervisor::new(),
            liveness: LivenessSupervisor::new(),
            leds: LedEmitter::new(),
            telemetry: TelemetryEmitter::new(),
            stats: TickStats::default(),
            init_seq: KeypadInitSequencer::default(),
            last_tick_ms: None,
            last_currents_a: [0.0; CHANNEL_COUNT],
            last_battery_v: 0.0,
            last_temp_volts: 0.0,
            log_verbosity: 0,
        }
    }

    /// One-time bring-up: bus bit rate and the keypad init sequence.
    pub fn startup(&mut self, can: &mut dyn CanBus) {
        can.set_bitrate(self.config.can_kbps);
        info!(kbps = self.config.can_kbps, "CAN bus configured");
        self.init_seq.restart();
    }

    /// Channel currents sampled on the last tick [A].
    pub fn last_currents_a(&self) -> [f32; CHANNEL_COUNT] {
        self.last_currents_a
    }

    /// Battery voltage sampled on the last tick [V].
    pub fn last_battery_v(&self) -> f32 {
        self.last_battery_v
    }

    /// Raw temperature sensor voltage sampled on the last tick [V].
    pub fn last_temp_volts(&self) -> f32 {
        self.last_temp_volts
    }

    /// CLI-selected log verbosity (0..=2); the binary maps it onto the
    /// subscriber's level filter.
    pub fn log_verbosity(&self) -> u8 {
        self.log_verbosity
    }

    pub fn set_log_verbosity(&mut self, level: u8) {
        self.log_verbosity = level.min(2);
    }

    /// Run one cooperative control tick.
    pub fn tick(&mut self, hw: &mut dyn Hardware, can: &mut dyn CanBus, now_ms: u64) {
        let dt_s = match self.last_tick_ms {
            Some(prev) => now_ms.saturating_sub(prev) as f32 / 1000.0,
            None => 0.0,
        };
        self.last_tick_ms = Some(now_ms);

        // Keypad bring-up frames, paced without blocking.
        self.init_seq.step(self.config.keypad_node_id, now_ms, can);

        // 1. CAN frames, in arrival order.
        while let Some(frame) = can.recv() {
            trace!(id = format_args!("0x{:03X}", frame.id), len = frame.len, "CAN rx");
            match self.arbiter.handle_frame(&frame, &self.config, &mut self.bank, now_ms) {
                FrameDisposition::Digout => self.liveness.digout_frame_seen(now_ms),
                FrameDisposition::KeypadHeartbeat => self.liveness.heartbeat_seen(now_ms),
                FrameDisposition::KeypadBootUp => {
                    info!("keypad boot-up, re-running init sequence");
                    self.init_seq.restart();
                }
                FrameDisposition::KeypadButtons | FrameDisposition::Ignored => {}
            }
        }
        self.arbiter.poll_keypad_holds(&self.config, &mut self.bank, now_ms);

        // 2. Local buttons.
        let mask = hw.button_mask();
        self.arbiter.poll_buttons(mask, &self.config, &mut self.bank, now_ms);

        // 3. Temperature supervision.
        self.last_temp_volts = hw.temperature_volts();
        let verdict = self.thermal.step(
            self.last_temp_volts,
            now_ms,
            self.config.temp_warn_c,
            self.config.temp_trip_c,
        );
        if verdict.trip {
            for ch in 0..CHANNEL_COUNT {
                self.bank.channels[ch].active = false;
                self.bank.channels[ch].faults |= ChannelFaults::THERMAL;
            }
        }

        // 4. Link liveness.
        if let Some(ev) = self.liveness.step(self.arbiter.last_input_mode(), now_ms) {
            for ch in 0..CHANNEL_COUNT {
                self.bank.set_channel(ch, false, now_ms);
            }
            if ev == LivenessEvent::DigoutLost {
                self.arbiter.reset_digout_levels();
            }
        }

        // 5. Fuse pass and switch writes.
        let mut leds = [LedState::Off; CHANNEL_COUNT];
        for ch in 0..CHANNEL_COUNT {
            let current = hw.channel_current_a(ch);
            self.last_currents_a[ch] = current.max(0.0);
            if self.bank.channels[ch].active {
                match fuse::step_channel(
                    &mut self.bank.channels[ch],
                    &self.config.channels[ch],
                    current,
                    now_ms,
                    dt_s,
                ) {
                    FuseVerdict::Pass => {}
                    FuseVerdict::Blown(window) => {
                        warn!(ch = ch + 1, ?window, "fuse blown, shutting down group");
                        let group = self.config.channels[ch].group;
                        self.bank
                            .shutdown_group(&self.config, group, ChannelFaults::OVERCURRENT);
                        if window == FuseWindow::SteadyState {
                            self.arbiter.request_button_timing_reset(ch);
                        }
                        self.arbiter.lock_digout_on_fault(&self.bank);
                    }
                }
            } else {
                self.bank.channels[ch].warn_undercurrent = false;
            }
            hw.set_switch(ch, self.bank.channels[ch].active);
        }

        // 6. LED states, derived after the fuse pass.
        for ch in 0..CHANNEL_COUNT {
            let led = led_for(
                &self.bank.channels[ch],
                &self.config.channels[ch],
                self.last_currents_a[ch],
            );
            self.bank.channels[ch].led = led;
            leds[ch] = led;
        }
        self.leds
            .step(&leds, self.config.keypad_node_id, now_ms, can);

        // 7. Telemetry.
        self.last_battery_v = hw.battery_volts();
        let sample = TelemetrySample {
            currents_a: self.last_currents_a,
            temperature_c: self.thermal.filtered_c(),
            undercurrent: std::array::from_fn(|ch| self.bank.channels[ch].warn_undercurrent),
            faults: std::array::from_fn(|ch| self.bank.channels[ch].faults),
            battery_v: self.last_battery_v,
        };
        self.telemetry
            .step(self.config.pdm_node_id, &sample, now_ms, can);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
