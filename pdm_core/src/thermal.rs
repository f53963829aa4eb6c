//! Board temperature supervision: TMP235 conversion, range gating, a
//! slew-limited filter, and bad-reading hysteresis feeding the warn and
//! trip decisions.
//!
//! The filter persists across ticks and re-initialises on the first
//! valid reading. A single wild sample cannot trip the module: the
//! filtered value moves at most 10 °C/s, and a sensor is declared
//! failed only after three consecutive out-of-range readings.

use tracing::{debug, warn};

/// Plausible TMP235 output range [V].
pub const SENSOR_VOLTS_MIN: f32 = 0.05;
pub const SENSOR_VOLTS_MAX: f32 = 2.1;

/// Plausible temperature range [°C].
pub const TEMP_MIN_C: f32 = -40.0;
pub const TEMP_MAX_C: f32 = 150.0;

/// Filter slew limit [°C/s].
pub const MAX_SLEW_C_PER_S: f32 = 10.0;

/// Minimum spacing between filter updates [ms].
pub const MIN_UPDATE_SPACING_MS: u64 = 100;

/// Consecutive bad readings before `sensor_error` is raised.
pub const MAX_BAD_READINGS: u8 = 3;

/// TMP235 transfer function: 500 mV offset at 0 °C, 10 mV/°C.
#[inline]
pub fn celsius_from_tmp235(volts: f32) -> f32 {
    (volts - 0.5) / 0.01
}

/// Per-tick decision handed to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThermalVerdict {
    /// Shut down every channel with a latched thermal fault.
    pub trip: bool,
    /// Temperature is in the warning band.
    pub warn: bool,
}

/// Slew-limited temperature filter with bad-reading hysteresis.
#[derive(Debug)]
pub struct TemperatureSupervisor {
    filtered_c: f32,
    last_update_ms: u64,
    bad_count: u8,
    initialized: bool,
    sensor_error: bool,
    warn_active: bool,
}

impl Default for TemperatureSupervisor {
    fn default() -> Self {
        Self {
            // Safe placeholder until the first valid reading.
            filtered_c: 25.0,
            last_update_ms: 0,
            bad_count: 0,
            initialized: false,
            sensor_error: false,
            warn_active: false,
        }
    }
}

impl TemperatureSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filtered board temperature [°C]; the placeholder value until the
    /// first valid reading.
    #[inline]
    pub fn filtered_c(&self) -> f32 {
        self.filtered_c
    }

    #[inline]
    pub fn sensor_error(&self) -> bool {
        self.sensor_error
    }

    #[inline]
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Ingest one sensor sample and produce the warn/trip verdict.
    pub fn step(&mut self, sensor_volts: f32, now_ms: u64, warn_c: f32, trip_c: f32) -> ThermalVerdict {
        let raw_c = celsius_from_tmp235(sensor_volts);
        let valid = sensor_volts > SENSOR_VOLTS_MIN
            && sensor_volts < SENSOR_VOLTS_MAX
            && (TEMP_MIN_C..=TEMP_MAX_C).contains(&raw_c);

        if !self.initialized {
            if valid {
                self.filtered_c = raw_c;
                self.initialized = true;
                self.last_update_ms = now_ms;
                self.bad_count = 0;
                self.sensor_error = false;
                debug!(temperature_c = raw_c, "temperature sensor initialized");
            } else {
                self.record_bad(sensor_volts, raw_c);
            }
            return self.verdict(warn_c, trip_c);
        }

        let dt_ms = now_ms.saturating_sub(self.last_update_ms);
        if dt_ms >= MIN_UPDATE_SPACING_MS {
            if valid {
                let max_change = MAX_SLEW_C_PER_S * dt_ms as f32 / 1000.0;
                let diff = raw_c - self.filtered_c;
                if diff.abs() > max_change {
                    self.filtered_c += max_change.copysign(diff);
                    debug!(
                        raw_c,
                        filtered_c = self.filtered_c,
                        "temperature change slew-limited"
                    );
                } else {
                    self.filtered_c = raw_c;
                }
                self.bad_count = 0;
                self.sensor_error = false;
            } else {
                self.record_bad(sensor_volts, raw_c);
            }
            self.last_update_ms = now_ms;
        }

        self.verdict(warn_c, trip_c)
    }

    fn record_bad(&mut self, volts: f32, raw_c: f32) {
        self.bad_count = self.bad_count.saturating_add(1);
        debug!(volts, raw_c, count = self.bad_count, "bad temperature reading");
        if self.bad_count >= MAX_BAD_READINGS && !self.sensor_error {
            self.sensor_error = true;
            warn!("temperature sensor failed: too many bad readings");
        }
    }

    fn verdict(&mut self, warn_c: f32, trip_c: f32) -> ThermalVerdict {
        let trip = self.sensor_error || (self.initialized && self.filtered_c >= trip_c);
        let warn = !trip && self.initialized && self.filtered_c >= warn_c;
        if warn && !self.warn_active {
            warn!(temperature_c = self.filtered_c, "board temperature in warning band");
        }
        self.warn_active = warn;
        ThermalVerdict { trip, warn }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
