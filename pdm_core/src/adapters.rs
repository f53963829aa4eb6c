//! Adapter traits at the hardware seam, with the simulation
//! implementations used by the binary's bench mode and the test suite.
//!
//! The tick never acquires or releases hardware; each adapter owns its
//! resource for the life of the process and is borrowed per tick.

use std::path::PathBuf;

use pdm_common::config::StoreError;
use pdm_common::frame::{CanFrame, FrameQueue};
use pdm_common::types::CHANNEL_COUNT;

// ─── Traits ─────────────────────────────────────────────────────────

/// Board-level analog and digital I/O.
pub trait Hardware {
    /// Load current on a channel [A]. Bounded read; may be noisy or
    /// negative, the fuse engine clamps.
    fn channel_current_a(&mut self, ch: usize) -> f32;

    /// Raw temperature sensor voltage [V] (TMP235 output).
    fn temperature_volts(&mut self) -> f32;

    /// Battery voltage [V], already divider-corrected.
    fn battery_volts(&mut self) -> f32;

    /// Debounce-ready push-button mask, bit `ch` = pressed.
    fn button_mask(&mut self) -> u8;

    /// Drive a high-side switch output.
    fn set_switch(&mut self, ch: usize, on: bool);
}

/// Raw CAN frame transport.
pub trait CanBus {
    /// Queue a frame for transmission. Failures are the adapter's to
    /// report; the control loop never blocks on them.
    fn send(&mut self, frame: &CanFrame);

    /// Pop one received frame, if any. Non-blocking.
    fn recv(&mut self) -> Option<CanFrame>;

    /// Reconfigure the bus bit rate [kbps].
    fn set_bitrate(&mut self, kbps: u16);
}

/// Byte-blob persistence for the configuration.
pub trait ConfigStore {
    /// Read the stored blob; `None` when the store is empty.
    fn load(&mut self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the stored blob.
    fn save(&mut self, blob: &[u8]) -> Result<(), StoreError>;
}

// ─── Simulation hardware ────────────────────────────────────────────

/// In-memory hardware model: tests and the bench-mode binary poke the
/// public fields, the core reads them through the trait.
#[derive(Debug)]
pub struct SimHardware {
    pub currents_a: [f32; CHANNEL_COUNT],
    pub temp_volts: f32,
    pub battery_v: f32,
    pub buttons: u8,
    pub switches: [bool; CHANNEL_COUNT],
}

impl Default for SimHardware {
    fn default() -> Self {
        Self {
            currents_a: [0.0; CHANNEL_COUNT],
            // 25 °C on a TMP235: 0.5 V offset + 10 mV/°C.
            temp_volts: 0.75,
            battery_v: 12.0,
            buttons: 0,
            switches: [false; CHANNEL_COUNT],
        }
    }
}

impl Hardware for SimHardware {
    fn channel_current_a(&mut self, ch: usize) -> f32 {
        self.currents_a[ch]
    }

    fn temperature_volts(&mut self) -> f32 {
        self.temp_volts
    }

    fn battery_volts(&mut self) -> f32 {
        self.battery_v
    }

    fn button_mask(&mut self) -> u8 {
        self.buttons
    }

    fn set_switch(&mut self, ch: usize, on: bool) {
        self.switches[ch] = on;
    }
}

// ─── Simulation CAN bus ─────────────────────────────────────────────

/// Loopback CAN bus: received frames come from a bounded queue the test
/// feeds, transmitted frames accumulate for inspection.
#[derive(Debug)]
pub struct SimCanBus {
    rx: FrameQueue,
    pub sent: Vec<CanFrame>,
    pub bitrate_kbps: u16,
}

impl Default for SimCanBus {
    fn default() -> Self {
        Self {
            rx: FrameQueue::new(Self::RX_CAPACITY),
            sent: Vec::new(),
            bitrate_kbps: 1000,
        }
    }
}

impl SimCanBus {
    /// RX queue bound; overflow drops the oldest frame.
    pub const RX_CAPACITY: usize = 32;

    /// Inject a frame as if it arrived from the bus.
    pub fn inject(&mut self, frame: CanFrame) {
        self.rx.push(frame);
    }

    /// Frames lost to RX overflow.
    pub fn rx_dropped(&self) -> u64 {
        self.rx.dropped()
    }

    /// Drain and return everything transmitted so far.
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl CanBus for SimCanBus {
    fn send(&mut self, frame: &CanFrame) {
        self.sent.push(*frame);
    }

    fn recv(&mut self) -> Option<CanFrame> {
        self.rx.pop()
    }

    fn set_bitrate(&mut self, kbps: u16) {
        self.bitrate_kbps = kbps;
    }
}

// ─── Config stores ──────────────────────────────────────────────────

/// Volatile store for tests.
#[derive(Debug, Default)]
pub struct MemStore {
    blob: Option<Vec<u8>>,
}

impl MemStore {
    /// A store pre-seeded with a blob.
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self { blob: Some(blob) }
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }
}

impl ConfigStore for MemStore {
    fn load(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blob.clone())
    }

    fn save(&mut self, blob: &[u8]) -> Result<(), StoreError> {
        self.blob = Some(blob.to_vec());
        Ok(())
    }
}

/// File-backed store used by the binary. A missing file is an empty
/// store, not an error.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileStore {
    fn load(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }

    fn save(&mut self, blob: &[u8]) -> Result<(), StoreError> {
        std::fs::write(&self.path, blob)
            .map_err(|e| StoreError::Io(format!("{}: {e}", self.path.display())))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
