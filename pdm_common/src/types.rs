//! Core enums and flags shared across the PDM control core.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Number of high-side output channels on the board.
pub const CHANNEL_COUNT: usize = 4;

/// Highest valid group identifier (groups are `1..=MAX_GROUP`).
pub const MAX_GROUP: u8 = 4;

/// How a channel responds to its input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Short press toggles the channel; long press clears faults.
    Latch,
    /// Channel is ON only while the input is asserted.
    Momentary,
}

impl OutputMode {
    /// Persisted byte value.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Latch => 0,
            Self::Momentary => 1,
        }
    }

    /// Decode a persisted byte; unknown values fall back to `Latch`.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Momentary,
            _ => Self::Latch,
        }
    }
}

/// The input surface that most recently commanded a channel.
///
/// Mutated only by the input arbiter on an actual input event; the
/// liveness supervisor scopes its watchdogs to this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// No input received since boot.
    #[default]
    None,
    /// Local push-buttons.
    Digital,
    /// CAN keypad button PDO.
    CanKeypad,
    /// Remote CAN digital-output frame.
    CanDigout,
}

/// Per-channel indicator state, derived after each fuse pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedState {
    #[default]
    Off,
    Green,
    Blue,
    Amber,
    Red,
    RedFlash,
}

bitflags! {
    /// Latched per-channel fault flags.
    ///
    /// Any set flag forces the channel inactive until an explicit clear
    /// (long press or DIGOUT falling edge).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelFaults: u8 {
        /// Inrush or steady-state fuse trip.
        const OVERCURRENT = 0x01;
        /// Board over-temperature or temperature sensor failure.
        const THERMAL     = 0x02;
    }
}
