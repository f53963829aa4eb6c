//! Input arbitration: three asynchronous surfaces (local push-buttons,
//! CAN keypad, remote DIGOUT frames) feed edge events through one
//! arbiter that owns the channel-command semantics and the
//! last-active-input tracking.
//!
//! Each surface is a small struct with explicit edge state (`last_*`
//! masks, press timers); none of them touches the channel bank
//! directly. Fault state lives in the bank and is shared: clearing via
//! any surface clears for all.

pub mod arbiter;
pub mod buttons;
pub mod digout;
pub mod keypad;

pub use arbiter::{FrameDisposition, InputArbiter};

/// Hold time that turns a press into a fault-clearing long press [ms].
pub const LONG_PRESS_MS: u64 = 1000;

/// Which press-capable surface produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressSurface {
    /// Local push-buttons.
    Button,
    /// CAN keypad PDO.
    Keypad,
}

/// Edge event from a press-capable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    /// Released → pressed edge.
    Pressed(usize),
    /// Held past [`LONG_PRESS_MS`] and not yet consumed. Emitted every
    /// poll until the arbiter performs the clear (the gate can open
    /// mid-hold when a fault appears) or the button is released.
    LongHold(usize),
    /// Pressed → released edge.
    Released { ch: usize, was_long: bool },
}
