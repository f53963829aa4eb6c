//! # PDM Control Core
//!
//! The power-control loop of a four-channel Power Distribution Module:
//! three asynchronous input surfaces (local buttons, CAN keypad, remote
//! DIGOUT frames) fused into per-channel commands, dual I²t-style fuse
//! integrators per channel, latched fault management with group
//! propagation, temperature and link-liveness supervision, and LED plus
//! telemetry emission, all driven by one cooperative tick.
//!
//! ## Architecture
//!
//! A single [`cycle::Controller`] value owns every component; adapters
//! (hardware, CAN bus, config store) are borrowed per tick through the
//! traits in [`adapters`]. Within a tick, inputs apply before fuses and
//! fuses before switch writes, so a fault discovered on tick `N` is
//! visible at the outputs on tick `N`. No step blocks on I/O and
//! nothing propagates out of the tick: at worst the module settles into
//! an all-outputs-off, fault-indicating state.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod cycle;
pub mod fuse;
pub mod indicator;
pub mod input;
pub mod liveness;
pub mod state;
pub mod thermal;
