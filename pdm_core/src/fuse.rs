//! Electronic fusing: two I²t-style integrators per channel.
//!
//! Inside the inrush window (the first `inrush_time_ms` after turn-on,
//! strict `<`) the inrush threshold and integrator apply; afterwards the
//! steady-state pair takes over. Only the active integrator moves on a
//! given tick. The integrand is the squared excess ratio, so large
//! excursions derate hard while brief peaks are tolerated, and dropping
//! back below threshold resets the score to zero (sawtooth, no false
//! trips on bursty loads).

use pdm_common::config::ChannelConfig;
use tracing::debug;

use crate::state::ChannelState;

/// Which integrator was active when a verdict was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseWindow {
    Inrush,
    SteadyState,
}

/// Outcome of one fuse step on an active channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseVerdict {
    Pass,
    /// The fuse blew; the caller shuts down the channel's group. A
    /// steady-state blow additionally requests a button-timing reset so
    /// the held button does not read as an immediate long press.
    Blown(FuseWindow),
}

/// Advance one channel's fuse state by `dt_s` seconds at `current_a`.
///
/// Must only be called while the channel is active. Negative measured
/// current clamps to zero before integration; a zero threshold trips
/// immediately rather than dividing (the channel is disabled for
/// safety). Scores stay non-negative and reset to zero on a blow.
pub fn step_channel(
    state: &mut ChannelState,
    cfg: &ChannelConfig,
    current_a: f32,
    now_ms: u64,
    dt_s: f32,
) -> FuseVerdict {
    let i = current_a.max(0.0);

    state.warn_undercurrent = i < cfg.under_warn_a;

    let window_ms = now_ms.saturating_sub(state.on_since_ms);
    let (window, threshold) = if window_ms < cfg.inrush_time_ms as u64 {
        (FuseWindow::Inrush, cfg.inrush_threshold_a)
    } else {
        (FuseWindow::SteadyState, cfg.oc_threshold_a)
    };

    if threshold <= 0.0 {
        debug!(threshold, ?window, "zero fuse threshold, disabling channel");
        reset_score(state, window);
        return FuseVerdict::Blown(window);
    }

    let score = match window {
        FuseWindow::Inrush => &mut state.inrush_score,
        FuseWindow::SteadyState => &mut state.oc_score,
    };

    if i > threshold {
        let excess = i / threshold - 1.0;
        *score += dt_s * excess * excess;
        if *score >= 1.0 {
            reset_score(state, window);
            return FuseVerdict::Blown(window);
        }
    } else {
        *score = 0.0;
    }
    *score = score.max(0.0);

    FuseVerdict::Pass
}

fn reset_score(state: &mut ChannelState, window: FuseWindow) {
    match window {
        FuseWindow::Inrush => state.inrush_score = 0.0,
        FuseWindow::SteadyState => state.oc_score = 0.0,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
