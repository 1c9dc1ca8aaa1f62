//! Scale curve sampling over a tick window.
//!
//! Malformed configuration is clamped, never reported: a window below one tick is
//! treated as one tick, and non-finite handles fall back to straight-line handles.

use crate::composition::model::{ScaleHelperConfig, ScaleKind};

/// Bisection steps used when solving `x(t) = tick`.
pub const DEFAULT_BEZIER_ITERATIONS: u32 = 32;
/// Fewer steps than this cannot resolve a tick within a 1e-7 window fraction.
pub const MIN_BEZIER_ITERATIONS: u32 = 24;

/// Effective window length.
pub fn effective_window(w: f64) -> f64 {
    if w.is_finite() && w >= 1.0 { w } else { 1.0 }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

/// Bezier control points `(p0, p1, p2, p3)` as `[x, y]`, after clamping.
pub fn control_points(config: &ScaleHelperConfig, w: f64) -> [[f64; 2]; 4] {
    let w = effective_window(w);
    let min = finite_or(config.min, 1.0);
    let max = finite_or(config.max, 1.0);
    let handle = |h: [f64; 2], frac: f64| -> [f64; 2] {
        if !h[0].is_finite() || !h[1].is_finite() {
            return [w * frac, min + (max - min) * frac];
        }
        let x = if h[0].abs() <= 1.0 { h[0] * w } else { h[0] };
        [x.clamp(0.0, w), h[1]]
    };
    [
        [0.0, min],
        handle(config.handle1, 1.0 / 3.0),
        handle(config.handle2, 2.0 / 3.0),
        [w, max],
    ]
}

fn cubic(a0: f64, a1: f64, a2: f64, a3: f64, t: f64) -> f64 {
    let omt = 1.0 - t;
    omt * omt * omt * a0 + 3.0 * omt * omt * t * a1 + 3.0 * omt * t * t * a2 + t * t * t * a3
}

/// Sample the scale at `tick` with the default bisection depth.
pub fn sample(config: &ScaleHelperConfig, tick: f64, tick_window_max: f64) -> f64 {
    sample_with(config, tick, tick_window_max, DEFAULT_BEZIER_ITERATIONS)
}

pub fn sample_with(
    config: &ScaleHelperConfig,
    tick: f64,
    tick_window_max: f64,
    iterations: u32,
) -> f64 {
    let w = effective_window(tick_window_max);
    let min = finite_or(config.min, 1.0);
    let max = finite_or(config.max, 1.0);
    let tick = finite_or(tick, 0.0);
    match config.kind {
        ScaleKind::None => 1.0,
        ScaleKind::Linear => min + (max - min) * (tick / w).clamp(0.0, 1.0),
        ScaleKind::Bezier => {
            // Endpoints are exact; no bisection at the boundaries.
            if tick <= 0.0 {
                return min;
            }
            if tick >= w {
                return max;
            }
            let [p0, p1, p2, p3] = control_points(config, w);
            let mut lo = 0.0_f64;
            let mut hi = 1.0_f64;
            for _ in 0..iterations.max(MIN_BEZIER_ITERATIONS) {
                let mid = 0.5 * (lo + hi);
                if cubic(p0[0], p1[0], p2[0], p3[0], mid) < tick {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let t = 0.5 * (lo + hi);
            cubic(p0[1], p1[1], p2[1], p3[1], t)
        }
    }
}

/// Fraction of the fade elapsed, in `[0, 1]`. A zero-length fade is complete at once.
pub fn fade_fraction(fade_elapsed: f64, fade_duration: f64) -> f64 {
    if !(fade_duration > 0.0) {
        return 1.0;
    }
    (finite_or(fade_elapsed, 0.0) / fade_duration).clamp(0.0, 1.0)
}

/// Sample while fading with `reverse_on_disable`: the window is walked backward from
/// `start_tick` (the tick reached when the fade began) to 0 over the fade duration.
pub fn sample_fading(
    config: &ScaleHelperConfig,
    start_tick: f64,
    fade_elapsed: f64,
    fade_duration: f64,
    tick_window_max: f64,
) -> f64 {
    sample_fading_with(
        config,
        start_tick,
        fade_elapsed,
        fade_duration,
        tick_window_max,
        DEFAULT_BEZIER_ITERATIONS,
    )
}

pub fn sample_fading_with(
    config: &ScaleHelperConfig,
    start_tick: f64,
    fade_elapsed: f64,
    fade_duration: f64,
    tick_window_max: f64,
    iterations: u32,
) -> f64 {
    let w = effective_window(tick_window_max);
    let start = finite_or(start_tick, 0.0).clamp(0.0, w);
    let p = fade_fraction(fade_elapsed, fade_duration);
    sample_with(config, start * (1.0 - p), w, iterations)
}

#[cfg(test)]
#[path = "../../tests/unit/animation/scale.rs"]
mod tests;
