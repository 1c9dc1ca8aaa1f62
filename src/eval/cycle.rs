//! Appear/live/fade cycle and per-card age resolution.

use crate::composition::model::PlaySettings;
use crate::eval::growth::VisibleLimit;

/// Derived timing windows, in ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleConfig {
    pub appear: u64,
    pub live: u64,
    pub fade: u64,
    pub total: u64,
}

impl CycleConfig {
    /// `appear` is the larger of the authored minimum and the inferred growth time.
    pub fn derive(play: &PlaySettings, inferred_appear: u64) -> Self {
        let appear = play.min_appear_ticks.max(inferred_appear);
        let live = play.live_ticks;
        let fade = play.fade_ticks;
        Self {
            appear,
            live,
            fade,
            total: appear.saturating_add(live).saturating_add(fade),
        }
    }

    /// End of the appear + live window.
    pub fn play(&self) -> u64 {
        self.appear.saturating_add(self.live)
    }
}

/// Preview-only enable state of one card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub enabled: bool,
    pub manual_override: bool,
    pub dissolve_start_tick: Option<u64>,
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self {
            enabled: true,
            manual_override: false,
            dissolve_start_tick: None,
        }
    }
}

impl RuntimeStatus {
    /// Force enabled/disabled until [`clear_manual`](Self::clear_manual).
    pub fn set_manual(&mut self, enabled: bool) {
        self.manual_override = true;
        self.set_enabled(enabled);
    }

    pub fn clear_manual(&mut self) {
        self.manual_override = false;
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.dissolve_start_tick = None;
        }
        self.enabled = enabled;
    }
}

/// Smallest tick at which every saturating sequenced level is fully grown.
///
/// `limit_at(level, tick)` reports a level's own limit. Levels that never reach capacity
/// within `probe_ticks` do not constrain the result; 0 when none saturate.
pub fn infer_appear_ticks(
    capacities: &[u64],
    probe_ticks: u64,
    mut limit_at: impl FnMut(usize, u64) -> VisibleLimit,
) -> u64 {
    let mut appear = 0;
    for (level, &capacity) in capacities.iter().enumerate() {
        let saturated =
            (0..=probe_ticks).find(|&t| limit_at(level, t).resolve(capacity) >= capacity);
        if let Some(t) = saturated {
            appear = appear.max(t);
        }
    }
    appear
}

/// Card age at `elapsed`.
///
/// Enabled cards loop over the cycle. A disabled card freezes the tick the disable was
/// first seen and advances through the fade tail from the end of the play window.
pub fn resolve_age(elapsed: u64, status: &mut RuntimeStatus, cycle: &CycleConfig) -> u64 {
    if status.enabled {
        return if cycle.total == 0 {
            0
        } else {
            elapsed % cycle.total
        };
    }
    let start = *status.dissolve_start_tick.get_or_insert(elapsed);
    cycle.play().saturating_add(elapsed.saturating_sub(start))
}

/// Toggle `enabled` from the cycle position unless a manual override is set.
pub fn sync_status(elapsed: u64, status: &mut RuntimeStatus, cycle: &CycleConfig) {
    if status.manual_override {
        return;
    }
    let pos = if cycle.total == 0 {
        0
    } else {
        elapsed % cycle.total
    };
    let enabled = pos < cycle.play();
    if enabled != status.enabled {
        tracing::trace!(elapsed, enabled, "cycle status change");
    }
    status.set_enabled(enabled);
}

/// Progress through the fade tail, in `[0, 1]`.
pub fn fade_progress(age: u64, cycle: &CycleConfig) -> f64 {
    let play = cycle.play();
    if age < play {
        return 0.0;
    }
    if cycle.fade == 0 {
        return 1.0;
    }
    ((age - play) as f64 / cycle.fade as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "../../tests/unit/eval/cycle.rs"]
mod tests;
