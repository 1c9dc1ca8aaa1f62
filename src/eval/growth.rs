//! Growth/visibility prediction.
//!
//! Rule-based growth (`GrowthAnimate`) is a pure function of the current tick. Script-based
//! growth is stateful: the visible counter after tick `T` depends on every tick before it,
//! so counters are memoized as prefix tables and only the missing ticks are simulated.

use crate::composition::model::{GrowthAnimate, LevelKind};
use crate::eval::scope::Scope;
use crate::expression::{Effects, ScriptCache, script_has_growth_call};
use crate::foundation::diagnostics::{Diagnostics, SourceLocation};
use crate::foundation::math::StableHasher;
use std::collections::HashMap;

/// How many elements of a level may be visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibleLimit {
    /// No growth constraint: everything is visible.
    Unbounded,
    Count(u64),
}

impl VisibleLimit {
    /// Concrete count for a level with `capacity` elements.
    pub fn resolve(self, capacity: u64) -> u64 {
        match self {
            Self::Unbounded => capacity,
            Self::Count(n) => n.min(capacity),
        }
    }

    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unbounded, x) | (x, Self::Unbounded) => x,
            (Self::Count(a), Self::Count(b)) => Self::Count(a.min(b)),
        }
    }

    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unbounded, _) | (_, Self::Unbounded) => Self::Unbounded,
            (Self::Count(a), Self::Count(b)) => Self::Count(a.max(b)),
        }
    }
}

/// Rule-based source: sum of counts whose condition holds now. A failing condition
/// counts as false.
pub fn compute_animate_visible_count(
    animates: &[GrowthAnimate],
    scope: &mut Scope,
    scripts: &mut ScriptCache,
    sink: &mut Diagnostics,
    location: &SourceLocation,
) -> u64 {
    let mut total = 0u64;
    for (i, a) in animates.iter().enumerate() {
        let loc = location.child(&format!("[{i}]")).child("condition");
        if scripts.bool_or(&a.condition, scope, false, sink, &loc) {
            total = total.saturating_add(u64::from(a.count));
        }
    }
    total
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PrefixKey {
    capacity: u64,
    scope_signature: u64,
    script_signature: u64,
}

/// Visible counters per simulated tick for one key.
#[derive(Debug, Default)]
struct PrefixTable {
    /// `counts[t]` is the counter after tick `t` ran.
    counts: Vec<u64>,
}

/// Memo of script-driven growth counters.
#[derive(Debug, Default)]
pub struct GrowthPrefixCache {
    tables: HashMap<PrefixKey, PrefixTable>,
    simulated_ticks: u64,
}

impl GrowthPrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.simulated_ticks = 0;
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total ticks simulated since creation or the last [`clear`](Self::clear).
    pub fn simulated_ticks(&self) -> u64 {
        self.simulated_ticks
    }
}

/// Signature of an ordered list of growth scripts.
pub fn script_signature(scripts: &[String]) -> u64 {
    let mut h = StableHasher::new();
    h.write_u64(scripts.len() as u64);
    for s in scripts {
        h.write_str(s);
    }
    h.finish()
}

/// Script-based source.
///
/// `scope_at(tick)` must build a fresh scope for the element at `tick`, with the
/// globals of that tick. Scopes for the same element must share one signature, so
/// globals that vary over time have to be keyed by their definitions (see
/// [`ScopeBuilder::with_globals_key`](crate::eval::scope::ScopeBuilder::with_globals_key)).
#[allow(clippy::too_many_arguments)]
pub fn compute_expression_visible_count(
    cache: &mut GrowthPrefixCache,
    sources: &[String],
    capacity: u64,
    age: u64,
    mut scope_at: impl FnMut(u64) -> Scope,
    scripts: &mut ScriptCache,
    sink: &mut Diagnostics,
    location: &SourceLocation,
) -> VisibleLimit {
    let engaged = sources.iter().any(|s| match &*scripts.parsed(s) {
        Ok(script) => script_has_growth_call(script),
        Err(_) => false,
    });
    if !engaged {
        return VisibleLimit::Unbounded;
    }
    if capacity == 0 {
        return VisibleLimit::Count(0);
    }

    let key = PrefixKey {
        capacity,
        scope_signature: scope_at(0).signature(),
        script_signature: script_signature(sources),
    };
    let table = cache.tables.entry(key).or_default();
    if let Some(&last) = table.counts.last()
        && (last >= capacity || (age as usize) < table.counts.len())
    {
        tracing::trace!(age, "growth prefix hit");
        let idx = (age as usize).min(table.counts.len() - 1);
        return VisibleLimit::Count(table.counts[idx]);
    }

    let start = table.counts.len() as u64;
    tracing::debug!(from = start, to = age, capacity, "growth prefix extend");
    let mut counter = table.counts.last().copied().unwrap_or(0);
    for tick in start..=age {
        for (i, src) in sources.iter().enumerate() {
            let mut scope = scope_at(tick);
            let mut effects = Effects::default();
            match scripts.run(src, &mut scope, None, &mut effects) {
                Ok(_) => counter = counter.saturating_add(effects.growth_signals),
                Err(e) => sink.warn(
                    location.child(&format!("[{i}]")).with_offset(e.offset()),
                    e.to_string(),
                ),
            }
        }
        counter = counter.min(capacity);
        table.counts.push(counter);
        cache.simulated_ticks += 1;
        if counter >= capacity {
            break;
        }
    }
    VisibleLimit::Count(counter)
}

/// Limit from a level's own sources.
///
/// Either source may reveal elements, so the larger wins. A sequenced level with no
/// source shows nothing; other kinds without a source are unconstrained.
pub fn own_limit(
    kind: LevelKind,
    animate: Option<u64>,
    script: Option<VisibleLimit>,
) -> VisibleLimit {
    match (animate.map(VisibleLimit::Count), script) {
        (Some(a), Some(s)) => a.max(s),
        (Some(x), None) | (None, Some(x)) => x,
        (None, None) if kind.is_sequenced() => VisibleLimit::Count(0),
        (None, None) => VisibleLimit::Unbounded,
    }
}

/// Capacity and own limit of one level in a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelGrowth {
    pub capacity: u64,
    pub own: VisibleLimit,
}

/// Effective limits for a chain of levels, outermost first.
///
/// Level `k`'s limit is the minimum of its own limit and each ancestor's effective limit
/// scaled into level `k`'s index space. An ancestor at full capacity imposes nothing.
pub fn compose_level_limits(levels: &[LevelGrowth]) -> Vec<VisibleLimit> {
    let mut out: Vec<VisibleLimit> = Vec::with_capacity(levels.len());
    for (k, level) in levels.iter().enumerate() {
        let mut eff = match level.own {
            VisibleLimit::Unbounded => VisibleLimit::Unbounded,
            VisibleLimit::Count(n) => VisibleLimit::Count(n.min(level.capacity)),
        };
        for (a, ancestor) in levels[..k].iter().enumerate() {
            let scaled = match out[a] {
                VisibleLimit::Unbounded => VisibleLimit::Unbounded,
                VisibleLimit::Count(n) if n >= ancestor.capacity => VisibleLimit::Unbounded,
                VisibleLimit::Count(n) => {
                    let v = u128::from(n) * u128::from(level.capacity)
                        / u128::from(ancestor.capacity.max(1));
                    VisibleLimit::Count(u64::try_from(v).unwrap_or(u64::MAX))
                }
            };
            eff = eff.min(scaled);
        }
        out.push(eff);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/eval/growth.rs"]
mod tests;
