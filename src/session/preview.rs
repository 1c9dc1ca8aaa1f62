use crate::animation::scale::{sample_fading_with, sample_with};
use crate::composition::model::{Card, DisplayAction, Document, ScaleKind, ShapeLevel};
use crate::eval::cycle::{
    CycleConfig, RuntimeStatus, fade_progress, infer_appear_ticks, resolve_age, sync_status,
};
use crate::eval::globals::GlobalsTimeline;
use crate::eval::growth::{
    GrowthPrefixCache, LevelGrowth, VisibleLimit, compose_level_limits,
    compute_animate_visible_count, compute_expression_visible_count, own_limit,
};
use crate::eval::scope::{DepthFrame, Scope, ScopeBuilder, ScopeRequest};
use crate::expression::validate::CONTROLLER_LOCALS;
use crate::expression::value::Value;
use crate::expression::{ActionState, Effects, ScriptCache};
use crate::foundation::core::{DEFAULT_AXIS, Rgba, Vec3, rgba_from};
use crate::foundation::diagnostics::{Diagnostic, Diagnostics, SourceLocation};
use crate::foundation::error::{ComposerError, ComposerResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Engine tuning shared by preview and appear-time inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOpts {
    /// Upper bound on fixed-point passes when resolving globals.
    pub max_global_passes: usize,
    /// How far ahead growth sources are probed when inferring the appear window.
    pub growth_probe_ticks: u64,
    /// Bisection steps for bezier scale curves (at least 24 are always used).
    pub bezier_iterations: u32,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            max_global_passes: 8,
            growth_probe_ticks: 4096,
            bezier_iterations: 32,
        }
    }
}

/// Slice of a [`PreviewFrame`] belonging to one card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardRange {
    pub card_id: String,
    pub start: usize,
    pub len: usize,
}

/// Flat per-element output of one simulated tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PreviewFrame {
    pub tick: u64,
    pub positions: Vec<[f64; 3]>,
    pub colors: Vec<Rgba>,
    pub sizes: Vec<f64>,
    pub visible: Vec<bool>,
    pub card_ranges: Vec<CardRange>,
}

impl PreviewFrame {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }

    /// Visible elements of the card with `card_id`, if it is part of the frame.
    pub fn card_visible_count(&self, card_id: &str) -> Option<usize> {
        let r = self.card_ranges.iter().find(|r| r.card_id == card_id)?;
        Some(
            self.visible[r.start..r.start + r.len]
                .iter()
                .filter(|v| **v)
                .count(),
        )
    }
}

/// One leaf element: binding anchor plus an index per level.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ElementPath {
    anchor: usize,
    indices: SmallVec<[usize; 4]>,
}

/// Preview-only state of one card. Rebuilt whenever the card's signature changes.
struct CardRuntime {
    signature: u64,
    fault: Option<String>,
    status: RuntimeStatus,
    cycle: Option<CycleConfig>,
    scripts: ScriptCache,
    growth: GrowthPrefixCache,
    elements: Vec<ElementPath>,
}

impl CardRuntime {
    fn new(doc: &Document, index: usize, sink: &mut Diagnostics) -> Self {
        let card = &doc.cards[index];
        let fault = match doc.validate_card(index) {
            Ok(()) => None,
            Err(e) => {
                sink.fatal(card_location(index), e.to_string());
                Some(e.to_string())
            }
        };
        let elements = if fault.is_some() {
            Vec::new()
        } else {
            enumerate_elements(card)
        };
        Self {
            signature: card.signature(),
            fault,
            status: RuntimeStatus::default(),
            cycle: None,
            scripts: ScriptCache::new(),
            growth: GrowthPrefixCache::new(),
            elements,
        }
    }

    fn invalidate(&mut self) {
        self.status = RuntimeStatus::default();
        self.cycle = None;
        self.scripts.clear();
        self.growth.clear();
    }
}

fn card_location(index: usize) -> SourceLocation {
    SourceLocation::new(format!("cards[{index}]"))
}

fn level_location(card: &SourceLocation, depth: usize) -> SourceLocation {
    if depth == 0 {
        card.child("shape")
    } else {
        card.child(&format!("nested[{}]", depth - 1))
    }
}

fn enumerate_elements(card: &Card) -> Vec<ElementPath> {
    let levels = card.levels();
    let mut out = Vec::new();
    for anchor in 0..card.binding.anchors().len() {
        let mut stack: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new()];
        for level in &levels {
            let cap = level.capacity() as usize;
            stack = stack
                .into_iter()
                .flat_map(|prefix| {
                    (0..cap).map(move |i| {
                        let mut p = prefix.clone();
                        p.push(i);
                        p
                    })
                })
                .collect();
        }
        out.extend(stack.into_iter().map(|indices| ElementPath { anchor, indices }));
    }
    out
}

fn frames_for(levels: &[&ShapeLevel], indices: &[usize]) -> SmallVec<[DepthFrame; 4]> {
    levels
        .iter()
        .zip(indices)
        .map(|(level, &i)| DepthFrame {
            rel: level.offset(i),
            order: level.kind.is_sequenced().then_some(i as u64),
        })
        .collect()
}

/// Per-tick inputs shared by every element of a card.
struct TickEnv<'a> {
    builder: &'a ScopeBuilder,
    elapsed: u64,
    age: u64,
    opts: &'a EngineOpts,
}

/// Own growth limit of level `depth` for the children of the element at `prefix`.
#[allow(clippy::too_many_arguments)]
fn level_own_limit(
    levels: &[&ShapeLevel],
    depth: usize,
    anchor: usize,
    prefix: &[usize],
    age: u64,
    elapsed: u64,
    globals: &mut GlobalsTimeline,
    rt: &mut CardRuntime,
    sink: &mut Diagnostics,
    loc: &SourceLocation,
) -> VisibleLimit {
    let level = levels[depth];
    let frames = frames_for(levels, prefix);
    let request = |elapsed_ticks: u64, age_ticks: u64| ScopeRequest {
        elapsed_ticks,
        age_ticks,
        depth,
        shape_index: None,
        point_index: anchor as u64,
        frames: &frames,
    };
    let growth_loc = loc.child("growth");
    let animate = (!level.growth.animates.is_empty()).then(|| {
        compute_animate_visible_count(
            &level.growth.animates,
            &mut globals.builder_at(elapsed).build(&request(elapsed, age)),
            &mut rt.scripts,
            sink,
            &growth_loc.child("animates"),
        )
    });
    let script = (!level.growth.scripts.is_empty()).then(|| {
        compute_expression_visible_count(
            &mut rt.growth,
            &level.growth.scripts,
            level.capacity(),
            age,
            |t| globals.builder_at(t).build(&request(t, t)),
            &mut rt.scripts,
            sink,
            &growth_loc.child("scripts"),
        )
    });
    own_limit(level.kind, animate, script)
}

fn infer_cycle(
    card: &Card,
    globals: &mut GlobalsTimeline,
    rt: &mut CardRuntime,
    opts: &EngineOpts,
    sink: &mut Diagnostics,
    loc: &SourceLocation,
) -> CycleConfig {
    let levels = card.levels();
    let sequenced: Vec<usize> = (0..levels.len())
        .filter(|&k| levels[k].kind.is_sequenced())
        .collect();
    let capacities: Vec<u64> = sequenced.iter().map(|&k| levels[k].capacity()).collect();
    let zeros = vec![0usize; levels.len()];
    let inferred = infer_appear_ticks(&capacities, opts.growth_probe_ticks, |i, t| {
        let k = sequenced[i];
        level_own_limit(
            &levels,
            k,
            0,
            &zeros[..k],
            t,
            t,
            globals,
            rt,
            sink,
            &level_location(loc, k),
        )
    });
    let cycle = CycleConfig::derive(&card.play, inferred);
    tracing::debug!(card = %card.id, ?cycle, inferred, "cycle derived");
    cycle
}

/// Local position contribution of one level for one element.
#[allow(clippy::too_many_arguments)]
fn level_point(
    level: &ShapeLevel,
    index: usize,
    scope: &mut Scope,
    cycle: &CycleConfig,
    env: &TickEnv<'_>,
    scripts: &mut ScriptCache,
    sink: &mut Diagnostics,
    loc: &SourceLocation,
) -> Vec3 {
    let axis = scripts.vec_or(&level.axis, scope, DEFAULT_AXIS, sink, &loc.child("axis"));
    let mut state = ActionState::new(level.offset(index), axis);
    for (i, action) in level.actions.iter().enumerate() {
        let aloc = loc.child(&format!("actions[{i}]"));
        match action {
            DisplayAction::RotateToDirection { direction } => {
                let dir = scripts.vec_or(direction, scope, state.axis, sink, &aloc);
                state.rotate_to_direction(dir);
            }
            DisplayAction::RotateAroundAxis { angle } => {
                let a = scripts.number_or(angle, scope, 0.0, sink, &aloc);
                state.rotate_around_axis(a);
            }
            DisplayAction::RotateToDirectionThenSpin { direction, angle } => {
                let dir = scripts.vec_or(direction, scope, state.axis, sink, &aloc);
                let a = scripts.number_or(angle, scope, 0.0, sink, &aloc);
                state.rotate_to_direction(dir);
                state.rotate_around_axis(a);
            }
            DisplayAction::Script { source } => {
                // A failing script leaves the point as it was before the script ran.
                let before = state;
                if let Err(e) = scripts.run(source, scope, Some(&mut state), &mut Effects::default())
                {
                    sink.warn(aloc.with_offset(e.offset()), e.to_string());
                    state = before;
                }
            }
        }
    }
    state.point * level_scale(level, cycle, env)
}

fn level_scale(level: &ShapeLevel, cycle: &CycleConfig, env: &TickEnv<'_>) -> f64 {
    let cfg = &level.scale;
    if cfg.kind == ScaleKind::None {
        return 1.0;
    }
    let play = cycle.play();
    if cfg.reverse_on_disable && env.age >= play {
        return sample_fading_with(
            cfg,
            play as f64,
            (env.age - play) as f64,
            cycle.fade as f64,
            cfg.tick_window,
            env.opts.bezier_iterations,
        );
    }
    sample_with(cfg, env.age as f64, cfg.tick_window, env.opts.bezier_iterations)
}

struct ParticleOut {
    position: Vec3,
    color: Rgba,
    size: f64,
    visible: bool,
}

/// Evaluate initializers and controllers in the leaf scope.
fn particle_attributes(
    card: &Card,
    scope: &mut Scope,
    scripts: &mut ScriptCache,
    sink: &mut Diagnostics,
    loc: &SourceLocation,
) -> (Vec3, f64, f64, bool) {
    let ploc = loc.child("particle");
    let p = &card.particle;
    let color = scripts.vec_or(&p.color, scope, Vec3::ONE, sink, &ploc.child("color"));
    let size = scripts.number_or(&p.size, scope, 0.2, sink, &ploc.child("size"));
    let alpha = scripts.number_or(&p.alpha, scope, 1.0, sink, &ploc.child("alpha"));
    if card.controllers.is_empty() {
        return (color, size, alpha, true);
    }

    let seeded = [
        Value::Vec3(color),
        Value::Num(size),
        Value::Num(alpha),
        Value::Bool(true),
    ];
    let mark = scope.locals_depth();
    scope.push_locals();
    for (name, v) in CONTROLLER_LOCALS.iter().zip(seeded) {
        scope.declare_local(name, v, false);
    }
    for (i, src) in card.controllers.iter().enumerate() {
        if let Err(e) = scripts.run(src, scope, None, &mut Effects::default()) {
            sink.warn(
                loc.child(&format!("controllers[{i}]")).with_offset(e.offset()),
                e.to_string(),
            );
        }
    }
    let read = |name: &str| scope.lookup_local(name);
    let out = (
        read("color").and_then(|v| v.as_vec3().ok()).unwrap_or(color),
        read("size").and_then(|v| v.as_f64().ok()).unwrap_or(size),
        read("alpha").and_then(|v| v.as_f64().ok()).unwrap_or(alpha),
        read("visible").and_then(|v| v.truthy().ok()).unwrap_or(true),
    );
    scope.truncate_locals(mark);
    out
}

fn simulate_card(
    card: &Card,
    index: usize,
    rt: &mut CardRuntime,
    env: &TickEnv<'_>,
    globals: &mut GlobalsTimeline,
    sink: &mut Diagnostics,
    out: &mut Vec<ParticleOut>,
) {
    let loc = card_location(index);
    let levels = card.levels();
    let anchors = card.binding.anchors();
    let cycle = match rt.cycle {
        Some(c) => c,
        None => {
            let c = infer_cycle(card, globals, rt, env.opts, sink, &loc);
            rt.cycle = Some(c);
            c
        }
    };
    sync_status(env.elapsed, &mut rt.status, &cycle);
    let age = resolve_age(env.elapsed, &mut rt.status, &cycle);
    let env = TickEnv { age, ..*env };
    let fade = fade_progress(age, &cycle);
    let level_locs: Vec<SourceLocation> =
        (0..levels.len()).map(|k| level_location(&loc, k)).collect();

    // Own limits per (anchor, parent prefix), computed once per tick.
    let mut own: HashMap<(usize, SmallVec<[usize; 4]>), VisibleLimit> = HashMap::new();

    let elements = std::mem::take(&mut rt.elements);
    for el in &elements {
        let mut chain = Vec::with_capacity(levels.len());
        for k in 0..levels.len() {
            let key = (el.anchor, SmallVec::from_slice(&el.indices[..k]));
            let limit = match own.get(&key) {
                Some(l) => *l,
                None => {
                    let l = level_own_limit(
                        &levels,
                        k,
                        el.anchor,
                        &el.indices[..k],
                        age,
                        env.elapsed,
                        globals,
                        rt,
                        sink,
                        &level_locs[k],
                    );
                    own.insert(key, l);
                    l
                }
            };
            chain.push(LevelGrowth {
                capacity: levels[k].capacity(),
                own: limit,
            });
        }
        let limits = compose_level_limits(&chain);
        let grown = el
            .indices
            .iter()
            .zip(&limits)
            .zip(&chain)
            .all(|((&i, limit), g)| (i as u64) < limit.resolve(g.capacity));

        let frames = frames_for(&levels, &el.indices);
        let mut position = anchors[el.anchor];
        let mut leaf_scope = None;
        for (k, level) in levels.iter().enumerate() {
            let mut scope = env.builder.build(&ScopeRequest {
                elapsed_ticks: env.elapsed,
                age_ticks: age,
                depth: k,
                shape_index: Some(el.indices[k] as u64),
                point_index: el.anchor as u64,
                frames: &frames,
            });
            position += level_point(
                level,
                el.indices[k],
                &mut scope,
                &cycle,
                &env,
                &mut rt.scripts,
                sink,
                &level_locs[k],
            );
            leaf_scope = Some(scope);
        }
        let mut scope = leaf_scope.unwrap_or_default();
        let (color, size, alpha, shown) =
            particle_attributes(card, &mut scope, &mut rt.scripts, sink, &loc);
        out.push(ParticleOut {
            position,
            color: rgba_from(color, alpha * (1.0 - fade)),
            size,
            visible: grown && shown,
        });
    }
    rt.elements = elements;
}

/// Tick-driven preview of a document.
///
/// The tick cursor only moves forward; [`replay`](Self::replay) and
/// [`reset`](Self::reset) rewind it to 0 and drop every cache.
pub struct PreviewSession {
    doc: Document,
    opts: EngineOpts,
    tick: u64,
    globals_signature: u64,
    globals: GlobalsTimeline,
    runtimes: Vec<CardRuntime>,
    diagnostics: Diagnostics,
}

impl PreviewSession {
    pub fn new(doc: Document, opts: EngineOpts) -> Self {
        let mut diagnostics = Diagnostics::new();
        if let Err(e) = doc.validate_globals() {
            diagnostics.fatal(SourceLocation::new("globals"), e.to_string());
        }
        let runtimes = (0..doc.cards.len())
            .map(|i| CardRuntime::new(&doc, i, &mut diagnostics))
            .collect();
        Self {
            globals_signature: doc.globals_signature(),
            globals: GlobalsTimeline::new(
                &doc.globals,
                doc.globals_signature(),
                opts.max_global_passes,
            ),
            doc,
            opts,
            tick: 0,
            runtimes,
            diagnostics,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    /// Tick the next [`advance`](Self::advance) will simulate.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.items()
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Simulate the current tick and move the cursor forward.
    #[tracing::instrument(skip(self), fields(tick = self.tick))]
    pub fn advance(&mut self) -> PreviewFrame {
        let elapsed = self.tick;
        let builder = self.globals.builder_at(elapsed);
        self.diagnostics.extend(self.globals.take_diagnostics());
        let env = TickEnv {
            builder: &builder,
            elapsed,
            age: 0,
            opts: &self.opts,
        };

        let mut frame = PreviewFrame {
            tick: elapsed,
            ..PreviewFrame::default()
        };
        let mut particles = Vec::new();
        for (index, (card, rt)) in self.doc.cards.iter().zip(&mut self.runtimes).enumerate() {
            let start = particles.len();
            if rt.fault.is_none() {
                simulate_card(
                    card,
                    index,
                    rt,
                    &env,
                    &mut self.globals,
                    &mut self.diagnostics,
                    &mut particles,
                );
            }
            frame.card_ranges.push(CardRange {
                card_id: card.id.clone(),
                start,
                len: particles.len() - start,
            });
        }
        // Growth replays may resolve earlier ticks.
        self.diagnostics.extend(self.globals.take_diagnostics());
        for p in particles {
            frame.positions.push(p.position.to_array());
            frame.colors.push(p.color);
            frame.sizes.push(p.size);
            frame.visible.push(p.visible);
        }
        self.tick += 1;
        frame
    }

    /// Advance `ticks` times, collecting every frame.
    pub fn run(&mut self, ticks: u64) -> Vec<PreviewFrame> {
        (0..ticks).map(|_| self.advance()).collect()
    }

    /// Rewind to tick 0 and drop every cache. Manual overrides are dropped too.
    pub fn replay(&mut self) {
        tracing::debug!(from = self.tick, "preview replay");
        self.tick = 0;
        self.globals.clear();
        for rt in &mut self.runtimes {
            rt.invalidate();
        }
    }

    /// [`replay`](Self::replay) and forget collected diagnostics, re-reporting structural faults.
    pub fn reset(&mut self) {
        self.replay();
        self.diagnostics.clear();
        for (i, rt) in self.runtimes.iter().enumerate() {
            if let Some(fault) = &rt.fault {
                self.diagnostics.fatal(card_location(i), fault.clone());
            }
        }
    }

    fn runtime_mut(&mut self, card_id: &str) -> ComposerResult<&mut CardRuntime> {
        let idx = self
            .doc
            .cards
            .iter()
            .position(|c| c.id == card_id)
            .ok_or_else(|| ComposerError::validation(format!("unknown card '{card_id}'")))?;
        Ok(&mut self.runtimes[idx])
    }

    /// Force a card enabled or disabled until [`clear_manual`](Self::clear_manual).
    pub fn set_manual(&mut self, card_id: &str, enabled: bool) -> ComposerResult<()> {
        self.runtime_mut(card_id)?.status.set_manual(enabled);
        Ok(())
    }

    pub fn clear_manual(&mut self, card_id: &str) -> ComposerResult<()> {
        self.runtime_mut(card_id)?.status.clear_manual();
        Ok(())
    }

    pub fn status(&self, card_id: &str) -> Option<RuntimeStatus> {
        let idx = self.doc.cards.iter().position(|c| c.id == card_id)?;
        Some(self.runtimes[idx].status)
    }

    /// Cycle of a card, once its first tick has been simulated.
    pub fn cycle(&self, card_id: &str) -> Option<CycleConfig> {
        let idx = self.doc.cards.iter().position(|c| c.id == card_id)?;
        self.runtimes[idx].cycle
    }

    /// Swap in an edited document.
    ///
    /// A card whose structural signature is unchanged keeps its runtime (status and
    /// caches); every other card gets a fresh one. Changing globals invalidates all
    /// caches, since every scope signature depends on them. The tick cursor is kept.
    pub fn update_document(&mut self, doc: Document) {
        let globals_changed = doc.globals_signature() != self.globals_signature;
        let mut old: HashMap<u64, CardRuntime> = HashMap::new();
        for rt in self.runtimes.drain(..) {
            old.entry(rt.signature).or_insert(rt);
        }
        let mut kept = 0usize;
        let mut runtimes = Vec::with_capacity(doc.cards.len());
        for i in 0..doc.cards.len() {
            let reusable = doc.validate_card(i).is_ok();
            match old.remove(&doc.cards[i].signature()) {
                Some(mut rt) if reusable && rt.fault.is_none() => {
                    if globals_changed {
                        rt.invalidate();
                    }
                    kept += 1;
                    runtimes.push(rt);
                }
                _ => runtimes.push(CardRuntime::new(&doc, i, &mut self.diagnostics)),
            }
        }
        tracing::debug!(kept, total = runtimes.len(), globals_changed, "document updated");
        if globals_changed {
            self.globals = GlobalsTimeline::new(
                &doc.globals,
                doc.globals_signature(),
                self.opts.max_global_passes,
            );
            if let Err(e) = doc.validate_globals() {
                self.diagnostics
                    .fatal(SourceLocation::new("globals"), e.to_string());
            }
        }
        self.globals_signature = doc.globals_signature();
        self.runtimes = runtimes;
        self.doc = doc;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/preview.rs"]
mod tests;
