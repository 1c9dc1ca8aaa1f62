//! Fixed-point resolution of project globals.
//!
//! Globals may reference each other in any order. Each pass re-evaluates every global in
//! declaration order against the values produced so far; resolution stops at the first
//! pass that changes nothing, or after `max_passes`. Genuinely cyclic definitions do not
//! converge: the last computed values are kept and `converged` is `false`.

use crate::composition::model::{GlobalKind, GlobalVar, ValueType};
use crate::eval::scope::{ScopeBuilder, ScopeRequest, TIME_VARS, VarLayer};
use crate::expression::ScriptCache;
use crate::expression::error::EvalFault;
use crate::expression::value::Value;
use crate::foundation::core::Vec3;
use crate::foundation::diagnostics::{Diagnostics, Severity, SourceLocation};
use std::collections::HashMap;
use std::rc::Rc;

/// Resolved ticks kept by a [`GlobalsTimeline`] before its memo is dropped.
const TIMELINE_MEMO: usize = 512;

/// Globals after fixed-point resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedGlobals {
    pub values: Rc<VarLayer>,
    /// Passes actually run (including the final no-change pass when converged).
    pub passes: usize,
    pub converged: bool,
}

/// Value a global holds before its first evaluation.
pub fn type_default(ty: ValueType) -> Value {
    match ty {
        ValueType::Number => Value::Num(0.0),
        ValueType::Bool => Value::Bool(false),
        ValueType::Vec => Value::Vec3(Vec3::ZERO),
    }
}

fn coerce(v: Value, ty: ValueType) -> Result<Value, EvalFault> {
    match ty {
        ValueType::Number => v.as_f64().map(Value::Num),
        ValueType::Vec => v.as_vec3().map(Value::Vec3),
        ValueType::Bool => match v {
            Value::Bool(_) => Ok(v),
            other => Err(EvalFault::type_error(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        },
    }
}

fn layer_insert(layer: &mut VarLayer, g: &GlobalVar, v: Value) {
    match g.kind {
        GlobalKind::Const => layer.insert_const(g.name.clone(), v),
        GlobalKind::Var => layer.insert(g.name.clone(), v),
    }
}

/// Resolve every global at `elapsed_ticks` (globals see `age == tick == elapsed`).
#[tracing::instrument(skip(globals, cache, sink), fields(count = globals.len()))]
pub fn resolve_globals(
    globals: &[GlobalVar],
    elapsed_ticks: u64,
    max_passes: usize,
    cache: &mut ScriptCache,
    sink: &mut Diagnostics,
) -> ResolvedGlobals {
    let mut current = VarLayer::new();
    for g in globals {
        layer_insert(&mut current, g, type_default(g.value_type));
    }
    if globals.is_empty() {
        return ResolvedGlobals {
            values: Rc::new(current),
            passes: 0,
            converged: true,
        };
    }

    let root = SourceLocation::new("globals");
    let mut passes = 0;
    let mut converged = false;
    while passes < max_passes.max(1) {
        passes += 1;
        let mut changed = false;
        for (i, g) in globals.iter().enumerate() {
            let builder = ScopeBuilder::new(Rc::new(current.clone()));
            let mut scope = builder.build(&ScopeRequest {
                elapsed_ticks,
                age_ticks: elapsed_ticks,
                depth: 0,
                shape_index: None,
                point_index: 0,
                frames: &[],
            });
            let loc = root.child(&format!("[{i}]")).child("expr");
            let fallback = current.get(&g.name).unwrap_or(type_default(g.value_type));
            let raw = cache.value_or(&g.expr, &mut scope, fallback, sink, &loc);
            let v = coerce(raw, g.value_type).unwrap_or_else(|e| {
                sink.warn(loc.clone(), format!("global '{}': {e}", g.name));
                fallback
            });
            if current.get(&g.name) != Some(v) {
                changed = true;
                layer_insert(&mut current, g, v);
            }
        }
        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::debug!(passes, "globals did not converge");
        sink.push(
            Severity::Info,
            root,
            format!("globals did not converge after {passes} passes; using last computed values"),
        );
    }
    ResolvedGlobals {
        values: Rc::new(current),
        passes,
        converged,
    }
}

/// Globals resolved per elapsed tick, shared by every card of a preview session.
///
/// Globals that read no time var resolve once. Otherwise each tick resolves on its own,
/// so a replayed tick sees exactly the values it saw live. Every builder handed out is
/// keyed by the globals' source signature, not their values, which keeps per-element
/// cache keys stable across ticks.
pub struct GlobalsTimeline {
    globals: Vec<GlobalVar>,
    key: u64,
    max_passes: usize,
    time_dependent: bool,
    resolved: HashMap<u64, Rc<VarLayer>>,
    scripts: ScriptCache,
    diagnostics: Diagnostics,
}

impl GlobalsTimeline {
    /// `key` identifies the global definitions (see `Document::globals_signature`).
    pub fn new(globals: &[GlobalVar], key: u64, max_passes: usize) -> Self {
        let mut scripts = ScriptCache::new();
        let time_dependent = globals.iter().any(|g| match &*scripts.parsed(&g.expr) {
            Ok(script) => script.reads_any(&TIME_VARS),
            Err(_) => false,
        });
        Self {
            globals: globals.to_vec(),
            key,
            max_passes,
            time_dependent,
            resolved: HashMap::new(),
            scripts,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    /// Number of memoized resolutions.
    pub fn memoized(&self) -> usize {
        self.resolved.len()
    }

    /// Global values at `elapsed`.
    pub fn at(&mut self, elapsed: u64) -> Rc<VarLayer> {
        let slot = if self.time_dependent { elapsed } else { 0 };
        if let Some(hit) = self.resolved.get(&slot) {
            return Rc::clone(hit);
        }
        if self.resolved.len() >= TIMELINE_MEMO {
            self.resolved.clear();
        }
        let r = resolve_globals(
            &self.globals,
            elapsed,
            self.max_passes,
            &mut self.scripts,
            &mut self.diagnostics,
        );
        self.resolved.insert(slot, Rc::clone(&r.values));
        r.values
    }

    /// Scope builder over the globals at `elapsed`.
    pub fn builder_at(&mut self, elapsed: u64) -> ScopeBuilder {
        ScopeBuilder::new(self.at(elapsed)).with_globals_key(self.key)
    }

    /// Diagnostics recorded since the last call.
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Forget every resolution and parsed script.
    pub fn clear(&mut self) {
        self.resolved.clear();
        self.scripts.clear();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/eval/globals.rs"]
mod tests;
