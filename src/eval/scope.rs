//! Layered variable environment visible to a script.
//!
//! Override order, lowest to highest: base -> globals -> depth-scoped -> locals.
//! `this.<name>` bypasses the chain and reads the globals layer directly.

use crate::composition::model::{GlobalKind, GlobalVar, LevelKind, ShapeLevel};
use crate::expression::value::Value;
use crate::foundation::core::Vec3;
use crate::foundation::math::StableHasher;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub const VAR_AGE: &str = "age";
pub const VAR_TICK: &str = "tick";
pub const VAR_ELAPSED: &str = "elapsedTickCounter";
pub const VAR_POINT_INDEX: &str = "pointIndex";
pub const VAR_SHAPE_INDEX: &str = "shapeIndex";

/// Base vars present in every scope.
pub const BASE_VARS: [&str; 4] = [VAR_AGE, VAR_TICK, VAR_ELAPSED, VAR_POINT_INDEX];

/// Time-varying names excluded from [`Scope::signature`].
pub(crate) const TIME_VARS: [&str; 3] = [VAR_AGE, VAR_TICK, VAR_ELAPSED];

/// Relative-position vector of the element at `depth`.
pub fn rel_var(depth: usize) -> String {
    format!("shapeRel{depth}")
}

/// Order index of the element at `depth`; only defined for sequenced levels.
pub fn order_var(depth: usize) -> String {
    format!("shapeOrder{depth}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    Base,
    Globals,
    Depth,
    Locals,
}

/// One name -> value map in the chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VarLayer {
    vars: BTreeMap<String, Value>,
    consts: BTreeSet<String>,
}

impl VarLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub(crate) fn insert_const(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.consts.insert(name.clone());
        self.vars.insert(name, value);
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.consts.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Why an assignment was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignError {
    Undefined,
    Const,
}

#[derive(Clone, Debug)]
pub struct Scope {
    base: VarLayer,
    globals: Rc<VarLayer>,
    depth_vars: VarLayer,
    locals: SmallVec<[VarLayer; 2]>,
    depth: usize,
    /// Stands in for the globals layer in [`Scope::signature`].
    globals_key: u64,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(Rc::new(VarLayer::new()))
    }
}

impl Scope {
    pub fn new(globals: Rc<VarLayer>) -> Self {
        let mut base = VarLayer::new();
        for name in BASE_VARS {
            base.insert(name, Value::Num(0.0));
        }
        Self {
            base,
            globals_key: values_key(&globals),
            globals,
            depth_vars: VarLayer::new(),
            locals: SmallVec::new(),
            depth: 0,
        }
    }

    /// Structural depth this scope was built for.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_base(&mut self, name: &str, value: Value) {
        self.base.insert(name, value);
    }

    pub fn set_depth_var(&mut self, name: impl Into<String>, value: Value) {
        self.depth_vars.insert(name, value);
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&VarLayer> {
        match kind {
            LayerKind::Base => Some(&self.base),
            LayerKind::Globals => Some(&*self.globals),
            LayerKind::Depth => Some(&self.depth_vars),
            LayerKind::Locals => self.locals.last(),
        }
    }

    /// Resolve `name` through the chain, innermost local first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.lookup_local(name)
            .or_else(|| self.depth_vars.get(name))
            .or_else(|| self.globals.get(name))
            .or_else(|| self.base.get(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<Value> {
        self.locals.iter().rev().find_map(|l| l.get(name))
    }

    /// Qualified-self channel: globals only.
    pub fn lookup_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    pub fn push_locals(&mut self) {
        self.locals.push(VarLayer::new());
    }

    pub fn pop_locals(&mut self) -> Option<VarLayer> {
        self.locals.pop()
    }

    pub(crate) fn locals_depth(&self) -> usize {
        self.locals.len()
    }

    pub(crate) fn truncate_locals(&mut self, len: usize) {
        self.locals.truncate(len);
    }

    /// Declare in the innermost local layer. Returns `false` if already declared there.
    pub fn declare_local(&mut self, name: &str, value: Value, is_const: bool) -> bool {
        if self.locals.is_empty() {
            self.push_locals();
        }
        let Some(top) = self.locals.last_mut() else {
            return false;
        };
        if top.contains(name) {
            return false;
        }
        if is_const {
            top.insert_const(name, value);
        } else {
            top.insert(name, value);
        }
        true
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l.contains(name))
    }

    /// Assign to the innermost layer that defines `name`.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), AssignError> {
        if let Some(layer) = self.locals.iter_mut().rev().find(|l| l.contains(name)) {
            if layer.is_const(name) {
                return Err(AssignError::Const);
            }
            layer.insert(name, value);
            return Ok(());
        }
        if self.depth_vars.contains(name) {
            self.depth_vars.insert(name, value);
            return Ok(());
        }
        if self.globals.contains(name) {
            return self.assign_global(name, value);
        }
        if self.base.contains(name) {
            self.base.insert(name, value);
            return Ok(());
        }
        Err(AssignError::Undefined)
    }

    /// Write a global for the lifetime of this scope only (copy-on-write).
    pub fn assign_global(&mut self, name: &str, value: Value) -> Result<(), AssignError> {
        if !self.globals.contains(name) {
            return Err(AssignError::Undefined);
        }
        if self.globals.is_const(name) {
            return Err(AssignError::Const);
        }
        Rc::make_mut(&mut self.globals).insert(name, value);
        Ok(())
    }

    /// Every identifier this scope can resolve (excluding script locals).
    pub fn visible_names(&self) -> BTreeSet<String> {
        self.base
            .iter()
            .chain(self.globals.iter())
            .chain(self.depth_vars.iter())
            .map(|(k, _)| k.to_owned())
            .collect()
    }

    /// Static shape of this scope, for validation.
    pub fn shape(&self) -> ScopeShape {
        ScopeShape {
            names: self.visible_names(),
            globals: self.globals.iter().map(|(k, _)| k.to_owned()).collect(),
            const_globals: self
                .globals
                .iter()
                .filter(|(k, _)| self.globals.is_const(k))
                .map(|(k, _)| k.to_owned())
                .collect(),
        }
    }

    /// Stable hash over everything except the time-varying base vars.
    ///
    /// Globals contribute their key: a hash of their values by default, or the source
    /// signature set with [`ScopeBuilder::with_globals_key`] when values vary per tick.
    pub fn signature(&self) -> u64 {
        let mut h = StableHasher::new();
        h.write_u64(self.depth as u64);
        h.write_u64(self.globals_key);
        for (tag, layer) in [(0u8, &self.base), (2, &self.depth_vars)] {
            h.write_u8(tag);
            for (k, v) in layer.iter() {
                if tag == 0 && TIME_VARS.contains(&k) {
                    continue;
                }
                h.write_str(k);
                v.hash_into(&mut h);
            }
        }
        h.finish()
    }
}

fn values_key(layer: &VarLayer) -> u64 {
    let mut h = StableHasher::new();
    for (k, v) in layer.iter() {
        h.write_str(k);
        v.hash_into(&mut h);
    }
    h.finish()
}

/// Per-depth data of one element's chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthFrame {
    /// Position of the element relative to its parent at this depth.
    pub rel: Vec3,
    /// Order index; `Some` only on sequenced levels.
    pub order: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub struct ScopeRequest<'a> {
    pub elapsed_ticks: u64,
    pub age_ticks: u64,
    pub depth: usize,
    pub shape_index: Option<u64>,
    pub point_index: u64,
    /// Frames for depths `0..`; only `0..=depth` are injected.
    pub frames: &'a [DepthFrame],
}

/// Assembles scopes sharing one resolved globals layer.
#[derive(Clone, Debug)]
pub struct ScopeBuilder {
    globals: Rc<VarLayer>,
    globals_key: u64,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new(Rc::new(VarLayer::new()))
    }
}

impl ScopeBuilder {
    pub fn new(globals: Rc<VarLayer>) -> Self {
        Self {
            globals_key: values_key(&globals),
            globals,
        }
    }

    /// Key globals by `key` instead of their values, so scopes built from globals
    /// resolved at different ticks share one signature.
    pub fn with_globals_key(mut self, key: u64) -> Self {
        self.globals_key = key;
        self
    }

    pub fn globals(&self) -> &Rc<VarLayer> {
        &self.globals
    }

    pub fn build(&self, req: &ScopeRequest<'_>) -> Scope {
        let mut scope = Scope::new(Rc::clone(&self.globals));
        scope.globals_key = self.globals_key;
        scope.depth = req.depth;
        scope.set_base(VAR_AGE, Value::Num(req.age_ticks as f64));
        scope.set_base(VAR_TICK, Value::Num(req.age_ticks as f64));
        scope.set_base(VAR_ELAPSED, Value::Num(req.elapsed_ticks as f64));
        scope.set_base(VAR_POINT_INDEX, Value::Num(req.point_index as f64));
        if let Some(i) = req.shape_index {
            scope.set_base(VAR_SHAPE_INDEX, Value::Num(i as f64));
        }
        for (d, frame) in req.frames.iter().enumerate().take(req.depth + 1) {
            scope.set_depth_var(rel_var(d), Value::Vec3(frame.rel));
            if let Some(order) = frame.order {
                scope.set_depth_var(order_var(d), Value::Num(order as f64));
            }
        }
        scope
    }
}

/// Names a scope would expose, without values. Used where no live scope exists
/// (code generation), so it must agree with [`ScopeBuilder::build`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeShape {
    names: BTreeSet<String>,
    globals: BTreeSet<String>,
    const_globals: BTreeSet<String>,
}

impl ScopeShape {
    /// Base vars + globals: what a global's own expression sees.
    pub fn for_globals(globals: &[GlobalVar]) -> Self {
        let mut shape = Self::default();
        shape.names.extend(BASE_VARS.iter().map(|s| (*s).to_owned()));
        for g in globals {
            shape.names.insert(g.name.clone());
            shape.globals.insert(g.name.clone());
            if g.kind == GlobalKind::Const {
                shape.const_globals.insert(g.name.clone());
            }
        }
        shape
    }

    /// Scope of a script attached to level `depth` of `levels`.
    pub fn for_level(globals: &[GlobalVar], levels: &[&ShapeLevel], depth: usize) -> Self {
        let mut shape = Self::for_globals(globals);
        shape.names.insert(VAR_SHAPE_INDEX.to_owned());
        for (d, level) in levels.iter().enumerate().take(depth + 1) {
            shape.names.insert(rel_var(d));
            if level.kind == LevelKind::SequencedGrowthShape {
                shape.names.insert(order_var(d));
            }
        }
        shape
    }

    /// Scope of a growth source of level `depth`: it decides how many children of one
    /// parent element are visible, so it sees the parent chain (`0..depth`) only.
    pub fn for_growth(globals: &[GlobalVar], levels: &[&ShapeLevel], depth: usize) -> Self {
        let mut shape = Self::for_globals(globals);
        for (d, level) in levels.iter().enumerate().take(depth) {
            shape.names.insert(rel_var(d));
            if level.kind == LevelKind::SequencedGrowthShape {
                shape.names.insert(order_var(d));
            }
        }
        shape
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_const_global(&self, name: &str) -> bool {
        self.const_globals.contains(name)
    }

    pub fn is_base(&self, name: &str) -> bool {
        BASE_VARS.contains(&name) || name == VAR_SHAPE_INDEX
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }
}

#[cfg(test)]
#[path = "../../tests/unit/eval/scope.rs"]
mod tests;
