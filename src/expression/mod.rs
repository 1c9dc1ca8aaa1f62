//! Embedded script language: lexer, parser, interpreter and generation-time validation.
//!
//! Every evaluation returns `Result<Value, EvalFault>`; callers that need a value pick
//! the default explicitly through [`evaluate_or`] or [`ScriptCache::value_or`].

pub(crate) mod ast;
pub mod error;
pub(crate) mod interp;
pub(crate) mod lexer;
pub(crate) mod parser;
pub mod validate;
pub mod value;

use crate::eval::scope::Scope;
use crate::expression::ast::{Expr, Script};
use crate::expression::error::{EvalFault, ExprError};
use crate::expression::interp::{GROWTH_BUILTINS, execute};
use crate::expression::value::Value;
use crate::foundation::core::Vec3;
use crate::foundation::diagnostics::{Diagnostics, SourceLocation};
use std::collections::HashMap;
use std::rc::Rc;

pub use interp::{ActionState, Effects};

/// Evaluate `source` against `scope` with no action state.
pub fn evaluate(source: &str, scope: &mut Scope) -> Result<Value, EvalFault> {
    evaluate_with(source, scope, None, &mut Effects::default())
}

/// Evaluate with an optional action state (rotation built-ins, `point`, `axis`).
pub fn evaluate_with(
    source: &str,
    scope: &mut Scope,
    state: Option<&mut ActionState>,
    effects: &mut Effects,
) -> Result<Value, EvalFault> {
    if let Some(v) = fast_path(source) {
        return Ok(v);
    }
    let script = parser::parse_script(source)?;
    execute(&script, scope, state, effects)
}

/// Evaluate, substituting `default` and recording a warning on failure.
pub fn evaluate_or(
    source: &str,
    scope: &mut Scope,
    default: Value,
    sink: &mut Diagnostics,
    location: SourceLocation,
) -> Value {
    match evaluate(source, scope) {
        Ok(v) => v,
        Err(e) => {
            sink.warn(location.with_offset(e.offset()), e.to_string());
            default
        }
    }
}

/// Literal shortcut: a number with optional unit suffix, or `Vec3(lit, lit, lit)`.
pub fn fast_path(source: &str) -> Option<Value> {
    let s = source.trim();
    if let Some(n) = literal_number(s) {
        return Some(Value::Num(n));
    }
    let inner = s.strip_prefix("Vec3")?.trim_start();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split(',');
    let x = literal_number(parts.next()?.trim())?;
    let y = literal_number(parts.next()?.trim())?;
    let z = literal_number(parts.next()?.trim())?;
    if parts.next().is_some() {
        return None;
    }
    Some(Value::Vec3(Vec3::new(x, y, z)))
}

fn literal_number(s: &str) -> Option<f64> {
    let digits = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let body = digits.strip_prefix(['-', '+']).unwrap_or(digits);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    if body.bytes().filter(|b| *b == b'.').count() > 1 || !body.bytes().any(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

/// True when the script calls a growth primitive; such scripts drive the
/// script-based growth source.
pub fn contains_growth_call(source: &str) -> bool {
    let Ok(script) = parser::parse_script(source) else {
        return false;
    };
    script_has_growth_call(&script)
}

pub(crate) fn script_has_growth_call(script: &Script) -> bool {
    let mut found = false;
    script.visit_calls(&mut |name: &str, _: &[Expr]| {
        found |= GROWTH_BUILTINS.contains(&name);
    });
    found
}

/// Parsed-script memo keyed by source text.
///
/// Preview runs the same handful of scripts every tick for every element; parsing
/// once per distinct source keeps the per-tick cost at interpretation only.
#[derive(Default)]
pub struct ScriptCache {
    parsed: HashMap<String, Rc<Result<Script, ExprError>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    pub fn clear(&mut self) {
        self.parsed.clear();
    }

    pub(crate) fn parsed(&mut self, source: &str) -> Rc<Result<Script, ExprError>> {
        if let Some(hit) = self.parsed.get(source) {
            return Rc::clone(hit);
        }
        let parsed = Rc::new(parser::parse_script(source));
        self.parsed.insert(source.to_owned(), Rc::clone(&parsed));
        parsed
    }

    /// Like [`evaluate_with`], but parses each distinct source once.
    pub fn run(
        &mut self,
        source: &str,
        scope: &mut Scope,
        state: Option<&mut ActionState>,
        effects: &mut Effects,
    ) -> Result<Value, EvalFault> {
        if let Some(v) = fast_path(source) {
            return Ok(v);
        }
        match &*self.parsed(source) {
            Ok(script) => execute(script, scope, state, effects),
            Err(e) => Err(e.clone().into()),
        }
    }

    /// Evaluate a side-effect-free expression, falling back to `default`.
    pub fn value_or(
        &mut self,
        source: &str,
        scope: &mut Scope,
        default: Value,
        sink: &mut Diagnostics,
        location: &SourceLocation,
    ) -> Value {
        let mut effects = Effects::default();
        match self.run(source, scope, None, &mut effects) {
            Ok(v) => v,
            Err(e) => {
                sink.warn(location.clone().with_offset(e.offset()), e.to_string());
                default
            }
        }
    }

    pub fn number_or(
        &mut self,
        source: &str,
        scope: &mut Scope,
        default: f64,
        sink: &mut Diagnostics,
        location: &SourceLocation,
    ) -> f64 {
        let v = self.value_or(source, scope, Value::Num(default), sink, location);
        v.as_f64().unwrap_or_else(|e| {
            sink.warn(location.clone(), e.to_string());
            default
        })
    }

    pub fn vec_or(
        &mut self,
        source: &str,
        scope: &mut Scope,
        default: Vec3,
        sink: &mut Diagnostics,
        location: &SourceLocation,
    ) -> Vec3 {
        let v = self.value_or(source, scope, Value::Vec3(default), sink, location);
        v.as_vec3().unwrap_or_else(|e| {
            sink.warn(location.clone(), e.to_string());
            default
        })
    }

    pub fn bool_or(
        &mut self,
        source: &str,
        scope: &mut Scope,
        default: bool,
        sink: &mut Diagnostics,
        location: &SourceLocation,
    ) -> bool {
        let v = self.value_or(source, scope, Value::Bool(default), sink, location);
        v.truthy().unwrap_or_else(|e| {
            sink.warn(location.clone(), e.to_string());
            default
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/expression/eval.rs"]
mod tests;
