//! Tree-walking interpreter over [`Script`] against an explicit [`Scope`].
//!
//! Scripts have no loops, so evaluation always terminates.

use crate::eval::scope::{AssignError, Scope};
use crate::expression::ast::{
    AssignOp, AssignTarget, BinaryOp, DeclKind, Expr, Script, Stmt, UnaryOp,
};
use crate::expression::error::EvalFault;
use crate::expression::value::Value;
use crate::foundation::core::Vec3;
use crate::foundation::math::{rotate_around_axis, rotate_to_direction};

pub(crate) const FN_VEC3: &str = "Vec3";
pub(crate) const FN_ROTATE_TO_DIRECTION: &str = "rotateToDirection";
pub(crate) const FN_ROTATE_AROUND_AXIS: &str = "rotateAroundAxis";
pub(crate) const FN_ROTATE_THEN_SPIN: &str = "rotateToDirectionThenSpin";
pub(crate) const FN_ADD_SINGLE: &str = "addSingle";
pub(crate) const FN_ADD_MULTIPLE: &str = "addMultiple";

/// Built-in functions and their arity.
pub(crate) const BUILTINS: &[(&str, usize)] = &[
    (FN_VEC3, 3),
    (FN_ROTATE_TO_DIRECTION, 1),
    (FN_ROTATE_AROUND_AXIS, 1),
    (FN_ROTATE_THEN_SPIN, 2),
    (FN_ADD_SINGLE, 0),
    (FN_ADD_MULTIPLE, 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("abs", 1),
    ("sqrt", 1),
    ("floor", 1),
    ("ceil", 1),
    ("round", 1),
    ("length", 1),
    ("normalize", 1),
    ("min", 2),
    ("max", 2),
    ("pow", 2),
    ("atan2", 2),
    ("clamp", 3),
    ("lerp", 3),
];

pub(crate) const ROTATION_BUILTINS: [&str; 3] = [
    FN_ROTATE_TO_DIRECTION,
    FN_ROTATE_AROUND_AXIS,
    FN_ROTATE_THEN_SPIN,
];

pub(crate) const GROWTH_BUILTINS: [&str; 2] = [FN_ADD_SINGLE, FN_ADD_MULTIPLE];

pub(crate) fn builtin_arity(name: &str) -> Option<usize> {
    BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, a)| *a)
}

pub const NAME_POINT: &str = "point";
pub const NAME_AXIS: &str = "axis";

/// Point and carried axis threaded through one DisplayAction list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionState {
    pub point: Vec3,
    pub axis: Vec3,
}

impl ActionState {
    pub fn new(point: Vec3, axis: Vec3) -> Self {
        Self { point, axis }
    }

    pub fn rotate_to_direction(&mut self, dir: Vec3) {
        self.point = rotate_to_direction(self.point, self.axis, dir);
        if let Some(d) = dir.try_normalize() {
            self.axis = d;
        }
    }

    pub fn rotate_around_axis(&mut self, angle: f64) {
        self.point = rotate_around_axis(self.point, self.axis, angle);
    }
}

/// Signals collected while running a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Elements requested by `addSingle` / `addMultiple`.
    pub growth_signals: u64,
}

pub(crate) struct Interp<'s> {
    pub(crate) scope: &'s mut Scope,
    pub(crate) state: Option<&'s mut ActionState>,
    pub(crate) effects: &'s mut Effects,
}

impl Interp<'_> {
    /// Run in the scope's current local layer; the value is that of the last statement.
    pub(crate) fn run(&mut self, script: &Script) -> Result<Value, EvalFault> {
        let mut last = Value::Unit;
        for stmt in &script.stmts {
            last = self.exec(stmt)?;
        }
        Ok(last)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Value, EvalFault> {
        let mark = self.scope.locals_depth();
        self.scope.push_locals();
        let mut out = Ok(Value::Unit);
        for stmt in stmts {
            out = self.exec(stmt);
            if out.is_err() {
                break;
            }
        }
        self.scope.truncate_locals(mark);
        out
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Value, EvalFault> {
        match stmt {
            Stmt::Decl {
                keyword,
                name,
                value,
                ..
            } => {
                let v = self.eval(value)?;
                if !self
                    .scope
                    .declare_local(name, v, *keyword == DeclKind::Const)
                {
                    return Err(EvalFault::Runtime(format!(
                        "'{name}' is already declared in this block"
                    )));
                }
                Ok(Value::Unit)
            }
            Stmt::Assign {
                target,
                op,
                value,
                offset,
            } => {
                let rhs = self.eval(value)?;
                self.assign(target, *op, rhs, *offset)?;
                Ok(Value::Unit)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy()? {
                    self.exec_block(then)
                } else {
                    self.exec_block(otherwise)
                }
            }
            Stmt::Expr(e) => self.eval(e),
        }
    }

    fn assign(
        &mut self,
        target: &AssignTarget,
        op: AssignOp,
        rhs: Value,
        offset: usize,
    ) -> Result<(), EvalFault> {
        match target {
            AssignTarget::Name(name) => {
                let v = match op {
                    AssignOp::Set => rhs,
                    _ => compound(op, self.lookup(name, offset)?, rhs)?,
                };
                self.store(name, v, offset)
            }
            AssignTarget::Component { name, component } => {
                let mut vec = self.lookup(name, offset)?.as_vec3()?;
                let old = Value::Num(component_of(vec, component)?);
                let v = match op {
                    AssignOp::Set => rhs,
                    _ => compound(op, old, rhs)?,
                }
                .as_f64()?;
                match component.as_str() {
                    "x" => vec.x = v,
                    "y" => vec.y = v,
                    _ => vec.z = v,
                }
                self.store(name, Value::Vec3(vec), offset)
            }
            AssignTarget::SelfMember(name) => {
                let v = match op {
                    AssignOp::Set => rhs,
                    _ => {
                        let old = self.scope.lookup_global(name).ok_or_else(|| {
                            EvalFault::UndefinedIdentifier {
                                name: name.clone(),
                                offset,
                            }
                        })?;
                        compound(op, old, rhs)?
                    }
                };
                self.scope
                    .assign_global(name, v)
                    .map_err(|e| assign_fault(e, name, offset))
            }
        }
    }

    fn lookup(&self, name: &str, offset: usize) -> Result<Value, EvalFault> {
        if let Some(v) = self.scope.lookup_local(name) {
            return Ok(v);
        }
        if let Some(state) = self.state.as_deref() {
            match name {
                NAME_POINT => return Ok(Value::Vec3(state.point)),
                NAME_AXIS => return Ok(Value::Vec3(state.axis)),
                _ => {}
            }
        }
        self.scope
            .lookup(name)
            .ok_or_else(|| EvalFault::UndefinedIdentifier {
                name: name.to_owned(),
                offset,
            })
    }

    fn store(&mut self, name: &str, v: Value, offset: usize) -> Result<(), EvalFault> {
        if !self.scope.has_local(name)
            && let Some(state) = self.state.as_deref_mut()
        {
            match name {
                NAME_POINT => {
                    state.point = v.as_vec3()?;
                    return Ok(());
                }
                NAME_AXIS => {
                    state.axis = v.as_vec3()?;
                    return Ok(());
                }
                _ => {}
            }
        }
        self.scope
            .assign(name, v)
            .map_err(|e| assign_fault(e, name, offset))
    }

    pub(crate) fn eval(&mut self, e: &Expr) -> Result<Value, EvalFault> {
        match e {
            Expr::Num { value, .. } => Ok(Value::Num(*value)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Ident { name, offset } => self.lookup(name, *offset),
            Expr::SelfMember { name, offset } => {
                self.scope
                    .lookup_global(name)
                    .ok_or_else(|| EvalFault::UndefinedIdentifier {
                        name: format!("this.{name}"),
                        offset: *offset,
                    })
            }
            Expr::Member { base, member } => {
                let v = self.eval(base)?.as_vec3()?;
                Ok(Value::Num(component_of(v, member)?))
            }
            Expr::Unary { op, expr } => {
                let v = self.eval(expr)?;
                match op {
                    UnaryOp::Neg => match v {
                        Value::Num(n) => Ok(Value::Num(-n)),
                        Value::Vec3(v) => Ok(Value::Vec3(-v)),
                        other => Err(EvalFault::type_error(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!v.truthy()?)),
                }
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let l = self.eval(left)?.truthy()?;
                    Ok(Value::Bool(l && self.eval(right)?.truthy()?))
                }
                BinaryOp::Or => {
                    let l = self.eval(left)?.truthy()?;
                    Ok(Value::Bool(l || self.eval(right)?.truthy()?))
                }
                _ => {
                    let l = self.eval(left)?;
                    let r = self.eval(right)?;
                    binary(*op, l, r)
                }
            },
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { func, args, offset } => {
                let Some(arity) = builtin_arity(func) else {
                    return Err(EvalFault::UnknownFunction {
                        name: func.clone(),
                        offset: *offset,
                    });
                };
                if args.len() != arity {
                    return Err(EvalFault::Arity {
                        name: func.clone(),
                        expected: arity,
                        got: args.len(),
                    });
                }
                let mut vals = [Value::Unit; 3];
                for (slot, a) in vals.iter_mut().zip(args) {
                    *slot = self.eval(a)?;
                }
                self.call(func, &vals[..arity])
            }
        }
    }

    fn call(&mut self, func: &str, a: &[Value]) -> Result<Value, EvalFault> {
        let num1 = |f: fn(f64) -> f64| -> Result<Value, EvalFault> {
            Ok(Value::Num(f(a[0].as_f64()?)))
        };
        match func {
            FN_VEC3 => Ok(Value::Vec3(Vec3::new(
                a[0].as_f64()?,
                a[1].as_f64()?,
                a[2].as_f64()?,
            ))),
            FN_ROTATE_TO_DIRECTION => {
                let dir = a[0].as_vec3()?;
                if let Some(state) = self.state.as_deref_mut() {
                    state.rotate_to_direction(dir);
                }
                Ok(Value::Unit)
            }
            FN_ROTATE_AROUND_AXIS => {
                let angle = a[0].as_f64()?;
                if let Some(state) = self.state.as_deref_mut() {
                    state.rotate_around_axis(angle);
                }
                Ok(Value::Unit)
            }
            FN_ROTATE_THEN_SPIN => {
                let dir = a[0].as_vec3()?;
                let angle = a[1].as_f64()?;
                if let Some(state) = self.state.as_deref_mut() {
                    state.rotate_to_direction(dir);
                    state.rotate_around_axis(angle);
                }
                Ok(Value::Unit)
            }
            FN_ADD_SINGLE => {
                self.effects.growth_signals = self.effects.growth_signals.saturating_add(1);
                Ok(Value::Unit)
            }
            FN_ADD_MULTIPLE => {
                let n = a[0].as_f64()?;
                let n = if n.is_finite() && n > 0.0 {
                    n.floor().min(u64::MAX as f64) as u64
                } else {
                    0
                };
                self.effects.growth_signals = self.effects.growth_signals.saturating_add(n);
                Ok(Value::Unit)
            }
            "sin" => num1(f64::sin),
            "cos" => num1(f64::cos),
            "tan" => num1(f64::tan),
            "abs" => num1(f64::abs),
            "sqrt" => num1(f64::sqrt),
            "floor" => num1(f64::floor),
            "ceil" => num1(f64::ceil),
            "round" => num1(f64::round),
            "length" => Ok(Value::Num(a[0].as_vec3()?.length())),
            "normalize" => Ok(Value::Vec3(a[0].as_vec3()?.normalize_or_zero())),
            "min" => Ok(Value::Num(a[0].as_f64()?.min(a[1].as_f64()?))),
            "max" => Ok(Value::Num(a[0].as_f64()?.max(a[1].as_f64()?))),
            "pow" => Ok(Value::Num(a[0].as_f64()?.powf(a[1].as_f64()?))),
            "atan2" => Ok(Value::Num(a[0].as_f64()?.atan2(a[1].as_f64()?))),
            "clamp" => {
                let (x, lo, hi) = (a[0].as_f64()?, a[1].as_f64()?, a[2].as_f64()?);
                if !(lo <= hi) {
                    return Err(EvalFault::Runtime(format!(
                        "clamp bounds are inverted ({lo} > {hi})"
                    )));
                }
                Ok(Value::Num(x.clamp(lo, hi)))
            }
            "lerp" => {
                let t = a[2].as_f64()?;
                match (a[0], a[1]) {
                    (Value::Vec3(x), Value::Vec3(y)) => Ok(Value::Vec3(x + (y - x) * t)),
                    (x, y) => {
                        let (x, y) = (x.as_f64()?, y.as_f64()?);
                        Ok(Value::Num(x + (y - x) * t))
                    }
                }
            }
            other => Err(EvalFault::Runtime(format!(
                "built-in '{other}' has no implementation"
            ))),
        }
    }
}

fn assign_fault(e: AssignError, name: &str, offset: usize) -> EvalFault {
    match e {
        AssignError::Undefined => EvalFault::UndefinedIdentifier {
            name: name.to_owned(),
            offset,
        },
        AssignError::Const => EvalFault::Runtime(format!("cannot assign to constant '{name}'")),
    }
}

fn component_of(v: Vec3, member: &str) -> Result<f64, EvalFault> {
    match member {
        "x" => Ok(v.x),
        "y" => Ok(v.y),
        "z" => Ok(v.z),
        other => Err(EvalFault::type_error(format!("vec has no member '{other}'"))),
    }
}

fn compound(op: AssignOp, old: Value, rhs: Value) -> Result<Value, EvalFault> {
    let bop = match op {
        AssignOp::Set => return Ok(rhs),
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
    };
    binary(bop, old, rhs)
}

pub(crate) fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalFault> {
    use Value::{Bool, Num, Vec3 as V};
    let mismatch = || {
        EvalFault::type_error(format!(
            "unsupported operands for {op:?}: {} and {}",
            l.type_name(),
            r.type_name()
        ))
    };
    Ok(match op {
        BinaryOp::Add => match (l, r) {
            (Num(a), Num(b)) => Num(a + b),
            (V(a), V(b)) => V(a + b),
            _ => return Err(mismatch()),
        },
        BinaryOp::Sub => match (l, r) {
            (Num(a), Num(b)) => Num(a - b),
            (V(a), V(b)) => V(a - b),
            _ => return Err(mismatch()),
        },
        BinaryOp::Mul => match (l, r) {
            (Num(a), Num(b)) => Num(a * b),
            (V(a), Num(b)) | (Num(b), V(a)) => V(a * b),
            (V(a), V(b)) => V(a * b),
            _ => return Err(mismatch()),
        },
        BinaryOp::Div => match (l, r) {
            (Num(a), Num(b)) => Num(a / b),
            (V(a), Num(b)) => V(a / b),
            _ => return Err(mismatch()),
        },
        BinaryOp::Mod => match (l, r) {
            (Num(a), Num(b)) => Num(a % b),
            _ => return Err(mismatch()),
        },
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (Num(a), Num(b)) = (l, r) else {
                return Err(mismatch());
            };
            Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            })
        }
        BinaryOp::Eq => Bool(loose_eq(l, r)),
        BinaryOp::Ne => Bool(!loose_eq(l, r)),
        BinaryOp::StrictEq => Bool(strict_eq(l, r)),
        BinaryOp::StrictNe => Bool(!strict_eq(l, r)),
        BinaryOp::And => Bool(l.truthy()? && r.truthy()?),
        BinaryOp::Or => Bool(l.truthy()? || r.truthy()?),
    })
}

fn strict_eq(l: Value, r: Value) -> bool {
    match (l, r) {
        (Value::Num(a), Value::Num(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Vec3(a), Value::Vec3(b)) => a == b,
        (Value::Unit, Value::Unit) => true,
        _ => false,
    }
}

/// Loose equality additionally compares bools with numbers (`true == 1`).
fn loose_eq(l: Value, r: Value) -> bool {
    match (l, r) {
        (Value::Bool(b), Value::Num(n)) | (Value::Num(n), Value::Bool(b)) => {
            n == if b { 1.0 } else { 0.0 }
        }
        _ => strict_eq(l, r),
    }
}

/// Run a parsed script in a fresh local layer; locals are discarded afterwards.
pub(crate) fn execute(
    script: &Script,
    scope: &mut Scope,
    state: Option<&mut ActionState>,
    effects: &mut Effects,
) -> Result<Value, EvalFault> {
    let mark = scope.locals_depth();
    scope.push_locals();
    let out = Interp {
        scope: &mut *scope,
        state,
        effects,
    }
    .run(script);
    scope.truncate_locals(mark);
    out
}
