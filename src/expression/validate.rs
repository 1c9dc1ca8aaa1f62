//! Generation-time validation.
//!
//! Stricter than preview: a generated class has no live object to fall back on, so
//! every identifier must resolve statically against the scope the script would see.

use crate::eval::scope::ScopeShape;
use crate::expression::ast::{AssignTarget, BinaryOp, DeclKind, Expr, Script, Stmt, UnaryOp};
use crate::expression::error::EvalFault;
use crate::expression::interp::{
    FN_VEC3, GROWTH_BUILTINS, NAME_AXIS, NAME_POINT, ROTATION_BUILTINS, builtin_arity,
};
use crate::expression::parser::parse_script;
use std::collections::BTreeMap;
use std::fmt;

/// Particle attribute locals seeded into controller scripts.
pub const CONTROLLER_LOCALS: [&str; 4] = ["color", "size", "alpha", "visible"];

/// Where a script is attached, which decides its extra names and allowed built-ins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptContext {
    /// Conditions, initializers, action operands, global expressions.
    Expression,
    /// Growth scripts: `addSingle` / `addMultiple` allowed.
    Growth,
    /// Script display actions: rotations plus `point` / `axis`.
    Action,
    /// Controller scripts: `color`, `size`, `alpha`, `visible`.
    Controller,
}

impl ScriptContext {
    pub fn context_names(self) -> &'static [&'static str] {
        match self {
            Self::Action => &[NAME_POINT, NAME_AXIS],
            Self::Controller => &CONTROLLER_LOCALS,
            Self::Expression | Self::Growth => &[],
        }
    }
}

impl fmt::Display for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expression => "expression",
            Self::Growth => "growth",
            Self::Action => "action",
            Self::Controller => "controller",
        })
    }
}

/// Syntax check plus identifier resolution against `shape` in `ctx`.
pub fn validate_for_generation(
    source: &str,
    shape: &ScopeShape,
    ctx: ScriptContext,
) -> Result<(), EvalFault> {
    let script = parse_script(source)?;
    validate_script(&script, shape, ctx)
}

pub(crate) fn validate_script(
    script: &Script,
    shape: &ScopeShape,
    ctx: ScriptContext,
) -> Result<(), EvalFault> {
    let mut v = Validator {
        shape,
        ctx,
        blocks: vec![BTreeMap::new()],
    };
    v.block(&script.stmts)
}

struct Validator<'a> {
    shape: &'a ScopeShape,
    ctx: ScriptContext,
    /// Declared locals per block, with constness.
    blocks: Vec<BTreeMap<String, bool>>,
}

/// Operand type where it is evident from the expression alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StaticType {
    Num,
    Bool,
    Vec,
}

impl StaticType {
    fn name(self) -> &'static str {
        match self {
            Self::Num => "number",
            Self::Bool => "bool",
            Self::Vec => "vec",
        }
    }
}

impl Validator<'_> {
    fn block(&mut self, stmts: &[Stmt]) -> Result<(), EvalFault> {
        for s in stmts {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn nested(&mut self, stmts: &[Stmt]) -> Result<(), EvalFault> {
        self.blocks.push(BTreeMap::new());
        let out = self.block(stmts);
        self.blocks.pop();
        out
    }

    fn local(&self, name: &str) -> Option<bool> {
        self.blocks.iter().rev().find_map(|b| b.get(name).copied())
    }

    fn stmt(&mut self, s: &Stmt) -> Result<(), EvalFault> {
        match s {
            Stmt::Decl {
                keyword,
                name,
                value,
                ..
            } => {
                self.expr(value)?;
                let top = self.blocks.len() - 1;
                if self.blocks[top].contains_key(name) {
                    return Err(EvalFault::Runtime(format!(
                        "'{name}' is already declared in this block"
                    )));
                }
                self.blocks[top].insert(name.clone(), *keyword == DeclKind::Const);
                Ok(())
            }
            Stmt::Assign {
                target,
                value,
                offset,
                ..
            } => {
                self.expr(value)?;
                match target {
                    AssignTarget::Name(name) | AssignTarget::Component { name, .. } => {
                        self.check_writable(name, *offset)
                    }
                    AssignTarget::SelfMember(name) => self.check_global_writable(name, *offset),
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                self.nested(then)?;
                self.nested(otherwise)
            }
            Stmt::Expr(e) => self.expr(e),
        }
    }

    fn check_writable(&self, name: &str, offset: usize) -> Result<(), EvalFault> {
        match self.local(name) {
            Some(true) => Err(EvalFault::Runtime(format!(
                "cannot assign to constant '{name}'"
            ))),
            Some(false) => Ok(()),
            None if self.ctx.context_names().contains(&name) => Ok(()),
            None if self.shape.is_global(name) => self.check_global_writable(name, offset),
            None if self.shape.contains(name) => Err(EvalFault::Runtime(format!(
                "'{name}' is read-only"
            ))),
            None => Err(EvalFault::UndefinedIdentifier {
                name: name.to_owned(),
                offset,
            }),
        }
    }

    fn check_global_writable(&self, name: &str, offset: usize) -> Result<(), EvalFault> {
        if !self.shape.is_global(name) {
            return Err(EvalFault::UndefinedIdentifier {
                name: format!("this.{name}"),
                offset,
            });
        }
        if self.shape.is_const_global(name) {
            return Err(EvalFault::Runtime(format!(
                "cannot assign to constant '{name}'"
            )));
        }
        Ok(())
    }

    /// Kotlin has no equality between a Boolean and a Double, so mixed operands
    /// that preview would coerce are rejected here.
    fn check_comparable(&self, left: &Expr, right: &Expr) -> Result<(), EvalFault> {
        match (self.static_type(left), self.static_type(right)) {
            (Some(l), Some(r)) if l != r => Err(EvalFault::type_error(format!(
                "cannot compare {} with {} in generated code",
                l.name(),
                r.name()
            ))),
            _ => Ok(()),
        }
    }

    fn static_type(&self, e: &Expr) -> Option<StaticType> {
        match e {
            Expr::Num { .. } => Some(StaticType::Num),
            Expr::Bool(_) => Some(StaticType::Bool),
            Expr::Ident { name, .. }
                if self.local(name).is_none()
                    && !self.shape.is_global(name)
                    && !self.ctx.context_names().contains(&name.as_str()) =>
            {
                if self.shape.is_base(name) || name.starts_with("shapeOrder") {
                    Some(StaticType::Num)
                } else if name.starts_with("shapeRel") {
                    Some(StaticType::Vec)
                } else {
                    None
                }
            }
            Expr::Member { .. } => Some(StaticType::Num),
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => Some(StaticType::Bool),
            Expr::Unary { expr, .. } => self.static_type(expr),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    match (self.static_type(left), self.static_type(right)) {
                        (Some(StaticType::Num), Some(StaticType::Num)) => Some(StaticType::Num),
                        (Some(StaticType::Vec), _) | (_, Some(StaticType::Vec)) => {
                            Some(StaticType::Vec)
                        }
                        _ => None,
                    }
                }
                _ => Some(StaticType::Bool),
            },
            Expr::Call { func, .. } => match func.as_str() {
                f if f == FN_VEC3 || f == "normalize" => Some(StaticType::Vec),
                "lerp" => None,
                f if ROTATION_BUILTINS.contains(&f) || GROWTH_BUILTINS.contains(&f) => None,
                _ => Some(StaticType::Num),
            },
            Expr::Ident { .. } | Expr::SelfMember { .. } | Expr::Ternary { .. } => None,
        }
    }

    fn expr(&self, e: &Expr) -> Result<(), EvalFault> {
        match e {
            Expr::Num { .. } | Expr::Bool(_) => Ok(()),
            Expr::Ident { name, offset } => {
                if self.local(name).is_some()
                    || self.ctx.context_names().contains(&name.as_str())
                    || self.shape.contains(name)
                {
                    Ok(())
                } else {
                    Err(EvalFault::UndefinedIdentifier {
                        name: name.clone(),
                        offset: *offset,
                    })
                }
            }
            Expr::SelfMember { name, offset } => {
                if self.shape.is_global(name) {
                    Ok(())
                } else {
                    Err(EvalFault::UndefinedIdentifier {
                        name: format!("this.{name}"),
                        offset: *offset,
                    })
                }
            }
            Expr::Member { base, member } => {
                if !matches!(member.as_str(), "x" | "y" | "z") {
                    return Err(EvalFault::type_error(format!(
                        "vec has no member '{member}'"
                    )));
                }
                self.expr(base)
            }
            Expr::Unary { expr, .. } => self.expr(expr),
            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                if matches!(
                    op,
                    BinaryOp::Eq | BinaryOp::Ne | BinaryOp::StrictEq | BinaryOp::StrictNe
                ) {
                    self.check_comparable(left, right)?;
                }
                Ok(())
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                self.expr(then)?;
                self.expr(otherwise)
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
                let f = func.as_str();
                if ROTATION_BUILTINS.contains(&f) && self.ctx != ScriptContext::Action {
                    return Err(EvalFault::Runtime(format!(
                        "'{f}' is only available in action scripts, not {} scripts",
                        self.ctx
                    )));
                }
                if GROWTH_BUILTINS.contains(&f) && self.ctx != ScriptContext::Growth {
                    return Err(EvalFault::Runtime(format!(
                        "'{f}' is only available in growth scripts, not {} scripts",
                        self.ctx
                    )));
                }
                for a in args {
                    self.expr(a)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/expression/validate.rs"]
mod tests;
