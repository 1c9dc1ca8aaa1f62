//! Script AST -> Kotlin text.
//!
//! Only a fixed idiom list changes spelling: declaration keywords, strict
//! equality, ternaries, numeric literal suffixes and qualified-self access.
//! Everything else is printed back as written.

use crate::compile::naming::{GlobalNames, sanitize_identifier};
use crate::eval::scope::TIME_VARS;
use crate::expression::ast::{
    AssignOp, AssignTarget, BinaryOp, DeclKind, Expr, Script, Stmt, UnaryOp,
};
use crate::expression::interp::FN_VEC3;
use crate::expression::validate::ScriptContext;
use std::collections::BTreeSet;

/// Indentation unit inside emitted blocks.
pub(crate) const INDENT: &str = "    ";

/// How numeric literals are spelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NumberMode {
    /// Integers as written, fractional literals with an `F` suffix.
    Float,
    /// Every literal as a Double (`1` -> `1.0`).
    Double,
}

// Kotlin binding strength, loosest first.
const P_IF: u8 = 0;
const P_OR: u8 = 1;
const P_AND: u8 = 2;
const P_EQ: u8 = 3;
const P_CMP: u8 = 4;
const P_ADD: u8 = 5;
const P_MUL: u8 = 6;
const P_PREFIX: u8 = 7;
const P_POSTFIX: u8 = 8;
const P_ATOM: u8 = 9;

/// Deterministic Kotlin spelling of a Double: `-0` prints as `0.0`, and a decimal
/// point is always present.
pub(crate) fn format_double(v: f64) -> String {
    if !v.is_finite() {
        return "0.0".to_owned();
    }
    let v = if v == 0.0 { 0.0 } else { v };
    let mut s = format!("{v}");
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}

fn format_int(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format_double(v)
    }
}

fn binary_op(op: BinaryOp) -> (&'static str, u8) {
    match op {
        BinaryOp::Or => ("||", P_OR),
        BinaryOp::And => ("&&", P_AND),
        BinaryOp::Eq | BinaryOp::StrictEq => ("==", P_EQ),
        BinaryOp::Ne | BinaryOp::StrictNe => ("!=", P_EQ),
        BinaryOp::Lt => ("<", P_CMP),
        BinaryOp::Le => ("<=", P_CMP),
        BinaryOp::Gt => (">", P_CMP),
        BinaryOp::Ge => (">=", P_CMP),
        BinaryOp::Add => ("+", P_ADD),
        BinaryOp::Sub => ("-", P_ADD),
        BinaryOp::Mul => ("*", P_MUL),
        BinaryOp::Div => ("/", P_MUL),
        BinaryOp::Mod => ("%", P_MUL),
    }
}

fn assign_op(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Set => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
    }
}

fn is_depth_var(name: &str) -> bool {
    ["shapeRel", "shapeOrder"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Prints one validated script. Identifier resolution mirrors the scope chain:
/// locals, then context names, then depth vars, then globals, then base vars.
pub(crate) struct Transpiler<'a> {
    names: &'a GlobalNames,
    class_name: &'a str,
    ctx: ScriptContext,
    /// Declared locals per block (source names).
    blocks: Vec<BTreeSet<String>>,
    /// Globals read or written, by source name.
    referenced: BTreeSet<String>,
    reads_time: bool,
}

impl<'a> Transpiler<'a> {
    pub(crate) fn new(names: &'a GlobalNames, class_name: &'a str, ctx: ScriptContext) -> Self {
        Self {
            names,
            class_name,
            ctx,
            blocks: vec![BTreeSet::new()],
            referenced: BTreeSet::new(),
            reads_time: false,
        }
    }

    /// Source names of every global the printed scripts touched.
    pub(crate) fn referenced_globals(&self) -> &BTreeSet<String> {
        &self.referenced
    }

    /// Whether the printed scripts read `age`, `tick` or `elapsedTickCounter`.
    pub(crate) fn reads_time(&self) -> bool {
        self.reads_time
    }

    /// The script as a value: one line for a bare expression, otherwise a
    /// `run { ... }` block whose last statement is the value.
    pub(crate) fn value(&mut self, script: &Script, mode: NumberMode) -> Vec<String> {
        if let [Stmt::Expr(e)] = script.stmts.as_slice() {
            return vec![self.expr(e, P_IF, mode)];
        }
        let mut lines = vec!["run {".to_owned()];
        lines.extend(self.block(&script.stmts, mode).into_iter().map(indent));
        lines.push("}".to_owned());
        lines
    }

    /// The script as statement lines, for callback bodies.
    pub(crate) fn body(&mut self, script: &Script, mode: NumberMode) -> Vec<String> {
        self.block(&script.stmts, mode)
    }

    fn block(&mut self, stmts: &[Stmt], mode: NumberMode) -> Vec<String> {
        let mut out = Vec::new();
        for s in stmts {
            self.stmt(s, mode, &mut out);
        }
        out
    }

    fn nested(&mut self, stmts: &[Stmt], mode: NumberMode) -> Vec<String> {
        self.blocks.push(BTreeSet::new());
        let lines = self.block(stmts, mode);
        self.blocks.pop();
        lines.into_iter().map(indent).collect()
    }

    fn is_local(&self, name: &str) -> bool {
        self.blocks.iter().any(|b| b.contains(name))
    }

    /// A Kotlin local with this spelling would hide the class member.
    fn kotlin_local_shadows(&self, kotlin_name: &str) -> bool {
        self.blocks
            .iter()
            .flatten()
            .any(|local| sanitize_identifier(local) == kotlin_name)
    }

    fn self_member(&mut self, name: &str) -> String {
        self.referenced.insert(name.to_owned());
        let renamed = self
            .names
            .get(name)
            .map_or_else(|| sanitize_identifier(name), str::to_owned);
        format!("this@{}.{renamed}", self.class_name)
    }

    fn ident(&mut self, name: &str) -> String {
        if self.is_local(name) {
            return sanitize_identifier(name);
        }
        if self.ctx.context_names().contains(&name) || is_depth_var(name) {
            return name.to_owned();
        }
        let names = self.names;
        if let Some(renamed) = names.get(name) {
            if self.kotlin_local_shadows(renamed) {
                return self.self_member(name);
            }
            self.referenced.insert(name.to_owned());
            return renamed.to_owned();
        }
        self.reads_time |= TIME_VARS.contains(&name);
        name.to_owned()
    }

    fn stmt(&mut self, s: &Stmt, mode: NumberMode, out: &mut Vec<String>) {
        match s {
            Stmt::Decl {
                keyword,
                name,
                value,
                ..
            } => {
                let rhs = self.expr(value, P_IF, mode);
                let kw = match keyword {
                    DeclKind::Let | DeclKind::Var => "var",
                    DeclKind::Const => "val",
                };
                if let Some(top) = self.blocks.last_mut() {
                    top.insert(name.clone());
                }
                out.push(format!("{kw} {} = {rhs}", sanitize_identifier(name)));
            }
            Stmt::Assign {
                target, op, value, ..
            } => {
                let rhs = self.expr(value, P_IF, mode);
                let lhs = match target {
                    AssignTarget::Name(name) => self.ident(name),
                    AssignTarget::Component { name, component } => {
                        format!("{}.{component}", self.ident(name))
                    }
                    AssignTarget::SelfMember(name) => self.self_member(name),
                };
                out.push(format!("{lhs} {} {rhs}", assign_op(*op)));
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let c = self.expr(cond, P_IF, mode);
                out.push(format!("if ({c}) {{"));
                self.if_tail(then, otherwise, mode, out);
            }
            Stmt::Expr(e) => {
                let line = self.expr(e, P_IF, mode);
                out.push(line);
            }
        }
    }

    fn if_tail(&mut self, then: &[Stmt], otherwise: &[Stmt], mode: NumberMode, out: &mut Vec<String>) {
        out.extend(self.nested(then, mode));
        match otherwise {
            [] => out.push("}".to_owned()),
            [
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                },
            ] => {
                let c = self.expr(cond, P_IF, mode);
                out.push(format!("}} else if ({c}) {{"));
                self.if_tail(then, otherwise, mode, out);
            }
            _ => {
                out.push("} else {".to_owned());
                out.extend(self.nested(otherwise, mode));
                out.push("}".to_owned());
            }
        }
    }

    fn expr(&mut self, e: &Expr, min: u8, mode: NumberMode) -> String {
        let (text, prec) = self.expr_prec(e, mode);
        if prec < min { format!("({text})") } else { text }
    }

    fn expr_prec(&mut self, e: &Expr, mode: NumberMode) -> (String, u8) {
        match e {
            Expr::Num { value, is_float } => {
                let text = match mode {
                    NumberMode::Double => format_double(*value),
                    NumberMode::Float if *is_float => format!("{}F", format_double(*value)),
                    NumberMode::Float => format_int(*value),
                };
                (text, P_ATOM)
            }
            Expr::Bool(b) => (b.to_string(), P_ATOM),
            Expr::Ident { name, .. } => (self.ident(name), P_ATOM),
            Expr::SelfMember { name, .. } => (self.self_member(name), P_POSTFIX),
            Expr::Member { base, member } => {
                let b = self.expr(base, P_POSTFIX, mode);
                (format!("{b}.{member}"), P_POSTFIX)
            }
            Expr::Unary { op, expr } => {
                let inner = self.expr(expr, P_PREFIX, mode);
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                // `--x` and `!!x` are different tokens in Kotlin.
                let inner = if inner.starts_with(sym) {
                    format!("({inner})")
                } else {
                    inner
                };
                (format!("{sym}{inner}"), P_PREFIX)
            }
            Expr::Binary { op, left, right } => {
                let (sym, p) = binary_op(*op);
                // Equality and comparison do not chain.
                let left_min = if p == P_EQ || p == P_CMP { p + 1 } else { p };
                let l = self.expr(left, left_min, mode);
                let r = self.expr(right, p + 1, mode);
                (format!("{l} {sym} {r}"), p)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let c = self.expr(cond, P_IF, mode);
                let t = self.expr(then, P_IF + 1, mode);
                let o = self.expr(otherwise, P_IF, mode);
                (format!("if ({c}) {t} else {o}"), P_IF)
            }
            Expr::Call { func, args, .. } => {
                let arg_mode = if func == FN_VEC3 { NumberMode::Double } else { mode };
                let args: Vec<String> = args.iter().map(|a| self.expr(a, P_IF, arg_mode)).collect();
                (format!("{func}({})", args.join(", ")), P_POSTFIX)
            }
        }
    }
}

pub(crate) fn indent(line: String) -> String {
    if line.is_empty() {
        line
    } else {
        format!("{INDENT}{line}")
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/transpile.rs"]
mod tests;
