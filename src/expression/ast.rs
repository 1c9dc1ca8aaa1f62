/// A parsed script: statements in source order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Script {
    pub(crate) stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Decl {
        keyword: DeclKind,
        name: String,
        value: Expr,
        offset: usize,
    },
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
        offset: usize,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        /// `else if` chains nest as a single `If` here.
        otherwise: Vec<Stmt>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Let,
    Var,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AssignTarget {
    Name(String),
    /// `name.x`, `name.y`, `name.z`.
    Component { name: String, component: String },
    /// `this.name`: always the global, never a local.
    SelfMember(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Num {
        value: f64,
        is_float: bool,
    },
    Bool(bool),
    Ident {
        name: String,
        offset: usize,
    },
    /// Qualified-self member access: `this.name`.
    SelfMember {
        name: String,
        offset: usize,
    },
    Member {
        base: Box<Expr>,
        member: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        offset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Script {
    /// Visit every expression node in the script, parents before children, in source order.
    pub(crate) fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        fn stmt(s: &Stmt, f: &mut impl FnMut(&Expr)) {
            match s {
                Stmt::Decl { value, .. } | Stmt::Assign { value, .. } => expr(value, f),
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    expr(cond, f);
                    for s in then.iter().chain(otherwise) {
                        stmt(s, f);
                    }
                }
                Stmt::Expr(e) => expr(e, f),
            }
        }
        fn expr(e: &Expr, f: &mut impl FnMut(&Expr)) {
            f(e);
            match e {
                Expr::Num { .. } | Expr::Bool(_) | Expr::Ident { .. } | Expr::SelfMember { .. } => {
                }
                Expr::Member { base, .. } => expr(base, f),
                Expr::Unary { expr: inner, .. } => expr(inner, f),
                Expr::Binary { left, right, .. } => {
                    expr(left, f);
                    expr(right, f);
                }
                Expr::Ternary {
                    cond,
                    then,
                    otherwise,
                } => {
                    expr(cond, f);
                    expr(then, f);
                    expr(otherwise, f);
                }
                Expr::Call { args, .. } => {
                    for a in args {
                        expr(a, f);
                    }
                }
            }
        }
        for s in &self.stmts {
            stmt(s, f);
        }
    }

    /// Visit every call expression in the script, in source order.
    pub(crate) fn visit_calls(&self, f: &mut impl FnMut(&str, &[Expr])) {
        self.visit_exprs(&mut |e| {
            if let Expr::Call { func, args, .. } = e {
                f(func, args);
            }
        });
    }

    /// Whether any bare identifier in the script is one of `names`.
    pub(crate) fn reads_any(&self, names: &[&str]) -> bool {
        let mut found = false;
        self.visit_exprs(&mut |e| {
            if let Expr::Ident { name, .. } = e {
                found |= names.contains(&name.as_str());
            }
        });
        found
    }
}
