use crate::expression::ast::{
    AssignOp, AssignTarget, BinaryOp, DeclKind, Expr, Script, Stmt, UnaryOp,
};
use crate::expression::error::ExprError;
use crate::expression::lexer::{Span, Token, TokenKind, lex};

/// Parse a full script (statements separated by `;` or line breaks).
pub(crate) fn parse_script(src: &str) -> Result<Script, ExprError> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let stmts = p.parse_block_body(&TokenKind::Eof)?;
    p.expect(TokenKind::Eof)?;
    Ok(Script { stmts })
}

/// Parse a single expression (no statements).
#[cfg(test)]
pub(crate) fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let tokens = lex(src.trim())?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_ternary()?;
    p.expect(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::new(
                self.span().start,
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, usize), ExprError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Ident(s) => Ok((s, t.span.start)),
            other => Err(ExprError::new(
                t.span.start,
                format!("expected {what}, found {other:?}"),
            )),
        }
    }

    fn parse_block_body(&mut self, end: &TokenKind) -> Result<Vec<Stmt>, ExprError> {
        let mut stmts = Vec::new();
        loop {
            while self.consume(TokenKind::Semicolon) {}
            if &self.peek().kind == end || self.peek().kind == TokenKind::Eof {
                return Ok(stmts);
            }
            let (stmt, needs_terminator) = self.parse_stmt()?;
            stmts.push(stmt);
            if needs_terminator && !self.consume(TokenKind::Semicolon) {
                let t = self.peek();
                let ok = t.newline_before || &t.kind == end || t.kind == TokenKind::RBrace;
                if !ok {
                    return Err(ExprError::new(
                        t.span.start,
                        format!("expected ';' or line break, found {:?}", t.kind),
                    ));
                }
            }
        }
    }

    fn parse_body(&mut self) -> Result<Vec<Stmt>, ExprError> {
        if self.consume(TokenKind::LBrace) {
            let stmts = self.parse_block_body(&TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            Ok(stmts)
        } else {
            let (stmt, _) = self.parse_stmt()?;
            self.consume(TokenKind::Semicolon);
            Ok(vec![stmt])
        }
    }

    fn parse_stmt(&mut self) -> Result<(Stmt, bool), ExprError> {
        let offset = self.span().start;
        let keyword = match self.peek().kind {
            TokenKind::Let => Some(DeclKind::Let),
            TokenKind::Var => Some(DeclKind::Var),
            TokenKind::Const => Some(DeclKind::Const),
            _ => None,
        };
        if let Some(keyword) = keyword {
            self.bump();
            let (name, _) = self.expect_ident("variable name")?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_ternary()?;
            return Ok((
                Stmt::Decl {
                    keyword,
                    name,
                    value,
                    offset,
                },
                true,
            ));
        }

        if self.consume(TokenKind::If) {
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_ternary()?;
            self.expect(TokenKind::RParen)?;
            let then = self.parse_body()?;
            let otherwise = if self.consume(TokenKind::Else) {
                if self.peek().kind == TokenKind::If {
                    let (stmt, _) = self.parse_stmt()?;
                    vec![stmt]
                } else {
                    self.parse_body()?
                }
            } else {
                Vec::new()
            };
            return Ok((
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                },
                false,
            ));
        }

        let e = self.parse_ternary()?;
        let op = match self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Set),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };
        let Some(op) = op else {
            return Ok((Stmt::Expr(e), true));
        };
        self.bump();
        let target = assign_target(e, offset)?;
        let value = self.parse_ternary()?;
        Ok((
            Stmt::Assign {
                target,
                op,
                value,
                offset,
            },
            true,
        ))
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if !self.consume(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_and()?;
        while self.consume(TokenKind::OrOr) {
            let r = self.parse_and()?;
            e = binary(BinaryOp::Or, e, r);
        }
        Ok(e)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_equality()?;
        while self.consume(TokenKind::AndAnd) {
            let r = self.parse_equality()?;
            e = binary(BinaryOp::And, e, r);
        }
        Ok(e)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                TokenKind::StrictEq => BinaryOp::StrictEq,
                TokenKind::StrictNe => BinaryOp::StrictNe,
                _ => break,
            };
            self.bump();
            let r = self.parse_comparison()?;
            e = binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.bump();
            let r = self.parse_term()?;
            e = binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let r = self.parse_factor()?;
            e = binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let r = self.parse_unary()?;
            e = binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.consume(TokenKind::Minus) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(e),
            });
        }
        if self.consume(TokenKind::Plus) {
            return self.parse_unary();
        }
        if self.consume(TokenKind::Bang) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(e),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_primary()?;

        loop {
            if self.consume(TokenKind::Dot) {
                let (member, _) = self.expect_ident("member name after '.'")?;
                e = Expr::Member {
                    base: Box::new(e),
                    member,
                };
                continue;
            }

            if self.peek().kind == TokenKind::LParen {
                let call_offset = self.span().start;
                let (func, offset) = match e {
                    Expr::Ident { name, offset } => (name, offset),
                    _ => {
                        return Err(ExprError::new(
                            call_offset,
                            "call target must be a single identifier",
                        ));
                    }
                };
                self.bump();
                let args = self.parse_args()?;
                e = Expr::Call { func, args, offset };
                continue;
            }

            break;
        }

        Ok(e)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.consume(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_ternary()?);
            if self.consume(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen)?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Number { value, is_float } => Ok(Expr::Num { value, is_float }),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Ident(name) => Ok(Expr::Ident {
                name,
                offset: t.span.start,
            }),
            TokenKind::This => {
                self.expect(TokenKind::Dot)?;
                let (name, _) = self.expect_ident("member name after 'this.'")?;
                Ok(Expr::SelfMember {
                    name,
                    offset: t.span.start,
                })
            }
            TokenKind::LParen => {
                let e = self.parse_ternary()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(ExprError::new(
                t.span.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn assign_target(e: Expr, offset: usize) -> Result<AssignTarget, ExprError> {
    match e {
        Expr::Ident { name, .. } => Ok(AssignTarget::Name(name)),
        Expr::SelfMember { name, .. } => Ok(AssignTarget::SelfMember(name)),
        Expr::Member { base, member } => match *base {
            Expr::Ident { name, .. } if matches!(member.as_str(), "x" | "y" | "z") => {
                Ok(AssignTarget::Component {
                    name,
                    component: member,
                })
            }
            _ => Err(ExprError::new(
                offset,
                "only name.x/y/z members can be assigned",
            )),
        },
        _ => Err(ExprError::new(offset, "invalid assignment target")),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/expression/parser.rs"]
mod tests;
