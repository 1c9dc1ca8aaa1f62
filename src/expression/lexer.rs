use crate::expression::error::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
    /// A line break separates this token from the previous one (statement terminator).
    pub(crate) newline_before: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    /// `is_float` is set for literals written with a fraction, exponent or float suffix.
    Number {
        value: f64,
        is_float: bool,
    },
    True,
    False,
    Let,
    Var,
    Const,
    If,
    Else,
    This,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Bang,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    EqEq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,

    AndAnd,
    OrOr,

    Question,
    Colon,

    Eof,
}

pub(crate) fn lex(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let mut newline_before = false;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\n' {
            newline_before = true;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments: `// ...` and `/* ... */`.
        if c == '/' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'/' => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'*' => {
                    let start = i;
                    i += 2;
                    loop {
                        if i + 1 >= bytes.len() {
                            return Err(ExprError::new(start, "unterminated block comment"));
                        }
                        if bytes[i] == b'\n' {
                            newline_before = true;
                        }
                        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                    continue;
                }
                _ => {}
            }
        }

        let start = i;
        let push = |out: &mut Vec<Token>, kind: TokenKind, end: usize| {
            out.push(Token {
                kind,
                span: Span { start, end },
                newline_before,
            });
        };

        // Number: [0-9]+(.[0-9]+)?([eE][+-]?[0-9]+)?[a-zA-Z]* or .[0-9]+...
        if c.is_ascii_digit()
            || (c == '.' && i + 1 < bytes.len() && (bytes[i + 1] as char).is_ascii_digit())
        {
            let mut is_float = false;
            if c == '.' {
                is_float = true;
                i += 1;
            } else {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                // fractional part
                if i < bytes.len()
                    && (bytes[i] as char) == '.'
                    && i + 1 < bytes.len()
                    && (bytes[i + 1] as char).is_ascii_digit()
                {
                    is_float = true;
                    i += 1;
                }
            }

            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }

            // exponent
            if i + 1 < bytes.len()
                && matches!(bytes[i] as char, 'e' | 'E')
                && (bytes[i + 1].is_ascii_digit()
                    || (matches!(bytes[i + 1], b'+' | b'-')
                        && i + 2 < bytes.len()
                        && bytes[i + 2].is_ascii_digit()))
            {
                is_float = true;
                i += 2;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
            }

            let digits_end = i;
            // Unit suffix letters are ignored; float suffixes mark the literal as float.
            while i < bytes.len() && (bytes[i] as char).is_ascii_alphabetic() {
                if matches!(bytes[i], b'f' | b'F' | b'd' | b'D') {
                    is_float = true;
                }
                i += 1;
            }

            let s = &input[start..digits_end];
            let value: f64 = s
                .parse()
                .map_err(|_| ExprError::new(start, "invalid number"))?;
            push(&mut out, TokenKind::Number { value, is_float }, i);
            newline_before = false;
            continue;
        }

        // Ident / keyword
        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            i += 1;
            while i < bytes.len() {
                let ch = bytes[i] as char;
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' {
                    i += 1;
                } else {
                    break;
                }
            }
            let s = &input[start..i];
            let kind = match s {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "let" => TokenKind::Let,
                "var" => TokenKind::Var,
                "const" => TokenKind::Const,
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "this" => TokenKind::This,
                _ => TokenKind::Ident(s.to_owned()),
            };
            push(&mut out, kind, i);
            newline_before = false;
            continue;
        }

        // Three-char operators
        if i + 2 < bytes.len() {
            let kind = match &input[i..i + 3] {
                "===" => Some(TokenKind::StrictEq),
                "!==" => Some(TokenKind::StrictNe),
                _ => None,
            };
            if let Some(kind) = kind {
                i += 3;
                push(&mut out, kind, i);
                newline_before = false;
                continue;
            }
        }

        // Two-char operators
        if i + 1 < bytes.len() {
            let kind = match &input[i..i + 2] {
                "&&" => Some(TokenKind::AndAnd),
                "||" => Some(TokenKind::OrOr),
                "==" => Some(TokenKind::EqEq),
                "!=" => Some(TokenKind::Ne),
                "<=" => Some(TokenKind::Le),
                ">=" => Some(TokenKind::Ge),
                "+=" => Some(TokenKind::PlusAssign),
                "-=" => Some(TokenKind::MinusAssign),
                "*=" => Some(TokenKind::StarAssign),
                "/=" => Some(TokenKind::SlashAssign),
                _ => None,
            };
            if let Some(kind) = kind {
                i += 2;
                push(&mut out, kind, i);
                newline_before = false;
                continue;
            }
        }

        // Single-char tokens
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => TokenKind::Bang,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            _ => {
                return Err(ExprError::new(start, format!("unexpected character '{c}'")));
            }
        };
        i += 1;
        push(&mut out, kind, i);
        newline_before = false;
    }

    out.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: input.len(),
            end: input.len(),
        },
        newline_before: true,
    });

    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/expression/lexer.rs"]
mod tests;
