//! Lexer and recursive-descent parser for the script language.

use super::ScriptError;

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Assign { name: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Attr {
        object: Box<Expr>,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Not,
    LParen,
    RParen,
    Comma,
    Dot,
    Newline,
    Semi,
    Eof,
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Int(v) => format!("number {}", v),
        Tok::Float(v) => format!("number {}", v),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Ident(n) => format!("'{}'", n),
        Tok::True => "'true'".to_string(),
        Tok::False => "'false'".to_string(),
        Tok::Null => "'null'".to_string(),
        Tok::Plus => "'+'".to_string(),
        Tok::Minus => "'-'".to_string(),
        Tok::Star => "'*'".to_string(),
        Tok::Slash => "'/'".to_string(),
        Tok::Percent => "'%'".to_string(),
        Tok::EqEq => "'=='".to_string(),
        Tok::Ne => "'!='".to_string(),
        Tok::Lt => "'<'".to_string(),
        Tok::Le => "'<='".to_string(),
        Tok::Gt => "'>'".to_string(),
        Tok::Ge => "'>='".to_string(),
        Tok::Assign => "'='".to_string(),
        Tok::Not => "'!'".to_string(),
        Tok::LParen => "'('".to_string(),
        Tok::RParen => "')'".to_string(),
        Tok::Comma => "','".to_string(),
        Tok::Dot => "'.'".to_string(),
        Tok::Newline => "end of line".to_string(),
        Tok::Semi => "';'".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

fn lex(src: &str) -> Result<Vec<Tok>, ScriptError> {
    let mut toks = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' => {
                chars.next();
                toks.push(Tok::Newline);
            }
            '#' => {
                // comment to end of line
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ';' => {
                chars.next();
                toks.push(Tok::Semi);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '.' => {
                chars.next();
                toks.push(Tok::Dot);
            }
            '+' => {
                chars.next();
                toks.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                toks.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                toks.push(Tok::Star);
            }
            '/' => {
                chars.next();
                toks.push(Tok::Slash);
            }
            '%' => {
                chars.next();
                toks.push(Tok::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::EqEq);
                } else {
                    toks.push(Tok::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ne);
                } else {
                    toks.push(Tok::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Le);
                } else {
                    toks.push(Tok::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ge);
                } else {
                    toks.push(Tok::Gt);
                }
            }
            '"' => {
                chars.next();
                toks.push(Tok::Str(lex_string(&mut chars)?));
            }
            '0'..='9' => {
                toks.push(lex_number(&mut chars)?);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(match name.as_str() {
                    "true" => Tok::True,
                    "false" => Tok::False,
                    "null" => Tok::Null,
                    _ => Tok::Ident(name),
                });
            }
            other => {
                return Err(ScriptError::Parse(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    toks.push(Tok::Eof);
    Ok(toks)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, ScriptError> {
    let mut s = String::new();
    loop {
        match chars.next() {
            None => return Err(ScriptError::Parse("unterminated string literal".to_string())),
            Some('"') => return Ok(s),
            Some('\\') => match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('r') => s.push('\r'),
                Some('\\') => s.push('\\'),
                Some('"') => s.push('"'),
                Some(other) => {
                    return Err(ScriptError::Parse(format!("unknown escape '\\{}'", other)))
                }
                None => {
                    return Err(ScriptError::Parse("unterminated string literal".to_string()))
                }
            },
            Some(c) => s.push(c),
        }
    }
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Tok, ScriptError> {
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    // a '.' starts a fractional part only when a digit follows (else it is attribute access)
    let mut is_float = false;
    if chars.peek() == Some(&'.') {
        let mut ahead = chars.clone();
        ahead.next();
        if matches!(ahead.peek(), Some(d) if d.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            chars.next();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    if is_float {
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| ScriptError::Parse(format!("bad number literal '{}'", text)))
    } else {
        text.parse::<i64>()
            .map(Tok::Int)
            .map_err(|_| ScriptError::Parse(format!("integer literal out of range: {}", text)))
    }
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn new(toks: Vec<Tok>) -> Self {
        Self { toks, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn peek_next(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.toks[self.pos].clone();
        if !matches!(tok, Tok::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ScriptError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(ScriptError::Parse(format!(
                "expected {}, found {}",
                describe(&tok),
                describe(self.peek())
            )))
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Tok::Newline | Tok::Semi) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Tok::Newline) {
            self.advance();
        }
    }

    fn at_assignment(&self) -> bool {
        matches!(self.peek(), Tok::Ident(_)) && matches!(self.peek_next(), Some(Tok::Assign))
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if self.at_assignment() {
            let name = match self.advance() {
                Tok::Ident(name) => name,
                other => {
                    return Err(ScriptError::Parse(format!(
                        "expected identifier, found {}",
                        describe(&other)
                    )))
                }
            };
            self.advance(); // '='
            let value = self.expression()?;
            return Ok(Stmt::Assign { name, value });
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinOp::Eq,
                Tok::Ne => BinOp::Ne,
                Tok::Lt => BinOp::Lt,
                Tok::Le => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek() {
            Tok::Minus => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.unary()?),
                })
            }
            Tok::Not => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.unary()?),
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Tok::LParen => {
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Tok::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Tok::Ident(name) => name,
                        other => {
                            return Err(ScriptError::Parse(format!(
                                "expected attribute name after '.', found {}",
                                describe(&other)
                            )))
                        }
                    };
                    expr = Expr::Attr {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        self.skip_newlines();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            self.skip_newlines();
            if self.eat(&Tok::Comma) {
                self.skip_newlines();
                continue;
            }
            self.expect(Tok::RParen)?;
            break;
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Tok::Int(v) => Ok(Expr::Int(v)),
            Tok::Float(v) => Ok(Expr::Float(v)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::Null => Ok(Expr::Null),
            Tok::Ident(name) => Ok(Expr::Name(name)),
            Tok::LParen => {
                self.skip_newlines();
                let expr = self.expression()?;
                self.skip_newlines();
                self.expect(Tok::RParen)?;
                Ok(expr)
            }
            other => Err(ScriptError::Parse(format!(
                "unexpected {}",
                describe(&other)
            ))),
        }
    }
}

/// Parse a program: statements separated by newlines or `;`.
pub(crate) fn parse_program(src: &str) -> Result<Vec<Stmt>, ScriptError> {
    let mut p = Parser::new(lex(src)?);
    let mut stmts = Vec::new();
    loop {
        p.skip_separators();
        if matches!(p.peek(), Tok::Eof) {
            break;
        }
        stmts.push(p.statement()?);
        match p.peek() {
            Tok::Newline | Tok::Semi => {
                p.advance();
            }
            Tok::Eof => {}
            other => {
                return Err(ScriptError::Parse(format!(
                    "unexpected {} after statement",
                    describe(other)
                )))
            }
        }
    }
    Ok(stmts)
}

/// Parse exactly one expression. Assignments and statement lists are refused.
pub(crate) fn parse_expression(src: &str) -> Result<Expr, ScriptError> {
    let mut p = Parser::new(lex(src)?);
    p.skip_separators();
    if matches!(p.peek(), Tok::Eof) {
        return Err(ScriptError::Parse("empty expression".to_string()));
    }
    if p.at_assignment() {
        return Err(ScriptError::NotAnExpression);
    }
    let expr = p.expression()?;
    p.skip_separators();
    if !matches!(p.peek(), Tok::Eof) {
        return Err(ScriptError::NotAnExpression);
    }
    Ok(expr)
}
