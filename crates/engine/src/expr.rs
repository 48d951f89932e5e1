// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression evaluator (§4.7): a small, pure recursive-descent evaluator
//! over a fixed grammar. No general scripting engine, no side effects.
//!
//! Grammar (low to high precedence):
//!   expr       := or
//!   or         := and ( "||" and )*
//!   and        := equality ( "&&" equality )*
//!   equality   := comparison ( ("==" | "!=") comparison )*
//!   comparison := membership ( ("<" | "<=" | ">" | ">=") membership )?
//!   membership := unary ( "in" unary )?
//!   unary      := "!" unary | primary
//!   primary    := literal | path | "(" expr ")"
//!
//! A path is a dotted identifier chain (`steps.fetch.status`, `var.retries`)
//! optionally indexed with `[n]`, resolved against an [`EvalContext`].

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),

    #[error("unknown variable path: {0}")]
    UnknownPath(String),

    #[error("type error evaluating expression: {0}")]
    Type(String),
}

pub type ExprResult<T> = Result<T, ExprError>;

/// Read-only bindings an expression resolves paths against.
pub trait EvalContext {
    /// Resolve a dotted path's first segment plus the remaining segments,
    /// e.g. `steps.fetch.status` resolves `steps` then walks `fetch.status`
    /// through the returned value. Returns `None` if the root is unbound.
    fn resolve(&self, segments: &[PathSegment]) -> Option<Value>;
}

/// A simple context backed by a single JSON object (used directly for unit
/// tests and for the simplest embeddings; the engine crate's step executors
/// use a richer context assembled from workflow variables and step outputs).
pub struct MapContext<'a>(pub &'a Value);

impl EvalContext for MapContext<'_> {
    fn resolve(&self, segments: &[PathSegment]) -> Option<Value> {
        walk(self.0, segments)
    }
}

/// One component of a dotted/indexed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

pub(crate) fn walk(root: &Value, segments: &[PathSegment]) -> Option<Value> {
    let mut cur = root.clone();
    for seg in segments {
        cur = match (seg, &cur) {
            (PathSegment::Field(name), Value::Object(map)) => map.get(name)?.clone(),
            (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i)?.clone(),
            _ => return None,
        };
    }
    Some(cur)
}

/// Evaluate `expr` to a JSON value.
pub fn evaluate(expr: &str, ctx: &dyn EvalContext) -> ExprResult<Value> {
    let tokens = lex(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::TrailingInput(format!("{:?}", &parser.tokens[parser.pos..])));
    }
    eval_node(&ast, ctx)
}

/// Evaluate `expr` and coerce the result to a bool (§4.7 `EvaluateBool`).
pub fn evaluate_bool(expr: &str, ctx: &dyn EvalContext) -> ExprResult<bool> {
    match evaluate(expr, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Type(format!("expected a boolean, got {other}"))),
    }
}

/// Interpolate every `${ ... }` span in `template` against `ctx`, rendering
/// each evaluated value in its natural textual form (§4.7 `Interpolate`).
/// Text outside `${ }` spans passes through unchanged.
pub fn interpolate(template: &str, ctx: &dyn EvalContext) -> ExprResult<String> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let start = i + 2;
            let mut depth = 1usize;
            let mut j = start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    j += 1;
                }
            }
            if depth != 0 {
                return Err(ExprError::UnexpectedEof);
            }
            let inner = &template[start..j];
            let value = evaluate(inner, ctx)?;
            out.push_str(&render(&value));
            i = j + 1;
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    Ok(out)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// -- lexer --

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
}

fn lex(input: &str) -> ExprResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(ExprError::UnterminatedString);
                }
                tokens.push(Token::String(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    "in" => Token::In,
                    _ => Token::Ident(text),
                });
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

// -- parser: produces a small AST, evaluated directly (no separate compile step) --

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Path(Vec<PathSegment>),
    Not(Box<Node>),
    BinOp(BinOp, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> ExprResult<Node> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ExprResult<Node> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExprResult<Node> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Node::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ExprResult<Node> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Node::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ExprResult<Node> {
        let lhs = self.parse_membership()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_membership()?;
        Ok(Node::BinOp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_membership(&mut self) -> ExprResult<Node> {
        let lhs = self.parse_unary()?;
        if matches!(self.peek(), Some(Token::In)) {
            self.advance();
            let rhs = self.parse_unary()?;
            return Ok(Node::BinOp(BinOp::In, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ExprResult<Node> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExprResult<Node> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(Node::Literal(serde_json::json!(n))),
            Some(Token::String(s)) => Ok(Node::Literal(Value::String(s))),
            Some(Token::Bool(b)) => Ok(Node::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Node::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Some(Token::Ident(name)) => {
                let mut segments = vec![PathSegment::Field(name)];
                loop {
                    match self.peek() {
                        Some(Token::Dot) => {
                            self.advance();
                            match self.advance().cloned() {
                                Some(Token::Ident(field)) => segments.push(PathSegment::Field(field)),
                                other => return Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                            }
                        }
                        Some(Token::LBracket) => {
                            self.advance();
                            match self.advance().cloned() {
                                Some(Token::Number(n)) => segments.push(PathSegment::Index(n as usize)),
                                other => return Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                            }
                            match self.advance() {
                                Some(Token::RBracket) => {}
                                other => return Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                            }
                        }
                        _ => break,
                    }
                }
                Ok(Node::Path(segments))
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ExprError::UnexpectedEof),
        }
    }
}

fn eval_node(node: &Node, ctx: &dyn EvalContext) -> ExprResult<Value> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Path(segments) => ctx
            .resolve(segments)
            .ok_or_else(|| ExprError::UnknownPath(path_display(segments))),
        Node::Not(inner) => {
            let v = eval_node(inner, ctx)?;
            Ok(Value::Bool(!as_bool(&v)?))
        }
        Node::BinOp(op, lhs, rhs) => {
            match op {
                BinOp::And => {
                    let l = as_bool(&eval_node(lhs, ctx)?)?;
                    if !l {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(as_bool(&eval_node(rhs, ctx)?)?))
                }
                BinOp::Or => {
                    let l = as_bool(&eval_node(lhs, ctx)?)?;
                    if l {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(as_bool(&eval_node(rhs, ctx)?)?))
                }
                BinOp::Eq => Ok(Value::Bool(eval_node(lhs, ctx)? == eval_node(rhs, ctx)?)),
                BinOp::Ne => Ok(Value::Bool(eval_node(lhs, ctx)? != eval_node(rhs, ctx)?)),
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    let l = eval_node(lhs, ctx)?;
                    let r = eval_node(rhs, ctx)?;
                    let ord = compare(&l, &r)?;
                    Ok(Value::Bool(match op {
                        BinOp::Lt => ord == std::cmp::Ordering::Less,
                        BinOp::Le => ord != std::cmp::Ordering::Greater,
                        BinOp::Gt => ord == std::cmp::Ordering::Greater,
                        BinOp::Ge => ord != std::cmp::Ordering::Less,
                        _ => unreachable!(),
                    }))
                }
                BinOp::In => {
                    let needle = eval_node(lhs, ctx)?;
                    let haystack = eval_node(rhs, ctx)?;
                    match haystack {
                        Value::Array(items) => Ok(Value::Bool(items.contains(&needle))),
                        other => Err(ExprError::Type(format!("right side of `in` must be an array, got {other}"))),
                    }
                }
            }
        }
    }
}

fn as_bool(v: &Value) -> ExprResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(ExprError::Type(format!("expected a boolean, got {other}"))),
    }
}

fn compare(l: &Value, r: &Value) -> ExprResult<std::cmp::Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .ok_or_else(|| ExprError::Type("non-comparable numbers".into())),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(ExprError::Type(format!("cannot order {a} and {b}"))),
    }
}

fn path_display(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|s| match s {
            PathSegment::Field(f) => f.clone(),
            PathSegment::Index(i) => format!("[{i}]"),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
