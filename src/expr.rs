//! Condition expressions used by mapping specs: row conditions such as
//! `qty > 0` and validations such as `docstatus = 1 and not is_return`.
//!
//! # Grammar
//! From the lowest to the highest precedence:
//! ```text
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | cmp
//! cmp     := operand (op operand)?
//! op      := "=" | "==" | "!=" | ">" | ">=" | "<" | "<=" | "like" | "not like"
//! operand := field | number | string | "true" | "false" | "null" | "(" or ")"
//! ```
//! `&&`, `||` and `!` are accepted for `and`, `or` and `not`.

use std::cmp::Ordering;

use log::trace;
use logos::Logos;
use smallvec::SmallVec;
use thiserror::Error;

use crate::doc::{Document, FieldName};
use crate::error_expl::{ContextBuilder, Pretty};
use crate::span::{Span, Spanned};
use crate::value::Value;

/// Comparison operator shared by expressions and [crate::store::Filter]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Like => "like",
            Op::NotLike => "not like",
        }
    }

    /// Apply the operator. Values that cannot be compared satisfy only `!=`.
    pub fn apply(&self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Op::Like => like(&lhs.to_text(), &rhs.to_text()),
            Op::NotLike => !like(&lhs.to_text(), &rhs.to_text()),
            op => match lhs.compare(rhs) {
                Some(ord) => match op {
                    Op::Eq => ord == Ordering::Equal,
                    Op::Ne => ord != Ordering::Equal,
                    Op::Gt => ord == Ordering::Greater,
                    Op::Ge => ord != Ordering::Less,
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Like | Op::NotLike => unreachable!(),
                },
                None => *op == Op::Ne,
            },
        }
    }
}

impl std::str::FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            "<=" => Op::Le,
            "like" => Op::Like,
            "not like" => Op::NotLike,
            _ => return Err(s.to_owned()),
        })
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL `LIKE` matching, case-insensitive. `%` matches any run of characters
/// and `_` exactly one.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Classic two-pointer wildcard match with backtracking to the last `%`.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(FieldName),
    Lit(Value),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        lhs: Box<Expr>,
        op: Op,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Parse an expression from its text form.
    pub fn parse(src: &str) -> Result<Expr, ParseError> {
        trace!("Parse expression `{src}`");
        let tokens = lex(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: src.len(),
        };
        if parser.peek().is_none() {
            return Err(ParseErrorKind::Empty.at(Span::from(0..src.len())));
        }
        let expr = parser.or()?;
        if let Some(t) = parser.next() {
            return Err(ParseErrorKind::UnexpectedToken(t.describe()).at(t.span()));
        }
        Ok(expr)
    }

    /// Evaluate against a document. Logical and comparison nodes yield
    /// [Value::Bool]; fields read through [Document::get].
    pub fn eval(&self, doc: &Document) -> Value {
        match self {
            Expr::Field(f) => doc.get(f),
            Expr::Lit(v) => v.clone(),
            Expr::Not(e) => Value::Bool(!e.eval(doc).is_truthy()),
            Expr::And(l, r) => Value::Bool(l.eval(doc).is_truthy() && r.eval(doc).is_truthy()),
            Expr::Or(l, r) => Value::Bool(l.eval(doc).is_truthy() || r.eval(doc).is_truthy()),
            Expr::Cmp { lhs, op, rhs } => Value::Bool(op.apply(&lhs.eval(doc), &rhs.eval(doc))),
        }
    }

    pub fn test(&self, doc: &Document) -> bool {
        self.eval(doc).is_truthy()
    }

    /// Field names the expression reads, in order of appearance.
    pub fn fields(&self) -> Vec<&FieldName> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldName>) {
        match self {
            Expr::Field(f) => out.push(f),
            Expr::Lit(_) => {}
            Expr::Not(e) => e.collect_fields(out),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
            Expr::Cmp { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
        }
    }

    fn is_atom(&self) -> bool {
        matches!(self, Expr::Field(_) | Expr::Lit(_))
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn wrapped(e: &Expr, plain: bool) -> String {
            if plain {
                e.to_string()
            } else {
                format!("({e})")
            }
        }

        match self {
            Expr::Field(name) => write!(f, "{name}"),
            Expr::Lit(v) => write!(f, "{v}"),
            Expr::Not(e) => write!(
                f,
                "not {}",
                wrapped(e, e.is_atom() || matches!(**e, Expr::Cmp { .. } | Expr::Not(_)))
            ),
            Expr::And(l, r) => write!(
                f,
                "{} and {}",
                wrapped(l, !matches!(**l, Expr::Or(..))),
                wrapped(r, !matches!(**r, Expr::Or(..) | Expr::And(..)))
            ),
            Expr::Or(l, r) => write!(f, "{} or {}", l, wrapped(r, !matches!(**r, Expr::Or(..)))),
            Expr::Cmp { lhs, op, rhs } => write!(
                f,
                "{} {op} {}",
                wrapped(lhs, lhs.is_atom()),
                wrapped(rhs, rhs.is_atom())
            ),
        }
    }
}

impl TryFrom<&str> for Expr {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Expr::parse(value)
    }
}

impl std::str::FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("empty expression")]
    Empty,

    #[error("unknown token `{0}`")]
    UnknownToken(String),

    #[error("unexpected {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing closing parenthesis")]
    Unclosed,

    #[error("{0}")]
    InvalidField(String),
}

impl ParseErrorKind {
    fn at(self, span: Span) -> ParseError {
        ParseError {
            kind: self,
            span,
            opened: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {}..{}", .span.start(), .span.end())]
pub struct ParseError {
    kind: ParseErrorKind,
    span: Span,

    /// Opening parenthesis of an unclosed group.
    opened: Option<Span>,
}

impl ParseError {
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Human-readable explanation with the offending part of `src` underlined.
    pub fn explain(&self, src: &str) -> String {
        let pretty = Pretty::new(src);
        let mut builder = pretty.explain_builder();
        builder.title(format!("invalid condition: {}", self.kind));

        let hint = match &self.kind {
            ParseErrorKind::Empty => "expected a condition",
            ParseErrorKind::UnknownToken(_) => "not part of the condition language",
            ParseErrorKind::UnexpectedToken(_) => "not expected here",
            ParseErrorKind::UnexpectedEnd => "expression ends here",
            ParseErrorKind::Unclosed => "expected `)`",
            ParseErrorKind::InvalidField(_) => "invalid field name",
        };

        let error = match ContextBuilder::new().important(self.span).message(hint).build() {
            Ok(c) => c,
            Err(_) => return self.to_string(),
        };
        builder.error(error);

        if let Some(opened) = self.opened {
            if let Ok(c) = ContextBuilder::new().important(opened).message("opened here").build() {
                builder.push_context(c);
            }
        }

        builder
            .build()
            .map(|p| p.to_string())
            .unwrap_or_else(|_| self.to_string())
    }
}

/// Lexical element of condition expressions.
#[derive(Debug, Logos, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Lex {
    #[token("and", priority = 100)]
    #[token("AND", priority = 100)]
    #[token("&&")]
    And,

    #[token("or", priority = 100)]
    #[token("OR", priority = 100)]
    #[token("||")]
    Or,

    #[token("not", priority = 100)]
    #[token("NOT", priority = 100)]
    #[token("!")]
    Not,

    #[token("like", priority = 100)]
    #[token("LIKE", priority = 100)]
    Like,

    #[token("true", priority = 100)]
    #[token("True", priority = 100)]
    True,

    #[token("false", priority = 100)]
    #[token("False", priority = 100)]
    False,

    #[token("null", priority = 100)]
    #[token("None", priority = 100)]
    Null,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^\\"]|\\.)*""#, lex_to_str_lit)]
    #[regex(r#"'([^\\']|\\.)*'"#, lex_to_str_lit)]
    StrLit(String),

    #[token("=")]
    #[token("==")]
    Eq,

    #[token("!=")]
    #[token("<>")]
    Ne,

    #[token(">")]
    Gt,

    #[token(">=")]
    Ge,

    #[token("<")]
    Lt,

    #[token("<=")]
    Le,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,
}

fn lex_to_str_lit(lex: &mut logos::Lexer<Lex>) -> String {
    let slice = lex.slice();
    let unquoted = &slice[1..slice.len() - 1];

    // Apply escape sequences.
    let mut out = String::with_capacity(unquoted.len());
    let mut chars = unquoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl Lex {
    fn as_op(&self) -> Option<Op> {
        Some(match self {
            Lex::Eq => Op::Eq,
            Lex::Ne => Op::Ne,
            Lex::Gt => Op::Gt,
            Lex::Ge => Op::Ge,
            Lex::Lt => Op::Lt,
            Lex::Le => Op::Le,
            Lex::Like => Op::Like,
            _ => return None,
        })
    }
}

impl Spanned<Lex> {
    fn describe(&self) -> String {
        match &**self {
            Lex::Ident(name) => format!("field `{name}`"),
            Lex::Int(_) | Lex::Float(_) | Lex::StrLit(_) => "literal".to_owned(),
            Lex::OpenParen => "`(`".to_owned(),
            Lex::CloseParen => "`)`".to_owned(),
            other => format!("`{}`", format!("{other:?}").to_lowercase()),
        }
    }
}

type Tokens = SmallVec<[Spanned<Lex>; 16]>;

fn lex(src: &str) -> Result<Tokens, ParseError> {
    let mut tokens = Tokens::new();
    let mut lexer = Lex::lexer(src).spanned();
    while let Some((token, range)) = lexer.next() {
        let span = Span::from(range);
        match token {
            Ok(token) => tokens.push(span.with(token)),
            Err(_) => {
                let text = lexer.slice().to_owned();
                return Err(ParseErrorKind::UnknownToken(text).at(span));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Tokens,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned<Lex>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned<Lex>> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Check if next token is the given one. If so, advance and return its span.
    fn probe(&mut self, lex: &Lex) -> Option<Span> {
        match self.peek() {
            Some(t) if **t == *lex => {
                let span = t.span();
                self.pos += 1;
                Some(span)
            }
            _ => None,
        }
    }

    fn end_span(&self) -> Span {
        Span::from(self.end..self.end)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and()?;
        while self.probe(&Lex::Or).is_some() {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while self.probe(&Lex::And).is_some() {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.probe(&Lex::Not).is_some() {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.operand()?;

        let op = match self.peek() {
            Some(t) if **t == Lex::Not => {
                // Only `not like` may follow an operand.
                match self.tokens.get(self.pos + 1) {
                    Some(next) if **next == Lex::Like => {
                        self.pos += 2;
                        Op::NotLike
                    }
                    _ => return Ok(lhs),
                }
            }
            Some(t) => match t.as_op() {
                Some(op) => {
                    self.pos += 1;
                    op
                }
                None => return Ok(lhs),
            },
            None => return Ok(lhs),
        };

        let rhs = self.operand()?;
        Ok(Expr::Cmp {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    fn operand(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseErrorKind::UnexpectedEnd.at(self.end_span()));
        };

        let (token, span) = token.split();
        Ok(match token {
            Lex::Ident(name) => match FieldName::new(name) {
                Ok(name) => Expr::Field(name),
                Err(e) => return Err(ParseErrorKind::InvalidField(e.to_string()).at(span)),
            },
            Lex::Int(i) => Expr::Lit(Value::Int(i)),
            Lex::Float(f) => Expr::Lit(Value::Float(f)),
            Lex::StrLit(s) => Expr::Lit(Value::Str(s)),
            Lex::True => Expr::Lit(Value::Bool(true)),
            Lex::False => Expr::Lit(Value::Bool(false)),
            Lex::Null => Expr::Lit(Value::Null),
            Lex::OpenParen => {
                let inner = self.or()?;
                if self.probe(&Lex::CloseParen).is_none() {
                    let at = self.peek().map(|t| t.span()).unwrap_or_else(|| self.end_span());
                    return Err(ParseError {
                        kind: ParseErrorKind::Unclosed,
                        span: at,
                        opened: Some(span),
                    });
                }
                inner
            }
            other => {
                let described = span.with(other).describe();
                return Err(ParseErrorKind::UnexpectedToken(described).at(span));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocType;

    fn row() -> Document {
        Document::new(DocType::new("Purchase Receipt Item").unwrap())
            .with("qty", 5)
            .with("rejected_qty", 0)
            .with("warehouse", "Stores - M")
            .with("item_name", "Hex Bolt M8")
    }

    #[test]
    fn simple_comparison() {
        crate::init_log();

        let e = Expr::parse("qty > 0").unwrap();
        assert!(e.test(&row()));
        assert!(!Expr::parse("rejected_qty > 0").unwrap().test(&row()));
    }

    #[test]
    fn precedence_and_grouping() {
        let e = Expr::parse("qty > 10 or rejected_qty = 0 and warehouse != ''").unwrap();
        assert!(matches!(e, Expr::Or(..)));
        assert!(e.test(&row()));

        let e = Expr::parse("(qty > 10 or rejected_qty = 0) and not warehouse").unwrap();
        assert!(matches!(e, Expr::And(..)));
        assert!(!e.test(&row()));
    }

    #[test]
    fn missing_field_is_null() {
        assert!(Expr::parse("not reference_type").unwrap().test(&row()));
        assert!(Expr::parse("batch_no = null").unwrap().test(&row()));
    }

    #[test]
    fn like_operators() {
        assert!(Expr::parse("item_name like '%bolt%'").unwrap().test(&row()));
        assert!(Expr::parse("item_name not like 'nut%'").unwrap().test(&row()));
        assert!(like("Hex Bolt", "h_x%"));
        assert!(!like("Hex Bolt", "bolt"));
        assert!(like("", "%"));
    }

    #[test]
    fn display_round_trips() {
        for src in [
            "qty > 0",
            "docstatus = 1 and not is_return",
            "(a = 1 or b = 2) and c != \"x\"",
            "not (a and b)",
            "rate >= 2.5",
        ] {
            let e = Expr::parse(src).unwrap();
            assert_eq!(Expr::parse(&e.to_string()).unwrap(), e, "{src}");
        }
    }

    #[test]
    fn collects_fields() {
        let e = Expr::parse("qty > 0 and warehouse = s_warehouse").unwrap();
        let names: Vec<&str> = e.fields().into_iter().map(|f| f.as_str()).collect();
        assert_eq!(names, ["qty", "warehouse", "s_warehouse"]);
    }

    #[test]
    fn unknown_token_is_spanned() {
        let err = Expr::parse("qty > 0 # comment").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::UnknownToken("#".to_owned()));
        assert_eq!(err.span(), Span::from(8..9));
    }

    #[test]
    fn unclosed_group_explains_both_ends() {
        let src = "(qty > 0";
        let err = Expr::parse(src).unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::Unclosed);

        let text = err.explain(src);
        assert!(text.starts_with("invalid condition: missing closing parenthesis"));
        assert!(text.contains("^ expected `)`"));
        assert!(text.contains("- opened here"));
    }

    #[test]
    fn trailing_and_empty() {
        assert_eq!(
            Expr::parse("qty >").unwrap_err().kind(),
            &ParseErrorKind::UnexpectedEnd
        );
        assert_eq!(Expr::parse("  ").unwrap_err().kind(), &ParseErrorKind::Empty);
        assert!(matches!(
            Expr::parse("qty 0").unwrap_err().kind(),
            ParseErrorKind::UnexpectedToken(_)
        ));
    }
}
