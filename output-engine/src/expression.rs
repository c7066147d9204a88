//! Template expression language.
//!
//! Templates are small expressions over named attributes:
//!
//! ```text
//! expr   := andExp ( 'or' andExp )*
//! andExp := concat ( 'and' concat )*
//! concat := term ( '+' term )*
//! term   := NAME | '(' expr ')'
//! ```
//!
//! `+` binds tighter than `and`, which binds tighter than `or`; all three are
//! left-associative. So `a + b and c or d` reads as `((a + b) and c) or d`.
//!
//! Expressions are parsed once into an [`Expr`] tree and evaluated against an
//! [`AttributeSource`]. `and`/`or` short-circuit: the operand that is not
//! chosen is never evaluated, so its attribute functions never run.

use std::fmt;

use thiserror::Error;

use crate::types::{Fragment, ObjectId, Value, Voice};

/// A syntax error in a template expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source text
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parsed template expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A named attribute
    Attr(String),
    /// `left + right`
    Concat(Box<Expr>, Box<Expr>),
    /// `left and right`
    And(Box<Expr>, Box<Expr>),
    /// `left or right`
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Plus,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push((Token::Plus, offset));
            }
            '(' => {
                chars.next();
                tokens.push((Token::LParen, offset));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, offset));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = offset;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &source[offset..end];
                let token = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Name(word.to_string()),
                };
                tokens.push((token, offset));
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", other),
                    offset,
                ))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_exp()?;
        while self.eat(&Token::Or) {
            let right = self.and_exp()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_exp(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.concat()?;
        while self.eat(&Token::And) {
            let right = self.concat()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        while self.eat(&Token::Plus) {
            let right = self.term()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.tokens.get(self.pos).map(|(t, _)| t.clone()) {
            Some(Token::Name(name)) => {
                self.pos += 1;
                Ok(Expr::Attr(name))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(ParseError::new("expected ')'", self.offset()));
                }
                Ok(inner)
            }
            Some(Token::RParen) => Err(ParseError::new("unexpected ')'", offset)),
            Some(Token::Plus) => Err(ParseError::new("unexpected '+'", offset)),
            Some(Token::And) => Err(ParseError::new("unexpected 'and'", offset)),
            Some(Token::Or) => Err(ParseError::new("unexpected 'or'", offset)),
            None => Err(ParseError::new("unexpected end of expression", offset)),
        }
    }
}

/// Parses a template expression.
///
/// # Examples
///
/// ```
/// use output_engine::expression::{parse, Expr};
///
/// let expr = parse("name + roleName").unwrap();
/// assert_eq!(expr.names(), vec!["name", "roleName"]);
///
/// assert!(parse("").is_err());
/// assert!(parse("name +").is_err());
/// ```
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(ParseError::new("unexpected trailing input", parser.offset()));
    }
    Ok(expr)
}

/// Supplies attribute values while an expression is evaluated.
pub trait AttributeSource {
    /// Object plain values are attributed to.
    fn subject(&self) -> ObjectId;

    /// Resolves a named attribute.
    fn resolve(&mut self, name: &str) -> Value;

    /// Voice hint for fragments produced by the attribute.
    fn voice(&self, _name: &str) -> Voice {
        Voice::Default
    }
}

/// Outcome of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluated {
    pub fragments: Vec<Fragment>,
    pub truthy: bool,
}

impl Expr {
    /// Evaluates the expression.
    pub fn evaluate(&self, source: &mut dyn AttributeSource) -> Evaluated {
        match self {
            Expr::Attr(name) => {
                let value = source.resolve(name);
                let truthy = value.is_truthy();
                let fragments = value.into_fragments(source.subject(), source.voice(name));
                Evaluated { fragments, truthy }
            }
            Expr::Concat(left, right) => {
                let mut fragments = left.evaluate(source).fragments;
                fragments.extend(right.evaluate(source).fragments);
                let truthy = !fragments.is_empty();
                Evaluated { fragments, truthy }
            }
            Expr::And(left, right) => {
                let left = left.evaluate(source);
                if left.truthy {
                    right.evaluate(source)
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = left.evaluate(source);
                if left.truthy {
                    left
                } else {
                    right.evaluate(source)
                }
            }
        }
    }

    /// Attribute names the expression refers to, in first-use order.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Attr(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Concat(l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_names(names);
                r.collect_names(names);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Concat(..) => 3,
            Expr::Attr(_) => 4,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (left, op, right) = match self {
            Expr::Attr(name) => return f.write_str(name),
            Expr::Concat(l, r) => (l, "+", r),
            Expr::And(l, r) => (l, "and", r),
            Expr::Or(l, r) => (l, "or", r),
        };
        let prec = self.precedence();
        if left.precedence() < prec {
            write!(f, "({})", left)?;
        } else {
            write!(f, "{}", left)?;
        }
        write!(f, " {} ", op)?;
        if right.precedence() <= prec {
            write!(f, "({})", right)
        } else {
            write!(f, "{}", right)
        }
    }
}
