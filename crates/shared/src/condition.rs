//! The `show_if` language used by assessment questions.
//!
//! A condition is a small boolean expression over the current answers:
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | compare
//! compare := primary ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" ) primary )?
//! primary := literal | answer | "(" expr ")"
//! answer  := ident | "answers" "." ident | "answers" "[" string "]"
//! literal := string | number | "true" | "false" | "null"
//! ```
//!
//! Identifiers may contain `-` after the first character so generated
//! question ids such as `q1-0` can be referenced directly. `===` and `!==`
//! are accepted as spellings of `==` and `!=`.

use std::{collections::BTreeSet, fmt, iter::Peekable, str::CharIndices, str::FromStr};

use thiserror::Error;

use crate::domain::{AnswerValue, Answers, QuestionId};

pub const MAX_SOURCE_LEN: usize = 1024;
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,
    #[error("condition is longer than {MAX_SOURCE_LEN} bytes")]
    TooLong,
    #[error("unexpected character `{ch}` at {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    #[error("unterminated string starting at {pos}")]
    UnterminatedString { pos: usize },
    #[error("invalid number `{text}` at {pos}")]
    InvalidNumber { pos: usize, text: String },
    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { pos: usize, found: String },
    #[error("unexpected end of condition")]
    UnexpectedEnd,
    #[error("condition nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Answer(QuestionId),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Contains {
        needle: Box<Expr>,
        haystack: Box<Expr>,
    },
}

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Set(BTreeSet<String>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Set(items) => !items.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) if !s.trim().is_empty() => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<&AnswerValue> for Value {
    fn from(value: &AnswerValue) -> Self {
        match value {
            AnswerValue::Number(n) => Value::Number(*n),
            AnswerValue::Text(s) => Value::Text(s.clone()),
            AnswerValue::Selections(items) => Value::Set(items.clone()),
        }
    }
}

impl Expr {
    pub fn evaluate(&self, answers: &Answers) -> Value {
        match self {
            Expr::Literal(literal) => match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Text(s) => Value::Text(s.clone()),
            },
            Expr::Answer(id) => answers.get(id).map(Value::from).unwrap_or(Value::Null),
            Expr::Not(inner) => Value::Bool(!inner.evaluate(answers).truthy()),
            Expr::And(lhs, rhs) => {
                Value::Bool(lhs.evaluate(answers).truthy() && rhs.evaluate(answers).truthy())
            }
            Expr::Or(lhs, rhs) => {
                Value::Bool(lhs.evaluate(answers).truthy() || rhs.evaluate(answers).truthy())
            }
            Expr::Compare { op, lhs, rhs } => {
                let lhs = lhs.evaluate(answers);
                let rhs = rhs.evaluate(answers);
                Value::Bool(compare(*op, &lhs, &rhs))
            }
            Expr::Contains { needle, haystack } => {
                let needle = needle.evaluate(answers);
                let haystack = haystack.evaluate(answers);
                Value::Bool(contains(&needle, &haystack))
            }
        }
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Set(a), Value::Set(b)) => a == b,
        // A single selection compares equal to its only option.
        (Value::Set(items), Value::Text(s)) | (Value::Text(s), Value::Set(items)) => {
            items.len() == 1 && items.contains(s)
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => match (lhs.as_number(), rhs.as_number())
        {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

/// Numeric when both sides read as numbers, lexicographic for two strings,
/// otherwise unordered.
fn ordering(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (lhs, rhs) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => loose_eq(lhs, rhs),
        CmpOp::Ne => !loose_eq(lhs, rhs),
        CmpOp::Lt => ordering(lhs, rhs).is_some_and(|o| o.is_lt()),
        CmpOp::Le => ordering(lhs, rhs).is_some_and(|o| o.is_le()),
        CmpOp::Gt => ordering(lhs, rhs).is_some_and(|o| o.is_gt()),
        CmpOp::Ge => ordering(lhs, rhs).is_some_and(|o| o.is_ge()),
    }
}

fn contains(needle: &Value, haystack: &Value) -> bool {
    let Some(needle) = needle.as_text() else {
        return false;
    };
    match haystack {
        Value::Set(items) => items.contains(&needle),
        Value::Text(text) => text.contains(&needle),
        _ => false,
    }
}

/// A parsed `show_if` expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(ConditionError::TooLong);
        }
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if let Some(extra) = parser.tokens.get(parser.cursor) {
            return Err(ConditionError::UnexpectedToken {
                pos: extra.pos,
                found: extra.token.to_string(),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, answers: &Answers) -> bool {
        self.expr.evaluate(answers).truthy()
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses and evaluates `source` in one step.
pub fn evaluate(source: &str, answers: &Answers) -> Result<bool, ConditionError> {
    Ok(Condition::parse(source)?.evaluate(answers))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Number(f64),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Not,
    And,
    Or,
    Cmp(CmpOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(s) => write!(f, "string '{s}'"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::True => f.write_str("`true`"),
            Token::False => f.write_str("`false`"),
            Token::Null => f.write_str("`null`"),
            Token::In => f.write_str("`in`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::LBracket => f.write_str("`[`"),
            Token::RBracket => f.write_str("`]`"),
            Token::Dot => f.write_str("`.`"),
            Token::Not => f.write_str("`!`"),
            Token::And => f.write_str("`&&`"),
            Token::Or => f.write_str("`||`"),
            Token::Cmp(op) => f.write_str(match op {
                CmpOp::Eq => "`==`",
                CmpOp::Ne => "`!=`",
                CmpOp::Lt => "`<`",
                CmpOp::Le => "`<=`",
                CmpOp::Gt => "`>`",
                CmpOp::Ge => "`>=`",
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' | ')' | '[' | ']' | '.' => {
                chars.next();
                match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Dot,
                }
            }
            '!' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    next_is(&mut chars, '=');
                    Token::Cmp(CmpOp::Ne)
                } else {
                    Token::Not
                }
            }
            '=' => {
                chars.next();
                if !next_is(&mut chars, '=') {
                    return Err(ConditionError::UnexpectedChar { pos, ch });
                }
                next_is(&mut chars, '=');
                Token::Cmp(CmpOp::Eq)
            }
            '<' | '>' => {
                chars.next();
                let or_equal = next_is(&mut chars, '=');
                Token::Cmp(match (ch, or_equal) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                })
            }
            '&' | '|' => {
                chars.next();
                if !next_is(&mut chars, ch) {
                    return Err(ConditionError::UnexpectedChar { pos, ch });
                }
                if ch == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            '\'' | '"' => Token::Text(read_string(&mut chars, pos, ch)?),
            c if c.is_ascii_digit() => Token::Number(read_number(source, &mut chars, pos)?),
            '-' => {
                let negative_number = source[pos + 1..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit());
                if !negative_number {
                    return Err(ConditionError::UnexpectedChar { pos, ch });
                }
                Token::Number(read_number(source, &mut chars, pos)?)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || matches!(c, '_' | '-' | '$') {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    "in" => Token::In,
                    _ => Token::Ident(ident),
                }
            }
            _ => return Err(ConditionError::UnexpectedChar { pos, ch }),
        };
        tokens.push(Spanned { token, pos });
    }

    Ok(tokens)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    chars.next_if(|&(_, c)| c == expected).is_some()
}

fn read_string(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    quote: char,
) -> Result<String, ConditionError> {
    chars.next();
    let mut out = String::new();
    loop {
        let Some((_, c)) = chars.next() else {
            return Err(ConditionError::UnterminatedString { pos: start });
        };
        match c {
            c if c == quote => return Ok(out),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(ConditionError::UnterminatedString { pos: start });
                };
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
}

fn read_number(
    source: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
) -> Result<f64, ConditionError> {
    let mut end = start;
    let mut seen_dot = false;
    if let Some((idx, '-')) = chars.peek().copied() {
        chars.next();
        end = idx + 1;
    }
    while let Some(&(idx, c)) = chars.peek() {
        if c.is_ascii_digit() || (c == '.' && !seen_dot) {
            seen_dot |= c == '.';
            end = idx + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    let text = &source[start..end];
    text.parse().map_err(|_| ConditionError::InvalidNumber {
        pos: start,
        text: text.to_string(),
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Result<Spanned, ConditionError> {
        let spanned = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.cursor += 1;
        Ok(spanned)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        let spanned = self.advance()?;
        if spanned.token == expected {
            Ok(())
        } else {
            Err(ConditionError::UnexpectedToken {
                pos: spanned.pos,
                found: spanned.token.to_string(),
            })
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ConditionError> {
        self.descend()?;
        let mut lhs = self.conjunction()?;
        while self.peek() == Some(&Token::Or) {
            self.cursor += 1;
            let rhs = self.conjunction()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.cursor += 1;
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.cursor += 1;
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.primary()?;
        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.cursor += 1;
                let rhs = self.primary()?;
                Ok(Expr::Compare {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            Some(Token::In) => {
                self.cursor += 1;
                let haystack = self.primary()?;
                Ok(Expr::Contains {
                    needle: Box::new(lhs),
                    haystack: Box::new(haystack),
                })
            }
            _ => Ok(lhs),
        }
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        let Spanned { token, pos } = self.advance()?;
        match token {
            Token::Text(s) => Ok(Expr::Literal(Literal::Text(s))),
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if name == "answers" => match self.peek() {
                Some(Token::Dot) => {
                    self.cursor += 1;
                    let Spanned { token, pos } = self.advance()?;
                    match token {
                        Token::Ident(id) => Ok(Expr::Answer(QuestionId(id))),
                        other => Err(ConditionError::UnexpectedToken {
                            pos,
                            found: other.to_string(),
                        }),
                    }
                }
                Some(Token::LBracket) => {
                    self.cursor += 1;
                    let Spanned { token, pos } = self.advance()?;
                    let Token::Text(id) = token else {
                        return Err(ConditionError::UnexpectedToken {
                            pos,
                            found: token.to_string(),
                        });
                    };
                    self.expect(Token::RBracket)?;
                    Ok(Expr::Answer(QuestionId(id)))
                }
                _ => Ok(Expr::Answer(QuestionId(name))),
            },
            Token::Ident(name) => Ok(Expr::Answer(QuestionId(name))),
            other => Err(ConditionError::UnexpectedToken {
                pos,
                found: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/condition_tests.rs"]
mod tests;
