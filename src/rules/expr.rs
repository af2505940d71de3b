//! Safe boolean expression evaluator for rule strings
//!
//! Rule sets may gate an action with an expression such as
//! `user._id == data._ownerId` or `data.isPublic || user.role == "editor"`.
//! Expressions are parsed into an AST when the rule set is loaded and
//! evaluated against the request's `user` and `data` bindings; they are never
//! executed as code.
//!
//! Grammar:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | cmp
//! cmp     := operand ( ("=="|"!="|"<="|">="|"<"|">") operand )?
//! operand := "(" expr ")" | path | literal
//! path    := ("user" | "data") ( "." ident )*
//! literal := JSON string | number | true | false | null
//! ```

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

/// Root binding a path resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    User,
    Data,
}

/// Parsed rule expression
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Path(Root, Vec<String>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Expression parse failure; raised at rule-set load time
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rule expression: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

fn error(message: impl Into<String>) -> ParseError {
    ParseError {
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(&'static str),
    LParen,
    RParen,
    Dot,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '&' | '|' => {
                if i + 1 < chars.len() && chars[i + 1] == c {
                    tokens.push(Token::Op(if c == '&' { "&&" } else { "||" }));
                    i += 2;
                } else {
                    return Err(error(format!("unexpected '{c}'")));
                }
            }
            '=' | '!' | '<' | '>' => {
                let eq_follows = i + 1 < chars.len() && chars[i + 1] == '=';
                let op = match (c, eq_follows) {
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    ('!', false) => {
                        tokens.push(Token::Not);
                        i += 1;
                        continue;
                    }
                    ('=', false) => return Err(error("single '=' is not an operator")),
                    _ => unreachable!(),
                };
                tokens.push(Token::Op(op));
                i += if eq_follows { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(error("unterminated string"));
                    };
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    text.push(ch);
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| error(format!("bad number '{text}'")))?;
                let number =
                    serde_json::Number::from_f64(number).ok_or_else(|| error("bad number"))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(error(format!("unexpected '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(found)) if *found == op) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat_op("||") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        while self.eat_op("&&") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.position += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.operand()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = match *op {
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                "<=" => BinOp::Le,
                ">=" => BinOp::Ge,
                "<" => BinOp::Lt,
                ">" => BinOp::Gt,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.operand()?;
            return Ok(Expr::Binary(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn operand(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(error("expected ')'")),
                }
            }
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => {
                let root = match name.as_str() {
                    "user" => Root::User,
                    "data" => Root::Data,
                    other => return Err(error(format!("unknown binding '{other}'"))),
                };
                let mut path = Vec::new();
                while self.peek() == Some(&Token::Dot) {
                    self.position += 1;
                    match self.advance() {
                        Some(Token::Ident(field)) => path.push(field),
                        _ => return Err(error("expected field name after '.'")),
                    }
                }
                Ok(Expr::Path(root, path))
            }
            other => Err(error(format!("unexpected token {other:?}"))),
        }
    }
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let expr = parser.expr()?;
        if parser.position != parser.tokens.len() {
            return Err(error("trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate against the request bindings, coercing the result to boolean
    pub fn evaluate(&self, user: Option<&Value>, data: &Value) -> bool {
        truthy(&self.resolve(user, data))
    }

    fn resolve(&self, user: Option<&Value>, data: &Value) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Path(root, path) => {
                let mut current = match root {
                    Root::User => match user {
                        Some(value) => value,
                        None => return Value::Null,
                    },
                    Root::Data => data,
                };
                for field in path {
                    match current.get(field) {
                        Some(next) => current = next,
                        None => return Value::Null,
                    }
                }
                current.clone()
            }
            Expr::Not(inner) => Value::Bool(!truthy(&inner.resolve(user, data))),
            Expr::And(left, right) => {
                let left = left.resolve(user, data);
                if truthy(&left) {
                    right.resolve(user, data)
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = left.resolve(user, data);
                if truthy(&left) {
                    left
                } else {
                    right.resolve(user, data)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = left.resolve(user, data);
                let right = right.resolve(user, data);
                Value::Bool(apply(*op, &left, &right))
            }
        }
    }
}

fn apply(op: BinOp, left: &Value, right: &Value) -> bool {
    match op {
        BinOp::Eq => loose_eq(left, right),
        BinOp::Ne => !loose_eq(left, right),
        _ => {
            let ordering = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => match (left.as_str(), right.as_str()) {
                    (Some(a), Some(b)) => Some(a.cmp(b)),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                BinOp::Le => ordering.is_le(),
                BinOp::Ge => ordering.is_ge(),
                BinOp::Lt => ordering.is_lt(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Eq | BinOp::Ne => unreachable!(),
            }
        }
    }
}

// Literals are tokenized through f64, so integer fields must compare
// numerically rather than by exact Number representation.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

/// JSON truthiness: null, false, 0, "" and absent values are falsy
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
