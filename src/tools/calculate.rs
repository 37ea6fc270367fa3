//! Arithmetic evaluation for the `Calculate` tool.
//!
//! The language is the arithmetic subset of Python the model tends to write:
//! integer and float literals, `+ - * / // % **`, unary signs, parentheses,
//! and the usual `math` module constants and functions. Integers stay
//! integral until an operation (true division, a float operand, a `math`
//! function) turns them into floats, and results print the way Python
//! prints them.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use super::Tool;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected '{0}'")]
    UnexpectedToken(String),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("{name}() takes {expected} argument(s)")]
    Arity { name: String, expected: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("math domain error in {0}")]
    Domain(String),

    #[error("expression nested too deeply")]
    TooDeep,
}

/// A Python-style number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => f.write_str(&format_float(x)),
        }
    }
}

/// Format a float like Python's `repr`: shortest round-trip digits, a
/// trailing `.0` on integral values, and exponent notation outside
/// `[1e-4, 1e16)`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", x);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }

    let formatted = format!("{}", x);
    if formatted.contains('.') {
        formatted
    } else {
        format!("{}.0", formatted)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(x) => f.write_str(&format_float(*x)),
            Token::Name(name) => f.write_str(name),
            Token::Op(op) => f.write_str(op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    is_float |= chars[i] == '.';
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    is_float = true;
                    i += 1;
                    if i < chars.len() && matches!(chars[i], '+' | '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let token = if is_float {
                    literal
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| EvalError::InvalidNumber(literal.clone()))?
                } else {
                    literal
                        .parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| EvalError::Overflow)?
                };
                tokens.push(token);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            '*' | '/' => {
                let doubled = chars.get(i + 1) == Some(&c);
                let op = match (c, doubled) {
                    ('*', true) => "**",
                    ('*', false) => "*",
                    ('/', true) => "//",
                    _ => "/",
                };
                tokens.push(Token::Op(op));
                i += if doubled { 2 } else { 1 };
            }
            '+' | '-' | '%' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    _ => "%",
                }));
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(EvalError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Nesting allowed for parentheses, call arguments and chained unary or
/// `**` operators. Matches Python's own parser limit.
const MAX_NESTING: usize = 200;

/// Recursive-descent evaluator over Python's precedence levels:
/// `+ -` < `* / // %` < unary `+ -` < `**` (right-associative).
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvalError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(EvalError::UnexpectedToken(token.to_string())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn expression(&mut self) -> Result<Number, EvalError> {
        let mut value = self.term()?;
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            value = binary(op, value, rhs)?;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Number, EvalError> {
        let mut value = self.unary()?;
        while let Some(op @ ("*" | "/" | "//" | "%")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = binary(op, value, rhs)?;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Number, EvalError> {
        match self.peek_op() {
            Some("-") => {
                self.pos += 1;
                match self.nested(Self::unary)? {
                    Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(EvalError::Overflow),
                    Number::Float(x) => Ok(Number::Float(-x)),
                }
            }
            Some("+") => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, EvalError> {
        let base = self.atom()?;
        if self.peek_op() == Some("**") {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return binary("**", base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, EvalError> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Number::Int(i)),
            Some(Token::Float(x)) => Ok(Number::Float(x)),
            Some(Token::LParen) => {
                let value = self.nested(Self::expression)?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.nested(Self::arguments)?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(EvalError::UnexpectedToken(token.to_string())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    /// Comma-separated arguments after an opening parenthesis.
    fn arguments(&mut self) -> Result<Vec<Number>, EvalError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(EvalError::UnexpectedToken(token.to_string())),
                None => return Err(EvalError::UnexpectedEnd),
            }
        }
    }
}

fn binary(op: &str, lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    use Number::Int;

    match (op, lhs, rhs) {
        ("+", Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(EvalError::Overflow),
        ("-", Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(EvalError::Overflow),
        ("*", Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(EvalError::Overflow),
        ("//", Int(a), Int(b)) => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            let quotient = a.checked_div(b).ok_or(EvalError::Overflow)?;
            // Python floors toward negative infinity.
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(Int(quotient - 1))
            } else {
                Ok(Int(quotient))
            }
        }
        ("%", Int(a), Int(b)) => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            // The remainder takes the sign of the divisor.
            let remainder = a.checked_rem(b).ok_or(EvalError::Overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                Ok(Int(remainder + b))
            } else {
                Ok(Int(remainder))
            }
        }
        ("**", Int(a), Int(b)) if b >= 0 => {
            let exponent = u32::try_from(b).map_err(|_| EvalError::Overflow)?;
            a.checked_pow(exponent).map(Int).ok_or(EvalError::Overflow)
        }
        _ => float_binary(op, lhs.as_f64(), rhs.as_f64()),
    }
}

fn float_binary(op: &str, a: f64, b: f64) -> Result<Number, EvalError> {
    let value = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "//" | "%" if b == 0.0 => return Err(EvalError::DivisionByZero),
        "/" => a / b,
        "//" => (a / b).floor(),
        "%" => {
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        "**" => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let value = a.powf(b);
            if value.is_nan() {
                return Err(EvalError::Domain("**".to_string()));
            }
            value
        }
        other => return Err(EvalError::UnexpectedToken(other.to_string())),
    };
    if value.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(EvalError::Overflow);
    }
    Ok(Number::Float(value))
}

fn constant(name: &str) -> Result<Number, EvalError> {
    match name {
        "pi" => Ok(Number::Float(std::f64::consts::PI)),
        "e" => Ok(Number::Float(std::f64::consts::E)),
        _ => Err(EvalError::UnknownName(name.to_string())),
    }
}

fn call(name: &str, args: &[Number]) -> Result<Number, EvalError> {
    let arity = |expected: &'static str| EvalError::Arity {
        name: name.to_string(),
        expected,
    };
    let one = || match args {
        [x] => Ok(x.as_f64()),
        _ => Err(arity("1")),
    };
    let two = || match args {
        [x, y] => Ok((x.as_f64(), y.as_f64())),
        _ => Err(arity("2")),
    };

    let value = match name {
        "abs" => {
            return match args {
                [Number::Int(i)] => i.checked_abs().map(Number::Int).ok_or(EvalError::Overflow),
                [Number::Float(x)] => Ok(Number::Float(x.abs())),
                _ => Err(arity("1")),
            }
        }
        "ceil" | "floor" => {
            if let [Number::Int(i)] = args {
                return Ok(Number::Int(*i));
            }
            let x = one()?;
            let rounded = if name == "ceil" { x.ceil() } else { x.floor() };
            if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
                return Err(EvalError::Overflow);
            }
            return Ok(Number::Int(rounded as i64));
        }
        "acos" => one()?.acos(),
        "asin" => one()?.asin(),
        "atan" => one()?.atan(),
        "atan2" => {
            let (y, x) = two()?;
            y.atan2(x)
        }
        "cos" => one()?.cos(),
        "cosh" => one()?.cosh(),
        "degrees" => one()?.to_degrees(),
        "exp" => one()?.exp(),
        "fabs" => one()?.abs(),
        "fmod" => {
            let (x, y) = two()?;
            if y == 0.0 {
                return Err(EvalError::Domain(name.to_string()));
            }
            x % y
        }
        "hypot" => {
            let (x, y) = two()?;
            x.hypot(y)
        }
        "ldexp" => match args {
            [x, Number::Int(i)] => {
                let exponent = i32::try_from(*i).map_err(|_| EvalError::Overflow)?;
                x.as_f64() * 2f64.powi(exponent)
            }
            [_, Number::Float(_)] => return Err(EvalError::Domain(name.to_string())),
            _ => return Err(arity("2")),
        },
        "log" => match args {
            [x] => checked_log(name, x.as_f64())?,
            [x, base] => {
                let denominator = checked_log(name, base.as_f64())?;
                if denominator == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                checked_log(name, x.as_f64())? / denominator
            }
            _ => return Err(arity("1 or 2")),
        },
        "log10" => {
            let x = one()?;
            checked_log(name, x)?;
            x.log10()
        }
        "pow" => {
            let (x, y) = two()?;
            return float_binary("**", x, y);
        }
        "radians" => one()?.to_radians(),
        "sin" => one()?.sin(),
        "sinh" => one()?.sinh(),
        "sqrt" => one()?.sqrt(),
        "tan" => one()?.tan(),
        "tanh" => one()?.tanh(),
        _ => return Err(EvalError::UnknownName(name.to_string())),
    };

    if value.is_nan() {
        return Err(EvalError::Domain(name.to_string()));
    }
    if value.is_infinite() && args.iter().all(|arg| arg.as_f64().is_finite()) {
        return Err(EvalError::Overflow);
    }
    Ok(Number::Float(value))
}

fn checked_log(name: &str, x: f64) -> Result<f64, EvalError> {
    if x <= 0.0 {
        return Err(EvalError::Domain(name.to_string()));
    }
    Ok(x.ln())
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<Number, EvalError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(EvalError::UnexpectedEnd);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    match parser.next() {
        None => Ok(value),
        Some(token) => Err(EvalError::UnexpectedToken(token.to_string())),
    }
}

/// Evaluate a mathematical expression.
pub struct Calculate;

#[async_trait]
impl Tool for Calculate {
    fn name(&self) -> &str {
        "Calculate"
    }

    fn parameters(&self) -> &[&'static str] {
        &["expression"]
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression using Python.  Expression should only contain numbers, operators (+ - * / **), or math module functions."
    }

    async fn execute(&self, params: &str) -> String {
        // Models often write `^` for exponentiation.
        let expression = params.replace('^', "**");
        match evaluate(&expression) {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::debug!(expression = %expression, error = %e, "Invalid expression");
                "That was not a valid expression".to_string()
            }
        }
    }
}
