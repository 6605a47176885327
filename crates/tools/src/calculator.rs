//! Calculator tool — evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `%`, `^`, parentheses, unary negation,
//! the constants `pi` and `e`, and the functions `sqrt`, `abs`, `round`,
//! `floor`, `ceil`, `min` and `max`. Uses a recursive-descent parser; no
//! identifier outside that fixed set is accepted.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor};
use serde_json::{Value, json};

/// Longest expression the validator accepts.
const MAX_EXPRESSION_LEN: usize = 1_000;

/// Deepest nesting of parentheses, calls, negations and exponents.
const MAX_DEPTH: usize = 64;

pub struct CalculatorTool {
    descriptor: ToolDescriptor,
}

impl CalculatorTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "calculator",
            "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, \
             sqrt/abs/round/floor/ceil/min/max, and the constants pi and e.",
        )
        .category("math")
        .timeout_ms(1_000)
        .param(
            ParamSpec::required(
                "expression",
                ParamType::String,
                "The expression to evaluate, e.g. '(2 + 3) * 4'",
            )
            .with_validator(|v| match v.as_str() {
                Some(s) if s.len() > MAX_EXPRESSION_LEN => Err(format!(
                    "must be at most {MAX_EXPRESSION_LEN} characters"
                )),
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("must not be empty".into()),
            }),
        );
        Self { descriptor }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let expr = params["expression"].as_str().unwrap_or_default();
        let value = evaluate(expr).map_err(|e| ToolError::execution("calculator", e))?;
        Ok(json!({
            "expression": expr,
            "result": value,
            "formatted": format_number(value),
        }))
    }
}

/// Render integers without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, tok
        ));
    }
    if !result.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let single = match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '^' => Some(Token::Caret),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = single {
            tokens.push(tok);
            i += 1;
            continue;
        }

        match chars[i] {
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(ident.to_ascii_lowercase()));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `parse` one nesting level deeper, refusing past `MAX_DEPTH`.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, String>,
    ) -> Result<T, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".into());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), String> {
        match self.consume() {
            Some(tok) if *tok == expected => Ok(()),
            _ => Err(format!("Expected {what}")),
        }
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash | Token::Percent => {
                    self.consume();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    if *op == Token::Slash {
                        left /= right;
                    } else {
                        left %= right;
                    }
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = '-' unary | power
    fn parse_unary(&mut self) -> Result<f64, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let val = self.nested(Self::parse_unary)?;
            return Ok(-val);
        }
        self.parse_power()
    }

    // power = primary ('^' unary)?   (right-associative)
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.nested(Self::parse_expr)?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(val)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let args = self.nested(Self::parse_args)?;
                    call_function(name, &args)
                } else {
                    constant(name)
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }

    // args = expr (',' expr)* ')'
    fn parse_args(&mut self) -> Result<Vec<f64>, String> {
        let mut args = vec![self.parse_expr()?];
        while let Some(Token::Comma) = self.peek() {
            self.consume();
            args.push(self.parse_expr()?);
        }
        self.expect(Token::RParen, "closing parenthesis after arguments")?;
        Ok(args)
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => Err(format!("Unknown identifier: '{name}'")),
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, String> {
    let unary = |f: fn(f64) -> f64| match args {
        [x] => Ok(f(*x)),
        _ => Err(format!("{name}() takes exactly one argument")),
    };
    match name {
        "sqrt" => match args {
            [x] if *x < 0.0 => Err("sqrt() of a negative number".into()),
            _ => unary(f64::sqrt),
        },
        "abs" => unary(f64::abs),
        "round" => unary(f64::round),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "min" => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or_else(|| "min() needs at least one argument".into()),
        "max" => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or_else(|| "max() needs at least one argument".into()),
        _ => Err(format!("Unknown function: '{name}'")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
