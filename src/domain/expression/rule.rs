//! Boolean condition expressions for branch selection
//!
//! Grammar:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | "(" or ")" | compare
//! compare := operand ( op operand )?
//! op      := == | != | > | >= | < | <= | contains | startsWith | endsWith
//! operand := reference | number | 'text' | "text" | true | false | null
//! ```
//!
//! References resolve through a [`VariableLookup`]. A reference whose property
//! or index is missing evaluates to null; every other resolution error (for
//! example a node that has not run) aborts evaluation.

use serde_json::Value;

use super::coercion::{is_truthy, to_f64};
use super::evaluator::VariableLookup;
use crate::domain::workflow::WorkflowError;

/// Comparison operator between two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
}

impl ConditionOperator {
    /// Evaluate the operator; numbers and numeric strings compare numerically
    pub fn evaluate(&self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => loose_eq(left, right),
            Self::Ne => !loose_eq(left, right),
            Self::Gt => compare_numbers(left, right, |a, b| a > b),
            Self::Gte => compare_numbers(left, right, |a, b| a >= b),
            Self::Lt => compare_numbers(left, right, |a, b| a < b),
            Self::Lte => compare_numbers(left, right, |a, b| a <= b),
            Self::Contains => contains(left, right),
            Self::StartsWith => starts_with(left, right),
            Self::EndsWith => ends_with(left, right),
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "contains" => Some(Self::Contains),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            _ => None,
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((to_f64(a), to_f64(b)), (Some(x), Some(y)) if x == y)
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => false,
    }
}

fn compare_numbers<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    if a.is_null() || b.is_null() {
        return false;
    }
    match (to_f64(a), to_f64(b)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => value.as_str().is_some_and(|v| s.contains(v)),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, value)),
        Value::Object(map) => value.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

fn starts_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.starts_with(v),
        _ => false,
    }
}

fn ends_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.ends_with(v),
        _ => false,
    }
}

/// Parsed condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Or(Box<Rule>, Box<Rule>),
    And(Box<Rule>, Box<Rule>),
    Not(Box<Rule>),
    Compare(Operand, ConditionOperator, Operand),
    Truthy(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reference(String),
    Literal(Value),
}

impl Rule {
    /// Parse a condition expression
    pub fn parse(expression: &str) -> Result<Self, WorkflowError> {
        let tokens = tokenize(expression).map_err(|m| invalid(expression, m))?;
        if tokens.is_empty() {
            return Err(invalid(expression, "expression is empty".to_string()));
        }

        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
            operands: 0,
        };
        let rule = parser.or().map_err(|m| invalid(expression, m))?;
        if parser.position < parser.tokens.len() {
            return Err(invalid(
                expression,
                format!("unexpected token {:?}", parser.tokens[parser.position]),
            ));
        }
        Ok(rule)
    }

    /// Evaluate with short-circuiting `&&` / `||`
    pub fn evaluate(&self, lookup: &dyn VariableLookup) -> Result<bool, WorkflowError> {
        match self {
            Self::Or(left, right) => Ok(left.evaluate(lookup)? || right.evaluate(lookup)?),
            Self::And(left, right) => Ok(left.evaluate(lookup)? && right.evaluate(lookup)?),
            Self::Not(inner) => Ok(!inner.evaluate(lookup)?),
            Self::Compare(left, op, right) => {
                Ok(op.evaluate(&left.resolve(lookup)?, &right.resolve(lookup)?))
            }
            Self::Truthy(operand) => Ok(is_truthy(&operand.resolve(lookup)?)),
        }
    }
}

impl Operand {
    fn resolve(&self, lookup: &dyn VariableLookup) -> Result<Value, WorkflowError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Reference(reference) => match lookup.lookup(reference) {
                Ok(value) => Ok(value),
                Err(WorkflowError::PropertyNotFound { .. } | WorkflowError::IndexOutOfRange { .. }) => {
                    Ok(Value::Null)
                }
                Err(other) => Err(other),
            },
        }
    }
}

/// Parse and evaluate in one step
pub fn evaluate_condition(expression: &str, lookup: &dyn VariableLookup) -> Result<bool, WorkflowError> {
    Rule::parse(expression)?.evaluate(lookup)
}

fn invalid(expression: &str, message: String) -> WorkflowError {
    WorkflowError::definition_invalid(format!("condition '{}': {}", expression, message))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(ConditionOperator),
    Reference(String),
    Literal(Value),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(ConditionOperator::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(ConditionOperator::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' | '<' => {
                let op = match (c, next == Some('=')) {
                    ('>', true) => ConditionOperator::Gte,
                    ('>', false) => ConditionOperator::Gt,
                    (_, true) => ConditionOperator::Lte,
                    (_, false) => ConditionOperator::Lt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        Some('\\') if j + 1 < chars.len() => {
                            text.push(chars[j + 1]);
                            j += 2;
                        }
                        Some(ch) if *ch == c => break,
                        Some(ch) => {
                            text.push(*ch);
                            j += 1;
                        }
                        None => return Err(format!("unterminated string at position {}", i)),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number: f64 = text
                    .parse()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                let value = serde_json::Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(|| format!("invalid number '{}'", text))?;
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && is_reference_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(word_token(word));
            }
            other => return Err(format!("unexpected character '{}' at position {}", other, i)),
        }
    }

    Ok(tokens)
}

fn is_reference_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '*' | '$' | '-')
}

fn word_token(word: String) -> Token {
    if let Some(op) = ConditionOperator::from_word(&word) {
        return Token::Op(op);
    }
    match word.as_str() {
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        "null" => Token::Literal(Value::Null),
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Reference(word),
    }
}

/// Deepest `(` / `!` nesting a condition may use
const MAX_NESTING: usize = 64;

/// Most operands a condition may contain; bounds `&&` / `||` chain depth
const MAX_OPERANDS: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    operands: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, String>,
    ) -> Result<T, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn or(&mut self) -> Result<Rule, String> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.position += 1;
            let right = self.and()?;
            left = Rule::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Rule, String> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.position += 1;
            let right = self.unary()?;
            left = Rule::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Rule, String> {
        match self.peek() {
            Some(Token::Not) => {
                self.position += 1;
                let inner = self.nested(Self::unary)?;
                Ok(Rule::Not(Box::new(inner)))
            }
            Some(Token::LParen) => {
                self.position += 1;
                let inner = self.nested(Self::or)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing ')'".to_string()),
                }
            }
            _ => self.compare(),
        }
    }

    fn compare(&mut self) -> Result<Rule, String> {
        let left = self.operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.position += 1;
            let right = self.operand()?;
            return Ok(Rule::Compare(left, op, right));
        }
        Ok(Rule::Truthy(left))
    }

    fn operand(&mut self) -> Result<Operand, String> {
        self.operands += 1;
        if self.operands > MAX_OPERANDS {
            return Err(format!("more than {} operands", MAX_OPERANDS));
        }
        match self.advance() {
            Some(Token::Reference(reference)) => Ok(Operand::Reference(reference)),
            Some(Token::Literal(value)) => Ok(Operand::Literal(value)),
            Some(other) => Err(format!("expected a value, found {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
