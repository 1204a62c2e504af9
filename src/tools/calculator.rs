//! Arithmetic on `计算 <expression>`

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;

const PREFIX: &str = "计算";

/// Parentheses and unary minus each recurse; deeper input is rejected
const MAX_DEPTH: usize = 64;

pub struct CalculatorTool;

/// Recursive-descent evaluator over `+ - * /`, unary minus and parentheses
struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().filter(|c| !c.is_whitespace()).collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn evaluate(mut self) -> Result<f64, ToolError> {
        if self.chars.is_empty() {
            return Err(ToolError::InvalidInput("empty expression".to_string()));
        }
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(c) => Err(ToolError::InvalidInput(format!("unexpected '{c}'"))),
        }
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/' | '×' | '÷')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if matches!(op, '*' | '×') {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return Err(ToolError::InvalidInput("division by zero".to_string()));
                }
                value / rhs
            };
        }
        Ok(value)
    }

    fn nested(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<f64, ToolError>,
    ) -> Result<f64, ToolError> {
        if self.depth >= MAX_DEPTH {
            return Err(ToolError::InvalidInput("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let value = inner(self);
        self.depth -= 1;
        value
    }

    fn factor(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                self.nested(|p| Ok(-p.factor()?))
            }
            Some('(' | '（') => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                match self.peek() {
                    Some(')' | '）') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(ToolError::InvalidInput("missing ')'".to_string())),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(ToolError::InvalidInput(format!("unexpected '{c}'"))),
            None => Err(ToolError::InvalidInput("unexpected end of expression".to_string())),
        }
    }

    fn number(&mut self) -> Result<f64, ToolError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| ToolError::InvalidInput(format!("bad number '{literal}'")))
    }
}

fn expression_of(text: &str) -> &str {
    text.strip_prefix(PREFIX)
        .unwrap_or(text)
        .trim_start_matches([':', '：'])
        .trim()
        .trim_end_matches(['=', '＝', '?', '？'])
        .trim()
}

#[async_trait]
impl ToolDescriptor for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Evaluate an arithmetic expression"
    }

    fn matches(&self, text: &str) -> bool {
        text.starts_with(PREFIX)
    }

    async fn handle(&self, text: &str) -> Result<Option<String>, ToolError> {
        let expression = expression_of(text);
        let result = Parser::new(expression).evaluate()?;
        if !result.is_finite() {
            return Err(ToolError::InvalidInput("result is not finite".to_string()));
        }
        Ok(Some(format!("计算结果: {expression} = {result}")))
    }
}
