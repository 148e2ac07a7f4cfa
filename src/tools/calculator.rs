//! Calculator 工具：安全的四则运算求值
//!
//! 只接受数字、+ - * / % **（右结合）、一元正负号与括号，手写递归下降解析，不执行任何代码。
//! 结果统一为 f64；除零、取模零与非有限结果都视为失败。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::ToolResult;
use crate::tools::{FieldType, InputContract, Tier, Tool};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a math expression and return the numeric result."
    }

    fn input_contract(&self) -> InputContract {
        InputContract::new().required(
            "expression",
            FieldType::String,
            "A math expression (e.g., '2 + 2', '10 / 3', '2 ** 10')",
        )
    }

    fn cost(&self) -> Tier {
        Tier::Low
    }

    fn risk(&self) -> Tier {
        Tier::Low
    }

    fn latency_ms(&self) -> u64 {
        5
    }

    fn check_output(&self, output: &Value) -> Result<(), String> {
        match output.get("result").and_then(|v| v.as_f64()) {
            Some(n) if n.is_finite() => Ok(()),
            _ => Err("calculator result is not a finite number".to_string()),
        }
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolResult, String> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        Ok(match evaluate(expression) {
            Ok(n) => ToolResult::success(self.name(), args.clone(), Value::from(n)),
            Err(e) => ToolResult::failure(self.name(), args.clone(), e),
        })
    }
}

/// 求值入口：整个输入必须恰好是一个表达式
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected token at position {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not finite".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let lit: String = chars[start..i].iter().collect();
                let n = lit
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{lit}'"))?;
                tokens.push(Token::Num(n));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                i += 1;
            }
            other => return Err(format!("Unsupported character '{other}'")),
        }
    }
    Ok(tokens)
}

// expr   := term (('+' | '-') term)*
// term   := unary (('*' | '/' | '%') unary)*
// unary  := ('+' | '-') unary | power
// power  := atom ('**' unary)?
// atom   := NUM | '(' expr ')'
//
// 括号、一元符号与 ** 的右操作数都经由 unary 递归，深度在 unary 入口统一限制。
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// unary 的最大嵌套层数
const MAX_DEPTH: usize = 64;

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut acc = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == Token::Plus { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut acc = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::Percent)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = match op {
                Token::Star => acc * rhs,
                _ if rhs == 0.0 => return Err("division by zero".to_string()),
                Token::Slash => acc / rhs,
                // 与 Python 一致：结果符号跟随除数
                _ => acc - rhs * (acc / rhs).floor(),
            };
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = self.unary_inner();
        self.depth -= 1;
        value
    }

    fn unary_inner(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Pow) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(_) => Err("Unsupported expression".to_string()),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(evaluate("2 + 2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert!((evaluate("10 / 3").unwrap() - 3.333_333).abs() < 1e-5);
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(evaluate("2 ** 10").unwrap(), 1024.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(evaluate("7 % 3").unwrap(), 1.0);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1 / 0").unwrap_err().contains("zero"));
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("import os").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&deep).unwrap_err(), "expression nested too deeply");
        assert!(evaluate(&"-".repeat(10_000)).is_err());
        assert!(evaluate(&vec!["2"; 5_000].join(" ** ")).is_err());

        let shallow = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);
        assert_eq!(evaluate(&vec!["1"; 5_000].join(" + ")).unwrap(), 5_000.0);
    }

    #[tokio::test]
    async fn test_execute_returns_contract_shaped_result() {
        let args = json!({"expression": "6 * 7"}).as_object().cloned().unwrap();
        let r = CalculatorTool.execute(&args).await.unwrap();
        assert!(r.ok);
        assert_eq!(r.tool, "calculator");
        assert_eq!(r.result(), Some(&json!(42.0)));
        assert!(CalculatorTool.check_output(&r.output).is_ok());

        let args = json!({"expression": "6 *"}).as_object().cloned().unwrap();
        let r = CalculatorTool.execute(&args).await.unwrap();
        assert!(!r.ok);
        assert!(r.error().is_some());
    }

    #[test]
    fn test_check_output_requires_number() {
        assert!(CalculatorTool.check_output(&json!({"result": "four"})).is_err());
        assert!(CalculatorTool.check_output(&json!({"result": 4})).is_ok());
    }
}
