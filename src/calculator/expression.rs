//! A small pratt-parsed AST interpreter for `EXPRESSION` calculators.
//!
//! Deliberately restricted per the design notes: arithmetic, comparisons,
//! boolean `and`/`or`/`not`, a fixed function table (`len`, `concat`,
//! `coalesce`, `if`), and `#fieldName` variable references. Not a general
//! scripting language.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::value::Value;

use super::context::CalcContext;
use super::error::CalculatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add, Sub, Mul, Mod, Div,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(Decimal),
    Str(String),
    Bool(bool),
    Field(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Expression ASTs cached by (expression text, field-config version), so
/// repeated evaluations of the same configured expression reuse the
/// parsed tree.
static AST_CACHE: Lazy<DashMap<(String, u64), Arc<Expr>>> = Lazy::new(DashMap::new);

#[cfg(test)]
pub fn clear_ast_cache() {
    AST_CACHE.clear();
}

fn parsed(expr_text: &str, version: u64) -> Result<Arc<Expr>, String> {
    let key = (expr_text.to_string(), version);
    if let Some(cached) = AST_CACHE.get(&key) {
        return Ok(cached.clone());
    }
    let ast = Arc::new(parse(expr_text)?);
    AST_CACHE.insert(key, ast.clone());
    Ok(ast)
}

/// Parse and evaluate `expr_text` (cached by `(expr_text, version)`)
/// against `context`, surfacing any failure as a [`CalculatorError`].
pub fn evaluate(
    expr_text: &str,
    version: u64,
    field_name: &str,
    context: &CalcContext,
) -> Result<Value, CalculatorError> {
    let ast = parsed(expr_text, version)
        .map_err(|message| CalculatorError::new("EXPRESSION", field_name, message))?;
    eval(&ast, context).map_err(|message| CalculatorError::new("EXPRESSION", field_name, message))
}

fn eval(expr: &Expr, ctx: &CalcContext) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Field(name) => Ok(ctx.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Not(inner) => {
            let v = eval(inner, ctx)?;
            let b = v.as_bool().ok_or_else(|| format!("'{v}' is not boolean"))?;
            Ok(Value::Bool(!b))
        }
        Expr::Neg(inner) => {
            let v = eval(inner, ctx)?;
            let n = v.as_number().ok_or_else(|| format!("'{v}' is not numeric"))?;
            Ok(Value::Number(-n))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &CalcContext) -> Result<Value, String> {
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = eval(lhs, ctx)?;
        let lb = l.as_bool().ok_or_else(|| format!("'{l}' is not boolean"))?;
        if op == BinOp::And && !lb {
            return Ok(Value::Bool(false));
        }
        if op == BinOp::Or && lb {
            return Ok(Value::Bool(true));
        }
        let r = eval(rhs, ctx)?;
        let rb = r.as_bool().ok_or_else(|| format!("'{r}' is not boolean"))?;
        return Ok(Value::Bool(rb));
    }

    let l = eval(lhs, ctx)?;
    let r = eval(rhs, ctx)?;

    match op {
        BinOp::Eq => Ok(Value::Bool(l.coerced_eq(&r))),
        BinOp::Ne => Ok(Value::Bool(!l.coerced_eq(&r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = l.compare(&r).ok_or_else(|| format!("'{l}' and '{r}' are not comparable"))?;
            let result = match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                BinOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let ln = l.as_number().ok_or_else(|| format!("'{l}' is not numeric"))?;
            let rn = r.as_number().ok_or_else(|| format!("'{r}' is not numeric"))?;
            let result = match op {
                BinOp::Add => ln + rn,
                BinOp::Sub => ln - rn,
                BinOp::Mul => ln * rn,
                BinOp::Div => {
                    if rn.is_zero() {
                        return Err("division by zero".to_string());
                    }
                    ln / rn
                }
                BinOp::Mod => {
                    if rn.is_zero() {
                        return Err("modulo by zero".to_string());
                    }
                    ln % rn
                }
                _ => unreachable!(),
            };
            Ok(Value::Number(result))
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &CalcContext) -> Result<Value, String> {
    match name {
        "len" => {
            if args.len() != 1 {
                return Err("len() takes exactly one argument".to_string());
            }
            let v = eval(&args[0], ctx)?;
            let len = match &v {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                _ => return Err(format!("len() is not defined for '{v}'")),
            };
            Ok(Value::Number(Decimal::from(len)))
        }
        "concat" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&eval(arg, ctx)?.to_string());
            }
            Ok(Value::String(out))
        }
        "coalesce" => {
            for arg in args {
                let v = eval(arg, ctx)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            Ok(Value::Null)
        }
        "if" => {
            if args.len() != 3 {
                return Err("if() takes exactly three arguments".to_string());
            }
            let cond = eval(&args[0], ctx)?;
            let cond = cond.as_bool().ok_or_else(|| format!("'{cond}' is not boolean"))?;
            if cond {
                eval(&args[1], ctx)
            } else {
                eval(&args[2], ctx)
            }
        }
        other => Err(format!("unknown function '{other}'")),
    }
}

// --- Tokenizer & parser -----------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    BoolLiteral(bool),
    Str(String),
    Field(String),
    Ident(String),
    Plus, Minus, Star, Slash, Percent,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or, Not,
    LParen, RParen, Comma,
    End,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '=' => { tokens.push(Token::Eq); i += 1; }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err("unexpected '!' (expected '!=')".to_string());
                }
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
            '#' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                    j += 1;
                }
                if j == start {
                    return Err("'#' must be followed by a field name".to_string());
                }
                tokens.push(Token::Field(chars[start..j].iter().collect()));
                i = j;
            }
            '"' | '\'' => {
                let quote = c;
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != quote {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(s));
                i = j + 1;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                let n = text.parse::<Decimal>().map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(n));
                i = j;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "true" => tokens.push(Token::BoolLiteral(true)),
                    "false" => tokens.push(Token::BoolLiteral(false)),
                    _ => tokens.push(Token::Ident(word)),
                }
                i = j;
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    tokens.push(Token::End);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> Result<(), String> {
        if self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {t:?}, found {:?}", self.peek()))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while *self.peek() == Token::And {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::Not => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::BoolLiteral(b) => Ok(Expr::Bool(b)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Field(name) => Ok(Expr::Field(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    args.push(self.parse_or()?);
                    while *self.peek() == Token::Comma {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::Call(name, args))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if *parser.peek() != Token::End {
        return Err(format!("unexpected trailing token {:?}", parser.peek()));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx(values: &HashMap<String, Value>) -> CalcContext<'_> {
        CalcContext::new(values)
    }

    #[test]
    fn arithmetic_expression_evaluates() {
        let mut values = HashMap::new();
        values.insert("price".to_string(), Value::Number(Decimal::new(10, 0)));
        values.insert("quantity".to_string(), Value::Number(Decimal::new(5, 0)));
        let c = ctx(&values);
        let result = evaluate("#price * #quantity", 1, "totalAmount", &c).unwrap();
        assert_eq!(result.as_number().unwrap(), Decimal::new(50, 0));
    }

    #[test]
    fn comparison_and_boolean_operators() {
        let mut values = HashMap::new();
        values.insert("age".to_string(), Value::Number(Decimal::new(25, 0)));
        let c = ctx(&values);
        let result = evaluate("#age >= 18 and not (#age > 100)", 1, "eligible", &c).unwrap();
        assert_eq!(result.as_bool(), Some(true));
    }

    #[test]
    fn functions_len_concat_coalesce_if() {
        let mut values = HashMap::new();
        values.insert("name".to_string(), Value::String("Alice".to_string()));
        let c = ctx(&values);
        assert_eq!(evaluate("len(#name)", 1, "f", &c).unwrap().as_number().unwrap(), Decimal::new(5, 0));
        assert_eq!(
            evaluate("concat(#name, \"!\")", 1, "f", &c).unwrap().as_str().map(str::to_string),
            Some("Alice!".to_string())
        );
        assert_eq!(
            evaluate("coalesce(#missing, #name)", 1, "f", &c).unwrap().as_str().map(str::to_string),
            Some("Alice".to_string())
        );
        assert_eq!(
            evaluate("if(len(#name) > 3, \"long\", \"short\")", 1, "f", &c).unwrap().as_str(),
            Some("long")
        );
    }

    #[test]
    fn division_by_zero_is_structured_error() {
        let values = HashMap::new();
        let c = ctx(&values);
        assert!(evaluate("1 / 0", 1, "f", &c).is_err());
    }

    #[test]
    fn unknown_function_is_an_error() {
        let values = HashMap::new();
        let c = ctx(&values);
        assert!(evaluate("nope(1)", 1, "f", &c).is_err());
    }

    #[test]
    fn ast_cache_reuses_parsed_tree() {
        clear_ast_cache();
        let values = HashMap::new();
        let c = ctx(&values);
        assert!(evaluate("1 + 1", 7, "f", &c).is_ok());
        assert_eq!(AST_CACHE.len(), 1);
        assert!(evaluate("1 + 1", 7, "f", &c).is_ok());
        assert_eq!(AST_CACHE.len(), 1);
    }
}
