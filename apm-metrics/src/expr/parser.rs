//! Recursive descent parser producing the expression tree.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | postfix
//! postfix := primary ('[' expr ']' | '.' IDENT)*
//! primary := NUMBER | STRING | 'true' | 'false' | 'nil'
//!          | '[' (expr (',' expr)*)? ']'
//!          | 'Metrics' '[' STRING ']'
//!          | IDENT '(' (expr (',' expr)*)? ')'
//!          | '(' expr ')'
//! ```
//!
//! Identifier resolution and arity checks happen here, so a tree that parses
//! only fails at run time on type or data errors.

use std::fmt;

use super::lexer::{Token, TokenKind, tokenize};
use crate::error::{Error, Result};

/// Identifier of the metric map in the evaluation environment.
pub(crate) const METRICS_IDENT: &str = "Metrics";

/// Deepest expression tree the parser builds. Evaluation and key collection
/// recurse over the tree, so this also bounds their stack use.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    MetricsSum,
    MetricsDiff,
    Len,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "MetricsSum" => Some(Builtin::MetricsSum),
            "MetricsDiff" => Some(Builtin::MetricsDiff),
            "len" => Some(Builtin::Len),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Builtin::MetricsSum | Builtin::MetricsDiff => 2,
            Builtin::Len => 1,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Builtin::MetricsSum => "MetricsSum",
            Builtin::MetricsDiff => "MetricsDiff",
            Builtin::Len => "len",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        })
    }
}

/// Fields readable on a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Timestamp,
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Nil,
    List(Vec<Expr>),
    Metric(String),
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        field: Field,
    },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Appends every metric key referenced by this tree to `keys`.
    pub(crate) fn collect_metric_keys(&self, keys: &mut Vec<String>) {
        match self {
            Expr::Metric(key) => keys.push(key.clone()),
            Expr::List(items) | Expr::Call { args: items, .. } => {
                for item in items {
                    item.collect_metric_keys(keys);
                }
            }
            Expr::Index { target, index } => {
                target.collect_metric_keys(keys);
                index.collect_metric_keys(keys);
            }
            Expr::Member { target, .. } | Expr::Neg(target) => target.collect_metric_keys(keys),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_metric_keys(keys);
                rhs.collect_metric_keys(keys);
            }
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Nil => {}
        }
    }
}

pub(crate) fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    parser.expect(&TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(unexpected(self.peek(), &format!("expected {}", kind)))
        }
    }

    /// Counts one more level of tree depth.
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Compile(format!(
                "expression nested too deeply at position {}",
                self.peek().pos
            )));
        }
        Ok(())
    }

    // Each operator of a left-associative chain adds a level to the tree.
    fn expr(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::LBracket) {
                self.descend()?;
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&TokenKind::Dot) {
                self.descend()?;
                let token = self.advance();
                let field = match &token.kind {
                    TokenKind::Ident(name) if name == "Timestamp" => Field::Timestamp,
                    TokenKind::Ident(name) if name == "Value" => Field::Value,
                    TokenKind::Ident(name) => {
                        return Err(Error::Compile(format!(
                            "unknown field {} at position {}",
                            name, token.pos
                        )));
                    }
                    _ => return Err(unexpected(&token, "expected field name")),
                };
                expr = Expr::Member {
                    target: Box::new(expr),
                    field,
                };
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.operand();
        self.depth -= 1;
        expr
    }

    fn operand(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => Ok(Expr::List(self.items(&TokenKind::RBracket)?)),
            TokenKind::Ident(name) => self.identifier(name, token.pos),
            _ => Err(unexpected(&token, "expected expression")),
        }
    }

    fn identifier(&mut self, name: String, pos: usize) -> Result<Expr> {
        match name.as_str() {
            "true" => return Ok(Expr::Bool(true)),
            "false" => return Ok(Expr::Bool(false)),
            "nil" => return Ok(Expr::Nil),
            METRICS_IDENT => return self.metric(pos),
            _ => {}
        }

        let Some(func) = Builtin::lookup(&name) else {
            return Err(Error::Compile(format!(
                "unknown name {} at position {}",
                name, pos
            )));
        };
        if !self.eat(&TokenKind::LParen) {
            return Err(unexpected(
                self.peek(),
                &format!("expected '(' after {}", func),
            ));
        }
        let args = self.items(&TokenKind::RParen)?;
        if args.len() != func.arity() {
            return Err(Error::Compile(format!(
                "{} expects {} arguments, got {} at position {}",
                func,
                func.arity(),
                args.len(),
                pos
            )));
        }
        Ok(Expr::Call { func, args })
    }

    /// Parses `["key"]` following the `Metrics` identifier.
    fn metric(&mut self, pos: usize) -> Result<Expr> {
        if !self.eat(&TokenKind::LBracket) {
            return Err(Error::Compile(format!(
                "{} must be indexed by a string literal at position {}",
                METRICS_IDENT, pos
            )));
        }
        let token = self.advance();
        let TokenKind::Str(key) = token.kind else {
            return Err(Error::Compile(format!(
                "{} must be indexed by a string literal at position {}",
                METRICS_IDENT, token.pos
            )));
        };
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::Metric(key))
    }

    /// Comma separated expressions up to and including `close`.
    fn items(&mut self, close: &TokenKind) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }
}

fn unexpected(token: &Token, context: &str) -> Error {
    Error::Compile(format!(
        "unexpected {} at position {}, {}",
        token.kind, token.pos, context
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn metric(key: &str) -> Box<Expr> {
        Box::new(Expr::Metric(key.to_string()))
    }

    #[test]
    fn should_parse_metric_sum() {
        // when
        let expr = parse(r#"Metrics["a"] + Metrics["b"]"#).unwrap();

        // then
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: metric("a"),
                rhs: metric("b"),
            }
        );
    }

    #[test]
    fn should_bind_multiplication_tighter_than_addition() {
        // when
        let expr = parse("1 + 2 * 3").unwrap();

        // then
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn should_associate_subtraction_left() {
        // when
        let expr = parse("5 - 2 - 1").unwrap();

        // then
        let Expr::Binary { op, lhs, rhs } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
        assert_eq!(*rhs, Expr::Number(1.0));
    }

    #[test]
    fn should_parse_postfix_chain() {
        // when
        let expr = parse(r#"Metrics["a"][-1].Value"#).unwrap();

        // then
        assert_eq!(
            expr,
            Expr::Member {
                target: Box::new(Expr::Index {
                    target: metric("a"),
                    index: Box::new(Expr::Neg(Box::new(Expr::Number(1.0)))),
                }),
                field: Field::Value,
            }
        );
    }

    #[test]
    fn should_parse_calls_and_lists() {
        // when
        let expr = parse(r#"MetricsDiff(MetricsSum(Metrics["a"], Metrics["b"]), Metrics["b"])"#)
            .unwrap();
        let list = parse(r#"[Metrics["a"][0], nil, true]"#).unwrap();

        // then
        assert!(matches!(
            expr,
            Expr::Call { func: Builtin::MetricsDiff, ref args } if args.len() == 2
        ));
        assert!(matches!(list, Expr::List(ref items) if items.len() == 3));
    }

    #[test]
    fn should_collect_metric_keys() {
        // given
        let expr = parse(r#"len(Metrics["a"]) * (Metrics["b"] - [Metrics["c"]][0]).Value"#)
            .unwrap();

        // when
        let mut keys = Vec::new();
        expr.collect_metric_keys(&mut keys);

        // then
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[rstest]
    #[case::empty("", "end of input")]
    #[case::dangling_operator(r#"Metrics["a"] +"#, "expected expression")]
    #[case::unclosed_paren("(1 + 2", "expected ')'")]
    #[case::trailing_tokens("1 2", "expected end of input")]
    #[case::unknown_identifier("foo", "unknown name foo")]
    #[case::unknown_function("avg(1)", "unknown name avg")]
    #[case::bare_function("len", "expected '(' after len")]
    #[case::wrong_arity(r#"MetricsSum(Metrics["a"])"#, "expects 2 arguments, got 1")]
    #[case::bare_metrics("Metrics", "string literal")]
    #[case::dynamic_metric_key(r#"Metrics["a" + "b"]"#, "expected ']'")]
    #[case::numeric_metric_key("Metrics[0]", "string literal")]
    #[case::unknown_field(r#"Metrics["a"][0].Name"#, "unknown field Name")]
    fn should_reject_invalid_expression(#[case] input: &str, #[case] expected: &str) {
        // when
        let result = parse(input);

        // then
        match result {
            Err(Error::Compile(msg)) => assert!(msg.contains(expected), "{}", msg),
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[rstest]
    #[case::parentheses(format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000)))]
    #[case::negations(format!("{}1", "-".repeat(10_000)))]
    #[case::lists(format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000)))]
    #[case::operator_chain(vec!["1"; 10_000].join(" + "))]
    #[case::index_chain(format!("[1]{}", "[0]".repeat(10_000)))]
    fn should_reject_deeply_nested_expression(#[case] input: String) {
        // when
        let result = parse(&input);

        // then
        match result {
            Err(Error::Compile(msg)) => assert!(msg.contains("nested too deeply"), "{}", msg),
            other => panic!("expected compile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn should_parse_moderately_nested_expression() {
        // given
        let input = format!("{}1{} + 2 * -3", "(".repeat(100), ")".repeat(100));

        // when
        let result = parse(&input);

        // then
        assert!(result.is_ok());
    }

    #[test]
    fn should_report_position_of_unexpected_token() {
        // when
        let result = parse("1 + )");

        // then
        assert!(matches!(result, Err(Error::Compile(msg)) if msg.contains("position 4")));
    }
}
