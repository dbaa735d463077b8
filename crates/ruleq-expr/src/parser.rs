//! Recursive-descent parser
//!
//! Precedence, lowest first: assignment, conditional, `||`, `&&`, equality,
//! comparison, additive, multiplicative, prefix unary, postfix update,
//! member/index/call, primary.

use crate::ast::{AssignOp, BinaryOp, Expr, LogicalOp, UnaryOp, UpdateOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Spanned, Token};
use crate::value::Value;
use crate::MAX_DEPTH;

/// Parse a complete expression
pub(crate) fn parse(source: &str) -> ParseResult<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::new(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    let expr = parser.assignment()?;

    if let Some(extra) = parser.peek_spanned() {
        return Err(ParseError::new(
            extra.offset,
            format!("unexpected token {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.offset)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> ParseResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                self.offset(),
                format!("{}, found {:?}", message.into(), token),
            ),
            None => ParseError::new(self.end, format!("{}, found end of input", message.into())),
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.assignment_inner();
        self.leave();
        result
    }

    fn assignment_inner(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        let target = self.conditional()?;

        let op = match self.peek() {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::PlusAssign) => AssignOp::Add,
            Some(Token::MinusAssign) => AssignOp::Sub,
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(ParseError::new(offset, "invalid assignment target"));
        }
        self.advance();

        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let test = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }

        let consequent = self.assignment()?;
        self.expect(Token::Colon, "':'")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// Run a left-associative chain, restoring the depth once it is built
    ///
    /// Each node the chain adds nests the previous one a level deeper, so
    /// the body calls [`Parser::enter`] per node.
    fn chain(&mut self, body: impl FnOnce(&mut Self) -> ParseResult<Expr>) -> ParseResult<Expr> {
        let mark = self.depth;
        let result = body(self);
        self.depth = mark;
        result
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.logical_and()?;
            while p.eat(&Token::OrOr) {
                p.enter()?;
                let right = p.logical_and()?;
                left = Expr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        })
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.equality()?;
            while p.eat(&Token::AndAnd) {
                p.enter()?;
                let right = p.equality()?;
                left = Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        })
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.comparison()?;
            loop {
                let op = match p.peek() {
                    Some(Token::EqEq) => BinaryOp::Eq,
                    Some(Token::NotEq) => BinaryOp::NotEq,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.comparison()?;
                left = binary(op, left, right);
            }
        })
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.additive()?;
            loop {
                let op = match p.peek() {
                    Some(Token::Lt) => BinaryOp::Lt,
                    Some(Token::LtEq) => BinaryOp::LtEq,
                    Some(Token::Gt) => BinaryOp::Gt,
                    Some(Token::GtEq) => BinaryOp::GtEq,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.additive()?;
                left = binary(op, left, right);
            }
        })
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.multiplicative()?;
            loop {
                let op = match p.peek() {
                    Some(Token::Plus) => BinaryOp::Add,
                    Some(Token::Minus) => BinaryOp::Sub,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.multiplicative()?;
                left = binary(op, left, right);
            }
        })
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.chain(|p| {
            let mut left = p.unary()?;
            loop {
                let op = match p.peek() {
                    Some(Token::Star) => BinaryOp::Mul,
                    Some(Token::Slash) => BinaryOp::Div,
                    Some(Token::Percent) => BinaryOp::Rem,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.unary()?;
                left = binary(op, left, right);
            }
        })
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Plus),
            Some(Token::PlusPlus) | Some(Token::MinusMinus) => None,
            _ => return self.postfix(),
        };

        self.enter()?;
        let result = match op {
            Some(op) => {
                self.advance();
                self.unary().map(|operand| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.prefix_update(),
        };
        self.leave();
        result
    }

    fn prefix_update(&mut self) -> ParseResult<Expr> {
        let op = match self.advance() {
            Some(Token::PlusPlus) => UpdateOp::Increment,
            _ => UpdateOp::Decrement,
        };
        let offset = self.offset();
        let target = self.unary()?;
        if !target.is_assignable() {
            return Err(ParseError::new(offset, "invalid update target"));
        }
        Ok(Expr::Update {
            op,
            prefix: true,
            target: Box::new(target),
        })
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        let expr = self.call()?;

        let op = match self.peek() {
            Some(Token::PlusPlus) => UpdateOp::Increment,
            Some(Token::MinusMinus) => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        if !expr.is_assignable() {
            return Err(ParseError::new(offset, "invalid update target"));
        }
        self.advance();
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn call(&mut self) -> ParseResult<Expr> {
        self.chain(Self::call_links)
    }

    fn call_links(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if matches!(
                self.peek(),
                Some(Token::Dot) | Some(Token::LBracket) | Some(Token::LParen)
            ) {
                self.enter()?;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let property = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.error("expected property name"));
                        }
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.assignment()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.advance();
                    let args = self.list(Token::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma separated expressions up to and including `close`
    fn list(&mut self, close: Token, what: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.assignment()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(Token::Comma, &format!("',' or {}", what))?;
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(self.error("expected expression"));
        };

        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let expr = self.assignment()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                self.enter()?;
                let items = self.list(Token::RBracket, "']'");
                self.leave();
                Ok(Expr::Array(items?))
            }
            Token::LBrace => {
                self.enter()?;
                let fields = self.object_fields();
                self.leave();
                Ok(Expr::Object(fields?))
            }
            other => Err(ParseError::new(
                offset,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    fn object_fields(&mut self) -> ParseResult<Vec<(String, Expr)>> {
        let mut fields = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(fields);
        }
        loop {
            let key = match self.advance() {
                Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                Some(Token::Number(n)) => Value::Number(n).to_string(),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected object key"));
                }
            };
            self.expect(Token::Colon, "':'")?;
            fields.push((key, self.assignment()?));

            if self.eat(&Token::RBrace) {
                return Ok(fields);
            }
            self.expect(Token::Comma, "',' or '}'")?;
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    fn member(object: &str, property: &str) -> Box<Expr> {
        Box::new(Expr::Member {
            object: ident(object),
            property: property.to_string(),
        })
    }

    #[test]
    fn test_comparison_of_members() {
        assert_eq!(
            parse("timer.max > timer.current").unwrap(),
            Expr::Binary {
                op: BinaryOp::Gt,
                left: member("timer", "max"),
                right: member("timer", "current"),
            }
        );
    }

    #[test]
    fn test_postfix_increment() {
        assert_eq!(
            parse("timer.current++").unwrap(),
            Expr::Update {
                op: UpdateOp::Increment,
                prefix: false,
                target: member("timer", "current"),
            }
        );
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3 == 7 && !false").unwrap();
        let Expr::Logical { op, left, .. } = expr else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOp::And);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_call_and_index_chain() {
        let expr = parse("light.get(light.max).value[1]").unwrap();
        let Expr::Index { object, .. } = expr else {
            panic!("expected index");
        };
        let Expr::Member { object, property } = *object else {
            panic!("expected member");
        };
        assert_eq!(property, "value");
        assert!(matches!(*object, Expr::Call { ref args, .. } if args.len() == 1));
    }

    #[test]
    fn test_object_literal() {
        assert_eq!(
            parse("{data: 'off', 'level': 3}").unwrap(),
            Expr::Object(vec![
                ("data".to_string(), Expr::Literal(Value::String("off".into()))),
                ("level".to_string(), Expr::Literal(Value::Number(3.0))),
            ])
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse("a.current = b.current = 3").unwrap();
        let Expr::Assign { value, .. } = expr else {
            panic!("expected assignment");
        };
        assert!(matches!(*value, Expr::Assign { .. }));
    }

    #[test]
    fn test_invalid_targets() {
        assert!(parse("1 = 2").is_err());
        assert!(parse("(a + b)++").is_err());
        assert!(parse("++3").is_err());
    }

    #[test]
    fn test_syntax_errors_report_offset() {
        let err = parse("a.max >").unwrap_err();
        assert_eq!(err.offset, 7);
        assert!(parse("").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("a ? b").is_err());
        assert!(parse("[1, 2").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse(&deep).is_err());
        let bangs = format!("{}true", "!".repeat(MAX_DEPTH + 1));
        assert!(parse(&bangs).is_err());
        assert!(parse("((((1))))").is_ok());
    }

    #[test]
    fn test_flat_chains_count_toward_depth() {
        let sum = format!("q.max{}", " + 1".repeat(4000));
        let err = parse(&sum).unwrap_err();
        assert!(err.message.contains("nested too deeply"));

        let ors = format!("false{}", " || false".repeat(4000));
        assert!(parse(&ors).is_err());

        let members = format!("q{}", ".value".repeat(4000));
        assert!(parse(&members).is_err());

        let indexes = format!("q{}", "[0]".repeat(4000));
        assert!(parse(&indexes).is_err());

        let short = format!("q.max{}", " + 1".repeat(20));
        assert!(parse(&short).is_ok());
    }
}
