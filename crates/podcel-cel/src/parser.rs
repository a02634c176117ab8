use crate::ast::{BinaryOp, ComprehensionKind, Expr, Literal, UnaryOp};
use crate::error::ParseError;
use crate::lexer::{tokenize, Spanned, Token};

const MAX_DEPTH: usize = 128;

/// Parse a CEL expression, expanding `has` and the comprehension macros.
pub(crate) fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected token {}", describe(other)))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .or_else(|| self.tokens.last())
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |spanned| spanned.offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                describe(&token),
                describe(self.peek())
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    /// Enter one more level of the tree being built. Operator chains and
    /// member suffixes count per step, since each step deepens the tree.
    fn nest(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nesting exceeds maximum depth"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.nest()?;
        let result = self.conditional();
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.or()?;
        self.expect(Token::Colon)?;
        let otherwise = self.expr()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let entered = self.depth;
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            self.nest()?;
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.depth = entered;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let entered = self.depth;
        let mut left = self.relation()?;
        while self.eat(&Token::AndAnd) {
            self.nest()?;
            let right = self.relation()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.depth = entered;
        Ok(left)
    }

    fn relation(&mut self) -> Result<Expr, ParseError> {
        let entered = self.depth;
        let mut left = self.addition()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.addition()?;
            left = binary(op, left, right);
        }
        self.depth = entered;
        Ok(left)
    }

    fn addition(&mut self) -> Result<Expr, ParseError> {
        let entered = self.depth;
        let mut left = self.multiplication()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.multiplication()?;
            left = binary(op, left, right);
        }
        self.depth = entered;
        Ok(left)
    }

    fn multiplication(&mut self) -> Result<Expr, ParseError> {
        let entered = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        self.depth = entered;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                self.nest()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                self.advance();
                let literal = match self.peek() {
                    Token::Int(magnitude) => Some(negative_int(*magnitude).ok_or_else(|| {
                        self.error(format!("integer literal -{magnitude} out of range"))
                    })?),
                    Token::Double(value) => Some(Literal::Double(-value)),
                    _ => None,
                };
                match literal {
                    Some(literal) => {
                        self.advance();
                        self.member_suffix(Expr::Literal(literal))
                    }
                    None => {
                        self.nest()?;
                        let operand = self.unary()?;
                        self.depth -= 1;
                        Ok(Expr::Unary {
                            op: UnaryOp::Negate,
                            operand: Box::new(operand),
                        })
                    }
                }
            }
            _ => self.member(),
        }
    }

    fn member(&mut self) -> Result<Expr, ParseError> {
        let primary = self.primary()?;
        self.member_suffix(primary)
    }

    fn member_suffix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        let entered = self.depth;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.nest()?;
                    let name = self.ident()?;
                    if self.eat(&Token::LParen) {
                        let args = self.arguments(Token::RParen)?;
                        expr = receiver_call(name, expr, args).map_err(|m| self.error(m))?;
                    } else {
                        expr = Expr::Select {
                            operand: Box::new(expr),
                            field: name,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    self.nest()?;
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        operand: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        self.depth = entered;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        let literal = match token {
            Token::Int(magnitude) => match i64::try_from(magnitude) {
                Ok(value) => Literal::Int(value),
                Err(_) => {
                    return Err(self.error(format!("integer literal {magnitude} out of range")))
                }
            },
            Token::Uint(value) => Literal::Uint(value),
            Token::Double(value) => Literal::Double(value),
            Token::String(value) => Literal::String(value),
            Token::Bytes(value) => Literal::Bytes(value),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Dot => {
                let name = self.ident()?;
                return self.identifier_or_call(name);
            }
            Token::Ident(name) => return self.identifier_or_call(name),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::LBracket => return Ok(Expr::List(self.arguments(Token::RBracket)?)),
            Token::LBrace => return self.map_literal(),
            other => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error(format!("unexpected token {}", describe(&other))));
            }
        };
        Ok(Expr::Literal(literal))
    }

    fn identifier_or_call(&mut self, name: String) -> Result<Expr, ParseError> {
        if !self.eat(&Token::LParen) {
            return Ok(Expr::Ident(name));
        }
        let args = self.arguments(Token::RParen)?;
        global_call(name, args).map_err(|m| self.error(m))
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected identifier, found {}", describe(&other))))
            }
        }
    }

    /// Comma separated expressions up to `close`, trailing comma allowed.
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::Comma) {
                if self.eat(&close) {
                    return Ok(args);
                }
                continue;
            }
            self.expect(close)?;
            return Ok(args);
        }
    }

    fn map_literal(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.expr()?;
            self.expect(Token::Colon)?;
            let value = self.expr()?;
            entries.push((key, value));
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RBrace) {
                    return Ok(Expr::Map(entries));
                }
                continue;
            }
            self.expect(Token::RBrace)?;
            return Ok(Expr::Map(entries));
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

fn negative_int(magnitude: u64) -> Option<Literal> {
    if magnitude == 1u64 << 63 {
        return Some(Literal::Int(i64::MIN));
    }
    i64::try_from(magnitude).ok().map(|value| Literal::Int(-value))
}

fn global_call(function: String, mut args: Vec<Expr>) -> Result<Expr, String> {
    if function == "has" {
        if args.len() != 1 {
            return Err("has() takes exactly one argument".to_string());
        }
        return match args.pop() {
            Some(Expr::Select { operand, field }) => Ok(Expr::Has { operand, field }),
            _ => Err("invalid argument to has() macro".to_string()),
        };
    }
    Ok(Expr::Call {
        function,
        target: None,
        args,
    })
}

fn receiver_call(function: String, target: Expr, mut args: Vec<Expr>) -> Result<Expr, String> {
    let kind = match (function.as_str(), args.len()) {
        ("all", 2) => Some(ComprehensionKind::All),
        ("exists", 2) => Some(ComprehensionKind::Exists),
        ("exists_one", 2) => Some(ComprehensionKind::ExistsOne),
        ("map", 2 | 3) => Some(ComprehensionKind::Map),
        ("filter", 2) => Some(ComprehensionKind::Filter),
        _ => None,
    };

    let Some(kind) = kind else {
        return Ok(Expr::Call {
            function,
            target: Some(Box::new(target)),
            args,
        });
    };

    let var = match args.first() {
        Some(Expr::Ident(name)) => name.clone(),
        _ => return Err(format!("{function}() variable name must be a simple identifier")),
    };
    let body = args.pop().map(Box::new);
    let filter = if args.len() == 2 {
        args.pop().map(Box::new)
    } else {
        None
    };
    let Some(body) = body else {
        return Err(format!("{function}() is missing its body"));
    };

    Ok(Expr::Comprehension {
        kind,
        range: Box::new(target),
        var,
        filter,
        body,
    })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(value) => format!("integer {value}"),
        Token::Uint(value) => format!("unsigned integer {value}u"),
        Token::Double(value) => format!("double {value}"),
        Token::String(_) => "string literal".to_string(),
        Token::Bytes(_) => "bytes literal".to_string(),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Eof => "end of input".to_string(),
        other => {
            let text = match other {
                Token::True => "true",
                Token::False => "false",
                Token::Null => "null",
                Token::In => "in",
                Token::LParen => "(",
                Token::RParen => ")",
                Token::LBracket => "[",
                Token::RBracket => "]",
                Token::LBrace => "{",
                Token::RBrace => "}",
                Token::Dot => ".",
                Token::Comma => ",",
                Token::Colon => ":",
                Token::Question => "?",
                Token::Plus => "+",
                Token::Minus => "-",
                Token::Star => "*",
                Token::Slash => "/",
                Token::Percent => "%",
                Token::Bang => "!",
                Token::EqEq => "==",
                Token::NotEq => "!=",
                Token::Lt => "<",
                Token::Le => "<=",
                Token::Gt => ">",
                Token::Ge => ">=",
                Token::AndAnd => "&&",
                Token::OrOr => "||",
                _ => "token",
            };
            format!("'{text}'")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    #[test]
    fn parses_canonical_rule() {
        let expr = parse("has(self.containers) && self.containers.size() > 0").unwrap();
        let Expr::Binary { op, left, right } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert_eq!(
            *left,
            Expr::Has {
                operand: ident("self"),
                field: "containers".to_string()
            }
        );
        let Expr::Binary { op, left, .. } = *right else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Gt);
        assert!(matches!(*left, Expr::Call { ref function, target: Some(_), .. } if function == "size"));
    }

    #[test]
    fn respects_precedence() {
        let expr = parse("1 + 2 * 3 == 7 || false").unwrap();
        let Expr::Binary { op: BinaryOp::Or, left, .. } = expr else {
            panic!("expected ||");
        };
        let Expr::Binary { op: BinaryOp::Eq, left, .. } = *left else {
            panic!("expected ==");
        };
        let Expr::Binary { op: BinaryOp::Add, right, .. } = *left else {
            panic!("expected +");
        };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn folds_negative_literals() {
        assert_eq!(
            parse("-9223372036854775808").unwrap(),
            Expr::Literal(Literal::Int(i64::MIN))
        );
        assert_eq!(parse("-1.5").unwrap(), Expr::Literal(Literal::Double(-1.5)));
        assert!(parse("9223372036854775808").is_err());
        assert!(matches!(
            parse("-self.x").unwrap(),
            Expr::Unary {
                op: UnaryOp::Negate,
                ..
            }
        ));
    }

    #[test]
    fn expands_comprehension_macros() {
        let expr = parse("self.items.all(i, i.size() < 5)").unwrap();
        assert!(matches!(
            expr,
            Expr::Comprehension { kind: ComprehensionKind::All, ref var, filter: None, .. } if var == "i"
        ));

        let expr = parse("self.items.map(i, i != '', i + 'x')").unwrap();
        assert!(matches!(
            expr,
            Expr::Comprehension {
                kind: ComprehensionKind::Map,
                filter: Some(_),
                ..
            }
        ));

        assert!(parse("self.items.all(i.x, true)").is_err());
        assert!(parse("has(self)").is_err());
    }

    #[test]
    fn parses_literals_and_collections() {
        let expr = parse("{'a': [1, 2u, 3.0,], 'b': null}['a'][0]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
        assert!(matches!(parse("[]").unwrap(), Expr::List(ref items) if items.is_empty()));
        assert!(matches!(parse("{}").unwrap(), Expr::Map(ref entries) if entries.is_empty()));
    }

    #[test]
    fn reports_syntax_errors() {
        let err = parse("self.a &&").unwrap_err();
        assert!(err.message.contains("end of input"), "{err}");
        assert!(parse("(1 + 2").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("true ? 1").is_err());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn rejects_long_unary_chains() {
        let source = format!("{}true", "!".repeat(200_000));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("maximum depth"), "{err}");

        let source = format!("{}1", "-".repeat(200_000));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn rejects_long_operator_chains() {
        let source = format!("{} == 1", vec!["1"; 100_000].join(" + "));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("maximum depth"), "{err}");

        let source = vec!["true"; 100_000].join(" && ");
        assert!(parse(&source).is_err());

        let source = format!("self{}", ".a".repeat(100_000));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn accepts_moderate_chains() {
        let source = format!("{} == 60", vec!["1"; 60].join(" + "));
        assert!(parse(&source).is_ok());
        assert!(parse(&format!("{}true", "!".repeat(60))).is_ok());
        assert!(parse(&format!("self{}", ".a".repeat(60))).is_ok());
    }
}
