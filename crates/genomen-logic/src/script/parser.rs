//! Recursive-descent parser for rule scripts.
//!
//! Precedence, loosest first: comparisons (non-associative), `|`, `&`,
//! `+ -`, `* /`, unary minus, then calls, literals and parentheses.
//!
//! Nesting and operator chains count towards [`MAX_DEPTH`] so the parsed
//! tree stays shallow enough to evaluate recursively.

use super::lexer::{Spanned, Token};
use crate::error::LogicError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Arg>,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

/// A parsed script: one expression per statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Expr>,
}

/// Deepest expression tree a script may build.
pub const MAX_DEPTH: usize = 256;

pub fn parse(tokens: Vec<Spanned>) -> Result<Program, LogicError> {
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), LogicError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: String) -> LogicError {
        LogicError::Parse { line: self.line(), message }
    }

    fn descend(&mut self) -> Result<(), LogicError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {MAX_DEPTH}")));
        }
        Ok(())
    }

    fn program(&mut self) -> Result<Program, LogicError> {
        let mut program = Program::default();
        loop {
            while self.eat(&Token::Separator) {}
            if *self.peek() == Token::Eof {
                return Ok(program);
            }
            program.statements.push(self.expression()?);
            match self.peek() {
                Token::Separator | Token::Eof => {}
                other => return Err(self.error(format!("unexpected {other:?} after statement"))),
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, LogicError> {
        let base = self.depth;
        self.descend()?;
        let expr = self.comparison()?;
        self.depth = base;
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, LogicError> {
        let lhs = self.or()?;
        let op = match self.peek() {
            Token::EqEq => BinaryOp::Eq,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.or()?;
        Ok(binary(op, lhs, rhs))
    }

    fn or(&mut self) -> Result<Expr, LogicError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Token::Pipe) {
            self.descend()?;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, LogicError> {
        let base = self.depth;
        let mut lhs = self.additive()?;
        while self.eat(&Token::Amp) {
            self.descend()?;
            let rhs = self.additive()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, LogicError> {
        let base = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, LogicError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, LogicError> {
        if self.eat(&Token::Minus) {
            let base = self.depth;
            self.descend()?;
            let operand = self.unary()?;
            self.depth = base;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, LogicError> {
        let line = self.line();
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Text(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.expect(Token::LParen, "'(' after function name")?;
                let args = self.arguments()?;
                Ok(Expr::Call { name, args, line })
            }
            other => Err(LogicError::Parse { line, message: format!("unexpected {other:?}") }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Arg>, LogicError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.argument()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(Token::Comma, "',' or ')'")?;
        }
    }

    fn argument(&mut self) -> Result<Arg, LogicError> {
        let named = matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (Some(Spanned { token: Token::Ident(_), .. }), Some(Spanned { token: Token::Assign, .. }))
        );
        if named {
            let Token::Ident(name) = self.advance() else {
                return Err(self.error("expected argument name".into()));
            };
            self.advance();
            return Ok(Arg { name: Some(name), value: self.expression()? });
        }
        Ok(Arg { name: None, value: self.expression()? })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn parse_str(source: &str) -> Result<Program, LogicError> {
        parse(tokenize(source)?)
    }

    #[test]
    fn test_precedence() {
        let program = parse_str("1 + 2 * 3 == 7").unwrap();
        let expected = binary(
            BinaryOp::Eq,
            binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0)),
            ),
            Expr::Number(7.0),
        );
        assert_eq!(program.statements, vec![expected]);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let program = parse_str("true | false & false").unwrap();
        let expected = binary(
            BinaryOp::Or,
            Expr::Bool(true),
            binary(BinaryOp::And, Expr::Bool(false), Expr::Bool(false)),
        );
        assert_eq!(program.statements, vec![expected]);
    }

    #[test]
    fn test_named_arguments() {
        let program = parse_str("RESULT(GENO('rs1', 'A/G'), true_result='yes')").unwrap();
        let Expr::Call { name, args, .. } = &program.statements[0] else {
            panic!("expected call");
        };
        assert_eq!(name, "RESULT");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, None);
        assert_eq!(args[1].name.as_deref(), Some("true_result"));
        assert_eq!(args[1].value, Expr::Text("yes".into()));
    }

    #[test]
    fn test_multiple_statements() {
        let program = parse_str("ACCEPT_RESULT()\n\nRESULT(1); SET_INTEREST(true)").unwrap();
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse_str("RESULT(1)\nRESULT(1 +)").unwrap_err();
        assert!(matches!(err, LogicError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let depth = 200_000;
        let source = format!("RESULT({}1{})", "(".repeat(depth), ")".repeat(depth));
        let err = parse_str(&source).unwrap_err();
        assert!(matches!(err, LogicError::Parse { line: 1, .. }));

        let negations = format!("RESULT({}1)", "-".repeat(depth));
        assert!(parse_str(&negations).is_err());

        let chain = format!("RESULT(1{})", " + 1".repeat(depth));
        assert!(parse_str(&chain).is_err());
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let source = format!("RESULT({}1{})", "(".repeat(100), ")".repeat(100));
        assert!(parse_str(&source).is_ok());
        assert!(parse_str(&format!("RESULT(1{})", " + 1".repeat(100))).is_ok());
    }

    #[test]
    fn test_bare_identifier_is_rejected() {
        assert!(parse_str("foo").is_err());
        assert!(parse_str("1 2").is_err());
    }
}
