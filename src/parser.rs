use crate::ast::*;
use crate::error::ExprError;
use crate::lexer::{tokenize, Token};
use std::collections::VecDeque;

pub struct Parser {
    buffer: VecDeque<Token>,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ExprError> {
        Ok(Self {
            buffer: tokenize(input)?.into(),
        })
    }

    fn peek(&self, n: usize) -> Option<&Token> {
        self.buffer.get(n)
    }

    fn consume(&mut self) -> Option<Token> {
        self.buffer.pop_front()
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.consume() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(ExprError::new(format!("expected {:?}, got {:?}", token, t))),
            None => Err(ExprError::new(format!(
                "expected {:?}, got end of expression",
                token
            ))),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.consume() {
            None => Ok(()),
            Some(t) => Err(ExprError::new(format!(
                "unexpected {:?} after expression",
                t
            ))),
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(&mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse `<ident> in <expr>` as used by the `for` attribute.
    pub fn parse_for(&mut self) -> Result<ForSpec, ExprError> {
        let target = match self.consume() {
            Some(Token::Ident(s)) => s,
            t => {
                return Err(ExprError::new(format!(
                    "expected identifier for loop target, got {:?}",
                    t
                )))
            }
        };
        self.expect(Token::In)?;
        let iterable = self.parse_expr()?;
        self.expect_end()?;

        Ok(ForSpec { target, iterable })
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while let Some(Token::Or) = self.peek(0) {
            self.consume();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while let Some(Token::And) = self.peek(0) {
            self.consume();
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if let Some(Token::Not) = self.peek(0) {
            self.consume();
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match (self.peek(0), self.peek(1)) {
                (Some(Token::EqEq), _) => BinOp::Eq,
                (Some(Token::NotEq), _) => BinOp::NotEq,
                (Some(Token::Lt), _) => BinOp::Lt,
                (Some(Token::Le), _) => BinOp::Le,
                (Some(Token::Gt), _) => BinOp::Gt,
                (Some(Token::Ge), _) => BinOp::Ge,
                (Some(Token::In), _) => BinOp::In,
                (Some(Token::Not), Some(Token::In)) => {
                    self.consume(); // not
                    BinOp::NotIn
                }
                _ => break,
            };
            self.consume();
            let rhs = self.parse_additive()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume();
            let rhs = self.parse_term()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.consume();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if let Some(Token::Minus) = self.peek(0) {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;

        // Handle suffixes: .attr, ['key'], (args)
        loop {
            match self.peek(0) {
                Some(Token::Dot) => {
                    self.consume(); // .
                    match self.consume() {
                        Some(Token::Ident(attr)) => {
                            expr = Expr::Attribute(Box::new(expr), attr);
                        }
                        t => {
                            return Err(ExprError::new(format!(
                                "expected identifier after dot, got {:?}",
                                t
                            )))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.consume(); // [
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                Some(Token::LParen) => {
                    let name = match expr {
                        Expr::Var(name) => name,
                        _ => return Err(ExprError::new("only built-in functions can be called")),
                    };
                    self.consume(); // (
                    let args = self.parse_list(Token::RParen)?;
                    expr = Expr::Call(name, args);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.peek(0) == Some(&close) {
            self.consume();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(t) if t == close => return Ok(items),
                t => {
                    return Err(ExprError::new(format!(
                        "expected ',' or {:?}, got {:?}",
                        close, t
                    )))
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.consume() {
            Some(Token::StringLit(s)) => Ok(Expr::StringLit(s)),
            Some(Token::Int(i)) => Ok(Expr::IntLit(i)),
            Some(Token::Float(f)) => Ok(Expr::FloatLit(f)),
            Some(Token::True) => Ok(Expr::BoolLit(true)),
            Some(Token::False) => Ok(Expr::BoolLit(false)),
            Some(Token::None) => Ok(Expr::NoneLit),
            Some(Token::Ident(s)) => Ok(Expr::Var(s)),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::LBracket) => Ok(Expr::ListLit(self.parse_list(Token::RBracket)?)),
            Some(t) => Err(ExprError::new(format!("expected expression, got {:?}", t))),
            None => Err(ExprError::new("expected expression, got end of input")),
        }
    }
}

/// Parse a standalone expression.
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    Parser::new(input)?.parse()
}

/// Parse the value of a `for` attribute.
pub fn parse_for(input: &str) -> Result<ForSpec, ExprError> {
    Parser::new(input)?.parse_for()
}

/// Split text into literal runs and `#{...}` expressions, left to right.
///
/// Quoted strings inside a marker may contain `}`.
pub fn split_markers(text: &str) -> Result<Vec<Piece<'_>>, ExprError> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("#{") {
        if start > 0 {
            pieces.push(Piece::Literal(&rest[..start]));
        }
        let body = &rest[start + 2..];
        let end = find_marker_end(body).ok_or_else(|| {
            ExprError::new(format!("unterminated `#{{` in {:?}", text))
        })?;
        pieces.push(Piece::Expr(&body[..end]));
        rest = &body[end + 1..];
    }

    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

fn find_marker_end(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '}' => return Some(idx),
            None => {}
        }
    }
    None
}
