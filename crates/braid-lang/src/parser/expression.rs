//! Classical expression parsing.

use super::{PResult, Parser};
use crate::ast::{BinOp, Expr, ExprKind, UnaryOp};
use crate::lexer::Token;

impl Parser {
    /// Parse a classical expression.
    pub(super) fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_binary_expr(0)
    }

    /// Parse a binary expression with precedence climbing.
    fn parse_binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary_expr()?;

        while let Some(op) = self.peek_binary_op() {
            let prec = op_precedence(op);
            if prec < min_prec {
                break;
            }
            self.advance(); // consume operator

            // `**` is right-associative; everything else is left.
            let next_min = if op == BinOp::Pow { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min)?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                pos,
            );
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> PResult<Expr> {
        let pos = self.peek_pos();
        if self.consume(&Token::Minus) {
            let operand = self.parse_unary_expr()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                pos,
            ));
        }
        if self.consume(&Token::Not) {
            let operand = self.parse_unary_expr()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                pos,
            ));
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        let pos = self.peek_pos();
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.err(pos, "expected expression, found end of input"))?;

        match token {
            Token::IntLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(v), pos))
            }
            Token::FloatLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(v), pos))
            }
            Token::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            Token::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            Token::Identifier(name) => {
                self.advance();
                if self.consume(&Token::LParen) {
                    let args = self.parse_expression_list()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::new(ExprKind::Call { name, args }, pos))
                } else {
                    Ok(Expr::new(ExprKind::Identifier(name), pos))
                }
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(Expr::new(ExprKind::Paren(Box::new(expr)), pos))
            }
            Token::LBracket => {
                self.advance();
                self.parse_list_or_range(pos)
            }
            _ => Err(self.err(pos, format!("expected expression, found '{token}'"))),
        }
    }

    /// After `[`: a list literal `[a, b, c]`, an exclusive range `[a:b]`,
    /// or an inclusive range `[a..b]`.
    fn parse_list_or_range(&mut self, pos: crate::diag::SourcePos) -> PResult<Expr> {
        if self.consume(&Token::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), pos));
        }
        let first = self.parse_expression()?;
        if self.consume(&Token::Colon) {
            let end = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::new(
                ExprKind::Range {
                    start: Box::new(first),
                    end: Box::new(end),
                    inclusive: false,
                },
                pos,
            ));
        }
        if self.consume(&Token::DotDot) {
            let end = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::new(
                ExprKind::Range {
                    start: Box::new(first),
                    end: Box::new(end),
                    inclusive: true,
                },
                pos,
            ));
        }
        let mut elems = vec![first];
        while self.consume(&Token::Comma) {
            elems.push(self.parse_expression()?);
        }
        self.expect(Token::RBracket)?;
        Ok(Expr::new(ExprKind::List(elems), pos))
    }

    fn peek_binary_op(&self) -> Option<BinOp> {
        match self.peek()? {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            Token::Percent => Some(BinOp::Mod),
            Token::Power => Some(BinOp::Pow),
            Token::EqEq => Some(BinOp::Eq),
            Token::NotEq => Some(BinOp::NotEq),
            Token::Lt => Some(BinOp::Lt),
            Token::LtEq => Some(BinOp::LtEq),
            Token::Gt => Some(BinOp::Gt),
            Token::GtEq => Some(BinOp::GtEq),
            Token::And => Some(BinOp::And),
            Token::Or => Some(BinOp::Or),
            Token::Amp => Some(BinOp::BitAnd),
            Token::Pipe => Some(BinOp::BitOr),
            Token::Caret => Some(BinOp::BitXor),
            Token::Shl => Some(BinOp::Shl),
            Token::Shr => Some(BinOp::Shr),
            _ => None,
        }
    }

    /// Parse a comma-separated expression list, stopping before `)`.
    pub(super) fn parse_expression_list(&mut self) -> PResult<Vec<Expr>> {
        if self.check(&Token::RParen) {
            return Ok(Vec::new());
        }
        let mut exprs = vec![self.parse_expression()?];
        while self.consume(&Token::Comma) {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }
}

/// Operator precedence; higher binds tighter.
fn op_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Eq | BinOp::NotEq => 3,
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => 4,
        BinOp::BitOr => 5,
        BinOp::BitXor => 6,
        BinOp::BitAnd => 7,
        BinOp::Shl | BinOp::Shr => 8,
        BinOp::Add | BinOp::Sub => 9,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 10,
        BinOp::Pow => 11,
    }
}
