//! Formula recursive descent parser.
//!
//! Parses token streams into `Expr` trees with the usual precedence
//! ladder, lowest first:
//!
//! `?:` → `||` → `&&` → `|` → `^` → `&` → `= <>` → `< <= > >=`
//! → `<< >>` → `+ -` → `* / %` → `**` → unary `- ! ~` → primary

use crate::{Error, Result};
use super::ast::*;
use super::lexer::{Token, TokenKind};

/// Parser state — wraps a token slice with cursor.
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> Error {
        Error::InvalidArgument(format!("formula parse error at {}: {msg}", self.peek().span.start))
    }
}

/// Parse a complete formula from tokens.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr> {
    let mut p = Parser::new(tokens);
    if p.at(TokenKind::Eof) {
        return Err(p.error("empty formula".into()));
    }
    let expr = parse_ternary(&mut p)?;
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!("unexpected token after expression: '{}'", p.peek().text)));
    }
    Ok(expr)
}

// ============================================================================
// Precedence ladder
// ============================================================================

fn parse_ternary(p: &mut Parser) -> Result<Expr> {
    let cond = parse_or(p)?;
    if p.eat(TokenKind::Question) {
        let then_expr = parse_ternary(p)?;
        p.expect(TokenKind::Colon)?;
        let else_expr = parse_ternary(p)?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    } else {
        Ok(cond)
    }
}

fn parse_or(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and(p)?;
    while p.eat(TokenKind::OrOr) {
        let right = parse_and(p)?;
        left = Expr::Binary { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_bit_or(p)?;
    while p.eat(TokenKind::AndAnd) {
        let right = parse_bit_or(p)?;
        left = Expr::Binary { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_bit_or(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_bit_xor(p)?;
    while p.eat(TokenKind::Pipe) {
        let right = parse_bit_xor(p)?;
        left = Expr::Binary { left: Box::new(left), op: BinaryOp::BitOr, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_bit_xor(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_bit_and(p)?;
    while p.eat(TokenKind::Caret) {
        let right = parse_bit_and(p)?;
        left = Expr::Binary { left: Box::new(left), op: BinaryOp::BitXor, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_bit_and(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_equality(p)?;
    while p.eat(TokenKind::Amp) {
        let right = parse_equality(p)?;
        left = Expr::Binary { left: Box::new(left), op: BinaryOp::BitAnd, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_equality(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_comparison(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Neq => BinaryOp::Neq,
            _ => break,
        };
        p.advance();
        let right = parse_comparison(p)?;
        left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_shift(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Lte => BinaryOp::Lte,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Gte => BinaryOp::Gte,
            _ => break,
        };
        p.advance();
        let right = parse_shift(p)?;
        left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_shift(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_addition(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Shl => BinaryOp::Shl,
            TokenKind::Shr => BinaryOp::Shr,
            _ => break,
        };
        p.advance();
        let right = parse_addition(p)?;
        left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_addition(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplication(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplication(p)?;
        left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_multiplication(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_power(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Rem,
            _ => break,
        };
        p.advance();
        let right = parse_power(p)?;
        left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_power(p: &mut Parser) -> Result<Expr> {
    let left = parse_unary(p)?;
    if p.eat(TokenKind::StarStar) {
        let right = parse_power(p)?; // right-associative
        Ok(Expr::Binary { left: Box::new(left), op: BinaryOp::Pow, right: Box::new(right) })
    } else {
        Ok(left)
    }
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    let op = match p.peek_kind() {
        TokenKind::Minus => Some(UnaryOp::Neg),
        TokenKind::Bang => Some(UnaryOp::Not),
        TokenKind::Tilde => Some(UnaryOp::BitNot),
        _ => None,
    };
    if let Some(op) = op {
        p.advance();
        let expr = parse_unary(p)?;
        Ok(Expr::Unary { op, expr: Box::new(expr) })
    } else {
        parse_primary(p)
    }
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    match p.peek_kind() {
        TokenKind::Integer => {
            let tok = p.advance();
            let val = if let Some(hex) = tok.text.strip_prefix("0x").or_else(|| tok.text.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16).map_err(|_| Error::InvalidArgument(
                    format!("invalid hex literal '{}' in formula", tok.text),
                ))?
            } else {
                tok.text.parse::<i64>().map_err(|_| Error::InvalidArgument(
                    format!("invalid integer literal '{}' in formula", tok.text),
                ))?
            };
            Ok(Expr::Int(val))
        }

        TokenKind::Float => {
            let tok = p.advance();
            let val = tok.text.parse::<f64>().map_err(|_| Error::InvalidArgument(
                format!("invalid float literal '{}' in formula", tok.text),
            ))?;
            Ok(Expr::Float(val))
        }

        TokenKind::Name => {
            let name = p.advance().text.clone();
            if p.eat(TokenKind::LParen) {
                let mut args = Vec::new();
                if !p.at(TokenKind::RParen) {
                    args.push(parse_ternary(p)?);
                    while p.eat(TokenKind::Comma) {
                        args.push(parse_ternary(p)?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(Expr::Call { name, args })
            } else {
                Ok(Expr::Var(name))
            }
        }

        TokenKind::LParen => {
            p.advance();
            let expr = parse_ternary(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }

        TokenKind::StringLiteral => {
            Err(p.error("string literals are not allowed in formulas".into()))
        }

        kind => Err(p.error(format!("unexpected token {kind:?} '{}'", p.peek().text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::tokenize;

    fn parse(src: &str) -> Result<Expr> {
        parse_expression(&tokenize(src).unwrap())
    }

    #[test]
    fn test_precedence_mul_over_add() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Mul, left, .. } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_unary_negation_synthesized() {
        let expr = parse("-FOO + 1").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, left, .. } => {
                assert!(matches!(*left, Expr::Unary { op: UnaryOp::Neg, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        // 2 ** 3 ** 2 parses as 2 ** (3 ** 2)
        let expr = parse("2 ** 3 ** 2").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Pow, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_ternary_nests_in_else() {
        let expr = parse("A ? 1 : B ? 2 : 3").unwrap();
        match expr {
            Expr::Ternary { else_expr, .. } => {
                assert!(matches!(*else_expr, Expr::Ternary { .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_function_call() {
        let expr = parse("MAX(A, B + 1)").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "MAX");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse("1 + 2 3").is_err());
    }

    #[test]
    fn test_dangling_operator_rejected() {
        assert!(parse("1 +").is_err());
    }

    #[test]
    fn test_missing_colon_rejected() {
        assert!(parse("A ? 1").is_err());
    }

    #[test]
    fn test_hex_primary() {
        assert_eq!(parse("0x10").unwrap(), Expr::Int(16));
    }
}
