//! Formula lexer — tokenizes an expression string.

use crate::{Error, Result};

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Integer, Float, StringLiteral,

    // Names (variables, functions, constants)
    Name,

    // Arithmetic
    Plus, Minus, Star, Slash, Percent,
    StarStar,   // **

    // Bitwise / shift
    Amp, Pipe, Caret, Tilde,
    Shl,        // <<
    Shr,        // >>

    // Comparison
    Eq, Neq, Lt, Lte, Gt, Gte,

    // Logical
    AndAnd, OrOr, Bang,

    // Ternary and grouping
    Question, Colon, Comma, LParen, RParen,

    Eof,
}

/// Tokenize a formula string.
///
/// Recognizes hex literals (`0x...`), decimal floats with optional
/// exponent, and `#` line comments. Number parsing goes through
/// `str::parse`, which is locale-independent — hardware formulas evaluate
/// identically on every host.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            // Skip whitespace
            c if c.is_whitespace() => { chars.next(); }

            // Skip line comments
            '#' => {
                while chars.peek().is_some_and(|&(_, c)| c != '\n') {
                    chars.next();
                }
            }

            // String literals (single or double quoted)
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let start = pos;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((end, c)) if c == quote => {
                            tokens.push(Token {
                                kind: TokenKind::StringLiteral,
                                span: Span { start, end: end + 1 },
                                text: s,
                            });
                            break;
                        }
                        Some((_, c)) => s.push(c),
                        None => return Err(Error::InvalidArgument(format!(
                            "unterminated string literal at {start} in formula"
                        ))),
                    }
                }
            }

            // Numbers: hex, integer, float
            c if c.is_ascii_digit() => {
                let start = pos;
                let mut num = String::new();

                // Hex literal
                if c == '0' {
                    let mut ahead = chars.clone();
                    ahead.next();
                    if matches!(ahead.peek(), Some(&(_, 'x' | 'X'))) {
                        chars.next(); // 0
                        chars.next(); // x
                        while let Some(&(_, c)) = chars.peek() {
                            if c.is_ascii_hexdigit() {
                                num.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if num.is_empty() {
                            return Err(Error::InvalidArgument(format!(
                                "empty hex literal at {start} in formula"
                            )));
                        }
                        tokens.push(Token {
                            kind: TokenKind::Integer,
                            span: Span { start, end: start + num.len() + 2 },
                            text: format!("0x{num}"),
                        });
                        continue;
                    }
                }

                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        num.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        num.push(c);
                        chars.next();
                    } else if (c == 'e' || c == 'E') && !num.is_empty() {
                        // Exponent: e[+-]?digits
                        let mut ahead = chars.clone();
                        ahead.next();
                        let sign = matches!(ahead.peek(), Some(&(_, '+' | '-')));
                        if sign {
                            ahead.next();
                        }
                        if matches!(ahead.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                            is_float = true;
                            num.push(c);
                            chars.next();
                            if sign {
                                if let Some((_, s)) = chars.next() {
                                    num.push(s);
                                }
                            }
                            while let Some(&(_, d)) = chars.peek() {
                                if d.is_ascii_digit() {
                                    num.push(d);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                        }
                        break;
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: if is_float { TokenKind::Float } else { TokenKind::Integer },
                    span: Span { start, end: start + num.len() },
                    text: num,
                });
            }

            // Names
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Name,
                    span: Span { start, end: start + name.len() },
                    text: name,
                });
            }

            // Punctuation / operators
            '(' => { chars.next(); tokens.push(punct(TokenKind::LParen, pos, "(")); }
            ')' => { chars.next(); tokens.push(punct(TokenKind::RParen, pos, ")")); }
            ',' => { chars.next(); tokens.push(punct(TokenKind::Comma, pos, ",")); }
            '?' => { chars.next(); tokens.push(punct(TokenKind::Question, pos, "?")); }
            ':' => { chars.next(); tokens.push(punct(TokenKind::Colon, pos, ":")); }
            '+' => { chars.next(); tokens.push(punct(TokenKind::Plus, pos, "+")); }
            '-' => { chars.next(); tokens.push(punct(TokenKind::Minus, pos, "-")); }
            '/' => { chars.next(); tokens.push(punct(TokenKind::Slash, pos, "/")); }
            '%' => { chars.next(); tokens.push(punct(TokenKind::Percent, pos, "%")); }
            '~' => { chars.next(); tokens.push(punct(TokenKind::Tilde, pos, "~")); }
            '^' => { chars.next(); tokens.push(punct(TokenKind::Caret, pos, "^")); }
            '*' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '*'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::StarStar, pos, "**"));
                } else {
                    tokens.push(punct(TokenKind::Star, pos, "*"));
                }
            }
            '&' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '&'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::AndAnd, pos, "&&"));
                } else {
                    tokens.push(punct(TokenKind::Amp, pos, "&"));
                }
            }
            '|' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '|'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::OrOr, pos, "||"));
                } else {
                    tokens.push(punct(TokenKind::Pipe, pos, "|"));
                }
            }
            '=' => {
                chars.next();
                // Tolerate both `=` and `==` for equality.
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Eq, pos, "=="));
                } else {
                    tokens.push(punct(TokenKind::Eq, pos, "="));
                }
            }
            '!' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "!="));
                } else {
                    tokens.push(punct(TokenKind::Bang, pos, "!"));
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Lte, pos, "<="));
                } else if matches!(chars.peek(), Some(&(_, '<'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Shl, pos, "<<"));
                } else if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "<>"));
                } else {
                    tokens.push(punct(TokenKind::Lt, pos, "<"));
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Gte, pos, ">="));
                } else if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Shr, pos, ">>"));
                } else {
                    tokens.push(punct(TokenKind::Gt, pos, ">"));
                }
            }

            other => {
                return Err(Error::InvalidArgument(format!(
                    "unexpected character '{other}' at {pos} in formula"
                )));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span { start: input.len(), end: input.len() },
        text: String::new(),
    });

    Ok(tokens)
}

fn punct(kind: TokenKind, pos: usize, text: &str) -> Token {
    Token {
        kind,
        span: Span { start: pos, end: pos + text.len() },
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_expression() {
        let tokens = tokenize("1 + 2 * 3").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Integer,
            TokenKind::Plus,
            TokenKind::Integer,
            TokenKind::Star,
            TokenKind::Integer,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_hex_literal() {
        let tokens = tokenize("0xFF00").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].text, "0xFF00");
    }

    #[test]
    fn test_float_with_exponent() {
        let tokens = tokenize("1.5e-3").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].text, "1.5e-3");
    }

    #[test]
    fn test_integer_then_exponent_is_float() {
        let tokens = tokenize("2E6").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].text, "2E6");
    }

    #[test]
    fn test_name_token() {
        let tokens = tokenize("GainRaw * 2").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Name);
        assert_eq!(tokens[0].text, "GainRaw");
    }

    #[test]
    fn test_shift_and_comparison_disambiguation() {
        let tokens = tokenize("A << 2 <> B < C").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Name, TokenKind::Shl, TokenKind::Integer,
            TokenKind::Neq, TokenKind::Name, TokenKind::Lt, TokenKind::Name,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_power_operator() {
        let tokens = tokenize("2 ** 10").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::StarStar);
    }

    #[test]
    fn test_ternary_tokens() {
        let tokens = tokenize("A ? 1 : 0").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Name, TokenKind::Question, TokenKind::Integer,
            TokenKind::Colon, TokenKind::Integer, TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_line_comment() {
        let tokens = tokenize("1 + 2 # the rest is ignored\n").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Integer, TokenKind::Plus, TokenKind::Integer, TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("1 @ 2").is_err());
    }

    #[test]
    fn test_empty_hex_is_an_error() {
        assert!(tokenize("0x").is_err());
    }
}
