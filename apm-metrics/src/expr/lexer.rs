//! Tokenizer for series expressions.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Ident(name) => write!(f, "identifier {}", name),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let kind = match c {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b'.' if !bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => TokenKind::Dot,
            b'"' | b'\'' => {
                let (value, end) = lex_string(input, pos)?;
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    pos: start,
                });
                pos = end;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                let end = scan_while(bytes, pos, |b| b.is_ascii_digit() || b == b'.');
                let end = scan_exponent(bytes, end);
                let text = &input[pos..end];
                let value = text.parse::<f64>().map_err(|_| {
                    Error::Compile(format!("invalid number {:?} at position {}", text, pos))
                })?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    pos: start,
                });
                pos = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = scan_while(bytes, pos, |b| b.is_ascii_alphanumeric() || b == b'_');
                tokens.push(Token {
                    kind: TokenKind::Ident(input[pos..end].to_string()),
                    pos: start,
                });
                pos = end;
                continue;
            }
            _ => {
                let ch = input[pos..].chars().next().unwrap_or_default();
                return Err(Error::Compile(format!(
                    "unexpected character {:?} at position {}",
                    ch, pos
                )));
            }
        };
        tokens.push(Token { kind, pos: start });
        pos += 1;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: input.len(),
    });
    Ok(tokens)
}

fn scan_while(bytes: &[u8], mut pos: usize, pred: impl Fn(u8) -> bool) -> usize {
    while pos < bytes.len() && pred(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Extends a number over an `e`/`E` exponent if one follows.
fn scan_exponent(bytes: &[u8], pos: usize) -> usize {
    if !matches!(bytes.get(pos), Some(b'e' | b'E')) {
        return pos;
    }
    let mut digits_at = pos + 1;
    if matches!(bytes.get(digits_at), Some(b'+' | b'-')) {
        digits_at += 1;
    }
    let end = scan_while(bytes, digits_at, |b| b.is_ascii_digit());
    if end == digits_at { pos } else { end }
}

/// Reads a quoted string starting at `start`, returning its value and the
/// offset just past the closing quote.
fn lex_string(input: &str, start: usize) -> Result<(String, usize)> {
    let quote = input.as_bytes()[start] as char;
    let mut value = String::new();
    let mut chars = input[start + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((value, start + 1 + offset + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, '\'')) => value.push('\''),
                Some((_, other)) => {
                    return Err(Error::Compile(format!(
                        "invalid escape sequence \\{} at position {}",
                        other,
                        start + 1 + offset
                    )));
                }
                None => break,
            },
            _ => value.push(c),
        }
    }

    Err(Error::Compile(format!(
        "unterminated string starting at position {}",
        start
    )))
}
