//! Tokenizer for rule source text.

use std::fmt;

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    /// `.name`: a field of the current filter element.
    Field(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Ident(v) => write!(f, "`{v}`"),
            Self::Field(v) => write!(f, "`.{v}`"),
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
            Self::Comma => f.write_str("`,`"),
            Self::Plus => f.write_str("`+`"),
            Self::Minus => f.write_str("`-`"),
            Self::Star => f.write_str("`*`"),
            Self::Slash => f.write_str("`/`"),
            Self::Percent => f.write_str("`%`"),
            Self::Not => f.write_str("`!`"),
            Self::And => f.write_str("`&&`"),
            Self::Or => f.write_str("`||`"),
            Self::Eq => f.write_str("`==`"),
            Self::Ne => f.write_str("`!=`"),
            Self::Lt => f.write_str("`<`"),
            Self::Le => f.write_str("`<=`"),
            Self::Gt => f.write_str("`>`"),
            Self::Ge => f.write_str("`>=`"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    /// Character offset of the first character.
    pub(crate) pos: usize,
}

/// Split `source` into tokens, always ending with [`TokenKind::Eof`].
pub(crate) fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit))
        {
            let (kind, next) = lex_number(&chars, i)?;
            tokens.push(Token { kind, pos: start });
            i = next;
            continue;
        }

        if c == '.' {
            i += 1;
            let name_start = i;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            if i == name_start || !is_ident_start(chars[name_start]) {
                return Err(CompileError::UnexpectedChar {
                    pos: start,
                    found: '.',
                });
            }
            tokens.push(Token {
                kind: TokenKind::Field(chars[name_start..i].iter().collect()),
                pos: start,
            });
            continue;
        }

        if is_ident_start(c) {
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let kind = match word.as_str() {
                "true" => TokenKind::Bool(true),
                "false" => TokenKind::Bool(false),
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, pos: start });
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = lex_string(&chars, i)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                pos: start,
            });
            i = next;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (kind, width) = match (c, next) {
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Not, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            _ => return Err(CompileError::UnexpectedChar { pos: i, found: c }),
        };
        tokens.push(Token { kind, pos: start });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: chars.len(),
    });
    Ok(tokens)
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex_number(chars: &[char], start: usize) -> CompileResult<(TokenKind, usize)> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit) {
        is_float = true;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if chars.get(j).is_some_and(char::is_ascii_digit) {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let literal: String = chars[start..i].iter().collect();
    let digits = literal.replace('_', "");
    let invalid = || CompileError::InvalidNumber {
        pos: start,
        literal: literal.clone(),
    };
    let kind = if is_float {
        TokenKind::Float(digits.parse().map_err(|_| invalid())?)
    } else {
        TokenKind::Int(digits.parse().map_err(|_| invalid())?)
    };
    Ok((kind, i))
}

fn lex_string(chars: &[char], start: usize) -> CompileResult<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or(CompileError::UnterminatedString { pos: start })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(CompileError::UnterminatedString { pos: start })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_filter_call_with_fields() {
        assert_eq!(
            kinds(r#"filter(torrents, .size > 10_240_000 && .ratio >= 1.5)"#),
            vec![
                TokenKind::Ident("filter".into()),
                TokenKind::LParen,
                TokenKind::Ident("torrents".into()),
                TokenKind::Comma,
                TokenKind::Field("size".into()),
                TokenKind::Gt,
                TokenKind::Int(10_240_000),
                TokenKind::And,
                TokenKind::Field("ratio".into()),
                TokenKind::Ge,
                TokenKind::Float(1.5),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn word_operators_and_strings() {
        assert_eq!(
            kinds(r#"not a or b and 'it\'s' != "x""#),
            vec![
                TokenKind::Not,
                TokenKind::Ident("a".into()),
                TokenKind::Or,
                TokenKind::Ident("b".into()),
                TokenKind::And,
                TokenKind::Str("it's".into()),
                TokenKind::Ne,
                TokenKind::Str("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_positions_of_bad_input() {
        assert_eq!(
            tokenize("a # b"),
            Err(CompileError::UnexpectedChar { pos: 2, found: '#' })
        );
        assert_eq!(
            tokenize("x == \"open"),
            Err(CompileError::UnterminatedString { pos: 5 })
        );
        assert!(matches!(
            tokenize("99999999999999999999"),
            Err(CompileError::InvalidNumber { pos: 0, .. })
        ));
    }
}
