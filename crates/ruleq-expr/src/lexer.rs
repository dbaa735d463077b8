//! Tokenizer

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{ParseError, ParseResult};

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Literals
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Assignment / update
    PlusPlus,
    MinusMinus,
    Assign,
    PlusAssign,
    MinusAssign,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logic
    AndAnd,
    OrOr,
    Bang,

    // Punctuation
    Question,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

/// A token with the byte offset it started at
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split an expression into tokens
pub(crate) fn tokenize(source: &str) -> ParseResult<Vec<Spanned>> {
    let mut lexer = Lexer {
        chars: source.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> ParseResult<Option<Spanned>> {
        self.skip_whitespace();

        let Some((offset, ch)) = self.chars.next() else {
            return Ok(None);
        };

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '?' => Token::Question,
            ':' => Token::Colon,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '+' => {
                if self.eat('+') {
                    Token::PlusPlus
                } else if self.eat('=') {
                    Token::PlusAssign
                } else {
                    Token::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    Token::MinusMinus
                } else if self.eat('=') {
                    Token::MinusAssign
                } else {
                    Token::Minus
                }
            }
            '=' => {
                if self.eat('=') {
                    // `===` is accepted as an alias of `==`
                    self.eat('=');
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::LtEq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::AndAnd
                } else {
                    return Err(ParseError::new(offset, "expected '&&'"));
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::OrOr
                } else {
                    return Err(ParseError::new(offset, "expected '||'"));
                }
            }
            '\'' | '"' => Token::Str(self.string(offset, ch)?),
            '0'..='9' => Token::Number(self.number(offset, ch)?),
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let ident = self.identifier(ch);
                match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    _ => Token::Ident(ident),
                }
            }
            other => {
                return Err(ParseError::new(
                    offset,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        Ok(Some(Spanned { token, offset }))
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if let Some((_, c)) = self.chars.peek() {
            if *c == expected {
                self.chars.next();
                return true;
            }
        }
        false
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn number(&mut self, offset: usize, first: char) -> ParseResult<f64> {
        let mut text = String::new();
        text.push(first);

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        // Fraction only when a digit follows the dot
        if self.peek_char() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some((_, c)) if c.is_ascii_digit()) {
                text.push('.');
                self.chars.next();
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
            }
        }

        if matches!(self.peek_char(), Some('e') | Some('E')) {
            text.push('e');
            self.chars.next();
            if let Some(sign @ ('+' | '-')) = self.peek_char() {
                text.push(sign);
                self.chars.next();
            }
            let mut digits = 0;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.chars.next();
                    digits += 1;
                } else {
                    break;
                }
            }
            if digits == 0 {
                return Err(ParseError::new(offset, format!("invalid number '{}'", text)));
            }
        }

        text.parse::<f64>()
            .map_err(|_| ParseError::new(offset, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, offset: usize, quote: char) -> ParseResult<String> {
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(ParseError::new(offset, "unterminated string"));
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some((_, escaped)) = self.chars.next() else {
                        return Err(ParseError::new(offset, "unterminated string"));
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                other => out.push(other),
            }
        }
    }

    fn identifier(&mut self, first: char) -> String {
        let mut ident = String::new();
        ident.push(first);
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        ident
    }
}
