//! Scanner - Lexical Analyzer
//!
//! The scanner is a lazy token producer the compiler pulls from one token
//! at a time. It never allocates a token stream up front; `scan_token` is
//! called on demand by the Pratt parser.

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};
use fax_util::Span;

/// Lazily tokenizes a byte buffer. Construct with [`Scanner::new`], then
/// pull tokens with [`Scanner::scan_token`] until `TokenKind::Eof`.
pub struct Scanner<'a> {
    source: &'a [u8],
    cursor: Cursor<'a>,
    error_message: String,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            cursor: Cursor::new(source),
            error_message: String::new(),
        }
    }

    /// The explanatory text for the most recently returned `Error` token.
    /// Tokens slice the *source* buffer, so there's nowhere in a `Token`
    /// itself to point at a message; the scanner tracks it out of band.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.cursor.begin_token();

        if self.cursor.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.cursor.advance();

        if is_alpha(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.cursor.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.cursor.advance();
                }
                b'\n' => {
                    self.cursor.newline();
                    self.cursor.advance();
                }
                b'/' if self.cursor.peek_next() == b'/' => {
                    while self.cursor.peek() != b'\n' && !self.cursor.is_at_end() {
                        self.cursor.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn identifier(&mut self) -> Token {
        while is_alpha(self.cursor.peek()) || self.cursor.peek().is_ascii_digit() {
            self.cursor.advance();
        }
        let kind = self.identifier_kind();
        self.make_token(kind)
    }

    fn identifier_kind(&self) -> TokenKind {
        let text = &self.source[self.cursor.start()..self.cursor.current()];
        match text {
            b"and" => TokenKind::And,
            b"class" => TokenKind::Class,
            b"else" => TokenKind::Else,
            b"false" => TokenKind::False,
            b"for" => TokenKind::For,
            b"fun" => TokenKind::Fun,
            b"if" => TokenKind::If,
            b"nil" => TokenKind::Nil,
            b"or" => TokenKind::Or,
            b"print" => TokenKind::Print,
            b"return" => TokenKind::Return,
            b"super" => TokenKind::Super,
            b"this" => TokenKind::This,
            b"true" => TokenKind::True,
            b"var" => TokenKind::Var,
            b"const" => TokenKind::Const,
            b"while" => TokenKind::While,
            _ => TokenKind::Identifier,
        }
    }

    fn number(&mut self) -> Token {
        while self.cursor.peek().is_ascii_digit() {
            self.cursor.advance();
        }
        if self.cursor.peek() == b'.' && self.cursor.peek_next().is_ascii_digit() {
            self.cursor.advance();
            while self.cursor.peek().is_ascii_digit() {
                self.cursor.advance();
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn string(&mut self) -> Token {
        while self.cursor.peek() != b'"' && !self.cursor.is_at_end() {
            if self.cursor.peek() == b'\n' {
                self.cursor.newline();
            }
            self.cursor.advance();
        }
        if self.cursor.is_at_end() {
            return self.error_token("Unterminated string.");
        }
        self.cursor.advance();
        self.make_token(TokenKind::String)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::new(
                self.cursor.start() as u32,
                (self.cursor.current() - self.cursor.start()) as u32,
                self.cursor.line(),
            ),
        }
    }

    fn error_token(&mut self, message: &str) -> Token {
        self.error_message = message.to_string();
        Token {
            kind: TokenKind::Error,
            span: Span::new(self.cursor.start() as u32, 0, self.cursor.line()),
        }
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}
