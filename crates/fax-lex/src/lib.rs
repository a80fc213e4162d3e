//! fax-lex - Lexical Analyzer (Scanner)
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! The scanner sits upstream of the compiler/VM/GC triangle, but nothing
//! downstream can run without it. This crate is that collaborator: a
//! cursor over the raw source bytes, and a scanner that turns it into a
//! lazy `Token` stream on demand.
//!
//! Source is treated as 8-bit text throughout, with no Unicode handling,
//! so every position here is a byte offset, not a character index.

mod cursor;
mod lexer;
mod token;

pub use cursor::Cursor;
pub use lexer::Scanner;
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            let tok = scanner.scan_token();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_arithmetic_expression() {
        use TokenKind::*;
        assert_eq!(
            kinds("1 + 2 * 3;"),
            vec![Number, Plus, Number, Star, Number, Semicolon, Eof]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        use TokenKind::*;
        assert_eq!(kinds("var const class"), vec![Var, Const, Class, Eof]);
    }

    #[test]
    fn an_identifier_with_keyword_prefix_stays_an_identifier() {
        assert_eq!(kinds("classify").last().copied(), Some(TokenKind::Eof));
        let mut scanner = Scanner::new(b"classify");
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::Identifier);
    }

    #[test]
    fn string_token_spans_include_quotes() {
        let src = b"\"ab\"";
        let mut scanner = Scanner::new(src);
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.lexeme(src), b"\"ab\"");
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new(b"\"ab");
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(scanner.error_message(), "Unterminated string.");
    }

    #[test]
    fn lines_advance_across_newlines() {
        let mut scanner = Scanner::new(b"1\n2\n3");
        let a = scanner.scan_token();
        let b = scanner.scan_token();
        let c = scanner.scan_token();
        assert_eq!((a.line(), b.line(), c.line()), (1, 2, 3));
    }

    #[test]
    fn line_comment_is_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("1 // a comment\n2"), vec![Number, Number, Eof]);
    }
}
