//! Property tests for the scanner: no arbitrary byte input should ever
//! make it panic, and every returned token's span must stay inside the
//! source buffer it was cut from.

use fax_lex::{Scanner, TokenKind};
use proptest::prelude::*;

proptest! {
    /// Scanning arbitrary bytes to `Eof` never panics and never returns a
    /// token whose span runs past the end of the source.
    #[test]
    fn scanning_arbitrary_bytes_never_panics_and_spans_stay_in_bounds(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut scanner = Scanner::new(&bytes);
        for _ in 0..bytes.len() + 1 {
            let tok = scanner.scan_token();
            let start = tok.span.start as usize;
            let end = start + tok.span.length as usize;
            prop_assert!(end <= bytes.len());
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
    }

    /// Line numbers never go backwards as the scanner advances through a
    /// source buffer built only of printable text and newlines.
    #[test]
    fn line_numbers_are_monotonically_nondecreasing(lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,8}", 1..20)) {
        let source = lines.join("\n");
        let mut scanner = Scanner::new(source.as_bytes());
        let mut last_line = 0u32;
        loop {
            let tok = scanner.scan_token();
            prop_assert!(tok.line() >= last_line);
            last_line = tok.line();
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
    }
}
