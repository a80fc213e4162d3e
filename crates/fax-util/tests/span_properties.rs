//! Property test for `Span::text`: any in-bounds span must slice out
//! exactly the bytes its `start`/`length` describe, for arbitrary source
//! buffers and arbitrary spans cut from them.

use fax_util::Span;
use proptest::prelude::*;

proptest! {
    #[test]
    fn text_returns_exactly_the_bytes_the_span_describes(
        source in proptest::collection::vec(any::<u8>(), 0..64),
        seed_start in 0usize..64,
        seed_len in 0usize..64,
    ) {
        if source.is_empty() {
            return Ok(());
        }
        let start = seed_start % source.len();
        let max_len = source.len() - start;
        let length = if max_len == 0 { 0 } else { seed_len % (max_len + 1) };

        let span = Span::new(start as u32, length as u32, 1);
        prop_assert_eq!(span.text(&source), &source[start..start + length]);
    }
}
