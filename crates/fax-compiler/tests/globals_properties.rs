//! Property test: global slot assignment is monotonic, so two successive
//! `parse_variable` calls at global scope yield increasing indices.

use fax_gc::Heap;
use fax_compiler::{compile, GlobalsTable};
use proptest::prelude::*;

fn distinct_identifiers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("g{i}")).collect()
}

proptest! {
    /// Compiling N consecutive `var` declarations always assigns slots
    /// `0..N` in declaration order, regardless of N (up to the 256-slot
    /// cap on the globals store).
    #[test]
    fn sequential_global_decls_get_sequential_slots(n in 1usize..200) {
        let names = distinct_identifiers(n);
        let source = names
            .iter()
            .map(|name| format!("var {name} = 0;"))
            .collect::<String>();

        let mut heap = Heap::new();
        let mut globals = GlobalsTable::new();
        compile(source.as_bytes(), &mut heap, &mut globals).expect("expected compile to succeed");
        prop_assert_eq!(globals.len(), n);
    }
}
