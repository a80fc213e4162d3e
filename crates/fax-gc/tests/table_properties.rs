//! Property tests for the open-addressed `Table`: insert/get/delete
//! roundtrips and interning identity should hold for any sequence of
//! distinct byte-string keys, not just hand-picked ones.

use fax_gc::{Heap, RootProvider, Table, Value};
use proptest::collection::vec;
use proptest::prelude::*;

struct NoRoots;
impl RootProvider for NoRoots {
    fn mark_roots(&self, _heap: &mut Heap) {}
}

fn distinct_byte_strings() -> impl Strategy<Value = Vec<Vec<u8>>> {
    vec("[a-z]{1,12}", 1..64).prop_map(|strings| {
        let mut seen = std::collections::HashSet::new();
        strings
            .into_iter()
            .map(|s| s.into_bytes())
            .filter(|bytes| seen.insert(bytes.clone()))
            .collect()
    })
}

proptest! {
    /// Every distinct byte sequence interns to a single, stable object
    /// identity no matter how many other strings are interned around it:
    /// every call to `copy_string(s)` returns the same object identity.
    #[test]
    fn interning_is_stable_across_many_distinct_strings(keys in distinct_byte_strings()) {
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let first_pass: Vec<_> = keys.iter().map(|k| heap.copy_string(k, &roots)).collect();
        let second_pass: Vec<_> = keys.iter().map(|k| heap.copy_string(k, &roots)).collect();
        for (a, b) in first_pass.iter().zip(second_pass.iter()) {
            prop_assert!(std::ptr::eq(*a, *b));
        }
        // distinct keys never collapse onto the same object
        for i in 0..first_pass.len() {
            for j in (i + 1)..first_pass.len() {
                prop_assert!(!std::ptr::eq(first_pass[i], first_pass[j]));
            }
        }
    }

    /// A table holds exactly the keys inserted and not yet deleted,
    /// regardless of insertion order or how many times it has grown past
    /// its initial capacity.
    #[test]
    fn set_then_get_roundtrips_for_every_key(keys in distinct_byte_strings()) {
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let mut table = Table::new();
        for (i, key_bytes) in keys.iter().enumerate() {
            let ptr = heap.copy_string(key_bytes, &roots);
            table.set(ptr, Value::Number(i as f64));
        }
        for (i, key_bytes) in keys.iter().enumerate() {
            let ptr = heap.copy_string(key_bytes, &roots);
            match table.get(ptr) {
                Some(Value::Number(n)) => prop_assert_eq!(n, i as f64),
                other => prop_assert!(false, "expected Number({i}), got {other:?}"),
            }
        }
    }

    /// Deleting a key removes it (leaving a tombstone) without disturbing
    /// any other key's reachability through the probe chain.
    #[test]
    fn deleting_one_key_does_not_disturb_the_others(keys in distinct_byte_strings()) {
        prop_assume!(keys.len() >= 2);
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let ptrs: Vec<_> = keys.iter().map(|k| heap.copy_string(k, &roots)).collect();
        let mut table = Table::new();
        for (i, &ptr) in ptrs.iter().enumerate() {
            table.set(ptr, Value::Number(i as f64));
        }

        table.delete(ptrs[0]);
        prop_assert!(table.get(ptrs[0]).is_none());
        for (i, &ptr) in ptrs.iter().enumerate().skip(1) {
            match table.get(ptr) {
                Some(Value::Number(n)) => prop_assert_eq!(n, i as f64),
                other => prop_assert!(false, "expected Number({i}), got {other:?}"),
            }
        }
    }
}
