//! fax-gc - Values, Heap Objects, and the Garbage Collector
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! This crate owns the heap: the tagged [`Value`] union, every
//! [`object::ObjKind`] variant, the open-addressed [`table::Table`] used
//! for interning/globals/fields/methods, the [`chunk::Chunk`] bytecode
//! container (kept here rather than in `fax-compiler` since `ObjFunction`,
//! itself a heap object, embeds one), and the mark-sweep [`heap::Heap`]
//! itself behind the [`heap::RootProvider`] seam so neither the compiler
//! nor the VM need to know the collector's internals, only how to
//! enumerate their own roots.

mod chunk;
mod heap;
mod object;
mod table;
mod value;

pub use chunk::{disassemble_chunk, disassemble_instruction, Chunk, OpCode};
pub use heap::{Heap, RootProvider};
pub use object::{
    string_bytes, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance,
    ObjKind, ObjNative, ObjString, ObjUpvalue, UpvalueLoc,
};
pub use table::{fnv1a_hash, Table};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    struct NoRoots;
    impl RootProvider for NoRoots {
        fn mark_roots(&self, _heap: &mut Heap) {}
    }

    #[test]
    fn interning_returns_the_same_pointer_for_equal_bytes() {
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let a = heap.copy_string(b"hello", &roots);
        let b = heap.copy_string(b"hello", &roots);
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn interning_distinguishes_different_bytes() {
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let a = heap.copy_string(b"hello", &roots);
        let b = heap.copy_string(b"world", &roots);
        assert!(!std::ptr::eq(a, b));
    }

    #[test]
    fn unrooted_strings_are_collected_under_stress_gc() {
        let mut heap = Heap::new();
        heap.stress_gc = true;
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let before = heap.bytes_allocated();
        let _ = heap.copy_string(b"transient", &roots);
        heap.collect_garbage(&roots);
        assert_eq!(heap.bytes_allocated(), before);
    }

    #[test]
    fn table_set_get_delete_roundtrip() {
        let mut heap = Heap::new();
        let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
        let key = heap.copy_string(b"x", &roots);

        let mut table = Table::new();
        assert!(table.set(key, Value::Number(1.0)));
        assert!(!table.set(key, Value::Number(2.0)));
        match table.get(key) {
            Some(Value::Number(n)) => assert_eq!(n, 2.0),
            other => panic!("expected Number(2.0), got {other:?}"),
        }
        assert!(table.delete(key));
        assert!(table.get(key).is_none());
    }

    #[test]
    fn chunk_lines_track_code_length() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Return, 1);
        assert_eq!(chunk.code.len(), chunk.lines.len());
    }

    #[test]
    fn opcode_roundtrips_through_try_from_u8() {
        for op in [OpCode::Constant, OpCode::Invoke, OpCode::Method, OpCode::Return] {
            let byte = op as u8;
            assert_eq!(OpCode::try_from(byte), Ok(op));
        }
        assert!(OpCode::try_from(255u8).is_err());
    }

    #[test]
    fn falsiness_matches_nil_and_false_only() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
    }
}
