//! End-to-end compiler tests covering the compile-error catalogue and
//! other compiler invariants, run against `compile` directly rather than
//! through a full `Vm` so a malformed chunk never needs to run.

use fax_gc::{Heap, Obj, ObjKind, RootProvider};
use fax_compiler::{compile, GlobalsTable};

struct NoRoots;
impl RootProvider for NoRoots {
    fn mark_roots(&self, _heap: &mut Heap) {}
}

fn chunk_len_matches_lines_len(ptr: *mut Obj) -> bool {
    unsafe {
        match &(*ptr).kind {
            ObjKind::Function(f) => f.chunk.code.len() == f.chunk.lines.len(),
            _ => panic!("compile() did not return a function object"),
        }
    }
}

fn compile_err(source: &str) -> Vec<String> {
    let mut heap = Heap::new();
    let mut globals = GlobalsTable::new();
    match compile(source.as_bytes(), &mut heap, &mut globals) {
        Err(fax_util::FaxError::Compile { messages }) => messages,
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn every_parsed_chunk_has_equal_length_code_and_lines() {
    let mut heap = Heap::new();
    let mut globals = GlobalsTable::new();
    let ptr = compile(
        b"var a = 1; fun f(x) { return x + a; } print f(2);",
        &mut heap,
        &mut globals,
    )
    .expect("expected compile to succeed");
    assert!(chunk_len_matches_lines_len(ptr));
}

#[test]
fn copy_string_interns_the_same_bytes_to_one_object() {
    let mut heap = Heap::new();
    let roots: Vec<&dyn RootProvider> = vec![&NoRoots];
    let a = heap.copy_string(b"shared", &roots);
    let b = heap.copy_string(b"shared", &roots);
    assert!(std::ptr::eq(a, b));
}

#[test]
fn successive_global_declarations_get_monotonically_increasing_slots() {
    let mut heap = Heap::new();
    let mut globals = GlobalsTable::new();
    compile(b"var a = 1; var b = 2; var c = 3;", &mut heap, &mut globals).unwrap();
    assert_eq!(globals.len(), 3);
}

#[test]
fn reading_a_local_in_its_own_initializer_is_a_compile_error() {
    let messages = compile_err("{ var a = a; }");
    assert!(messages.iter().any(|m| m.contains("own initializer")));
}

#[test]
fn writing_a_const_global_is_a_compile_error() {
    let messages = compile_err("const k = 1; k = 2;");
    assert!(messages.iter().any(|m| m.contains("Writing to const variable.")));
}

#[test]
fn this_outside_a_class_is_a_compile_error() {
    let messages = compile_err("fun f() { return this; }");
    assert!(messages.iter().any(|m| m.contains("'this' outside")));
}

#[test]
fn super_outside_a_class_is_a_compile_error() {
    let messages = compile_err("fun f() { super.bar(); }");
    assert!(messages.iter().any(|m| m.contains("'super' outside")));
}

#[test]
fn super_in_a_class_without_a_superclass_is_a_compile_error() {
    let messages = compile_err("class A { m() { super.m(); } }");
    assert!(messages.iter().any(|m| m.contains("no superclass")));
}

#[test]
fn a_class_inheriting_from_itself_is_a_compile_error() {
    let messages = compile_err("class A < A {}");
    assert!(messages.iter().any(|m| m.contains("inherit from itself")));
}

#[test]
fn returning_a_value_from_an_initializer_is_a_compile_error() {
    let messages = compile_err("class A { init() { return 1; } }");
    assert!(messages.iter().any(|m| m.contains("return a value from an initializer")));
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_a_compile_error() {
    let messages = compile_err("{ var a = 1; var a = 2; }");
    assert!(messages.iter().any(|m| m.contains("Already a variable")));
}

#[test]
fn the_compiler_keeps_going_past_the_first_error() {
    let messages = compile_err("var a = ; var b = ;");
    assert!(messages.len() >= 2, "expected more than one reported error, got {messages:?}");
}

#[test]
fn top_level_return_is_a_compile_error() {
    let messages = compile_err("return 1;");
    assert!(messages.iter().any(|m| m.contains("return from top-level code")));
}
