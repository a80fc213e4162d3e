//! fax-compiler - the single-pass Pratt Compiler
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! One pass over the token stream, no separate AST: `compiler::compile`
//! drives a Pratt expression parser (`rules::get_rule`) and a set of
//! recursive-descent statement handlers that emit bytecode directly into
//! a `fax_gc::Chunk` as they go. Scope/local/upvalue bookkeeping lives in
//! [`context::CompilationContext`], one pushed per nested function or
//! method; [`globals::GlobalsTable`] gives every global variable a stable
//! slot index instead of a by-name runtime lookup, so `fax-vm`'s globals
//! store is just an array indexed the same way.

mod class_context;
mod compiler;
mod context;
mod globals;
mod rules;

pub use class_context::ClassContext;
pub use compiler::compile;
pub use context::{CompilationContext, FunctionKind, Local, LocalName, UpvalueDesc, VarState};
pub use globals::{GlobalsTable, GLOBALS_MAX};
pub use rules::{get_rule, ParseFn, ParseRule, Precedence};
