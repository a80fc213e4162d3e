//! Per-function compile-time state: the stack of `CompilationContext`s the
//! compiler pushes one of per nested function/method, and the `Local`/
//! `Upvalue` bookkeeping each one carries.

use fax_gc::{Chunk, Obj};
use fax_lex::Token;

/// What kind of function a `CompilationContext` is compiling. Distinct
/// from a runtime `ObjKind`; this only matters during compilation, to
/// decide the implicit return and whether `this`/`return value` are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// The implicit top-level function wrapping the whole source file.
    Script,
    Function,
    Method,
    Initializer,
}

/// The three states a declared variable moves through: not yet readable
/// at all (mid-initializer), then either permanently read-only (`const`)
/// or assignable (`var`). Modeled identically for locals and globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarState {
    Uninitialized,
    Readable,
    Writeable,
}

/// A local's name is either real source text (ordinary declarations) or
/// a compiler-synthesized name that never appears as an `IDENTIFIER`
/// token (`this`'s slot 0, the `super` local an inheriting class opens).
/// Keeping these distinct means a user variable can never accidentally
/// shadow or collide with one.
#[derive(Clone, Copy)]
pub enum LocalName {
    Source(Token),
    Synthetic(&'static str),
}

impl LocalName {
    pub fn bytes<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        match self {
            LocalName::Source(tok) => tok.lexeme(source),
            LocalName::Synthetic(s) => s.as_bytes(),
        }
    }
}

pub struct Local {
    pub name: LocalName,
    pub depth: i32,
    pub is_captured: bool,
    pub state: VarState,
}

/// One upvalue slot of a function: either captures an enclosing local
/// directly (`is_local = true`, `index` = that local's slot) or forwards
/// an upvalue already captured by the enclosing function
/// (`is_local = false`, `index` = that upvalue's slot).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub index: u8,
    pub is_local: bool,
}

pub const LOCALS_MAX: usize = u8::MAX as usize + 1;
pub const UPVALUES_MAX: usize = u8::MAX as usize + 1;

/// One function body under active compilation. Nested function literals
/// push a new context and pop back to the enclosing one when their body
/// closes, exactly mirroring the call-frame stack the VM builds at
/// runtime.
pub struct CompilationContext {
    pub kind: FunctionKind,
    pub function_name: Option<*mut Obj>,
    pub chunk: Chunk,
    pub arity: u8,
    pub locals: Vec<Local>,
    pub upvalues: Vec<UpvalueDesc>,
    pub scope_depth: i32,
}

impl CompilationContext {
    pub fn new(kind: FunctionKind, function_name: Option<*mut Obj>) -> Self {
        // Slot 0 is reserved for the implicit receiver. In methods and
        // initializers it's addressable as `this`; in plain functions and
        // the top-level script it holds the function/closure itself and
        // is never looked up by name, so it gets a name no source token
        // can ever produce.
        let receiver_name = match kind {
            FunctionKind::Method | FunctionKind::Initializer => LocalName::Synthetic("this"),
            FunctionKind::Function | FunctionKind::Script => LocalName::Synthetic(""),
        };
        let slot0 = Local {
            name: receiver_name,
            depth: 0,
            is_captured: false,
            state: VarState::Readable,
        };
        CompilationContext {
            kind,
            function_name,
            chunk: Chunk::new(),
            arity: 0,
            locals: vec![slot0],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }

    pub fn resolve_local(&self, name: &[u8], source: &[u8]) -> Option<(usize, VarState)> {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name.bytes(source) == name {
                return Some((slot, local.state));
            }
        }
        None
    }

    /// Pushes a local that's already initialized the moment it's declared.
    /// No separate "mark defined" step is needed, because its value is
    /// already sitting in the stack slot this local claims (the synthetic
    /// `super` local, and the per-iteration `for`-loop shadow copy, both
    /// work this way).
    pub fn push_initialized_local(&mut self, name: LocalName, is_const: bool) {
        self.locals.push(Local {
            name,
            depth: self.scope_depth,
            is_captured: false,
            state: if is_const {
                VarState::Readable
            } else {
                VarState::Writeable
            },
        });
    }

    /// Declares the synthetic `super` local a subclass body opens around
    /// its methods.
    pub fn declare_synthetic_local(&mut self, name: &'static str) {
        self.push_initialized_local(LocalName::Synthetic(name), true);
    }

    /// Adds `index` as the upvalue slot, or returns the existing slot if
    /// this exact `(index, is_local)` pair was already captured.
    pub fn add_upvalue(&mut self, index: u8, is_local: bool) -> Option<u8> {
        for (slot, existing) in self.upvalues.iter().enumerate() {
            if existing.index == index && existing.is_local == is_local {
                return Some(slot as u8);
            }
        }
        if self.upvalues.len() >= UPVALUES_MAX {
            return None;
        }
        self.upvalues.push(UpvalueDesc { index, is_local });
        Some((self.upvalues.len() - 1) as u8)
    }
}
