//! Error Module - Fax Error Types
//!
//! Defines the error vocabulary shared across the scanner, compiler and VM:
//! scanner errors surface as compile errors once the compiler reports the
//! `ERROR` token it receives; runtime errors carry their own stack trace
//! text built by the VM.

use thiserror::Error;

/// Top-level error type returned by `fax_compiler::compile` and
/// `fax_vm::Vm::interpret`.
#[derive(Debug, Error)]
pub enum FaxError {
    /// A scanner or parser error. The compiler keeps compiling after the
    /// first one (panic-mode recovery) and only reports `CompileError` to
    /// the caller once all have been collected; `messages` preserves that
    /// multiplicity for the driver to print.
    #[error("compile error(s) in source")]
    Compile { messages: Vec<String> },

    /// A runtime error raised by the VM. `message` is the offending error
    /// text (e.g. "Operands must be numbers."); `trace` is one line per
    /// call frame, innermost first: file line and function name, or
    /// "script" for the top level.
    #[error("{message}")]
    Runtime { message: String, trace: Vec<String> },
}

impl FaxError {
    pub fn compile(messages: Vec<String>) -> Self {
        FaxError::Compile { messages }
    }

    pub fn runtime(message: impl Into<String>, trace: Vec<String>) -> Self {
        FaxError::Runtime {
            message: message.into(),
            trace,
        }
    }
}
