//! fax-util - Shared Types for the Fax Toolchain
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! Every crate in the workspace (scanner, compiler, GC, VM, driver) needs a
//! handful of the same small types: a source location (`Span`), and a
//! vocabulary of errors (`FaxError`) that each phase can produce and that the
//! driver eventually turns into an exit code. This crate is the leaf of the
//! dependency graph; it depends on nothing else in the workspace.
//!
//! Unlike a multi-file compiler, this toolchain only ever has one source
//! string in flight per `interpret()` call, so there is no
//! `SourceMap`/file-id here, just a byte offset and a line number,
//! recomputed from the scanner's own line counter.

mod error;
mod span;

pub use error::FaxError;
pub use span::Span;
