//! Blaze backend — direct x86-64 code emission.
//!
//! No intermediate representation: the emitter walks the AST and drives
//! bit-exact instruction encoders straight into an executable code
//! buffer. Forward references (conditionals, loops, function calls) go
//! through the buffer's label/patch table and resolve at finalization.
//!
//! Layering, leaves first: [`code_buffer`] (growable byte sink with
//! pending patches), [`x86_64`] (encoders), [`symbols`] (scope-stacked
//! frame bookkeeping), then the emitter core in [`emit`] with the SSE2
//! float path ([`float`]), 4-D array codegen ([`array`]) and the
//! timeline runtime call sites ([`timeline`]).

pub mod array;
pub mod code_buffer;
pub mod emit;
pub mod error;
pub mod float;
pub mod symbols;
pub mod timeline;
pub mod x86_64;

pub use code_buffer::{CodeBuffer, FinalizedCode, Label, PatchKind};
pub use emit::{emit_program, EmitSession};
pub use error::EmitError;
pub use symbols::{Symbol, SymbolKind, SymbolTable, ValClass};
