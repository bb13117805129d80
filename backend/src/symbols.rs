use crate::code_buffer::Label;
use crate::error::EmitError;

/// Value class of a scalar slot. Everything is one quadword; the class
/// decides whether the integer or the SSE path touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValClass {
    Int,
    Float,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    /// Scalar variable in a frame slot.
    Var { frame_offset: i32, class: ValClass },
    /// 4-D array: the frame slot holds the runtime base pointer.
    Array4 {
        frame_offset: i32,
        dims: [u64; 4],
        elem_size: u64,
    },
    /// Function: entry is a code-buffer label (unbound while only
    /// forward-referenced).
    Func { entry: Label, params: usize },
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Scope depth at declaration (0 = function top level).
    pub depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScopeMark {
    first_symbol: usize,
    saved_offset: i32,
}

/// Scope-stacked symbol table with frame-offset bookkeeping.
///
/// Frame offsets grow downward from RBP; each declaration moves the
/// cursor by one aligned slot. Leaving a scope pops its symbols and
/// restores the offset cursor it entered with; the per-function
/// high-water mark survives so the prologue knows how much stack to
/// reserve.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<ScopeMark>,
    offset: i32,
    max_frame: u32,
    /// Frame-slot symbols below this index belong to another frame and
    /// are invisible (functions stay visible across the barrier).
    barrier: usize,
}

const SLOT: i32 = 8;

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(ScopeMark {
            first_symbol: self.symbols.len(),
            saved_offset: self.offset,
        });
    }

    pub fn leave_scope(&mut self) {
        let mark = self.scopes.pop().expect("scope underflow");
        self.symbols.truncate(mark.first_symbol);
        self.offset = mark.saved_offset;
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Reset frame accounting at a function boundary.
    pub fn frame_reset(&mut self) {
        self.offset = 0;
        self.max_frame = 0;
    }

    /// Bytes of locals the current function needs, 16-byte aligned for
    /// the prologue's RSP adjustment.
    pub fn frame_size(&self) -> u32 {
        (self.max_frame + 15) & !15
    }

    /// Offset cursor as observed by a matching `leave_scope` test.
    pub fn frame_offset(&self) -> i32 {
        self.offset
    }

    fn alloc_slot(&mut self) -> i32 {
        self.offset -= SLOT;
        self.max_frame = self.max_frame.max(self.offset.unsigned_abs());
        self.offset
    }

    fn check_duplicate(&self, name: &str) -> Result<(), EmitError> {
        let first = self
            .scopes
            .last()
            .map_or(0, |m| m.first_symbol);
        if self.symbols[first..].iter().any(|s| s.name == name) {
            return Err(EmitError::Duplicate(name.to_owned()));
        }
        Ok(())
    }

    fn push(&mut self, name: &str, kind: SymbolKind) -> Symbol {
        let sym = Symbol {
            name: name.to_owned(),
            kind,
            depth: self.depth(),
        };
        self.symbols.push(sym.clone());
        sym
    }

    /// Declare a scalar variable in the current scope.
    pub fn declare_var(
        &mut self,
        name: &str,
        class: ValClass,
    ) -> Result<Symbol, EmitError> {
        self.check_duplicate(name)?;
        let frame_offset = self.alloc_slot();
        Ok(self.push(
            name,
            SymbolKind::Var {
                frame_offset,
                class,
            },
        ))
    }

    /// Declare a 4-D array; its frame slot will hold the base pointer.
    pub fn declare_array4(
        &mut self,
        name: &str,
        dims: [u64; 4],
        elem_size: u64,
    ) -> Result<Symbol, EmitError> {
        self.check_duplicate(name)?;
        let frame_offset = self.alloc_slot();
        Ok(self.push(
            name,
            SymbolKind::Array4 {
                frame_offset,
                dims,
                elem_size,
            },
        ))
    }

    /// Declare a function with its (possibly still unbound) entry label.
    pub fn declare_function(
        &mut self,
        name: &str,
        entry: Label,
        params: usize,
    ) -> Result<Symbol, EmitError> {
        self.check_duplicate(name)?;
        Ok(self.push(name, SymbolKind::Func { entry, params }))
    }

    /// Innermost-outward lookup. Returns a copy of the symbol record;
    /// the table retains ownership. Frame slots of enclosing frames
    /// (below the barrier) do not resolve; their RBP is not ours.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols
            .iter()
            .enumerate()
            .rev()
            .find(|(i, s)| {
                s.name == name
                    && (*i >= self.barrier
                        || matches!(s.kind, SymbolKind::Func { .. }))
            })
            .map(|(_, s)| s.clone())
    }

    /// Raise the frame barrier to the current table length (entering a
    /// function body); returns the previous barrier for restoration.
    pub fn raise_frame_barrier(&mut self) -> usize {
        std::mem::replace(&mut self.barrier, self.symbols.len())
    }

    pub fn restore_frame_barrier(&mut self, prev: usize) {
        self.barrier = prev;
    }
}
