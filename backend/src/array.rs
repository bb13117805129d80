//! 4-D array codegen.
//!
//! Layout: a 64-byte header `[d0][d1][d2][d3][elem_size][reserved×3]`
//! (u64 each) followed by row-major data with strides
//! `(e, d0·e, d0·d1·e, d0·d1·d2·e)`. Elements are 8 bytes. The array's
//! frame slot holds the base pointer returned by the runtime allocator.

use blaze_ast::{Node, NodeId, TimeDir};

use crate::emit::EmitSession;
use crate::error::EmitError;
use crate::symbols::SymbolKind;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{Reg, ARRAY_INDEX_REGS};

/// Header size in bytes.
pub const ARRAY4_HEADER: i32 = 64;
/// Element size: every element is one quadword.
pub const ARRAY4_ELEM: u64 = 8;

/// Header field offsets.
const HDR_DIM0: i32 = 0;
const HDR_ELEM: i32 = 32;

impl EmitSession<'_> {
    /// Allocate and initialize a 4-D array, binding `name` to the slot
    /// holding its base pointer.
    pub(crate) fn emit_array_def(
        &mut self,
        name: &str,
        dims: [u64; 4],
    ) -> Result<(), EmitError> {
        let elems = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .and_then(|v| v.checked_mul(dims[3]))
            .ok_or_else(|| EmitError::ArrayTooLarge(name.to_owned()))?;
        let total = elems
            .checked_mul(ARRAY4_ELEM)
            .and_then(|v| v.checked_add(ARRAY4_HEADER as u64))
            .filter(|&v| v <= i32::MAX as u64)
            .ok_or_else(|| EmitError::ArrayTooLarge(name.to_owned()))?;
        if dims.iter().any(|&d| d > i32::MAX as u64) {
            return Err(EmitError::ArrayTooLarge(name.to_owned()));
        }

        let sym = self.syms.declare_array4(name, dims, ARRAY4_ELEM)?;
        let SymbolKind::Array4 { frame_offset, .. } = sym.kind else {
            unreachable!();
        };

        // rdi = byte count; allocator returns the base in rax.
        emit_mov_ri(&mut self.buf, Reg::Rdi, total);
        self.emit_call_hook(self.layout.hooks.alloc);

        // Header fills. Offset 0 is written exactly once, with d0.
        let buf = &mut self.buf;
        for (i, &dim) in dims.iter().enumerate() {
            emit_store_imm(buf, true, Reg::Rax, HDR_DIM0 + 8 * i as i32, dim as i32);
        }
        emit_store_imm(buf, true, Reg::Rax, HDR_ELEM, ARRAY4_ELEM as i32);
        // Reserved header bytes stay zero (the allocator zeroes blocks).

        emit_store(buf, true, Reg::Rax, Reg::Rbp, frame_offset);
        Ok(())
    }

    /// Emit an element access. Leaves the element address in RAX
    /// (`lvalue`) or the loaded 8-byte element (`!lvalue`).
    ///
    /// Index evaluation pushes x, y, z, t; the pops land them in
    /// R8..R11 in reverse order. Strides are compile-time immediates.
    pub(crate) fn emit_array_address(
        &mut self,
        id: NodeId,
        lvalue: bool,
    ) -> Result<(), EmitError> {
        let Node::Array4Access { array, index } = self.node(id)? else {
            return Err(EmitError::BadNode(id));
        };
        let (array, index) = (*array, *index);

        let Node::Ident { name } = self.node(array)? else {
            return Err(EmitError::BadNode(array));
        };
        let name = self.str_of(array, *name)?;
        let sym = self
            .syms
            .lookup(name)
            .ok_or_else(|| EmitError::Undefined(name.to_owned()))?;
        let SymbolKind::Array4 {
            frame_offset,
            dims,
            elem_size,
        } = sym.kind
        else {
            return Err(EmitError::WrongSymbolKind {
                name: sym.name,
                kind: "non-array",
            });
        };

        let strides = [
            elem_size,
            dims[0] * elem_size,
            dims[0] * dims[1] * elem_size,
            dims[0] * dims[1] * dims[2] * elem_size,
        ];
        if strides.iter().any(|&s| s > i32::MAX as u64) {
            return Err(EmitError::ArrayTooLarge(sym.name));
        }

        for (axis, &idx) in index.iter().enumerate() {
            match self.node(idx)? {
                Node::Timing { dir } => {
                    if axis != 3 {
                        return Err(EmitError::TemporalIndexMisplaced);
                    }
                    self.emit_temporal_index(*dir);
                }
                _ => self.emit_expr_int(idx)?,
            }
            self.push_tmp();
        }
        // R8=x, R9=y, R10=z, R11=t.
        for &reg in ARRAY_INDEX_REGS.iter().rev() {
            self.pop_tmp(reg);
        }

        let buf = &mut self.buf;
        for (axis, &reg) in ARRAY_INDEX_REGS.iter().enumerate() {
            emit_imul_ri(buf, true, reg, reg, strides[axis] as i32);
        }
        for &reg in &ARRAY_INDEX_REGS[1..] {
            emit_arith_rr(buf, ArithOp::Add, true, Reg::R8, reg);
        }

        emit_load(buf, true, Reg::Rax, Reg::Rbp, frame_offset);
        emit_lea_sib(buf, true, Reg::Rax, Reg::Rax, Reg::R8, 0, ARRAY4_HEADER);
        if !lvalue {
            emit_load(buf, true, Reg::Rax, Reg::Rax, 0);
        }
        Ok(())
    }

    /// `<t` / `>t`: the runtime current-time cell, shifted one step.
    fn emit_temporal_index(&mut self, dir: TimeDir) {
        let buf = &mut self.buf;
        emit_mov_ri(buf, Reg::Rax, self.layout.current_time);
        emit_load(buf, true, Reg::Rax, Reg::Rax, 0);
        let op = match dir {
            TimeDir::Past => ArithOp::Sub,
            TimeDir::Future => ArithOp::Add,
        };
        emit_arith_ri(buf, op, true, Reg::Rax, 1);
    }
}
