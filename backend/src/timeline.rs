//! Timeline call-site emission: fixed points, flows, and the collision
//! scan.
//!
//! Runtime entries are reached with `mov rax, imm64; call rax`; the
//! collision resolution sequences are emitted inline against the table
//! address in the layout. Every branch in the scan loop is rel32; the
//! loop body can outgrow a rel8 displacement.

use blaze_ast::{CollisionStrategy, FlowCtlOp, NodeId, StrRef};
use blaze_runtime::tables::{
    COLLISION_CAPACITY, COLLISION_DATA_SIZE, COLLISION_NEXT_NONE,
    COLLISION_RECORD_SIZE, TLR_OFF_DATA, TLR_OFF_NEXT, TLR_OFF_TARGET,
};

use crate::emit::EmitSession;
use crate::error::EmitError;
use crate::symbols::{SymbolKind, ValClass};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::Reg;

impl EmitSession<'_> {
    /// Register a fixed point named by an inline string and bind its id
    /// to a variable of the same name. A nonzero `required` mask is
    /// installed right after registration.
    pub(crate) fn emit_fixed_point(
        &mut self,
        id: NodeId,
        name: StrRef,
        required: u64,
    ) -> Result<(), EmitError> {
        let name_str = self.str_of(id, name)?;
        let bytes = self.bytes_of(id, name)?.to_vec();
        let sym = self.syms.declare_var(name_str, ValClass::Int)?;
        let SymbolKind::Var { frame_offset, .. } = sym.kind else {
            unreachable!();
        };

        let start = self.emit_inline_bytes(&bytes, true)?;
        emit_lea_rip(&mut self.buf, Reg::Rdi, start);
        self.emit_call_hook(self.layout.hooks.register_fixedpoint);
        emit_store(&mut self.buf, true, Reg::Rax, Reg::Rbp, frame_offset);

        if required != 0 {
            emit_mov_rr(&mut self.buf, true, Reg::Rdi, Reg::Rax);
            emit_mov_ri(&mut self.buf, Reg::Rsi, required);
            self.emit_call_hook(self.layout.hooks.fixedpoint_require);
        }
        Ok(())
    }

    /// `arrive(point, timeline, data?)`: blocks in the runtime until the
    /// fixed point releases.
    pub(crate) fn emit_arrive(
        &mut self,
        point: NodeId,
        timeline: NodeId,
        data: Option<NodeId>,
    ) -> Result<(), EmitError> {
        self.emit_expr_int(point)?;
        self.push_tmp();
        self.emit_expr_int(timeline)?;
        self.push_tmp();
        match data {
            Some(d) => self.emit_expr_int(d)?,
            None => emit_mov_ri(&mut self.buf, Reg::Rax, 0),
        }
        self.push_tmp();
        self.pop_tmp(Reg::Rdx);
        self.pop_tmp(Reg::Rsi);
        self.pop_tmp(Reg::Rdi);
        self.emit_call_hook(self.layout.hooks.arrive_fixedpoint);
        Ok(())
    }

    /// Register a permanent (no rate) or rate-limited flow; the flow id
    /// binds to `name`.
    pub(crate) fn emit_timeline(
        &mut self,
        name: &str,
        timeline_id: NodeId,
        rate: Option<NodeId>,
    ) -> Result<(), EmitError> {
        let sym = self.syms.declare_var(name, ValClass::Int)?;
        let SymbolKind::Var { frame_offset, .. } = sym.kind else {
            unreachable!();
        };

        self.emit_expr_int(timeline_id)?;
        self.push_tmp();
        match rate {
            Some(r) => self.emit_expr_int(r)?,
            None => emit_mov_ri(&mut self.buf, Reg::Rax, 0),
        }
        emit_mov_rr(&mut self.buf, true, Reg::Rsi, Reg::Rax);
        self.pop_tmp(Reg::Rdi);
        self.emit_call_hook(self.layout.hooks.register_flow);
        emit_store(&mut self.buf, true, Reg::Rax, Reg::Rbp, frame_offset);
        Ok(())
    }

    /// Gate a block on `should_execute_flow(flow)`.
    pub(crate) fn emit_flow_spec(
        &mut self,
        flow: NodeId,
        body: NodeId,
    ) -> Result<(), EmitError> {
        self.emit_expr_int(flow)?;
        emit_mov_rr(&mut self.buf, true, Reg::Rdi, Reg::Rax);
        self.emit_call_hook(self.layout.hooks.should_execute);
        emit_arith_ri(&mut self.buf, ArithOp::Cmp, true, Reg::Rax, 0);
        let skip = self.buf.mark_label();
        emit_jcc_label(&mut self.buf, Cc::Z, skip);
        self.emit_stmt(body)?;
        self.buf.bind_label(skip)?;
        Ok(())
    }

    pub(crate) fn emit_flow_ctl(
        &mut self,
        op: FlowCtlOp,
        flow: NodeId,
        rate: Option<NodeId>,
    ) -> Result<(), EmitError> {
        match op {
            FlowCtlOp::Pause | FlowCtlOp::Terminate => {
                self.emit_expr_int(flow)?;
                emit_mov_rr(&mut self.buf, true, Reg::Rdi, Reg::Rax);
                let hook = match op {
                    FlowCtlOp::Pause => self.layout.hooks.pause_flow,
                    _ => self.layout.hooks.terminate_flow,
                };
                self.emit_call_hook(hook);
            }
            FlowCtlOp::Resume => {
                self.emit_expr_int(flow)?;
                self.push_tmp();
                match rate {
                    Some(r) => self.emit_expr_int(r)?,
                    None => emit_mov_ri(&mut self.buf, Reg::Rax, 0),
                }
                emit_mov_rr(&mut self.buf, true, Reg::Rsi, Reg::Rax);
                self.pop_tmp(Reg::Rdi);
                self.emit_call_hook(self.layout.hooks.resume_flow);
            }
        }
        Ok(())
    }

    /// Collision detection and resolution.
    ///
    /// `target` evaluates to a pointer to the incoming timeline record.
    /// The emitted sequence scans the collision table for another record
    /// with the same target address and resolves per strategy, leaving
    /// 1 in RAX on a handled collision and 0 otherwise.
    ///
    /// Registers: R9 = incoming record, RAX = its target, RCX = scan
    /// cursor, RDX = scan counter.
    pub(crate) fn emit_collide(
        &mut self,
        target: NodeId,
        strategy: CollisionStrategy,
        fallback: Option<NodeId>,
    ) -> Result<(), EmitError> {
        // Bounce rewrites the incoming target; evaluate the replacement
        // before the scan clobbers the scratch registers.
        if strategy == CollisionStrategy::Bounce {
            match fallback {
                Some(f) => self.emit_expr_int(f)?,
                None => emit_mov_ri(
                    &mut self.buf,
                    Reg::Rax,
                    self.layout.default_bounce,
                ),
            }
            self.push_tmp();
        }

        self.emit_expr_int(target)?;

        let table = self.layout.collision_table;
        let buf = &mut self.buf;
        let l_loop = buf.mark_label();
        let l_next = buf.mark_label();
        let l_found = buf.mark_label();
        let l_miss = buf.mark_label();
        let l_end = buf.mark_label();

        emit_mov_rr(buf, true, Reg::R9, Reg::Rax);
        emit_load(buf, true, Reg::Rax, Reg::R9, TLR_OFF_TARGET);
        emit_mov_ri(buf, Reg::Rcx, table);
        emit_mov_ri(buf, Reg::Rdx, 0);

        buf.bind_label(l_loop)?;
        emit_arith_ri(buf, ArithOp::Cmp, true, Reg::Rdx, COLLISION_CAPACITY as i32);
        emit_jcc_label(buf, Cc::Ge, l_miss);
        // Skip the incoming record's own slot.
        emit_arith_rr(buf, ArithOp::Cmp, true, Reg::Rcx, Reg::R9);
        emit_jcc_label(buf, Cc::E, l_next);
        emit_load(buf, true, Reg::R8, Reg::Rcx, TLR_OFF_TARGET);
        emit_arith_rr(buf, ArithOp::Cmp, true, Reg::R8, Reg::Rax);
        emit_jcc_label(buf, Cc::E, l_found);
        buf.bind_label(l_next)?;
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rcx, COLLISION_RECORD_SIZE as i32);
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rdx, 1);
        emit_jmp_label(buf, l_loop);

        buf.bind_label(l_found)?;
        match strategy {
            CollisionStrategy::Bounce => {
                emit_pop(buf, Reg::R10);
                emit_store(buf, true, Reg::R10, Reg::R9, TLR_OFF_TARGET);
                emit_mov_ri(buf, Reg::Rax, 1);
                emit_jmp_label(buf, l_end);
                buf.bind_label(l_miss)?;
                emit_pop(buf, Reg::R10);
                emit_mov_ri(buf, Reg::Rax, 0);
                // One pop executes per path; settle the compile-time count.
                self.push_depth -= 1;
            }
            CollisionStrategy::Merge => {
                // Copy the incoming 256-byte payload over the existing one.
                emit_lea(buf, true, Reg::Rdi, Reg::Rcx, TLR_OFF_DATA);
                emit_lea(buf, true, Reg::Rsi, Reg::R9, TLR_OFF_DATA);
                emit_mov_ri(buf, Reg::Rcx, COLLISION_DATA_SIZE as u64);
                emit_rep_movsb(buf);
                emit_mov_ri(buf, Reg::Rax, 1);
                emit_jmp_label(buf, l_end);
                buf.bind_label(l_miss)?;
                emit_mov_ri(buf, Reg::Rax, 0);
            }
            CollisionStrategy::Queue => {
                // Link the incoming record at the chain tail. `next` is a
                // 32-bit byte offset into the table; ~0 terminates.
                let l_walk = buf.mark_label();
                let l_tail = buf.mark_label();
                emit_mov_ri(buf, Reg::R11, table);
                emit_mov_rr(buf, true, Reg::R10, Reg::R9);
                emit_arith_rr(buf, ArithOp::Sub, true, Reg::R10, Reg::R11);
                emit_store_imm(
                    buf,
                    false,
                    Reg::R9,
                    TLR_OFF_NEXT,
                    COLLISION_NEXT_NONE as i32,
                );
                buf.bind_label(l_walk)?;
                emit_load(buf, false, Reg::R8, Reg::Rcx, TLR_OFF_NEXT);
                emit_arith_ri(
                    buf,
                    ArithOp::Cmp,
                    false,
                    Reg::R8,
                    COLLISION_NEXT_NONE as i32,
                );
                emit_jcc_label(buf, Cc::E, l_tail);
                emit_mov_rr(buf, true, Reg::Rcx, Reg::R11);
                emit_arith_rr(buf, ArithOp::Add, true, Reg::Rcx, Reg::R8);
                emit_jmp_label(buf, l_walk);
                buf.bind_label(l_tail)?;
                emit_store(buf, false, Reg::R10, Reg::Rcx, TLR_OFF_NEXT);
                emit_mov_ri(buf, Reg::Rax, 1);
                emit_jmp_label(buf, l_end);
                buf.bind_label(l_miss)?;
                emit_mov_ri(buf, Reg::Rax, 0);
            }
        }
        buf.bind_label(l_end)?;
        Ok(())
    }
}
