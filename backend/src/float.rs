//! Scalar-double emission (SSE2).
//!
//! Doubles are materialized through the integer path (bit pattern into
//! RAX, via the stack into XMM0), which keeps the code stream free of
//! RIP-relative constant pools. Binary operators park the left value on
//! the stack while the right side evaluates.

use blaze_ast::{BinOpKind, NodeId};

use crate::emit::EmitSession;
use crate::error::EmitError;
use crate::symbols::ValClass;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{Reg, Xmm};

impl EmitSession<'_> {
    /// `mov rax, imm64(bits); push rax; movsd xmm0, [rsp]; add rsp, 8`.
    pub(crate) fn emit_float_literal(&mut self, value: f64) {
        let buf = &mut self.buf;
        emit_mov_ri(buf, Reg::Rax, value.to_bits());
        emit_push(buf, Reg::Rax);
        emit_movsd_load(buf, Xmm::Xmm0, Reg::Rsp, 0);
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, 8);
    }

    pub(crate) fn emit_float_slot_load(&mut self, frame_offset: i32) {
        emit_movsd_load(&mut self.buf, Xmm::Xmm0, Reg::Rbp, frame_offset);
    }

    pub(crate) fn emit_float_slot_store(&mut self, frame_offset: i32) {
        emit_movsd_store(&mut self.buf, Xmm::Xmm0, Reg::Rbp, frame_offset);
    }

    /// Expression coerced into XMM0 (integers convert via CVTSI2SD).
    pub(crate) fn emit_expr_float(&mut self, id: NodeId) -> Result<(), EmitError> {
        if self.emit_expr(id)? == ValClass::Int {
            emit_cvtsi2sd(&mut self.buf, Xmm::Xmm0, Reg::Rax);
        }
        Ok(())
    }

    /// Left to XMM0, right to XMM1, left parked on the stack in between.
    fn emit_float_operands(
        &mut self,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<(), EmitError> {
        self.emit_expr_float(lhs)?;
        emit_arith_ri(&mut self.buf, ArithOp::Sub, true, Reg::Rsp, 8);
        emit_movsd_store(&mut self.buf, Xmm::Xmm0, Reg::Rsp, 0);
        self.push_depth += 1;
        self.emit_expr_float(rhs)?;
        let buf = &mut self.buf;
        emit_movsd_rr(buf, Xmm::Xmm1, Xmm::Xmm0);
        emit_movsd_load(buf, Xmm::Xmm0, Reg::Rsp, 0);
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, 8);
        self.push_depth -= 1;
        Ok(())
    }

    pub(crate) fn emit_float_binop(
        &mut self,
        op: BinOpKind,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<(), EmitError> {
        self.emit_float_operands(lhs, rhs)?;
        let sse = match op {
            BinOpKind::Add => SseOp::Add,
            BinOpKind::Sub => SseOp::Sub,
            BinOpKind::Mul => SseOp::Mul,
            BinOpKind::Div => SseOp::Div,
            other => {
                return Err(EmitError::BadNodeKind {
                    node: lhs,
                    kind: blaze_ast::NodeKind::BinOp,
                    context: float_op_context(other),
                })
            }
        };
        emit_sse_arith(&mut self.buf, sse, Xmm::Xmm0, Xmm::Xmm1);
        Ok(())
    }

    /// Unordered-aware double comparison producing 0/1 in RAX.
    ///
    /// UCOMISD; JP detects NaN (every comparison except `!=` is false on
    /// unordered); otherwise SETB/SETBE/SETA/SETAE/SETE pick the order.
    pub(crate) fn emit_float_compare(
        &mut self,
        op: BinOpKind,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<(), EmitError> {
        self.emit_float_operands(lhs, rhs)?;
        let cc = match op {
            BinOpKind::Eq => Cc::E,
            BinOpKind::Ne => Cc::Ne,
            BinOpKind::Lt => Cc::B,
            BinOpKind::Le => Cc::Be,
            BinOpKind::Gt => Cc::A,
            BinOpKind::Ge => Cc::Ae,
            other => {
                return Err(EmitError::BadNodeKind {
                    node: lhs,
                    kind: blaze_ast::NodeKind::BinOp,
                    context: float_op_context(other),
                })
            }
        };
        let buf = &mut self.buf;
        let unordered = buf.mark_label();
        let end = buf.mark_label();
        emit_ucomisd(buf, Xmm::Xmm0, Xmm::Xmm1);
        emit_jcc_rel8_label(buf, Cc::P, unordered);
        emit_setcc(buf, cc, Reg::Rax);
        emit_movzx_b(buf, Reg::Rax, Reg::Rax);
        emit_jmp_rel8_label(buf, end);
        buf.bind_label(unordered)?;
        emit_mov_ri(buf, Reg::Rax, (op == BinOpKind::Ne) as u64);
        buf.bind_label(end)?;
        Ok(())
    }
}

fn float_op_context(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::And | BinOpKind::Or | BinOpKind::Xor => {
            "bitwise operator on doubles"
        }
        _ => "on doubles",
    }
}
