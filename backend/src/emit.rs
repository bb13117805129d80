//! Emitter core: walks the AST and drives the instruction encoders.
//!
//! Value convention: integer expressions land in RAX, doubles in XMM0.
//! Binary operators evaluate left, `push rax`, evaluate right, `pop rcx`,
//! then combine with RCX (left) op RAX (right). Temporary pushes are
//! counted so every call site can restore 16-byte stack alignment with a
//! dummy adjustment when the count is odd.

use blaze_ast::{Ast, BinOpKind, JumpKind, Node, NodeId, NodeKind, StrRef};
use blaze_runtime::RuntimeLayout;
use log::{debug, trace};

use crate::code_buffer::{CodeBuffer, FinalizedCode, Label};
use crate::error::EmitError;
use crate::symbols::{Symbol, SymbolKind, SymbolTable, ValClass};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{Reg, CALL_ARG_REGS};

/// Linux x86-64 syscall numbers used by emitted code.
pub const SYS_WRITE: u64 = 1;
pub const SYS_EXIT: u64 = 60;

/// Compile `ast` into executable code. The program entry is at offset 0;
/// it ends in `sys_exit` with the program's final expression value.
pub fn emit_program(
    ast: &Ast,
    layout: RuntimeLayout,
) -> Result<FinalizedCode, EmitError> {
    EmitSession::new(ast, layout)?.run()
}

struct LoopLabels {
    top: Label,
    exit: Label,
}

/// One emission session: a single-threaded straight-line traversal.
/// Dropping the session before [`run`](Self::run) completes discards the
/// partial buffer; there is no partial success.
pub struct EmitSession<'a> {
    ast: &'a Ast,
    pub(crate) buf: CodeBuffer,
    pub(crate) syms: SymbolTable,
    pub(crate) layout: RuntimeLayout,
    loop_stack: Vec<LoopLabels>,
    /// Pending temporary pushes (odd count = stack 8 off alignment).
    pub(crate) push_depth: usize,
    /// Epilogue label of the function currently being emitted.
    func_end: Option<Label>,
}

impl<'a> EmitSession<'a> {
    pub fn new(ast: &'a Ast, layout: RuntimeLayout) -> Result<Self, EmitError> {
        Ok(Self {
            ast,
            buf: CodeBuffer::with_default_size()?,
            syms: SymbolTable::new(),
            layout,
            loop_stack: Vec::new(),
            push_depth: 0,
            func_end: None,
        })
    }

    // -- AST access --

    pub(crate) fn node(&self, id: NodeId) -> Result<&'a Node, EmitError> {
        self.ast.node(id).ok_or(EmitError::BadNode(id))
    }

    pub(crate) fn str_of(&self, id: NodeId, r: StrRef) -> Result<&'a str, EmitError> {
        self.ast.str(r).ok_or(EmitError::BadString(id))
    }

    pub(crate) fn bytes_of(
        &self,
        id: NodeId,
        r: StrRef,
    ) -> Result<&'a [u8], EmitError> {
        self.ast.str_bytes(r).ok_or(EmitError::BadString(id))
    }

    fn bad_kind(
        &self,
        id: NodeId,
        node: &Node,
        context: &'static str,
    ) -> EmitError {
        EmitError::BadNodeKind {
            node: id,
            kind: node.kind(),
            context,
        }
    }

    // -- Temp stack accounting --

    pub(crate) fn push_tmp(&mut self) {
        emit_push(&mut self.buf, Reg::Rax);
        self.push_depth += 1;
    }

    pub(crate) fn pop_tmp(&mut self, reg: Reg) {
        emit_pop(&mut self.buf, reg);
        self.push_depth -= 1;
    }

    /// Call a runtime entry through RAX, with a dummy stack adjustment
    /// when an odd number of temporary pushes is pending.
    pub(crate) fn emit_call_hook(&mut self, hook: u64) {
        let pad = self.push_depth % 2 == 1;
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Sub, true, Reg::Rsp, 8);
        }
        emit_mov_ri(&mut self.buf, Reg::Rax, hook);
        emit_call_reg(&mut self.buf, Reg::Rax);
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Add, true, Reg::Rsp, 8);
        }
    }

    /// Embed `bytes` in the code stream behind a jump, returning the
    /// offset of the first byte. Short payloads use a rel8 skip.
    pub(crate) fn emit_inline_bytes(
        &mut self,
        bytes: &[u8],
        nul_terminate: bool,
    ) -> Result<usize, EmitError> {
        let total = bytes.len() + nul_terminate as usize;
        let skip = self.buf.mark_label();
        if total <= 120 {
            emit_jmp_rel8_label(&mut self.buf, skip);
        } else {
            emit_jmp_label(&mut self.buf, skip);
        }
        let start = self.buf.pos();
        self.buf.emit_bytes(bytes);
        if nul_terminate {
            self.buf.emit_u8(0);
        }
        self.buf.bind_label(skip)?;
        Ok(start)
    }

    // -- Type classification --

    pub(crate) fn class_of(&self, id: NodeId) -> Result<ValClass, EmitError> {
        Ok(match self.node(id)? {
            Node::FloatNum { .. } => ValClass::Float,
            Node::BinOp { op, lhs, rhs } => {
                if op.is_comparison() {
                    ValClass::Int
                } else if self.class_of(*lhs)? == ValClass::Float
                    || self.class_of(*rhs)? == ValClass::Float
                {
                    ValClass::Float
                } else {
                    ValClass::Int
                }
            }
            Node::Ident { name } => {
                let name = self.str_of(id, *name)?;
                match self.syms.lookup(name) {
                    Some(Symbol {
                        kind: SymbolKind::Var { class, .. },
                        ..
                    }) => class,
                    _ => ValClass::Int,
                }
            }
            _ => ValClass::Int,
        })
    }

    // -- Expressions --

    /// Emit an expression; integers land in RAX, doubles in XMM0.
    pub(crate) fn emit_expr(&mut self, id: NodeId) -> Result<ValClass, EmitError> {
        trace!("expr {:?} @ {:#x}", id, self.buf.pos());
        match self.node(id)? {
            Node::Num { value } => {
                emit_mov_ri(&mut self.buf, Reg::Rax, *value as u64);
                Ok(ValClass::Int)
            }
            Node::FloatNum { value } => {
                self.emit_float_literal(*value);
                Ok(ValClass::Float)
            }
            Node::Ident { name } => {
                let name = self.str_of(id, *name)?;
                let sym = self
                    .syms
                    .lookup(name)
                    .ok_or_else(|| EmitError::Undefined(name.to_owned()))?;
                match sym.kind {
                    SymbolKind::Var {
                        frame_offset,
                        class: ValClass::Int,
                    } => {
                        emit_load(
                            &mut self.buf,
                            true,
                            Reg::Rax,
                            Reg::Rbp,
                            frame_offset,
                        );
                        Ok(ValClass::Int)
                    }
                    SymbolKind::Var {
                        frame_offset,
                        class: ValClass::Float,
                    } => {
                        self.emit_float_slot_load(frame_offset);
                        Ok(ValClass::Float)
                    }
                    SymbolKind::Array4 { frame_offset, .. } => {
                        // Array identifier as a value: its base pointer.
                        emit_load(
                            &mut self.buf,
                            true,
                            Reg::Rax,
                            Reg::Rbp,
                            frame_offset,
                        );
                        Ok(ValClass::Int)
                    }
                    SymbolKind::Func { .. } => {
                        Err(EmitError::WrongSymbolKind {
                            name: sym.name,
                            kind: "function",
                        })
                    }
                }
            }
            Node::BinOp { op, lhs, rhs } => {
                let float = !op.is_comparison()
                    && (self.class_of(*lhs)? == ValClass::Float
                        || self.class_of(*rhs)? == ValClass::Float);
                let float_cmp = op.is_comparison()
                    && (self.class_of(*lhs)? == ValClass::Float
                        || self.class_of(*rhs)? == ValClass::Float);
                if float {
                    self.emit_float_binop(*op, *lhs, *rhs)?;
                    Ok(ValClass::Float)
                } else if float_cmp {
                    self.emit_float_compare(*op, *lhs, *rhs)?;
                    Ok(ValClass::Int)
                } else {
                    self.emit_int_binop(*op, *lhs, *rhs)?;
                    Ok(ValClass::Int)
                }
            }
            Node::Array4Access { .. } => {
                self.emit_array_address(id, false)?;
                Ok(ValClass::Int)
            }
            Node::Call { callee, args } => {
                let callee = self.str_of(id, *callee)?;
                // Clone the arg list; emission below re-borrows self.
                let args = args.clone();
                self.emit_call(callee, &args)?;
                Ok(ValClass::Int)
            }
            Node::Timing { .. } => Err(EmitError::TemporalIndexMisplaced),
            node => Err(self.bad_kind(id, node, "in expression position")),
        }
    }

    /// Expression coerced into RAX (doubles convert via CVTSD2SI).
    pub(crate) fn emit_expr_int(&mut self, id: NodeId) -> Result<(), EmitError> {
        if self.emit_expr(id)? == ValClass::Float {
            emit_cvtsd2si(&mut self.buf, Reg::Rax, crate::x86_64::regs::Xmm::Xmm0);
        }
        Ok(())
    }

    fn emit_int_binop(
        &mut self,
        op: BinOpKind,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<(), EmitError> {
        self.emit_expr_int(lhs)?;
        self.push_tmp();
        self.emit_expr_int(rhs)?;
        self.pop_tmp(Reg::Rcx);
        // Left in RCX, right in RAX.
        let buf = &mut self.buf;
        match op {
            BinOpKind::Add => {
                emit_arith_rr(buf, ArithOp::Add, true, Reg::Rax, Reg::Rcx)
            }
            BinOpKind::Sub => {
                emit_arith_rr(buf, ArithOp::Sub, true, Reg::Rcx, Reg::Rax);
                emit_mov_rr(buf, true, Reg::Rax, Reg::Rcx);
            }
            BinOpKind::Mul => emit_mul(buf, true, Reg::Rcx),
            BinOpKind::Div => {
                // Operand order: RCX / RAX. Swap through the stack, then
                // sign-extend and divide; #DE on zero is left to the host.
                emit_push(buf, Reg::Rax);
                emit_mov_rr(buf, true, Reg::Rax, Reg::Rcx);
                emit_pop(buf, Reg::Rcx);
                emit_cqo(buf);
                emit_idiv(buf, true, Reg::Rcx);
            }
            BinOpKind::And => {
                emit_arith_rr(buf, ArithOp::And, true, Reg::Rax, Reg::Rcx)
            }
            BinOpKind::Or => {
                emit_arith_rr(buf, ArithOp::Or, true, Reg::Rax, Reg::Rcx)
            }
            BinOpKind::Xor => {
                emit_arith_rr(buf, ArithOp::Xor, true, Reg::Rax, Reg::Rcx)
            }
            cmp => {
                emit_arith_rr(buf, ArithOp::Cmp, true, Reg::Rcx, Reg::Rax);
                emit_setcc(buf, int_cc(cmp), Reg::Rax);
                emit_movzx_b(buf, Reg::Rax, Reg::Rax);
            }
        }
        Ok(())
    }

    // -- Statements --

    pub(crate) fn emit_stmt(&mut self, id: NodeId) -> Result<(), EmitError> {
        trace!("stmt {:?} @ {:#x}", id, self.buf.pos());
        match self.node(id)? {
            Node::VarDef { name, init } => {
                let (name, init) = (*name, *init);
                let name = self.str_of(id, name)?;
                let class = self.class_of(init)?;
                let sym = self.syms.declare_var(name, class)?;
                let SymbolKind::Var { frame_offset, .. } = sym.kind else {
                    unreachable!();
                };
                match class {
                    ValClass::Int => {
                        self.emit_expr_int(init)?;
                        emit_store(
                            &mut self.buf,
                            true,
                            Reg::Rax,
                            Reg::Rbp,
                            frame_offset,
                        );
                    }
                    ValClass::Float => {
                        self.emit_expr_float(init)?;
                        self.emit_float_slot_store(frame_offset);
                    }
                }
                Ok(())
            }
            Node::Assign { target, value } => self.emit_assign(*target, *value),
            Node::Action { stmts } => {
                let stmts = stmts.clone();
                self.syms.enter_scope();
                for s in stmts {
                    self.emit_stmt(s)?;
                }
                self.syms.leave_scope();
                Ok(())
            }
            Node::If {
                cond,
                then_blk,
                else_blk,
            } => self.emit_if(*cond, *then_blk, *else_blk),
            Node::Loop { cond, body } => self.emit_loop(*cond, *body),
            Node::Jump { kind } => {
                let labels = self
                    .loop_stack
                    .last()
                    .ok_or(EmitError::JumpOutsideLoop)?;
                let target = match kind {
                    JumpKind::Break => labels.exit,
                    JumpKind::Continue => labels.top,
                };
                emit_jmp_label(&mut self.buf, target);
                Ok(())
            }
            Node::Return { value } => {
                let end = self.func_end.ok_or(EmitError::BadNodeKind {
                    node: id,
                    kind: NodeKind::Return,
                    context: "outside a function",
                })?;
                match value {
                    Some(v) => self.emit_expr_int(*v)?,
                    None => emit_mov_ri(&mut self.buf, Reg::Rax, 0),
                }
                emit_jmp_label(&mut self.buf, end);
                Ok(())
            }
            Node::Print { value } => self.emit_print(*value),
            Node::Array4Def { name, dims } => {
                let (name, dims) = (*name, *dims);
                let name = self.str_of(id, name)?;
                self.emit_array_def(name, dims)
            }
            Node::FixedPoint { name, required } => {
                let (name, required) = (*name, *required);
                self.emit_fixed_point(id, name, required)
            }
            Node::Arrive {
                point,
                timeline,
                data,
            } => self.emit_arrive(*point, *timeline, *data),
            Node::Timeline { name, id: tl, rate } => {
                let (name, tl, rate) = (*name, *tl, *rate);
                let name = self.str_of(id, name)?;
                self.emit_timeline(name, tl, rate)
            }
            Node::FlowSpec { flow, body } => self.emit_flow_spec(*flow, *body),
            Node::FlowCtl { op, flow, rate } => {
                self.emit_flow_ctl(*op, *flow, *rate)
            }
            Node::Collide {
                target,
                strategy,
                fallback,
            } => self.emit_collide(*target, *strategy, *fallback),
            Node::FuncDef { .. } => {
                Err(self.bad_kind(id, self.node(id)?, "outside the program root"))
            }
            Node::Program { .. } => {
                Err(self.bad_kind(id, self.node(id)?, "below the root"))
            }
            // Bare expression statement: value left in RAX.
            _ => self.emit_expr_int(id),
        }
    }

    fn emit_assign(
        &mut self,
        target: NodeId,
        value: NodeId,
    ) -> Result<(), EmitError> {
        match self.node(target)? {
            Node::Ident { name } => {
                let name = self.str_of(target, *name)?;
                let sym = self
                    .syms
                    .lookup(name)
                    .ok_or_else(|| EmitError::Undefined(name.to_owned()))?;
                match sym.kind {
                    SymbolKind::Var {
                        frame_offset,
                        class: ValClass::Int,
                    } => {
                        self.emit_expr_int(value)?;
                        emit_store(
                            &mut self.buf,
                            true,
                            Reg::Rax,
                            Reg::Rbp,
                            frame_offset,
                        );
                        Ok(())
                    }
                    SymbolKind::Var {
                        frame_offset,
                        class: ValClass::Float,
                    } => {
                        self.emit_expr_float(value)?;
                        self.emit_float_slot_store(frame_offset);
                        Ok(())
                    }
                    _ => Err(EmitError::WrongSymbolKind {
                        name: sym.name,
                        kind: "non-scalar",
                    }),
                }
            }
            Node::Array4Access { .. } => {
                self.emit_array_address(target, true)?;
                self.push_tmp();
                self.emit_expr_int(value)?;
                self.pop_tmp(Reg::Rcx);
                emit_store(&mut self.buf, true, Reg::Rax, Reg::Rcx, 0);
                Ok(())
            }
            node => Err(self.bad_kind(target, node, "as assignment target")),
        }
    }

    fn emit_if(
        &mut self,
        cond: NodeId,
        then_blk: NodeId,
        else_blk: Option<NodeId>,
    ) -> Result<(), EmitError> {
        self.emit_expr_int(cond)?;
        emit_arith_ri(&mut self.buf, ArithOp::Cmp, true, Reg::Rax, 0);
        let else_label = self.buf.mark_label();
        emit_jcc_label(&mut self.buf, Cc::Z, else_label);
        self.emit_stmt(then_blk)?;
        match else_blk {
            Some(els) => {
                let end = self.buf.mark_label();
                emit_jmp_label(&mut self.buf, end);
                self.buf.bind_label(else_label)?;
                self.emit_stmt(els)?;
                self.buf.bind_label(end)?;
            }
            None => self.buf.bind_label(else_label)?,
        }
        Ok(())
    }

    fn emit_loop(&mut self, cond: NodeId, body: NodeId) -> Result<(), EmitError> {
        let top = self.buf.mark_label();
        self.buf.bind_label(top)?;
        self.emit_expr_int(cond)?;
        emit_arith_ri(&mut self.buf, ArithOp::Cmp, true, Reg::Rax, 0);
        let exit = self.buf.mark_label();
        emit_jcc_label(&mut self.buf, Cc::Z, exit);
        self.loop_stack.push(LoopLabels { top, exit });
        self.emit_stmt(body)?;
        self.loop_stack.pop();
        emit_jmp_label(&mut self.buf, top);
        self.buf.bind_label(exit)?;
        Ok(())
    }

    fn emit_print(&mut self, value: NodeId) -> Result<(), EmitError> {
        if let Node::Str { text } = self.node(value)? {
            // Inline the literal, then sys_write(1, str, len).
            let bytes = self.bytes_of(value, *text)?.to_vec();
            let start = self.emit_inline_bytes(&bytes, false)?;
            let buf = &mut self.buf;
            emit_lea_rip(buf, Reg::Rsi, start);
            emit_mov_ri(buf, Reg::Rdi, 1);
            emit_mov_ri(buf, Reg::Rdx, bytes.len() as u64);
            emit_mov_ri(buf, Reg::Rax, SYS_WRITE);
            emit_syscall(buf);
            return Ok(());
        }
        match self.class_of(value)? {
            ValClass::Float => {
                self.emit_expr_float(value)?;
                self.emit_call_hook(self.layout.hooks.print_f64);
            }
            ValClass::Int => {
                self.emit_expr_int(value)?;
                emit_mov_rr(&mut self.buf, true, Reg::Rdi, Reg::Rax);
                self.emit_call_hook(self.layout.hooks.print_i64);
            }
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        callee: &str,
        args: &[NodeId],
    ) -> Result<(), EmitError> {
        let sym = self
            .syms
            .lookup(callee)
            .ok_or_else(|| EmitError::Undefined(callee.to_owned()))?;
        let SymbolKind::Func { entry, params } = sym.kind else {
            return Err(EmitError::WrongSymbolKind {
                name: sym.name,
                kind: "non-function",
            });
        };
        if args.len() != params {
            return Err(EmitError::Arity {
                name: sym.name,
                expected: params,
                got: args.len(),
            });
        }
        if args.len() > CALL_ARG_REGS.len() {
            return Err(EmitError::TooManyArgs(args.len()));
        }
        for &arg in args {
            self.emit_expr_int(arg)?;
            self.push_tmp();
        }
        for i in (0..args.len()).rev() {
            self.pop_tmp(CALL_ARG_REGS[i]);
        }
        let pad = self.push_depth % 2 == 1;
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Sub, true, Reg::Rsp, 8);
        }
        emit_call_label(&mut self.buf, entry);
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Add, true, Reg::Rsp, 8);
        }
        Ok(())
    }

    // -- Functions and the program wrapper --

    /// push RBP; mov RBP, RSP; sub RSP, <patched later>. Returns the
    /// patch site of the frame-size immediate.
    fn emit_prologue(&mut self) -> usize {
        let buf = &mut self.buf;
        emit_push(buf, Reg::Rbp);
        emit_mov_rr(buf, true, Reg::Rbp, Reg::Rsp);
        // Fixed-width sub so the immediate is patchable in place.
        emit_modrm_ext(buf, OPC_ARITH_EvIz | P_REXW, ArithOp::Sub as u8, Reg::Rsp);
        let site = buf.pos();
        buf.emit_u32(0);
        site
    }

    fn emit_epilogue(&mut self) {
        let buf = &mut self.buf;
        emit_mov_rr(buf, true, Reg::Rsp, Reg::Rbp);
        emit_pop(buf, Reg::Rbp);
        emit_ret(buf);
    }

    fn emit_function(
        &mut self,
        id: NodeId,
        name: StrRef,
        params: &[StrRef],
        body: NodeId,
    ) -> Result<(), EmitError> {
        let name_str = self.str_of(id, name)?;
        let sym = self
            .syms
            .lookup(name_str)
            .ok_or_else(|| EmitError::Undefined(name_str.to_owned()))?;
        let SymbolKind::Func { entry, .. } = sym.kind else {
            return Err(EmitError::WrongSymbolKind {
                name: sym.name,
                kind: "non-function",
            });
        };
        debug!("function `{name_str}` @ {:#x}", self.buf.pos());

        let offset = self.buf.pos();
        self.buf.bind_label_at(entry, offset)?;

        let barrier = self.syms.raise_frame_barrier();
        self.syms.frame_reset();
        self.syms.enter_scope();
        let frame_site = self.emit_prologue();

        // Spill arguments into their frame slots.
        for (i, &param) in params.iter().enumerate() {
            let pname = self.str_of(id, param)?;
            let psym = self.syms.declare_var(pname, ValClass::Int)?;
            let SymbolKind::Var { frame_offset, .. } = psym.kind else {
                unreachable!();
            };
            emit_store(
                &mut self.buf,
                true,
                CALL_ARG_REGS[i],
                Reg::Rbp,
                frame_offset,
            );
        }

        let end = self.buf.mark_label();
        let prev_end = self.func_end.replace(end);
        self.emit_stmt(body)?;
        self.func_end = prev_end;

        // Fall-through return value.
        emit_mov_ri(&mut self.buf, Reg::Rax, 0);
        self.buf.bind_label(end)?;
        self.emit_epilogue();

        let frame = self.syms.frame_size();
        self.buf.patch_at(frame_site, 4, frame as u64);

        self.syms.leave_scope();
        self.syms.restore_frame_barrier(barrier);
        Ok(())
    }

    /// Emit the whole program and finalize.
    pub fn run(mut self) -> Result<FinalizedCode, EmitError> {
        let root = self
            .ast
            .root()
            .ok_or(EmitError::BadNode(NodeId(0)))?;
        let Node::Program { body } = self.node(root)? else {
            return Err(self.bad_kind(root, self.node(root)?, "as program root"));
        };
        let body = body.clone();
        debug!(
            "emitting program: {} top-level statements, {} AST nodes",
            body.len(),
            self.ast.len()
        );

        self.syms.enter_scope();

        // Pre-declare functions so forward calls patch through labels.
        for &stmt in &body {
            if let Node::FuncDef { name, params, .. } = self.node(stmt)? {
                let name = self.str_of(stmt, *name)?;
                let entry = self.buf.mark_label();
                self.syms.declare_function(name, entry, params.len())?;
            }
        }

        // Implicit entry function at offset 0.
        self.syms.frame_reset();
        let frame_site = self.emit_prologue();
        let mut last_is_expr = false;
        for &stmt in &body {
            if matches!(self.node(stmt)?, Node::FuncDef { .. }) {
                continue;
            }
            self.emit_stmt(stmt)?;
            last_is_expr = is_expression(self.node(stmt)?);
        }

        // exit(<final expression>): status in RDI, sys_exit in RAX.
        if last_is_expr {
            emit_mov_rr(&mut self.buf, true, Reg::Rdi, Reg::Rax);
        } else {
            emit_mov_ri(&mut self.buf, Reg::Rdi, 0);
        }
        emit_mov_ri(&mut self.buf, Reg::Rax, SYS_EXIT);
        emit_syscall(&mut self.buf);
        let frame = self.syms.frame_size();
        self.buf.patch_at(frame_site, 4, frame as u64);

        // Function bodies follow the entry's exit sequence.
        for &stmt in &body {
            if let Node::FuncDef { name, params, body } = self.node(stmt)? {
                let (name, params, fbody) = (*name, params.clone(), *body);
                self.emit_function(stmt, name, &params, fbody)?;
            }
        }

        self.syms.leave_scope();
        debug_assert_eq!(self.push_depth, 0);

        debug!(
            "finalizing: {} bytes, {} pending patches",
            self.buf.pos(),
            self.buf.pending_patches()
        );
        self.buf.finalize()
    }
}

fn is_expression(node: &Node) -> bool {
    matches!(
        node.kind(),
        NodeKind::Num
            | NodeKind::FloatNum
            | NodeKind::Ident
            | NodeKind::BinOp
            | NodeKind::Call
            | NodeKind::Array4Access
    )
}

fn int_cc(op: BinOpKind) -> Cc {
    match op {
        BinOpKind::Eq => Cc::E,
        BinOpKind::Ne => Cc::Ne,
        BinOpKind::Lt => Cc::L,
        BinOpKind::Le => Cc::Le,
        BinOpKind::Gt => Cc::G,
        BinOpKind::Ge => Cc::Ge,
        _ => unreachable!("not a comparison"),
    }
}
