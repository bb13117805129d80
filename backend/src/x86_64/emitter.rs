//! Bit-exact x86-64 instruction encoders.
//!
//! Every encoder is a pure function of its operands into appended bytes;
//! the emitter core never writes raw bytes itself. Opcode words carry
//! `P_*` prefix flags; `emit_opc` materializes legacy prefixes, REX and
//! 0F escapes in Intel order (66/F2/F3 before REX before 0F).

#![allow(non_upper_case_globals)]

use crate::code_buffer::{CodeBuffer, Label, PatchKind};
use crate::x86_64::regs::{Reg, Xmm};

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F escape
pub const P_DATA16: u32 = 0x400; // 0x66 prefix
pub const P_REXW: u32 = 0x1000; // REX.W = 1
pub const P_REXB_RM: u32 = 0x4000; // R/M field addresses a byte register
pub const P_SIMDF3: u32 = 0x20000; // 0xF3 prefix
pub const P_SIMDF2: u32 = 0x40000; // 0xF2 prefix

// -- Opcode constants --

pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_EvIz: u32 = 0x81;
pub const OPC_ARITH_GvEv: u32 = 0x03;
pub const OPC_ARITH_EvGv: u32 = 0x01;

pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;
pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;

pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JCC_short: u32 = 0x70;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_JMP_short: u32 = 0xEB;
pub const OPC_CALL_Jz: u32 = 0xE8;
pub const OPC_SETCC: u32 = 0x90 | P_EXT | P_REXB_RM;
pub const OPC_TESTL: u32 = 0x85;

pub const OPC_GRP3_Ev: u32 = 0xF7;
pub const OPC_GRP5: u32 = 0xFF;

pub const OPC_IMUL_GvEv: u32 = 0xAF | P_EXT;
pub const OPC_IMUL_GvEvIb: u32 = 0x6B;
pub const OPC_IMUL_GvEvIz: u32 = 0x69;

pub const OPC_LEA: u32 = 0x8D;
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_RET: u32 = 0xC3;

// SSE2 scalar double.
pub const OPC_MOVSD_VqWq: u32 = 0x10 | P_EXT | P_SIMDF2;
pub const OPC_MOVSD_WqVq: u32 = 0x11 | P_EXT | P_SIMDF2;
pub const OPC_UCOMISD: u32 = 0x2E | P_EXT | P_DATA16;
pub const OPC_COMISD: u32 = 0x2F | P_EXT | P_DATA16;
pub const OPC_CVTSI2SD: u32 = 0x2A | P_EXT | P_SIMDF2;
pub const OPC_CVTSD2SI: u32 = 0x2D | P_EXT | P_SIMDF2;

/// Arithmetic sub-opcodes (/r field of 0x81/0x83, shifted into GvEv).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Group 3 extension codes (/r field of 0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Neg = 3,
    Mul = 4,
    Imul = 5,
    Div = 6,
    Idiv = 7,
}

/// Group 5 extension codes (/r field of 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    CallN = 2,
    JmpN = 4,
}

/// SSE2 scalar-double arithmetic opcodes (with the F2 0F prefix pattern).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SseOp {
    Add = 0x58,
    Mul = 0x59,
    Sub = 0x5C,
    Div = 0x5E,
}

/// x86 condition codes for Jcc/SETcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cc {
    O = 0x0,
    No = 0x1,
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    Ns = 0x9,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl Cc {
    /// Zero/not-zero aliases (same encodings as E/NE).
    pub const Z: Cc = Cc::E;
    pub const NZ: Cc = Cc::Ne;

    /// Inverted condition: flip the low bit.
    pub fn invert(self) -> Self {
        // SAFETY: Cc covers all 16 encodings and ^1 stays in range.
        unsafe { core::mem::transmute(self as u8 ^ 1) }
    }
}

// -- Core encoding --

#[inline]
fn rexw_flag(rexw: bool) -> u32 {
    if rexw {
        P_REXW
    } else {
        0
    }
}

/// Emit prefixes + opcode. `r` is the reg field, `rm` the r/m field,
/// both raw register numbers (0-15); pass 0 for unused fields.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08; // REX.W
    }
    if r >= 8 {
        rex |= 0x04; // REX.R
    }
    if rm >= 8 {
        rex |= 0x01; // REX.B
    }
    // Byte-register access to SPL/BPL/SIL/DIL needs a bare REX.
    if opc & P_REXB_RM != 0 && rm >= 4 && rex == 0 {
        rex = 0x40;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if opc & P_SIMDF3 != 0 {
        buf.emit_u8(0xF3);
    } else if opc & P_SIMDF2 != 0 {
        buf.emit_u8(0xF2);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & P_EXT != 0 {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

/// Prefixes + opcode, 3-register variant (r, rm, index) for SIB forms.
fn emit_opc_3(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if index >= 8 {
        rex |= 0x02; // REX.X
    }
    if rm >= 8 {
        rex |= 0x01;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if opc & P_SIMDF3 != 0 {
        buf.emit_u8(0xF3);
    } else if opc & P_SIMDF2 != 0 {
        buf.emit_u8(0xF2);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & P_EXT != 0 {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

/// Opcode + ModR/M, register-register (raw field numbers).
fn emit_modrm_raw(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc(buf, opc, r, rm);
    buf.emit_u8(0xC0 | ((r & 7) << 3) | (rm & 7));
}

/// Opcode + ModR/M for register-register.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_modrm_raw(buf, opc, r as u8, rm as u8);
}

/// Opcode + ModR/M with /ext (group opcodes).
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_opc(buf, opc, ext, rm as u8);
    buf.emit_u8(0xC0 | (ext << 3) | rm.low3());
}

/// ModR/M + optional SIB + displacement for `[base + offset]`, with a
/// raw reg-field number so GPR and XMM consumers share one path.
/// RBP/R13 as base force an explicit disp8; RSP/R12 force a SIB (0x24).
fn emit_modrm_offset_raw(
    buf: &mut CodeBuffer,
    opc: u32,
    r: u8,
    base: Reg,
    offset: i32,
) {
    emit_opc(buf, opc, r, base as u8);

    let r3 = r & 7;
    let b3 = base.low3();

    if offset == 0 && b3 != 5 {
        if b3 == 4 {
            buf.emit_u8((r3 << 3) | 0x04);
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8((r3 << 3) | b3);
        }
    } else if (-128..=127).contains(&offset) {
        if b3 == 4 {
            buf.emit_u8(0x44 | (r3 << 3));
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8(0x40 | (r3 << 3) | b3);
        }
        buf.emit_u8(offset as u8);
    } else {
        if b3 == 4 {
            buf.emit_u8(0x84 | (r3 << 3));
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8(0x80 | (r3 << 3) | b3);
        }
        buf.emit_u32(offset as u32);
    }
}

/// Opcode + ModR/M + displacement for `[base + offset]`.
pub fn emit_modrm_offset(buf: &mut CodeBuffer, opc: u32, r: Reg, base: Reg, offset: i32) {
    emit_modrm_offset_raw(buf, opc, r as u8, base, offset);
}

/// Opcode + ModR/M + SIB for `[base + index*scale + offset]`.
pub fn emit_modrm_sib(
    buf: &mut CodeBuffer,
    opc: u32,
    r: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_opc_3(buf, opc, r as u8, base as u8, index as u8);

    let r3 = r.low3();
    let b3 = base.low3();
    let sib = (shift << 6) | (index.low3() << 3) | b3;

    if offset == 0 && b3 != 5 {
        buf.emit_u8((r3 << 3) | 0x04);
        buf.emit_u8(sib);
    } else if (-128..=127).contains(&offset) {
        buf.emit_u8(0x44 | (r3 << 3));
        buf.emit_u8(sib);
        buf.emit_u8(offset as u8);
    } else {
        buf.emit_u8(0x84 | (r3 << 3));
        buf.emit_u8(sib);
        buf.emit_u32(offset as u32);
    }
}

// -- Arithmetic --

/// ADD/SUB/AND/OR/XOR/CMP dst, src.
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm(buf, opc, dst, src);
}

/// Arithmetic dst, imm (auto-selects imm8 vs imm32).
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm_ext(buf, OPC_ARITH_EvIb | w, op as u8, dst);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm_ext(buf, OPC_ARITH_EvIz | w, op as u8, dst);
        buf.emit_u32(imm as u32);
    }
}

/// NEG reg.
pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Neg as u8, reg);
}

/// TEST r1, r2.
pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, r1: Reg, r2: Reg) {
    emit_modrm(buf, OPC_TESTL | rexw_flag(rexw), r1, r2);
}

// -- Data movement --

/// MOV dst, src.
pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, dst);
}

/// MOV reg, imm64.
///
/// Values representable as a sign-extended imm32 use the REX.W C7 /0
/// form (`mov rax, 1` => `48 C7 C0 01 00 00 00`); anything wider takes
/// the 10-byte B8+rd imm64 form.
pub fn emit_mov_ri(buf: &mut CodeBuffer, reg: Reg, val: u64) {
    let sval = val as i64;
    if (i32::MIN as i64..=i32::MAX as i64).contains(&sval) {
        emit_modrm_ext(buf, OPC_MOVL_EvIz | P_REXW, 0, reg);
        buf.emit_u32(val as u32);
    } else {
        emit_opc(buf, (OPC_MOVL_Iv + reg.low3() as u32) | P_REXW, 0, reg as u8);
        buf.emit_u64(val);
    }
}

/// MOV reg, imm64 in the fixed 10-byte form with a placeholder
/// immediate; returns the site of the imm64 for an `abs64-mov-imm`
/// patch.
pub fn emit_mov_ri_patchable(buf: &mut CodeBuffer, reg: Reg) -> usize {
    emit_opc(buf, (OPC_MOVL_Iv + reg.low3() as u32) | P_REXW, 0, reg as u8);
    let site = buf.pos();
    buf.emit_u64(0);
    site
}

/// MOV dst, [base+offset].
pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst, base, offset);
}

/// MOV [base+offset], src.
pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, base, offset);
}

/// MOV [base+offset], imm32 (sign-extended when rexw).
pub fn emit_store_imm(buf: &mut CodeBuffer, rexw: bool, base: Reg, offset: i32, imm: i32) {
    emit_modrm_offset_raw(buf, OPC_MOVL_EvIz | rexw_flag(rexw), 0, base, offset);
    buf.emit_u32(imm as u32);
}

/// MOVZX dst32, src8 (zero-extend a SETcc result).
pub fn emit_movzx_b(buf: &mut CodeBuffer, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVZBL | P_REXB_RM, dst, src);
}

/// LEA dst, [base+offset].
pub fn emit_lea(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_LEA | rexw_flag(rexw), dst, base, offset);
}

/// LEA dst, [base + index*scale + offset].
pub fn emit_lea_sib(
    buf: &mut CodeBuffer,
    rexw: bool,
    dst: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_modrm_sib(buf, OPC_LEA | rexw_flag(rexw), dst, base, index, shift, offset);
}

/// LEA dst, [rip + disp32] resolved to `target_offset` in this buffer
/// (inline string literals).
pub fn emit_lea_rip(buf: &mut CodeBuffer, dst: Reg, target_offset: usize) {
    emit_opc(buf, OPC_LEA | P_REXW, dst as u8, 0);
    buf.emit_u8((dst.low3() << 3) | 0x05); // mod=00, rm=101: RIP-relative
    let after = buf.pos() + 4;
    let disp = target_offset as i64 - after as i64;
    debug_assert!((i32::MIN as i64..=i32::MAX as i64).contains(&disp));
    buf.emit_u32(disp as u32);
}

// -- Multiply / divide --

/// MUL reg: RDX:RAX = RAX * reg.
pub fn emit_mul(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Mul as u8, reg);
}

/// IMUL dst, src.
pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_IMUL_GvEv | rexw_flag(rexw), dst, src);
}

/// IMUL dst, src, imm32.
pub fn emit_imul_ri(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm(buf, OPC_IMUL_GvEvIb | w, dst, src);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm(buf, OPC_IMUL_GvEvIz | w, dst, src);
        buf.emit_u32(imm as u32);
    }
}

/// IDIV reg: RAX = RDX:RAX / reg, RDX = remainder.
pub fn emit_idiv(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Idiv as u8, reg);
}

/// CQO: sign-extend RAX into RDX:RAX.
pub fn emit_cqo(buf: &mut CodeBuffer) {
    buf.emit_u8(0x48);
    buf.emit_u8(0x99);
}

// -- Stack --

/// PUSH reg.
pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_PUSH_r32 + reg.low3() as u32, 0, reg as u8);
}

/// POP reg.
pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_POP_r32 + reg.low3() as u32, 0, reg as u8);
}

// -- Branches and calls --

/// SETcc dst-low-byte.
pub fn emit_setcc(buf: &mut CodeBuffer, cc: Cc, dst: Reg) {
    emit_modrm_ext(buf, OPC_SETCC + cc as u32, 0, dst);
}

/// CALL through a register.
pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
}

/// RET.
pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_RET as u8);
}

/// SYSCALL.
pub fn emit_syscall(buf: &mut CodeBuffer) {
    buf.emit_u8(0x0F);
    buf.emit_u8(0x05);
}

/// CALL rel32 to a label; pending-patched when the label is unbound.
pub fn emit_call_label(buf: &mut CodeBuffer, label: Label) {
    buf.emit_u8(OPC_CALL_Jz as u8);
    emit_rel32_site(buf, label, PatchKind::Rel32Call);
}

/// JMP rel32 to a label.
pub fn emit_jmp_label(buf: &mut CodeBuffer, label: Label) {
    buf.emit_u8(OPC_JMP_long as u8);
    emit_rel32_site(buf, label, PatchKind::Rel32Jump);
}

/// Jcc rel32 to a label.
pub fn emit_jcc_label(buf: &mut CodeBuffer, cc: Cc, label: Label) {
    emit_opc(buf, OPC_JCC_long + cc as u32, 0, 0);
    emit_rel32_site(buf, label, PatchKind::Rel32Jump);
}

/// JMP rel8 to a label (short skips only; finalize rejects overflow).
pub fn emit_jmp_rel8_label(buf: &mut CodeBuffer, label: Label) {
    buf.emit_u8(OPC_JMP_short as u8);
    emit_rel8_site(buf, label);
}

/// Jcc rel8 to a label.
pub fn emit_jcc_rel8_label(buf: &mut CodeBuffer, cc: Cc, label: Label) {
    buf.emit_u8((OPC_JCC_short + cc as u32) as u8);
    emit_rel8_site(buf, label);
}

fn emit_rel32_site(buf: &mut CodeBuffer, label: Label, kind: PatchKind) {
    let site = buf.pos();
    match buf.label_offset(label) {
        Some(target) => {
            let disp = target as i64 - (site as i64 + 4);
            buf.emit_u32(disp as u32);
        }
        None => {
            buf.add_patch(site, kind, label);
            buf.emit_u32(0);
        }
    }
}

fn emit_rel8_site(buf: &mut CodeBuffer, label: Label) {
    let site = buf.pos();
    match buf.label_offset(label) {
        Some(target) => {
            let disp = target as i64 - (site as i64 + 1);
            debug_assert!((i8::MIN as i64..=i8::MAX as i64).contains(&disp));
            buf.emit_u8(disp as u8);
        }
        None => {
            buf.add_patch(site, PatchKind::Rel8Jump, label);
            buf.emit_u8(0);
        }
    }
}

// -- String ops --

/// REP MOVSB: copy RCX bytes from [RSI] to [RDI].
pub fn emit_rep_movsb(buf: &mut CodeBuffer) {
    buf.emit_u8(0xF3);
    buf.emit_u8(0xA4);
}

// -- SSE2 scalar double --

/// MOVSD dst, src (register-register).
pub fn emit_movsd_rr(buf: &mut CodeBuffer, dst: Xmm, src: Xmm) {
    emit_modrm_raw(buf, OPC_MOVSD_VqWq, dst as u8, src as u8);
}

/// MOVSD dst, [base+offset].
pub fn emit_movsd_load(buf: &mut CodeBuffer, dst: Xmm, base: Reg, offset: i32) {
    emit_modrm_offset_raw(buf, OPC_MOVSD_VqWq, dst as u8, base, offset);
}

/// MOVSD [base+offset], src.
pub fn emit_movsd_store(buf: &mut CodeBuffer, src: Xmm, base: Reg, offset: i32) {
    emit_modrm_offset_raw(buf, OPC_MOVSD_WqVq, src as u8, base, offset);
}

/// ADDSD/SUBSD/MULSD/DIVSD dst, src.
pub fn emit_sse_arith(buf: &mut CodeBuffer, op: SseOp, dst: Xmm, src: Xmm) {
    emit_modrm_raw(buf, op as u32 | P_EXT | P_SIMDF2, dst as u8, src as u8);
}

/// UCOMISD a, b (unordered compare, sets EFLAGS).
pub fn emit_ucomisd(buf: &mut CodeBuffer, a: Xmm, b: Xmm) {
    emit_modrm_raw(buf, OPC_UCOMISD, a as u8, b as u8);
}

/// COMISD a, b (ordered compare, sets EFLAGS).
pub fn emit_comisd(buf: &mut CodeBuffer, a: Xmm, b: Xmm) {
    emit_modrm_raw(buf, OPC_COMISD, a as u8, b as u8);
}

/// CVTSI2SD dst, src64 (W=1).
pub fn emit_cvtsi2sd(buf: &mut CodeBuffer, dst: Xmm, src: Reg) {
    emit_modrm_raw(buf, OPC_CVTSI2SD | P_REXW, dst as u8, src as u8);
}

/// CVTSD2SI dst64, src (W=1).
pub fn emit_cvtsd2si(buf: &mut CodeBuffer, dst: Reg, src: Xmm) {
    emit_modrm_raw(buf, OPC_CVTSD2SI | P_REXW, dst as u8, src as u8);
}
