//! Golden-byte tests for the instruction encoders.

mod code_buffer;

use blaze_backend::code_buffer::CodeBuffer;
use blaze_backend::x86_64::emitter::*;
use blaze_backend::x86_64::regs::{Reg, Xmm};

fn emit_bytes(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
    let mut buf = CodeBuffer::new(4096).unwrap();
    f(&mut buf);
    buf.as_slice().to_vec()
}

// -- Register encodings --

#[test]
fn reg_encoding() {
    assert_eq!(Reg::Rax.low3(), 0);
    assert_eq!(Reg::Rsp.low3(), 4);
    assert_eq!(Reg::R8.low3(), 0);
    assert_eq!(Reg::R15.low3(), 7);
    assert!(Reg::R8.needs_rex());
    assert!(!Reg::Rdi.needs_rex());
}

// -- MOV immediates --

#[test]
fn mov_rax_imm_small() {
    // mov rax, 1 => 48 C7 C0 01 00 00 00
    let code = emit_bytes(|b| emit_mov_ri(b, Reg::Rax, 1));
    assert_eq!(code, [0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn mov_rdi_imm_small() {
    // mov rdi, 1 => 48 C7 C7 01 00 00 00
    let code = emit_bytes(|b| emit_mov_ri(b, Reg::Rdi, 1));
    assert_eq!(code, [0x48, 0xC7, 0xC7, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn mov_imm_negative_sign_extends() {
    // mov rax, -1 => 48 C7 C0 FF FF FF FF
    let code = emit_bytes(|b| emit_mov_ri(b, Reg::Rax, u64::MAX));
    assert_eq!(code, [0x48, 0xC7, 0xC0, 0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn mov_imm64_wide() {
    // movabs rax, 0x123456789ABCDEF0 => 48 B8 F0 DE BC 9A 78 56 34 12
    let code = emit_bytes(|b| emit_mov_ri(b, Reg::Rax, 0x1234_5678_9ABC_DEF0));
    assert_eq!(
        code,
        [0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]
    );
}

#[test]
fn mov_imm_patchable_is_fixed_width() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let site = emit_mov_ri_patchable(&mut buf, Reg::Rax);
    assert_eq!(site, 2); // 48 B8, then the imm64
    assert_eq!(buf.pos(), 10);
}

// -- Arithmetic --

#[test]
fn add_rr_64() {
    // add rax, rcx => 48 03 C1
    let code = emit_bytes(|b| emit_arith_rr(b, ArithOp::Add, true, Reg::Rax, Reg::Rcx));
    assert_eq!(code, [0x48, 0x03, 0xC1]);
}

#[test]
fn add_rr_extended() {
    // add r8, r9 => 4D 03 C1
    let code = emit_bytes(|b| emit_arith_rr(b, ArithOp::Add, true, Reg::R8, Reg::R9));
    assert_eq!(code, [0x4D, 0x03, 0xC1]);
}

#[test]
fn sub_ri_imm8() {
    // sub rsp, 8 => 48 83 EC 08
    let code = emit_bytes(|b| emit_arith_ri(b, ArithOp::Sub, true, Reg::Rsp, 8));
    assert_eq!(code, [0x48, 0x83, 0xEC, 0x08]);
}

#[test]
fn cmp_ri_zero() {
    // cmp rax, 0 => 48 83 F8 00
    let code = emit_bytes(|b| emit_arith_ri(b, ArithOp::Cmp, true, Reg::Rax, 0));
    assert_eq!(code, [0x48, 0x83, 0xF8, 0x00]);
}

#[test]
fn cmp_rr_64() {
    // cmp rcx, rax => 48 3B C8
    let code = emit_bytes(|b| emit_arith_rr(b, ArithOp::Cmp, true, Reg::Rcx, Reg::Rax));
    assert_eq!(code, [0x48, 0x3B, 0xC8]);
}

#[test]
fn mul_rcx() {
    // mul rcx => 48 F7 E1
    let code = emit_bytes(|b| emit_mul(b, true, Reg::Rcx));
    assert_eq!(code, [0x48, 0xF7, 0xE1]);
}

#[test]
fn imul_ri_imm8_and_imm32() {
    // imul r8, r8, 8 => 4D 6B C0 08
    let code = emit_bytes(|b| emit_imul_ri(b, true, Reg::R8, Reg::R8, 8));
    assert_eq!(code, [0x4D, 0x6B, 0xC0, 0x08]);
    // imul r9, r9, 0x1000 => 4D 69 C9 00 10 00 00
    let code = emit_bytes(|b| emit_imul_ri(b, true, Reg::R9, Reg::R9, 0x1000));
    assert_eq!(code, [0x4D, 0x69, 0xC9, 0x00, 0x10, 0x00, 0x00]);
}

#[test]
fn idiv_with_cqo() {
    let code = emit_bytes(|b| {
        emit_cqo(b);
        emit_idiv(b, true, Reg::Rcx);
    });
    assert_eq!(code, [0x48, 0x99, 0x48, 0xF7, 0xF9]);
}

// -- Memory operands --

#[test]
fn load_store_rbp_disp8() {
    // mov rax, [rbp-8] => 48 8B 45 F8
    let code = emit_bytes(|b| emit_load(b, true, Reg::Rax, Reg::Rbp, -8));
    assert_eq!(code, [0x48, 0x8B, 0x45, 0xF8]);
    // mov [rbp-8], rax => 48 89 45 F8
    let code = emit_bytes(|b| emit_store(b, true, Reg::Rax, Reg::Rbp, -8));
    assert_eq!(code, [0x48, 0x89, 0x45, 0xF8]);
}

#[test]
fn rsp_base_always_has_sib() {
    let cases: Vec<Vec<u8>> = vec![
        emit_bytes(|b| emit_load(b, true, Reg::Rax, Reg::Rsp, 0)),
        emit_bytes(|b| emit_load(b, true, Reg::Rax, Reg::Rsp, 0x10)),
        emit_bytes(|b| emit_store(b, true, Reg::Rcx, Reg::Rsp, 0x100)),
        emit_bytes(|b| emit_movsd_load(b, Xmm::Xmm0, Reg::Rsp, 0)),
    ];
    for code in cases {
        assert!(
            code.iter().any(|&x| x == 0x24),
            "RSP base must carry SIB 0x24: {code:02X?}"
        );
    }
}

#[test]
fn rbp_base_zero_offset_gets_disp8() {
    // mov rax, [rbp] => 48 8B 45 00
    let code = emit_bytes(|b| emit_load(b, true, Reg::Rax, Reg::Rbp, 0));
    assert_eq!(code, [0x48, 0x8B, 0x45, 0x00]);
}

#[test]
fn lea_sib_with_header_offset() {
    // lea rax, [rax + r8 + 64] => 4A 8D 44 00 40
    let code =
        emit_bytes(|b| emit_lea_sib(b, true, Reg::Rax, Reg::Rax, Reg::R8, 0, 64));
    assert_eq!(code, [0x4A, 0x8D, 0x44, 0x00, 0x40]);
}

#[test]
fn store_imm32() {
    // mov qword [rax+8], 2 => 48 C7 40 08 02 00 00 00
    let code = emit_bytes(|b| emit_store_imm(b, true, Reg::Rax, 8, 2));
    assert_eq!(code, [0x48, 0xC7, 0x40, 0x08, 0x02, 0x00, 0x00, 0x00]);
}

// -- Control transfer --

#[test]
fn syscall_bytes() {
    let code = emit_bytes(emit_syscall);
    assert_eq!(code, [0x0F, 0x05]);
}

#[test]
fn ret_byte() {
    let code = emit_bytes(emit_ret);
    assert_eq!(code, [0xC3]);
}

#[test]
fn call_through_register() {
    // call rax => FF D0
    let code = emit_bytes(|b| emit_call_reg(b, Reg::Rax));
    assert_eq!(code, [0xFF, 0xD0]);
}

#[test]
fn setcc_and_movzx() {
    // sete al => 0F 94 C0 ; movzx eax, al => 0F B6 C0
    let code = emit_bytes(|b| {
        emit_setcc(b, Cc::E, Reg::Rax);
        emit_movzx_b(b, Reg::Rax, Reg::Rax);
    });
    assert_eq!(code, [0x0F, 0x94, 0xC0, 0x0F, 0xB6, 0xC0]);
}

#[test]
fn cc_invert_flips_low_bit() {
    assert_eq!(Cc::E.invert(), Cc::Ne);
    assert_eq!(Cc::L.invert(), Cc::Ge);
    assert_eq!(Cc::B.invert(), Cc::Ae);
}

#[test]
fn push_pop_extended() {
    // push r8 => 41 50 ; pop r8 => 41 58
    let code = emit_bytes(|b| {
        emit_push(b, Reg::R8);
        emit_pop(b, Reg::R8);
    });
    assert_eq!(code, [0x41, 0x50, 0x41, 0x58]);
}

#[test]
fn rep_movsb_bytes() {
    let code = emit_bytes(emit_rep_movsb);
    assert_eq!(code, [0xF3, 0xA4]);
}

// -- SSE2 scalar double --

#[test]
fn movsd_load_rsp() {
    // movsd xmm0, [rsp] => F2 0F 10 04 24
    let code = emit_bytes(|b| emit_movsd_load(b, Xmm::Xmm0, Reg::Rsp, 0));
    assert_eq!(code, [0xF2, 0x0F, 0x10, 0x04, 0x24]);
}

#[test]
fn movsd_store_rbp() {
    // movsd [rbp-16], xmm0 => F2 0F 11 45 F0
    let code = emit_bytes(|b| emit_movsd_store(b, Xmm::Xmm0, Reg::Rbp, -16));
    assert_eq!(code, [0xF2, 0x0F, 0x11, 0x45, 0xF0]);
}

#[test]
fn movsd_rr() {
    // movsd xmm1, xmm0 => F2 0F 10 C8
    let code = emit_bytes(|b| emit_movsd_rr(b, Xmm::Xmm1, Xmm::Xmm0));
    assert_eq!(code, [0xF2, 0x0F, 0x10, 0xC8]);
}

#[test]
fn addsd_xmm0_xmm1() {
    // addsd xmm0, xmm1 => F2 0F 58 C1
    let code = emit_bytes(|b| emit_sse_arith(b, SseOp::Add, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0xF2, 0x0F, 0x58, 0xC1]);
}

#[test]
fn subsd_mulsd_divsd() {
    let code = emit_bytes(|b| emit_sse_arith(b, SseOp::Sub, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0xF2, 0x0F, 0x5C, 0xC1]);
    let code = emit_bytes(|b| emit_sse_arith(b, SseOp::Mul, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0xF2, 0x0F, 0x59, 0xC1]);
    let code = emit_bytes(|b| emit_sse_arith(b, SseOp::Div, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0xF2, 0x0F, 0x5E, 0xC1]);
}

#[test]
fn ucomisd_comisd_have_data16_prefix() {
    // ucomisd xmm0, xmm1 => 66 0F 2E C1
    let code = emit_bytes(|b| emit_ucomisd(b, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0x66, 0x0F, 0x2E, 0xC1]);
    // comisd xmm0, xmm1 => 66 0F 2F C1
    let code = emit_bytes(|b| emit_comisd(b, Xmm::Xmm0, Xmm::Xmm1));
    assert_eq!(code, [0x66, 0x0F, 0x2F, 0xC1]);
}

#[test]
fn cvtsi2sd_rexw() {
    // cvtsi2sd xmm0, rax => F2 48 0F 2A C0 (F2 precedes REX)
    let code = emit_bytes(|b| emit_cvtsi2sd(b, Xmm::Xmm0, Reg::Rax));
    assert_eq!(code, [0xF2, 0x48, 0x0F, 0x2A, 0xC0]);
}

#[test]
fn cvtsd2si_rexw() {
    // cvtsd2si rax, xmm0 => F2 48 0F 2D C0
    let code = emit_bytes(|b| emit_cvtsd2si(b, Reg::Rax, Xmm::Xmm0));
    assert_eq!(code, [0xF2, 0x48, 0x0F, 0x2D, 0xC0]);
}

// -- RIP-relative LEA --

#[test]
fn lea_rip_backward_displacement() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    for _ in 0..16 {
        buf.emit_u8(0x90);
    }
    let lea_at = buf.pos();
    emit_lea_rip(&mut buf, Reg::Rsi, 4);
    // 48 8D 35 disp32; disp = 4 - (lea_at + 7)
    let code = buf.as_slice();
    assert_eq!(&code[lea_at..lea_at + 3], &[0x48, 0x8D, 0x35]);
    let disp = i32::from_le_bytes(
        code[lea_at + 3..lea_at + 7].try_into().unwrap(),
    );
    assert_eq!(disp as i64, 4 - (lea_at as i64 + 7));
}
