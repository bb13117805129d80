//! Code buffer properties: cursor discipline, label binding, patch
//! resolution at finalize.

use blaze_backend::code_buffer::{CodeBuffer, PatchKind};
use blaze_backend::error::EmitError;
use blaze_backend::x86_64::emitter::{
    emit_call_label, emit_jcc_label, emit_jmp_label, emit_jmp_rel8_label,
    emit_mov_ri_patchable, Cc,
};
use blaze_backend::x86_64::regs::Reg;

#[test]
fn cursor_is_monotonic_and_matches_length() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut last = buf.pos();
    for i in 0..64 {
        match i % 4 {
            0 => buf.emit_u8(0x90),
            1 => buf.emit_u16(0x9090),
            2 => buf.emit_u32(0x90909090),
            _ => buf.emit_u64(0x9090909090909090),
        }
        assert!(buf.pos() > last);
        last = buf.pos();
    }
    assert_eq!(buf.as_slice().len(), buf.pos());
}

#[test]
fn growth_preserves_contents() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let cap = buf.capacity();
    for i in 0..cap + 1024 {
        buf.emit_u8((i % 251) as u8);
    }
    assert!(buf.capacity() > cap);
    let code = buf.as_slice();
    for (i, &b) in code.iter().enumerate() {
        assert_eq!(b, (i % 251) as u8);
    }
}

#[test]
fn patch_at_rewrites_emitted_bytes() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u32(0);
    buf.emit_u64(0);
    buf.patch_at(0, 4, 0x1234_5678);
    assert_eq!(buf.read_u32(0), 0x1234_5678);
    buf.patch_at(4, 8, u64::MAX);
    assert_eq!(buf.read_u32(4), 0xFFFF_FFFF);
}

#[test]
fn forward_rel32_jump_resolves_to_target_minus_site_plus_4() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    emit_jmp_label(&mut buf, label); // E9 + 4-byte site
    let site = 1;
    for _ in 0..40 {
        buf.emit_u8(0x90);
    }
    buf.bind_label(label).unwrap();
    let target = buf.label_offset(label).unwrap();
    buf.emit_u8(0xC3);

    let code = buf.finalize().unwrap();
    let disp = i32::from_le_bytes(code.as_slice()[site..site + 4].try_into().unwrap());
    assert_eq!(disp as i64, target as i64 - (site as i64 + 4));
}

#[test]
fn forward_call_and_jcc_resolve() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let f = buf.mark_label();
    emit_call_label(&mut buf, f); // E8 at 0, site 1
    let j = buf.mark_label();
    emit_jcc_label(&mut buf, Cc::Ne, j); // 0F 85 at 5, site 7
    for _ in 0..10 {
        buf.emit_u8(0x90);
    }
    buf.bind_label(j).unwrap();
    let j_target = buf.label_offset(j).unwrap();
    buf.bind_label(f).unwrap();
    let f_target = buf.label_offset(f).unwrap();
    buf.emit_u8(0xC3);

    let code = buf.finalize().unwrap();
    let bytes = code.as_slice();
    assert_eq!(bytes[0], 0xE8);
    let call_disp = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
    assert_eq!(call_disp as i64, f_target as i64 - 5);
    assert_eq!(&bytes[5..7], &[0x0F, 0x85]);
    let jcc_disp = i32::from_le_bytes(bytes[7..11].try_into().unwrap());
    assert_eq!(jcc_disp as i64, j_target as i64 - 11);
}

#[test]
fn backward_jump_fills_displacement_directly() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let top = buf.mark_label();
    buf.bind_label(top).unwrap();
    for _ in 0..8 {
        buf.emit_u8(0x90);
    }
    emit_jmp_label(&mut buf, top); // backward: no pending patch
    assert_eq!(buf.pending_patches(), 0);
    let disp = i32::from_le_bytes(buf.as_slice()[9..13].try_into().unwrap());
    assert_eq!(disp as i64, -(9 + 4));
}

#[test]
fn rel8_jump_resolves_to_target_minus_site_plus_1() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    emit_jmp_rel8_label(&mut buf, label); // EB at 0, site 1
    for _ in 0..16 {
        buf.emit_u8(0x90);
    }
    buf.bind_label(label).unwrap();
    let target = buf.label_offset(label).unwrap();
    buf.emit_u8(0xC3);

    let code = buf.finalize().unwrap();
    let disp = code.as_slice()[1] as i8;
    assert_eq!(disp as i64, target as i64 - 2);
}

#[test]
fn rel8_overflow_is_fatal() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    emit_jmp_rel8_label(&mut buf, label);
    for _ in 0..200 {
        buf.emit_u8(0x90);
    }
    buf.bind_label(label).unwrap();
    assert!(matches!(
        buf.finalize(),
        Err(EmitError::PatchRange { .. })
    ));
}

#[test]
fn abs64_patch_resolves_to_base_plus_target() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    let site = emit_mov_ri_patchable(&mut buf, Reg::Rax);
    buf.add_patch(site, PatchKind::Abs64MovImm, label);
    for _ in 0..4 {
        buf.emit_u8(0x90);
    }
    buf.bind_label(label).unwrap();
    let target = buf.label_offset(label).unwrap();
    buf.emit_u8(0xC3);

    let code = buf.finalize().unwrap();
    let imm = u64::from_le_bytes(code.as_slice()[site..site + 8].try_into().unwrap());
    assert_eq!(imm, code.base_addr() + target as u64);
}

#[test]
fn unresolved_patch_is_fatal() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    emit_jmp_label(&mut buf, label);
    assert!(matches!(
        buf.finalize(),
        Err(EmitError::UnresolvedPatch { .. })
    ));
}

#[test]
fn label_rebind_is_rejected() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let label = buf.mark_label();
    buf.bind_label(label).unwrap();
    assert!(matches!(
        buf.bind_label(label),
        Err(EmitError::LabelRebound(_))
    ));
}
