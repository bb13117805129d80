//! Emitter-core tests at the byte level, against the deterministic
//! fixed-convention layout (code is inspected, never run here).

use blaze_ast::{AstBuilder, BinOpKind, JumpKind, TimeDir};
use blaze_backend::emit::emit_program;
use blaze_backend::error::EmitError;
use blaze_runtime::RuntimeLayout;

fn layout() -> RuntimeLayout {
    RuntimeLayout::fixed_convention()
}

#[test]
fn entry_starts_with_frame_setup() {
    let mut b = AstBuilder::new();
    let x = b.var_def("x", |b| b.num(41));
    let ast = b.program(vec![x]);
    let code = emit_program(&ast, layout()).unwrap();
    let bytes = code.as_slice();
    // push rbp; mov rbp, rsp; sub rsp, imm32
    assert_eq!(bytes[0], 0x55);
    assert_eq!(&bytes[1..4], &[0x48, 0x89, 0xE5]);
    assert_eq!(&bytes[4..7], &[0x48, 0x81, 0xEC]);
    // One local => 16-byte-aligned frame of 16.
    let frame = u32::from_le_bytes(bytes[7..11].try_into().unwrap());
    assert_eq!(frame, 16);
}

#[test]
fn program_ends_with_exit_syscall() {
    let mut b = AstBuilder::new();
    let x = b.var_def("x", |b| b.num(1));
    let ast = b.program(vec![x]);
    let code = emit_program(&ast, layout()).unwrap();
    let bytes = code.as_slice();
    // mov rax, 60; syscall tail.
    let tail = [0x48, 0xC7, 0xC0, 0x3C, 0x00, 0x00, 0x00, 0x0F, 0x05];
    assert!(
        bytes.windows(tail.len()).any(|w| w == tail),
        "missing sys_exit sequence"
    );
}

#[test]
fn final_expression_becomes_exit_status_moves() {
    // Program whose last statement is an expression: the exit status
    // move must be mov rdi, rax (48 89 C7) right before sys_exit.
    let mut b = AstBuilder::new();
    let lhs = b.num(40);
    let rhs = b.num(2);
    let e = b.bin(BinOpKind::Add, lhs, rhs);
    let ast = b.program(vec![e]);
    let code = emit_program(&ast, layout()).unwrap();
    let bytes = code.as_slice();
    let seq = [
        0x48, 0x89, 0xC7, // mov rdi, rax
        0x48, 0xC7, 0xC0, 0x3C, 0x00, 0x00, 0x00, // mov rax, 60
        0x0F, 0x05, // syscall
    ];
    assert!(bytes.windows(seq.len()).any(|w| w == seq));
}

#[test]
fn undefined_identifier_is_fatal() {
    let mut b = AstBuilder::new();
    let x = b.ident("nope");
    let p = b.print(x);
    let ast = b.program(vec![p]);
    assert!(matches!(
        emit_program(&ast, layout()),
        Err(EmitError::Undefined(name)) if name == "nope"
    ));
}

#[test]
fn duplicate_declaration_is_fatal() {
    let mut b = AstBuilder::new();
    let a = b.var_def("x", |b| b.num(1));
    let c = b.var_def("x", |b| b.num(2));
    let ast = b.program(vec![a, c]);
    assert!(matches!(
        emit_program(&ast, layout()),
        Err(EmitError::Duplicate(_))
    ));
}

#[test]
fn arity_mismatch_is_fatal() {
    let mut b = AstBuilder::new();
    let body = b.action(vec![]);
    let f = b.func_def("f", &["a", "b"], body);
    let arg = b.num(1);
    let call = b.call("f", vec![arg]);
    let ast = b.program(vec![f, call]);
    assert!(matches!(
        emit_program(&ast, layout()),
        Err(EmitError::Arity { expected: 2, got: 1, .. })
    ));
}

#[test]
fn jump_outside_loop_is_fatal() {
    let mut b = AstBuilder::new();
    let j = b.jump(JumpKind::Break);
    let ast = b.program(vec![j]);
    assert!(matches!(
        emit_program(&ast, layout()),
        Err(EmitError::JumpOutsideLoop)
    ));
}

#[test]
fn temporal_index_off_time_axis_is_fatal() {
    let mut b = AstBuilder::new();
    let a = b.array4_def("a", [2, 2, 2, 2]);
    let t = b.timing(TimeDir::Past);
    let zero = b.num(0);
    let (z1, z2, z3) = (zero, b.num(0), b.num(0));
    let arr = b.ident("a");
    let access = b.array_access(arr, [t, z1, z2, z3]);
    let p = b.print(access);
    let ast = b.program(vec![a, p]);
    assert!(matches!(
        emit_program(&ast, layout()),
        Err(EmitError::TemporalIndexMisplaced)
    ));
}

#[test]
fn forward_function_call_leaves_no_pending_patches() {
    // Call before definition: must finalize cleanly (patch resolved).
    let mut b = AstBuilder::new();
    let call = b.call("later", vec![]);
    let body_stmts = {
        let v = b.num(3);
        vec![b.ret(Some(v))]
    };
    let body = b.action(body_stmts);
    let f = b.func_def("later", &[], body);
    let ast = b.program(vec![call, f]);
    let code = emit_program(&ast, layout()).unwrap();
    assert!(code.len() > 0);
    // E8 must appear (direct rel32 call), never FF /2 for local calls.
    assert!(code.as_slice().contains(&0xE8));
}

#[test]
fn string_print_embeds_literal_behind_skip() {
    let mut b = AstBuilder::new();
    let s = b.str_lit("Y");
    let p = b.print(s);
    let ast = b.program(vec![p]);
    let code = emit_program(&ast, layout()).unwrap();
    let bytes = code.as_slice();
    let pos = bytes
        .iter()
        .position(|&x| x == b'Y')
        .expect("literal embedded in code stream");
    // Short literal: preceded by a rel8 jmp skipping it.
    assert_eq!(bytes[pos - 2], 0xEB);
    assert_eq!(bytes[pos - 1] as usize, 1, "skip of one literal byte");
    // sys_write: mov rax, 1; syscall present.
    let w = [0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, 0x0F, 0x05];
    assert!(bytes.windows(w.len()).any(|s| s == w));
}

#[test]
fn float_literal_uses_stack_materialization() {
    let mut b = AstBuilder::new();
    let x = b.var_def("x", |b| b.float(1.5));
    let ast = b.program(vec![x]);
    let code = emit_program(&ast, layout()).unwrap();
    let bytes = code.as_slice();
    // movabs rax, bits(1.5); push rax; movsd xmm0, [rsp]; add rsp, 8
    let bits = 1.5f64.to_bits().to_le_bytes();
    let movabs: Vec<u8> = [0x48, 0xB8]
        .iter()
        .copied()
        .chain(bits.iter().copied())
        .collect();
    let at = bytes
        .windows(movabs.len())
        .position(|w| w == movabs.as_slice())
        .expect("float bit pattern materialized through rax");
    let after = &bytes[at + movabs.len()..];
    assert_eq!(after[0], 0x50, "push rax");
    assert_eq!(&after[1..6], &[0xF2, 0x0F, 0x10, 0x04, 0x24]);
    assert_eq!(&after[6..10], &[0x48, 0x83, 0xC4, 0x08], "add rsp, 8");
}

#[test]
fn collision_scan_uses_rel32_branches_only() {
    use blaze_ast::CollisionStrategy;
    let mut b = AstBuilder::new();
    let target = b.num(0x500000);
    let c = b.collide(target, CollisionStrategy::Queue, None);
    let ast = b.program(vec![c]);
    let code = emit_program(&ast, layout()).unwrap();
    // Queue emission finalizes with all loop branches resolved; a rel8
    // loop branch would have tripped the range check on long bodies.
    assert!(code.len() > 0);
    let bytes = code.as_slice();
    // The scan bound (1024) appears as a cmp immediate.
    let bound = [0x48, 0x81, 0xFA, 0x00, 0x04, 0x00, 0x00]; // cmp rdx, 1024
    assert!(bytes.windows(bound.len()).any(|w| w == bound));
}
