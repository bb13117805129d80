/// x86-64 general-purpose register indices.
///
/// Encoding matches the ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Low 3 bits of the encoding (ModR/M field value).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether the register needs a REX extension bit (R8-R15).
    #[inline]
    pub const fn needs_rex(self) -> bool {
        (self as u8) >= 8
    }
}

/// SSE register indices. Same ModR/M numbering as the GPRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
}

impl Xmm {
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }
}

/// Argument registers of the internal calling convention (System V
/// AMD64, shared with outbound runtime calls).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Registers the emitted prologue/epilogue must preserve.
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbp, Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Scratch registers for 4-D index evaluation: R8=x, R9=y, R10=z, R11=t.
pub const ARRAY_INDEX_REGS: [Reg; 4] = [Reg::R8, Reg::R9, Reg::R10, Reg::R11];

/// Stack alignment the convention demands at each call.
pub const STACK_ALIGN: usize = 16;

/// Every frame slot is one aligned quadword; scalars and array base
/// pointers both occupy exactly one.
pub const SLOT_SIZE: usize = 8;
