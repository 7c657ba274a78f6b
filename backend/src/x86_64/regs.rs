use eerec_core::RegSet;

/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
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

/// SSE register indices.
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
    Xmm8 = 8,
    Xmm9 = 9,
    Xmm10 = 10,
    Xmm11 = 11,
    Xmm12 = 12,
    Xmm13 = 13,
    Xmm14 = 14,
    Xmm15 = 15,
}

const GPRS: [Reg; 16] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rbx,
    Reg::Rsp,
    Reg::Rbp,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

const XMMS: [Xmm; 16] = [
    Xmm::Xmm0,
    Xmm::Xmm1,
    Xmm::Xmm2,
    Xmm::Xmm3,
    Xmm::Xmm4,
    Xmm::Xmm5,
    Xmm::Xmm6,
    Xmm::Xmm7,
    Xmm::Xmm8,
    Xmm::Xmm9,
    Xmm::Xmm10,
    Xmm::Xmm11,
    Xmm::Xmm12,
    Xmm::Xmm13,
    Xmm::Xmm14,
    Xmm::Xmm15,
];

impl Reg {
    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register requires a REX prefix (R8-R15).
    #[inline]
    pub const fn needs_rex(self) -> bool {
        (self as u8) >= 8
    }

    pub const fn from_index(i: u8) -> Reg {
        GPRS[(i & 15) as usize]
    }
}

impl Xmm {
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    pub const fn from_index(i: u8) -> Xmm {
        XMMS[(i & 15) as usize]
    }
}

/// Holds `*mut CpuState` for the whole life of generated code.
pub const ENV_REG: Reg = Reg::Rbp;

/// Holds the host address of guest memory (loaded by the prologue).
pub const MEM_BASE_REG: Reg = Reg::R15;

/// Scratch registers lowering code may clobber freely; never allocated.
pub const SCRATCH0: Reg = Reg::Rax;
pub const SCRATCH1: Reg = Reg::Rcx;
pub const SCRATCH2: Reg = Reg::Rdx;

pub const XSCRATCH0: Xmm = Xmm::Xmm0;
pub const XSCRATCH1: Xmm = Xmm::Xmm1;

/// Callee-saved registers that the prologue must save/restore
/// (System V ABI).
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbp, Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Host GPRs the register allocator may bind guest registers to.
pub const GPR_POOL: RegSet = RegSet::of(&[
    Reg::Rbx as u8,
    Reg::Rsi as u8,
    Reg::Rdi as u8,
    Reg::R8 as u8,
    Reg::R9 as u8,
    Reg::R10 as u8,
    Reg::R11 as u8,
    Reg::R12 as u8,
    Reg::R13 as u8,
    Reg::R14 as u8,
]);

/// Host XMM registers the register allocator may bind to.
pub const XMM_POOL: RegSet = RegSet::from_raw(0xfffc);

pub const STACK_ALIGN: usize = 16;
/// Space reserved for outgoing call arguments on the stack.
pub const STATIC_CALL_ARGS_SIZE: usize = 128;

/// Total push size: return address (implicit) + callee-saved pushes.
pub const PUSH_SIZE: usize = (1 + CALLEE_SAVED.len()) * 8;

/// Total frame size (16-byte aligned).
pub const FRAME_SIZE: usize = {
    let raw = PUSH_SIZE + STATIC_CALL_ARGS_SIZE;
    (raw + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
};

/// Stack adjustment after pushes.
pub const STACK_ADDEND: usize = FRAME_SIZE - PUSH_SIZE;
