//! Guest register file.
//!
//! `CpuState` is shared between the compiler (which reads field offsets
//! to build memory operands) and generated code (which addresses it
//! through the env register). The layout is `#[repr(C)]` and every field
//! that generated code touches has a matching `*_OFFSET` constant.

use std::ffi::c_void;
use std::mem::offset_of;

use crate::flags::FlagState;
use crate::vu::VuRegs;

/// Number of general-purpose registers.
pub const NUM_GPRS: usize = 32;
/// Number of FPU registers.
pub const NUM_FPRS: usize = 32;

/// One 128-bit general-purpose register. Most instructions only touch
/// the low doubleword.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quad {
    pub lo: u64,
    pub hi: u64,
}

impl Quad {
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub const fn to_u128(self) -> u128 {
        (self.hi as u128) << 64 | self.lo as u128
    }

    pub const fn from_u128(v: u128) -> Self {
        Self {
            lo: v as u64,
            hi: (v >> 64) as u64,
        }
    }
}

/// Constant vectors addressed by generated SSE code.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SseMasks {
    pub abs: [u32; 4],
    pub sign: [u32; 4],
}

impl SseMasks {
    pub const fn new() -> Self {
        Self {
            abs: [0x7fff_ffff; 4],
            sign: [0x8000_0000; 4],
        }
    }
}

/// Main-processor architectural state plus the runtime slots generated
/// code needs.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct CpuState {
    pub gpr: [Quad; NUM_GPRS],
    pub hi: Quad,
    pub lo: Quad,
    pub fpr: [u32; NUM_FPRS],
    pub fcr31: u32,
    /// FPU accumulator.
    pub acc: u32,
    /// Non-zero when the last accumulator write overflowed.
    pub acc_flag: u32,
    pub pc: u32,
    /// Remaining instruction budget; blocks subtract their length on
    /// entry and return to the dispatcher once it goes negative.
    pub budget: i64,
    /// Code of the last delivered condition.
    pub cause: u32,
    _pad: u32,
    pub masks: SseMasks,
    pub vu0: VuRegs,
    /// Host address of guest physical address 0 for inline accesses.
    pub mem_base: *mut u8,
    /// `*mut Runtime` while generated code is running, null otherwise.
    pub runtime: *mut c_void,
}

impl CpuState {
    pub fn new() -> Self {
        Self {
            gpr: [Quad::default(); NUM_GPRS],
            hi: Quad::default(),
            lo: Quad::default(),
            fpr: [0; NUM_FPRS],
            fcr31: 0,
            acc: 0,
            acc_flag: 0,
            pc: 0,
            budget: 0,
            cause: 0,
            _pad: 0,
            masks: SseMasks::new(),
            vu0: VuRegs::new(),
            mem_base: std::ptr::null_mut(),
            runtime: std::ptr::null_mut(),
        }
    }

    /// Low doubleword of GPR `r`.
    #[inline]
    pub fn gpr(&self, r: usize) -> u64 {
        self.gpr[r].lo
    }

    /// Write the low doubleword of GPR `r`; writes to r0 are dropped.
    #[inline]
    pub fn set_gpr(&mut self, r: usize, value: u64) {
        if r != 0 {
            self.gpr[r].lo = value;
        }
    }

    /// Compare everything a guest program can observe.
    pub fn same_architectural_state(&self, other: &CpuState) -> bool {
        self.gpr == other.gpr
            && self.hi == other.hi
            && self.lo == other.lo
            && self.fpr == other.fpr
            && self.fcr31 == other.fcr31
            && self.acc == other.acc
            && self.acc_flag == other.acc_flag
            && self.pc == other.pc
            && self.vu0 == other.vu0
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

pub const GPR_OFFSET: i32 = offset_of!(CpuState, gpr) as i32;
pub const HI_OFFSET: i32 = offset_of!(CpuState, hi) as i32;
pub const LO_OFFSET: i32 = offset_of!(CpuState, lo) as i32;
pub const FPR_OFFSET: i32 = offset_of!(CpuState, fpr) as i32;
pub const FCR31_OFFSET: i32 = offset_of!(CpuState, fcr31) as i32;
pub const ACC_OFFSET: i32 = offset_of!(CpuState, acc) as i32;
pub const PC_OFFSET: i32 = offset_of!(CpuState, pc) as i32;
pub const BUDGET_OFFSET: i32 = offset_of!(CpuState, budget) as i32;
pub const ABS_MASK_OFFSET: i32 =
    (offset_of!(CpuState, masks) + offset_of!(SseMasks, abs)) as i32;
pub const SIGN_MASK_OFFSET: i32 =
    (offset_of!(CpuState, masks) + offset_of!(SseMasks, sign)) as i32;
pub const VF_OFFSET: i32 = (offset_of!(CpuState, vu0) + offset_of!(VuRegs, vf)) as i32;
pub const MEM_BASE_OFFSET: i32 = offset_of!(CpuState, mem_base) as i32;
pub const VU_CCR_OFFSET: i32 = (offset_of!(CpuState, vu0) + offset_of!(VuRegs, ccr)) as i32;
pub const VU_STATUS_OFFSET: i32 = (offset_of!(CpuState, vu0)
    + offset_of!(VuRegs, status)
    + offset_of!(FlagState, packed)) as i32;
pub const VU_MAC_OFFSET: i32 = (offset_of!(CpuState, vu0) + offset_of!(VuRegs, mac)) as i32;

/// Byte offset of GPR `i` (low doubleword).
pub const fn gpr_offset(i: usize) -> i32 {
    GPR_OFFSET + (i as i32) * 16
}

/// Byte offset of FPR `i`.
pub const fn fpr_offset(i: usize) -> i32 {
    FPR_OFFSET + (i as i32) * 4
}

/// Byte offset of VF register `i`.
pub const fn vf_offset(i: usize) -> i32 {
    VF_OFFSET + (i as i32) * 16
}
