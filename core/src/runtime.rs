//! Contracts between generated code and the collaborators that live
//! outside the recompiler.

use crate::cpu::CpuState;
use crate::memory::GuestMemory;
use crate::vu::VuRegs;

/// Exit codes returned by generated code through the epilogue.
pub mod exit {
    /// Direct branch whose jump has not been linked yet; `pc` holds the
    /// target.
    pub const LINK: usize = 1;
    /// Register-indirect jump or an instruction that rewrote `pc`.
    pub const INDIRECT: usize = 2;
    /// The instruction budget went negative on block entry; `pc` holds
    /// the start of the block that was about to run.
    pub const BUDGET: usize = 3;
    /// A condition handler asked the driver to stop.
    pub const STOP: usize = 4;
}

/// A guest event that must be handled outside compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Syscall { code: u32 },
    Break { code: u32 },
}

impl Condition {
    pub const SYSCALL: u32 = 8;
    pub const BREAK: u32 = 9;

    /// Pack into the argument generated code passes to the helper.
    pub const fn to_raw(self) -> u64 {
        match self {
            Condition::Syscall { code } => (Self::SYSCALL as u64) << 32 | code as u64,
            Condition::Break { code } => (Self::BREAK as u64) << 32 | code as u64,
        }
    }

    pub const fn from_raw(raw: u64) -> Option<Self> {
        let code = raw as u32;
        match (raw >> 32) as u32 {
            Self::SYSCALL => Some(Condition::Syscall { code }),
            Self::BREAK => Some(Condition::Break { code }),
            _ => None,
        }
    }

    pub const fn cause(self) -> u32 {
        match self {
            Condition::Syscall { .. } => Self::SYSCALL,
            Condition::Break { .. } => Self::BREAK,
        }
    }
}

/// What the driver should do after a condition was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Keep executing at `cpu.pc`.
    Resume,
    /// Return to the caller of the dispatch loop.
    Stop,
}

/// Receives guest conditions. Called with `cpu.pc` at the instruction
/// that raised the condition; the handler sets the resume address.
pub trait ConditionSink {
    fn deliver(&mut self, cpu: &mut CpuState, cond: Condition) -> Delivery;
}

/// Executes single guest instructions the compiler does not lower.
///
/// Called with every guest register flushed. `cpu.pc` already points at
/// the following instruction; control-flow instructions may overwrite it.
pub trait Interpreter {
    fn step(&mut self, cpu: &mut CpuState, mem: &mut dyn GuestMemory, pc: u32, insn: u32);
}

/// A VU0 micro-program executor.
pub trait MicroProgram: Send {
    fn run(&mut self, vu: &mut VuRegs, start_pc: u32);
}

/// The rendezvous between the main processor and the vector unit.
pub trait VectorUnit {
    /// Block until any in-flight micro-program has finished, then copy
    /// its resulting state into `vu`. A full barrier.
    fn finish_pending(&mut self, vu: &mut VuRegs);

    /// Begin running a micro-program on a snapshot of `vu`.
    fn start(&mut self, vu: &VuRegs, start_pc: u32);
}

/// Vector unit with no micro-program support. Kicks are ignored.
#[derive(Debug, Default)]
pub struct NoVectorUnit;

impl VectorUnit for NoVectorUnit {
    fn finish_pending(&mut self, _vu: &mut VuRegs) {}

    fn start(&mut self, _vu: &VuRegs, start_pc: u32) {
        tracing::warn!(start_pc, "VU0 kick without a vector unit");
    }
}

/// Everything runtime helpers can reach while a block executes.
/// Installed into `CpuState::runtime` by the dispatch loop.
pub struct Runtime<'a> {
    pub memory: &'a mut dyn GuestMemory,
    pub interpreter: &'a mut dyn Interpreter,
    pub conditions: &'a mut dyn ConditionSink,
    pub vu: &'a mut dyn VectorUnit,
}

impl CpuState {
    /// The runtime installed by the dispatch loop.
    ///
    /// # Safety
    /// Only valid while called from generated code (or a helper it
    /// invokes), when `runtime` points at a live `Runtime`.
    pub unsafe fn runtime_mut<'a>(&self) -> &'a mut Runtime<'a> {
        debug_assert!(!self.runtime.is_null(), "no runtime installed");
        &mut *(self.runtime as *mut Runtime<'a>)
    }
}
