//! Shared data model of the recompiler: the guest register file, status
//! flags, block and fixup bookkeeping, and the traits through which
//! generated code reaches the rest of the emulator.

pub mod block;
pub mod config;
pub mod cpu;
pub mod error;
pub mod flags;
pub mod label;
pub mod memory;
pub mod runtime;
pub mod types;
pub mod vu;

pub use block::{BlockExit, BlockPhase, CodeBlock, Fixup, JumpCache, BLOCK_HASH_SIZE, JMP_CACHE_SIZE};
pub use config::RecConfig;
pub use cpu::{CpuState, Quad};
pub use error::{Error, Result};
pub use flags::FlagState;
pub use label::{Label, LabelId, LabelUse, RelocKind};
pub use memory::{FlatMemory, GuestMemory, HostWindow};
pub use runtime::{
    Condition, ConditionSink, Delivery, Interpreter, MicroProgram, NoVectorUnit, Runtime,
    VectorUnit,
};
pub use types::{Cond, RegSet, Width};
pub use vu::VuRegs;
