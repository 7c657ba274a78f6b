pub mod emitter;
pub mod regs;
pub mod tables;

pub use emitter::{Mem, X86Cond, X86_64CodeGen};
pub use regs::{Reg, Xmm};
pub use tables::{OpSize, Operand};
