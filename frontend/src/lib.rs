//! Guest frontend: R5900 decoding, block compilation and the runtime
//! helpers generated code calls back into.
//!
//! Provides the generic compilation loop (`TranslatorOps` and
//! `translator_loop`) plus the R5900 implementation.

pub mod r5900;

pub use r5900::{compile_block, CompileEnv};

// ---------------------------------------------------------------
// Generic translation framework
// ---------------------------------------------------------------

/// Block termination reason set by `translate_insn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    /// Continue to the next sequential instruction.
    Next,
    /// Reached the maximum number of instructions per block.
    TooMany,
    /// Unconditional control transfer; no fall-through.
    NoReturn,
}

/// Cursor state shared by all guest architectures.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    /// PC of the first instruction in this block.
    pub pc_first: u32,
    /// PC of the next instruction to decode.
    pub pc_next: u32,
    /// How the current instruction terminates.
    pub is_jmp: BlockEnd,
    /// Guest instructions compiled so far.
    pub num_insns: u32,
    /// Maximum instructions allowed in one block.
    pub max_insns: u32,
}

impl BlockCursor {
    pub fn new(pc: u32, max_insns: u32) -> Self {
        Self {
            pc_first: pc,
            pc_next: pc,
            is_jmp: BlockEnd::Next,
            num_insns: 0,
            max_insns,
        }
    }
}

/// Per-architecture compilation operations.
pub trait TranslatorOps {
    /// Called once at the start of the block.
    fn tb_start(&mut self);

    /// Decode the instruction at the cursor (and its delay slot).
    fn insn_start(&mut self);

    /// Lower the decoded instruction.
    ///
    /// Must advance `base().pc_next` and set `base().is_jmp` when the
    /// instruction terminates the block.
    fn translate_insn(&mut self);

    /// Emit the block exit for fall-through endings.
    fn tb_stop(&mut self);

    fn base(&self) -> &BlockCursor;

    fn base_mut(&mut self) -> &mut BlockCursor;
}

/// Drive the decode → lower cycle until the block ends.
pub fn translator_loop<T: TranslatorOps>(ctx: &mut T) {
    ctx.tb_start();

    loop {
        ctx.insn_start();
        ctx.translate_insn();

        let base = ctx.base();
        if base.is_jmp != BlockEnd::Next {
            break;
        }
        if base.num_insns >= base.max_insns {
            ctx.base_mut().is_jmp = BlockEnd::TooMany;
            break;
        }
    }

    ctx.tb_stop();
}
