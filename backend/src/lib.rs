//! Host code generation for x86-64: the executable code buffer, the
//! instruction encoder and the guest-to-host register allocator.

pub mod code_buffer;
pub mod regalloc;
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use regalloc::{Binding, GuestReg, Intent, RegAlloc};
pub use x86_64::X86_64CodeGen;

/// Trait for host architecture code generators.
///
/// Covers the fixed trampolines every block relies on and the patchable
/// jumps used for block linking. Per-instruction lowering is done by the
/// frontend against the encoder directly.
pub trait HostCodeGen {
    /// Emit the prologue: save callee-saved registers, set up the env
    /// and memory-base registers, allocate the stack frame, jump to
    /// block code.
    fn emit_prologue(&mut self, buf: &mut CodeBuffer);

    /// Emit the epilogue: deallocate the frame, restore callee-saved
    /// registers, return the exit code to the caller.
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer);

    /// Emit a return to the dispatcher with `code` as the exit code.
    fn emit_exit(&self, buf: &mut CodeBuffer, code: usize);

    /// Emit a patchable direct jump whose displacement is still
    /// unresolved. Returns the offset of the jump instruction.
    fn emit_goto_block(&self, buf: &mut CodeBuffer) -> usize;

    /// Patch the direct jump at `jump_offset` to land on
    /// `target_offset`. Used both for linking and for restoring a
    /// jump to its stub.
    fn patch_jump(&self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize);

    /// Offset of the block return path.
    fn epilogue_offset(&self) -> usize;

    /// First offset after the trampolines; blocks are emitted from here.
    fn code_gen_start(&self) -> usize;
}
