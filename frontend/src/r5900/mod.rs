//! R5900 frontend: decodes guest code and lowers it straight to x86-64
//! through the register allocator.

mod alu;
mod branch;
mod cop1;
pub mod cop2;
pub mod fpu;
pub mod helpers;
pub mod insn;
pub mod mem;

use eerec_backend::x86_64::emitter::{
    emit_arith_mi, emit_call_abs, emit_jcc_fwd, emit_jmp, emit_mov_ri, emit_mov_rr,
    emit_store_imm, ArithOp, Mem,
};
use eerec_backend::x86_64::regs::{CALL_ARG_REGS, ENV_REG, SCRATCH0};
use eerec_backend::x86_64::tables::{emit_move, OpSize, Operand};
use eerec_backend::x86_64::{X86Cond, X86_64CodeGen};
use eerec_backend::{CodeBuffer, GuestReg, HostCodeGen, Intent, RegAlloc};
use eerec_core::cpu::{BUDGET_OFFSET, PC_OFFSET};
use eerec_core::runtime::{exit, Condition};
use eerec_core::{BlockExit, BlockPhase, CodeBlock, Fixup, GuestMemory, Label, LabelId, RecConfig, RelocKind};

use crate::{translator_loop, BlockCursor, BlockEnd, TranslatorOps};
use insn::{Insn, Op};

/// Everything one block compilation needs from the execution
/// environment.
pub struct CompileEnv<'a> {
    pub buf: &'a mut CodeBuffer,
    pub backend: &'a X86_64CodeGen,
    /// Source of guest instruction words.
    pub memory: &'a mut dyn GuestMemory,
    /// Address mask for inline memory accesses; `None` routes every
    /// access through the runtime helpers.
    pub window_mask: Option<u32>,
    pub config: &'a RecConfig,
}

/// Compile the block starting at `pc`.
///
/// The returned block is in the `Linking` phase: its exits are recorded
/// but not yet patched, and it is not reachable from dispatch.
pub fn compile_block(env: CompileEnv<'_>, pc: u32) -> CodeBlock {
    let mut c = R5900Compiler::new(env, pc);
    translator_loop(&mut c);
    c.block
}

// ---------------------------------------------------------------
// Compilation context
// ---------------------------------------------------------------

/// An argument passed to a runtime helper after the env pointer.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Arg {
    Imm(u64),
    /// The value computed into RAX.
    Scratch,
}

pub(crate) struct R5900Compiler<'a> {
    base: BlockCursor,
    pub(crate) buf: &'a mut CodeBuffer,
    backend: &'a X86_64CodeGen,
    memory: &'a mut dyn GuestMemory,
    pub(crate) window_mask: Option<u32>,
    config: &'a RecConfig,
    pub(crate) ra: RegAlloc,
    block: CodeBlock,
    labels: Vec<Label>,
    /// Instruction at the cursor and, for branches, its delay slot.
    insn: Option<Insn>,
    delay: Option<Insn>,
    /// Offset of the budget immediate patched with the final icount.
    budget_imm: usize,
    /// Displacement field of the jump to the budget stub.
    budget_jcc: usize,
}

impl<'a> R5900Compiler<'a> {
    fn new(env: CompileEnv<'a>, pc: u32) -> Self {
        Self {
            base: BlockCursor::new(pc, env.config.max_block_insns),
            buf: env.buf,
            backend: env.backend,
            memory: env.memory,
            window_mask: env.window_mask,
            config: env.config,
            ra: RegAlloc::new(env.config.const_folding),
            block: CodeBlock::new(pc),
            labels: Vec::new(),
            insn: None,
            delay: None,
            budget_imm: 0,
            budget_jcc: 0,
        }
    }

    fn fetch(&mut self, pc: u32) -> Insn {
        Insn::decode(pc, self.memory.read_u32(pc))
    }

    // -- small operand helpers shared by the lowering modules --

    /// Compile-time value of GPR `r`.
    pub(crate) fn known(&self, r: u8) -> Option<u64> {
        self.ra.const_value(GuestReg::Gpr(r))
    }

    /// Copy guest register `g` into the host scratch register `dst`.
    pub(crate) fn load_into(&mut self, dst: eerec_backend::x86_64::Reg, g: GuestReg, size: OpSize) {
        let src = self.ra.bind(self.buf, g, Intent::ReadAny);
        emit_move(self.buf, size, Operand::Reg(dst), src);
    }

    /// Make `src` the new value of guest register `g`.
    pub(crate) fn set_result(&mut self, g: GuestReg, src: eerec_backend::x86_64::Reg) {
        let d = self.ra.write_gpr(self.buf, g);
        emit_mov_rr(self.buf, true, d, src);
    }

    /// Copy one scalar guest register to another.
    pub(crate) fn copy_scalar(&mut self, dst: GuestReg, src: GuestReg) {
        if let Some(v) = self.ra.const_value(src) {
            self.ra.set_const(self.buf, dst, v);
            return;
        }
        let s = self.ra.bind(self.buf, src, Intent::ReadAny);
        let d = self.ra.write_gpr(self.buf, dst);
        emit_move(self.buf, OpSize::B64, Operand::Reg(d), s);
    }

    // -- labels --

    pub(crate) fn new_label(&mut self) -> LabelId {
        self.labels.push(Label::new());
        LabelId(self.labels.len() as u32 - 1)
    }

    pub(crate) fn jcc_label(&mut self, cond: X86Cond, id: LabelId) {
        let field = emit_jcc_fwd(self.buf, cond);
        let label = &mut self.labels[id.0 as usize];
        match label.value {
            Some(target) => self.buf.patch_rel32(field, target),
            None => label.add_use(field, RelocKind::Rel32),
        }
    }

    pub(crate) fn bind_label(&mut self, id: LabelId) {
        let here = self.buf.offset();
        for u in self.labels[id.0 as usize].bind(here) {
            match u.kind {
                RelocKind::Rel32 => self.buf.patch_rel32(u.offset, here),
            }
        }
    }

    // -- exits --

    /// Leave the block towards `target` through a linkable jump.
    pub(crate) fn exit_to(&mut self, target: u32) {
        self.ra.flush_all(self.buf);
        let jump = self.backend.emit_goto_block(self.buf);
        let stub = self.buf.offset();
        emit_store_imm(self.buf, false, Mem::env(PC_OFFSET), target as i32);
        self.backend.emit_exit(self.buf, exit::LINK);
        self.block.exits.push(BlockExit {
            fixup: Fixup { jump, stub, target },
            dest: None,
        });
    }

    /// Return to dispatch with `pc` already written.
    pub(crate) fn exit_indirect(&mut self) {
        self.ra.flush_all(self.buf);
        self.backend.emit_exit(self.buf, exit::INDIRECT);
    }

    // -- helper calls --

    /// Call a runtime helper. Every guest register must already be
    /// flushed; all bindings are dropped afterwards since the callee
    /// clobbers the caller-saved registers.
    pub(crate) fn call_helper(&mut self, func: usize, args: &[Arg]) {
        debug_assert!(!self.ra.has_pending_writes(), "helper call with unflushed state");
        debug_assert!(args.len() < CALL_ARG_REGS.len());
        // RAX is consumed before the other arguments overwrite anything.
        for (i, arg) in args.iter().enumerate() {
            if let Arg::Scratch = arg {
                emit_mov_rr(self.buf, true, CALL_ARG_REGS[i + 1], SCRATCH0);
            }
        }
        emit_mov_rr(self.buf, true, CALL_ARG_REGS[0], ENV_REG);
        for (i, arg) in args.iter().enumerate() {
            if let Arg::Imm(v) = arg {
                emit_mov_ri(self.buf, true, CALL_ARG_REGS[i + 1], *v);
            }
        }
        emit_call_abs(self.buf, func);
        self.ra.invalidate_all();
    }

    /// Run `insn` through the interpreter.
    pub(crate) fn fallback(&mut self, insn: &Insn) {
        self.ra.flush_all(self.buf);
        self.call_helper(
            helpers::helper_interpret as usize,
            &[Arg::Imm(insn.pc as u64), Arg::Imm(insn.raw as u64)],
        );
    }

    /// SYSCALL / BREAK: hand the condition to the sink and return to
    /// dispatch with whatever exit code it picked.
    fn lower_condition(&mut self, insn: &Insn, cond: Condition) {
        self.ra.flush_all(self.buf);
        emit_store_imm(self.buf, false, Mem::env(PC_OFFSET), insn.pc as i32);
        self.call_helper(
            helpers::helper_deliver_condition as usize,
            &[Arg::Imm(cond.to_raw())],
        );
        emit_jmp(self.buf, self.backend.epilogue_offset());
    }

    /// Lower one instruction that is neither a branch nor a block end.
    pub(crate) fn lower(&mut self, insn: &Insn) {
        match insn.op {
            Op::Alu { op, rd, rs, rt } => self.lower_alu(op, rd, rs, rt),
            Op::AluImm { op, rt, rs, imm } => self.lower_alu_imm(op, rt, rs, imm),
            Op::Lui { rt, imm } => {
                if rt != 0 {
                    let v = ((imm as u32) << 16) as i32 as i64 as u64;
                    self.ra.set_const(self.buf, GuestReg::Gpr(rt), v);
                }
            }
            Op::Shift { kind, rd, rt, sa } => self.lower_shift(kind, rd, rt, sa),
            Op::ShiftVar { kind, rd, rt, rs } => self.lower_shift_var(kind, rd, rt, rs),
            Op::CondMove { rd, rs, rt, on_zero } => self.lower_cond_move(rd, rs, rt, on_zero),
            Op::MoveFromHiLo { rd, hi } => {
                if rd != 0 {
                    let src = if hi { GuestReg::Hi } else { GuestReg::Lo };
                    self.copy_scalar(GuestReg::Gpr(rd), src);
                }
            }
            Op::MoveToHiLo { rs, hi } => {
                let dst = if hi { GuestReg::Hi } else { GuestReg::Lo };
                self.copy_scalar(dst, GuestReg::Gpr(rs));
            }
            Op::Plzcw { rd, rs } => self.lower_plzcw(rd, rs),

            Op::Load { width, signed, rt, base, offset } => {
                self.lower_load(width, signed, rt, base, offset)
            }
            Op::Store { width, rt, base, offset } => self.lower_store(width, rt, base, offset),
            Op::Lwc1 { ft, base, offset } => self.lower_lwc1(ft, base, offset),
            Op::Swc1 { ft, base, offset } => self.lower_swc1(ft, base, offset),

            Op::Mfc1 { rt, fs } => self.lower_mfc1(rt, fs),
            Op::Mtc1 { rt, fs } => self.lower_mtc1(rt, fs),
            Op::Cfc1 { rt, fs } => self.lower_cfc1(rt, fs),
            Op::Ctc1 { rt, fs } => self.lower_ctc1(rt, fs),
            Op::FpuMove { kind, fd, fs } => self.lower_fpu_move(kind, fd, fs),
            Op::Fpu { op, fd, fs, ft } => self.lower_fpu(op, fd, fs, ft),

            Op::Qmfc2 { .. }
            | Op::Qmtc2 { .. }
            | Op::Cfc2 { .. }
            | Op::Ctc2 { .. }
            | Op::Vu { .. }
            | Op::Vnop
            | Op::Vcallms { .. } => self.lower_cop2(insn.op),

            Op::Fallback => self.fallback(insn),

            Op::Branch { .. }
            | Op::Jump { .. }
            | Op::JumpReg { .. }
            | Op::Syscall { .. }
            | Op::Break { .. }
            | Op::FallbackJump => unreachable!("{:?} is not a straight-line instruction", insn.op),
        }
        self.ra.unpin_all();
    }

    /// Lower the instruction in a branch delay slot.
    pub(crate) fn lower_delay(&mut self, delay: &Insn) {
        if delay.is_branch() {
            tracing::warn!(pc = delay.pc, "branch in delay slot ignored");
            return;
        }
        if delay.ends_block() {
            tracing::warn!(pc = delay.pc, "block-ending instruction in delay slot interpreted");
            self.fallback(delay);
            return;
        }
        self.lower(delay);
    }

    /// Budget check at block entry; the immediate is patched once the
    /// block length is known.
    fn emit_budget_check(&mut self) {
        emit_arith_mi(self.buf, ArithOp::Sub, true, Mem::env(BUDGET_OFFSET), 0);
        self.budget_imm = self.buf.offset() - 4;
        self.budget_jcc = emit_jcc_fwd(self.buf, X86Cond::Jl);
    }

    /// Out-of-line path taken when the budget runs out: undo the charge
    /// and hand the block start back to dispatch.
    fn emit_budget_stub(&mut self, icount: u32) {
        let here = self.buf.offset();
        self.buf.patch_rel32(self.budget_jcc, here);
        self.buf.patch_u32(self.budget_imm, icount);
        emit_arith_mi(self.buf, ArithOp::Add, true, Mem::env(BUDGET_OFFSET), icount as i32);
        emit_store_imm(self.buf, false, Mem::env(PC_OFFSET), self.base.pc_first as i32);
        self.backend.emit_exit(self.buf, exit::BUDGET);
    }
}

// ---------------------------------------------------------------
// TranslatorOps implementation
// ---------------------------------------------------------------

impl TranslatorOps for R5900Compiler<'_> {
    fn tb_start(&mut self) {
        self.block.host_offset = self.buf.offset();
        self.emit_budget_check();
    }

    fn insn_start(&mut self) {
        if self.block.phase == BlockPhase::Emitting {
            self.block.phase.advance(BlockPhase::Scanning);
        }
        let pc = self.base.pc_next;
        let insn = self.fetch(pc);
        self.delay = if insn.is_branch() {
            Some(self.fetch(pc.wrapping_add(4)))
        } else {
            None
        };
        self.insn = Some(insn);
        self.block.phase.advance(BlockPhase::Emitting);
    }

    fn translate_insn(&mut self) {
        let Some(insn) = self.insn.take() else {
            unreachable!("translate_insn without insn_start");
        };
        if let Some(delay) = self.delay.take() {
            self.lower_branch(&insn, &delay);
            self.base.num_insns += 2;
            self.base.pc_next = self.base.pc_next.wrapping_add(8);
            self.base.is_jmp = BlockEnd::NoReturn;
            return;
        }

        match insn.op {
            Op::Syscall { code } => {
                self.lower_condition(&insn, Condition::Syscall { code });
                self.base.is_jmp = BlockEnd::NoReturn;
            }
            Op::Break { code } => {
                self.lower_condition(&insn, Condition::Break { code });
                self.base.is_jmp = BlockEnd::NoReturn;
            }
            Op::FallbackJump => {
                self.ra.flush_all(self.buf);
                self.call_helper(
                    helpers::helper_interpret_jump as usize,
                    &[Arg::Imm(insn.pc as u64), Arg::Imm(insn.raw as u64)],
                );
                self.exit_indirect();
                self.base.is_jmp = BlockEnd::NoReturn;
            }
            _ => self.lower(&insn),
        }
        self.base.num_insns += 1;
        self.base.pc_next = self.base.pc_next.wrapping_add(4);
    }

    fn tb_stop(&mut self) {
        if self.base.is_jmp != BlockEnd::NoReturn {
            self.exit_to(self.base.pc_next);
        }
        let icount = self.base.num_insns;
        self.emit_budget_stub(icount);

        debug_assert!(self.labels.iter().all(|l| !l.has_pending_uses()));
        self.block.size = self.base.pc_next.wrapping_sub(self.base.pc_first);
        self.block.icount = icount;
        self.block.host_size = self.buf.offset() - self.block.host_offset;
        self.block.phase.advance(BlockPhase::Linking);
        tracing::trace!(
            pc = format_args!("{:#010x}", self.block.pc),
            icount,
            host_size = self.block.host_size,
            exits = self.block.exits.len(),
            "compiled block"
        );
    }

    fn base(&self) -> &BlockCursor {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BlockCursor {
        &mut self.base
    }
}
