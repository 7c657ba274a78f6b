//! Branches, jumps and their delay slots.
//!
//! A conditional branch with a runtime outcome is compiled into two
//! exits. The allocator state is snapshotted at the conditional jump so
//! both paths start from the same bindings.

use eerec_backend::x86_64::emitter::{emit_store, ArithOp, Mem};
use eerec_backend::x86_64::regs::SCRATCH0;
use eerec_backend::x86_64::tables::{emit_group1, encode, TestOp, TEST_GROUP};
use eerec_backend::x86_64::{OpSize, Operand, X86Cond};
use eerec_backend::{GuestReg, Intent};
use eerec_core::cpu::{FCR31_OFFSET, PC_OFFSET};

use super::insn::{independent, BranchTest, Insn, Op};
use super::R5900Compiler;

/// Bit index of the condition flag in FCR31.
const FCR31_C_BIT: i32 = 23;

fn link_value(pc: u32) -> u64 {
    pc.wrapping_add(8) as i32 as i64 as u64
}

impl R5900Compiler<'_> {
    fn set_link(&mut self, rd: u8, pc: u32) {
        if rd != 0 {
            self.ra.set_const(self.buf, GuestReg::Gpr(rd), link_value(pc));
        }
    }

    /// Outcome of a branch whose operands are all known.
    fn static_outcome(&self, test: BranchTest) -> Option<bool> {
        match test {
            BranchTest::Compare { cond, rs, rt } => {
                Some(cond.eval(self.known(rs)?, self.known(rt)?))
            }
            BranchTest::Fpu { .. } => None,
        }
    }

    /// Emit the compare and return the host condition under which the
    /// branch is taken. Dirty state is written back before the flags
    /// are set so both successors see a consistent home image.
    fn emit_branch_test(&mut self, test: BranchTest) -> X86Cond {
        match test {
            BranchTest::Compare { cond, rs, rt } => {
                let (a, b, cond) = if self.known(rs).is_some() && self.known(rt).is_none() {
                    (rt, rs, cond.swap())
                } else {
                    (rs, rt, cond)
                };
                let a = self.ra.read_gpr(self.buf, GuestReg::Gpr(a));
                let b = self.ra.bind(self.buf, GuestReg::Gpr(b), Intent::ReadAny);
                self.ra.flush_dirty(self.buf);
                emit_group1(self.buf, ArithOp::Cmp, OpSize::B64, Operand::Reg(a), b);
                X86Cond::from_cond(cond)
            }
            BranchTest::Fpu { on_true } => {
                self.ra.flush_dirty(self.buf);
                encode(
                    &TEST_GROUP,
                    self.buf,
                    TestOp::Bt as u8,
                    OpSize::B32,
                    Operand::Mem(Mem::env(FCR31_OFFSET)),
                    Operand::Imm(FCR31_C_BIT),
                );
                if on_true {
                    X86Cond::Jb
                } else {
                    X86Cond::Jae
                }
            }
        }
    }

    pub(crate) fn lower_branch(&mut self, br: &Insn, delay: &Insn) {
        match br.op {
            Op::Jump { target, link } => {
                if link {
                    self.set_link(31, br.pc);
                }
                self.lower_delay(delay);
                self.exit_to(target);
            }
            Op::JumpReg { rs, link } => self.lower_jump_reg(br, delay, rs, link),
            Op::Branch { test, likely, link, .. } => {
                let Some(target) = br.branch_target() else {
                    unreachable!("conditional branch without a target");
                };
                self.lower_cond_branch(br, delay, test, target, likely, link);
            }
            _ => unreachable!("{:?} is not a branch", br.op),
        }
    }

    fn lower_jump_reg(&mut self, br: &Insn, delay: &Insn, rs: u8, link: Option<u8>) {
        if let Some(t) = self.known(rs) {
            if let Some(rd) = link {
                self.set_link(rd, br.pc);
            }
            self.lower_delay(delay);
            self.exit_to(t as u32);
            return;
        }

        // The target is read before the link register and the delay slot
        // can overwrite rs.
        self.load_into(SCRATCH0, GuestReg::Gpr(rs), OpSize::B32);
        emit_store(self.buf, false, SCRATCH0, Mem::env(PC_OFFSET));
        self.ra.unpin_all();
        if let Some(rd) = link {
            self.set_link(rd, br.pc);
        }
        self.lower_delay(delay);
        self.exit_indirect();
    }

    fn lower_cond_branch(
        &mut self,
        br: &Insn,
        delay: &Insn,
        test: BranchTest,
        target: u32,
        likely: bool,
        link: bool,
    ) {
        let fall = br.pc.wrapping_add(8);

        if let Some(taken) = self.static_outcome(test) {
            if link {
                self.set_link(31, br.pc);
            }
            if taken || !likely {
                self.lower_delay(delay);
            }
            self.exit_to(if taken { target } else { fall });
            return;
        }

        let swap = self.config.swap_delay_slots
            && !likely
            && delay.is_simple()
            && independent(br, delay);
        if swap {
            self.lower_delay(delay);
        }

        let taken = self.emit_branch_test(test);
        if link {
            // Only stores or nothing at all; the flags survive.
            self.set_link(31, br.pc);
        }
        let not_taken = self.new_label();
        self.jcc_label(taken.invert(), not_taken);
        self.ra.unpin_all();
        let snapshot = self.ra.snapshot();

        if !swap {
            self.lower_delay(delay);
        }
        self.exit_to(target);

        self.bind_label(not_taken);
        self.ra.restore(snapshot);
        if !swap && !likely {
            self.lower_delay(delay);
        }
        self.exit_to(fall);
    }
}
