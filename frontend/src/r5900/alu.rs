//! Integer ALU lowering.
//!
//! 32-bit operations compute in EAX and sign-extend the result into the
//! 64-bit register, matching the guest's MIPS III rules. Known inputs
//! fold to constants without emitting code.

use eerec_backend::x86_64::emitter::{
    emit_arith_ri, emit_arith_rr, emit_cmovcc, emit_ext_rr, emit_mov_rr, emit_not, emit_setcc,
    emit_shift_cl, emit_shift_ri, ArithOp, ShiftOp, OPC_MOVSLQ, OPC_MOVZBL,
};
use eerec_backend::x86_64::regs::{SCRATCH0, SCRATCH1, SCRATCH2};
use eerec_backend::x86_64::tables::{emit_group1, encode, ScanOp, TestOp, BIT_SCAN, TEST_GROUP};
use eerec_backend::x86_64::{OpSize, Operand, Reg, X86Cond};
use eerec_backend::{GuestReg, Intent};

use super::insn::{AluOp, ImmOp, ShiftKind};
use super::R5900Compiler;

fn sext32(v: u64) -> u64 {
    v as u32 as i32 as i64 as u64
}

pub(crate) fn eval_alu(op: AluOp, a: u64, b: u64) -> u64 {
    match op {
        AluOp::Addu => sext32(a.wrapping_add(b)),
        AluOp::Subu => sext32(a.wrapping_sub(b)),
        AluOp::Daddu => a.wrapping_add(b),
        AluOp::Dsubu => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Nor => !(a | b),
        AluOp::Slt => ((a as i64) < (b as i64)) as u64,
        AluOp::Sltu => (a < b) as u64,
    }
}

pub(crate) fn eval_imm(op: ImmOp, a: u64, imm: u16) -> u64 {
    let simm = imm as i16 as i64 as u64;
    match op {
        ImmOp::Addiu => sext32(a.wrapping_add(simm)),
        ImmOp::Daddiu => a.wrapping_add(simm),
        ImmOp::Andi => a & imm as u64,
        ImmOp::Ori => a | imm as u64,
        ImmOp::Xori => a ^ imm as u64,
        ImmOp::Slti => ((a as i64) < (simm as i64)) as u64,
        ImmOp::Sltiu => (a < simm) as u64,
    }
}

pub(crate) fn eval_shift(kind: ShiftKind, v: u64, sa: u32) -> u64 {
    match kind {
        ShiftKind::Sll => sext32(((v as u32) << (sa & 31)) as u64),
        ShiftKind::Srl => sext32(((v as u32) >> (sa & 31)) as u64),
        ShiftKind::Sra => ((v as u32 as i32) >> (sa & 31)) as i64 as u64,
        ShiftKind::Dsll => v << (sa & 63),
        ShiftKind::Dsrl => v >> (sa & 63),
        ShiftKind::Dsra => ((v as i64) >> (sa & 63)) as u64,
    }
}

/// Leading bits equal to the sign bit, minus one, per 32-bit half.
pub(crate) fn eval_plzcw(v: u64) -> u64 {
    let half = |x: u32| {
        let y = x ^ ((x as i32 >> 31) as u32);
        (y.leading_zeros().max(1) - 1) as u64
    };
    half(v as u32) | half((v >> 32) as u32) << 32
}

fn shift_op(kind: ShiftKind) -> (ShiftOp, bool) {
    match kind {
        ShiftKind::Sll => (ShiftOp::Shl, false),
        ShiftKind::Srl => (ShiftOp::Shr, false),
        ShiftKind::Sra => (ShiftOp::Sar, false),
        ShiftKind::Dsll => (ShiftOp::Shl, true),
        ShiftKind::Dsrl => (ShiftOp::Shr, true),
        ShiftKind::Dsra => (ShiftOp::Sar, true),
    }
}

impl R5900Compiler<'_> {
    fn sign_extend_scratch(&mut self) {
        emit_ext_rr(self.buf, OPC_MOVSLQ, SCRATCH0, SCRATCH0);
    }

    fn set_flag_result(&mut self, cond: X86Cond) {
        emit_setcc(self.buf, cond, SCRATCH0);
        emit_ext_rr(self.buf, OPC_MOVZBL, SCRATCH0, SCRATCH0);
    }

    pub(crate) fn lower_alu(&mut self, op: AluOp, rd: u8, rs: u8, rt: u8) {
        if rd == 0 {
            return;
        }
        if let (Some(a), Some(b)) = (self.known(rs), self.known(rt)) {
            self.ra.set_const(self.buf, GuestReg::Gpr(rd), eval_alu(op, a, b));
            return;
        }

        self.load_into(SCRATCH0, GuestReg::Gpr(rs), OpSize::B64);
        let b = self.ra.bind(self.buf, GuestReg::Gpr(rt), Intent::ReadAny);
        let a = Operand::Reg(SCRATCH0);
        match op {
            AluOp::Addu | AluOp::Subu => {
                let arith = if op == AluOp::Addu { ArithOp::Add } else { ArithOp::Sub };
                emit_group1(self.buf, arith, OpSize::B32, a, b);
                self.sign_extend_scratch();
            }
            AluOp::Daddu => emit_group1(self.buf, ArithOp::Add, OpSize::B64, a, b),
            AluOp::Dsubu => emit_group1(self.buf, ArithOp::Sub, OpSize::B64, a, b),
            AluOp::And => emit_group1(self.buf, ArithOp::And, OpSize::B64, a, b),
            AluOp::Or => emit_group1(self.buf, ArithOp::Or, OpSize::B64, a, b),
            AluOp::Xor => emit_group1(self.buf, ArithOp::Xor, OpSize::B64, a, b),
            AluOp::Nor => {
                emit_group1(self.buf, ArithOp::Or, OpSize::B64, a, b);
                emit_not(self.buf, true, SCRATCH0);
            }
            AluOp::Slt | AluOp::Sltu => {
                emit_group1(self.buf, ArithOp::Cmp, OpSize::B64, a, b);
                let cond = if op == AluOp::Slt { X86Cond::Jl } else { X86Cond::Jb };
                self.set_flag_result(cond);
            }
        }
        self.set_result(GuestReg::Gpr(rd), SCRATCH0);
    }

    pub(crate) fn lower_alu_imm(&mut self, op: ImmOp, rt: u8, rs: u8, imm: u16) {
        if rt == 0 {
            return;
        }
        if let Some(a) = self.known(rs) {
            self.ra.set_const(self.buf, GuestReg::Gpr(rt), eval_imm(op, a, imm));
            return;
        }

        let simm = imm as i16 as i32;
        self.load_into(SCRATCH0, GuestReg::Gpr(rs), OpSize::B64);
        match op {
            ImmOp::Addiu => {
                emit_arith_ri(self.buf, ArithOp::Add, false, SCRATCH0, simm);
                self.sign_extend_scratch();
            }
            ImmOp::Daddiu => emit_arith_ri(self.buf, ArithOp::Add, true, SCRATCH0, simm),
            ImmOp::Andi => emit_arith_ri(self.buf, ArithOp::And, true, SCRATCH0, imm as i32),
            ImmOp::Ori => emit_arith_ri(self.buf, ArithOp::Or, true, SCRATCH0, imm as i32),
            ImmOp::Xori => emit_arith_ri(self.buf, ArithOp::Xor, true, SCRATCH0, imm as i32),
            ImmOp::Slti | ImmOp::Sltiu => {
                emit_arith_ri(self.buf, ArithOp::Cmp, true, SCRATCH0, simm);
                let cond = if op == ImmOp::Slti { X86Cond::Jl } else { X86Cond::Jb };
                self.set_flag_result(cond);
            }
        }
        self.set_result(GuestReg::Gpr(rt), SCRATCH0);
    }

    pub(crate) fn lower_shift(&mut self, kind: ShiftKind, rd: u8, rt: u8, sa: u8) {
        if rd == 0 {
            return;
        }
        if let Some(v) = self.known(rt) {
            self.ra.set_const(self.buf, GuestReg::Gpr(rd), eval_shift(kind, v, sa as u32));
            return;
        }
        let (op, wide) = shift_op(kind);
        let size = if wide { OpSize::B64 } else { OpSize::B32 };
        self.load_into(SCRATCH0, GuestReg::Gpr(rt), size);
        if sa != 0 {
            emit_shift_ri(self.buf, op, wide, SCRATCH0, sa);
        }
        if !wide {
            self.sign_extend_scratch();
        }
        self.set_result(GuestReg::Gpr(rd), SCRATCH0);
    }

    pub(crate) fn lower_shift_var(&mut self, kind: ShiftKind, rd: u8, rt: u8, rs: u8) {
        if rd == 0 {
            return;
        }
        if let (Some(v), Some(s)) = (self.known(rt), self.known(rs)) {
            self.ra.set_const(self.buf, GuestReg::Gpr(rd), eval_shift(kind, v, s as u32));
            return;
        }
        let (op, wide) = shift_op(kind);
        let size = if wide { OpSize::B64 } else { OpSize::B32 };
        self.load_into(SCRATCH1, GuestReg::Gpr(rs), OpSize::B32);
        self.load_into(SCRATCH0, GuestReg::Gpr(rt), size);
        emit_shift_cl(self.buf, op, wide, SCRATCH0);
        if !wide {
            self.sign_extend_scratch();
        }
        self.set_result(GuestReg::Gpr(rd), SCRATCH0);
    }

    /// MOVZ / MOVN.
    pub(crate) fn lower_cond_move(&mut self, rd: u8, rs: u8, rt: u8, on_zero: bool) {
        if rd == 0 {
            return;
        }
        if let Some(t) = self.known(rt) {
            if (t == 0) == on_zero {
                self.copy_scalar(GuestReg::Gpr(rd), GuestReg::Gpr(rs));
            }
            return;
        }

        self.load_into(SCRATCH0, GuestReg::Gpr(rs), OpSize::B64);
        // Bind everything before the test; materializing a constant may
        // clobber the flags.
        let d = self.ra.bind(self.buf, GuestReg::Gpr(rd), Intent::Modify);
        let t = self.ra.read_gpr(self.buf, GuestReg::Gpr(rt));
        encode(
            &TEST_GROUP,
            self.buf,
            TestOp::Test as u8,
            OpSize::B64,
            Operand::Reg(t),
            Operand::Reg(t),
        );
        let cond = if on_zero { X86Cond::Je } else { X86Cond::Jne };
        let Operand::Reg(d) = d else {
            unreachable!("GPR bound to {d:?}");
        };
        emit_cmovcc(self.buf, cond, true, d, SCRATCH0);
    }

    /// One PLZCW half held in `r`: `31 - bsr((y << 1) | 1)` where `y`
    /// folds the sign bit into the value.
    fn plzcw_half(&mut self, r: Reg) {
        emit_mov_rr(self.buf, false, SCRATCH1, r);
        emit_shift_ri(self.buf, ShiftOp::Sar, false, SCRATCH1, 31);
        emit_arith_rr(self.buf, ArithOp::Xor, false, r, SCRATCH1);
        emit_shift_ri(self.buf, ShiftOp::Shl, false, r, 1);
        emit_arith_ri(self.buf, ArithOp::Or, false, r, 1);
        encode(
            &BIT_SCAN,
            self.buf,
            ScanOp::Bsr as u8,
            OpSize::B32,
            Operand::Reg(r),
            Operand::Reg(r),
        );
        emit_arith_ri(self.buf, ArithOp::Xor, false, r, 31);
    }

    pub(crate) fn lower_plzcw(&mut self, rd: u8, rs: u8) {
        if rd == 0 {
            return;
        }
        if let Some(v) = self.known(rs) {
            self.ra.set_const(self.buf, GuestReg::Gpr(rd), eval_plzcw(v));
            return;
        }
        self.load_into(SCRATCH0, GuestReg::Gpr(rs), OpSize::B64);
        emit_mov_rr(self.buf, true, SCRATCH2, SCRATCH0);
        emit_shift_ri(self.buf, ShiftOp::Shr, true, SCRATCH2, 32);
        self.plzcw_half(SCRATCH0);
        self.plzcw_half(SCRATCH2);
        emit_shift_ri(self.buf, ShiftOp::Shl, true, SCRATCH2, 32);
        emit_arith_rr(self.buf, ArithOp::Or, true, SCRATCH0, SCRATCH2);
        self.set_result(GuestReg::Gpr(rd), SCRATCH0);
    }
}
