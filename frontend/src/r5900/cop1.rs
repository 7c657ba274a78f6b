//! COP1 lowering. Register moves and sign manipulation are inline;
//! arithmetic goes through the numeric shim in `helper_fpu`.

use eerec_backend::x86_64::emitter::{
    emit_arith_mi, emit_arith_ri, emit_ext_rr, emit_load_ext, emit_movd_from_xmm,
    emit_movd_to_xmm, emit_store, ArithOp, Mem, OPC_MOVSLQ,
};
use eerec_backend::x86_64::regs::SCRATCH0;
use eerec_backend::x86_64::tables::{emit_group1, emit_move};
use eerec_backend::x86_64::{OpSize, Operand};
use eerec_backend::{GuestReg, Intent};
use eerec_core::cpu::{ABS_MASK_OFFSET, FCR31_OFFSET, SIGN_MASK_OFFSET};
use eerec_core::flags::{FCR31_O, FCR31_U, FCR31_WRITABLE};

use super::helpers::helper_fpu;
use super::insn::{FpuMoveKind, FpuOp};
use super::{Arg, R5900Compiler};

/// FCR0 implementation/revision word.
pub const FCR0_VALUE: u64 = 0x2e00;

impl R5900Compiler<'_> {
    pub(crate) fn lower_mfc1(&mut self, rt: u8, fs: u8) {
        if rt == 0 {
            return;
        }
        match self.ra.bind(self.buf, GuestReg::Fpr(fs), Intent::ReadAny) {
            Operand::Xmm(x) => emit_movd_from_xmm(self.buf, SCRATCH0, x),
            src => emit_move(self.buf, OpSize::B32, Operand::Reg(SCRATCH0), src),
        }
        emit_ext_rr(self.buf, OPC_MOVSLQ, SCRATCH0, SCRATCH0);
        self.set_result(GuestReg::Gpr(rt), SCRATCH0);
    }

    pub(crate) fn lower_mtc1(&mut self, rt: u8, fs: u8) {
        self.load_into(SCRATCH0, GuestReg::Gpr(rt), OpSize::B32);
        let x = self.ra.bind_xmm(self.buf, GuestReg::Fpr(fs), Intent::Write);
        emit_movd_to_xmm(self.buf, x, SCRATCH0);
    }

    pub(crate) fn lower_cfc1(&mut self, rt: u8, fs: u8) {
        if rt == 0 {
            return;
        }
        match fs {
            0 => self.ra.set_const(self.buf, GuestReg::Gpr(rt), FCR0_VALUE),
            31 => {
                emit_load_ext(self.buf, OPC_MOVSLQ, SCRATCH0, Mem::env(FCR31_OFFSET));
                self.set_result(GuestReg::Gpr(rt), SCRATCH0);
            }
            _ => self.ra.set_const(self.buf, GuestReg::Gpr(rt), 0),
        }
    }

    pub(crate) fn lower_ctc1(&mut self, rt: u8, fs: u8) {
        if fs != 31 {
            return;
        }
        self.load_into(SCRATCH0, GuestReg::Gpr(rt), OpSize::B32);
        emit_arith_ri(self.buf, ArithOp::And, false, SCRATCH0, FCR31_WRITABLE as i32);
        emit_store(self.buf, false, SCRATCH0, Mem::env(FCR31_OFFSET));
    }

    /// MOV.S / ABS.S / NEG.S. ABS and NEG clear O and U.
    pub(crate) fn lower_fpu_move(&mut self, kind: FpuMoveKind, fd: u8, fs: u8) {
        let s = self.ra.bind_xmm(self.buf, GuestReg::Fpr(fs), Intent::Read);
        let d = if fd == fs {
            self.ra.bind_xmm(self.buf, GuestReg::Fpr(fd), Intent::Modify)
        } else {
            self.ra.bind_xmm(self.buf, GuestReg::Fpr(fd), Intent::Write)
        };
        if d != s {
            emit_move(self.buf, OpSize::ScalarSingle, Operand::Xmm(d), Operand::Xmm(s));
        }
        let mask = match kind {
            FpuMoveKind::Mov => return,
            FpuMoveKind::Abs => (ArithOp::And, ABS_MASK_OFFSET),
            FpuMoveKind::Neg => (ArithOp::Xor, SIGN_MASK_OFFSET),
        };
        emit_group1(
            self.buf,
            mask.0,
            OpSize::PackedSingle,
            Operand::Xmm(d),
            Operand::Mem(Mem::env(mask.1)),
        );
        emit_arith_mi(
            self.buf,
            ArithOp::And,
            false,
            Mem::env(FCR31_OFFSET),
            !(FCR31_O | FCR31_U) as i32,
        );
    }

    pub(crate) fn lower_fpu(&mut self, op: FpuOp, fd: u8, fs: u8, ft: u8) {
        self.ra.flush_all(self.buf);
        self.call_helper(
            helper_fpu as usize,
            &[
                Arg::Imm(op as u64),
                Arg::Imm(fd as u64),
                Arg::Imm(fs as u64),
                Arg::Imm(ft as u64),
            ],
        );
    }
}
