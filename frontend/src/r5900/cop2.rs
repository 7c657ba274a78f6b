//! COP2 (VU0 macro mode).
//!
//! Every COP2 instruction first synchronizes with a running
//! micro-program. Whole-register moves are inline; lane arithmetic runs
//! in `vu_execute` through the same numeric shim as COP1.

use eerec_backend::x86_64::emitter::{
    emit_load_ext, emit_sse_rm, ArithOp, Mem, OPC_MOVSLQ, OPC_MOVUPS_VxWx, OPC_MOVUPS_WxVx,
};
use eerec_backend::x86_64::regs::SCRATCH0;
use eerec_backend::x86_64::tables::{emit_group1, emit_move};
use eerec_backend::x86_64::{OpSize, Operand};
use eerec_backend::{GuestReg, Intent};
use eerec_core::cpu::{ABS_MASK_OFFSET, VU_CCR_OFFSET, VU_MAC_OFFSET, VU_STATUS_OFFSET};
use eerec_core::flags::mac;
use eerec_core::vu::{CTRL_MAC, CTRL_STATUS};
use eerec_core::VuRegs;

use super::fpu::{self, SIGN};
use super::helpers::{helper_ctc2, helper_vu0_callms, helper_vu0_op, helper_vu0_sync};
use super::insn::{Op, VuOp};
use super::{Arg, R5900Compiler};

const FULL_DEST: u8 = 0xf;

/// Execute a VU0 macro operation on the lanes selected by `dest`
/// (bit 3 = x). Arithmetic updates the MAC flags and the status
/// register; moves leave both alone.
pub fn vu_execute(op: VuOp, vu: &mut VuRegs, dest: u8, fd: u8, fs: u8, ft: u8) {
    let s = vu.vf[fs as usize & 31];
    let t = vu.vf[ft as usize & 31];
    let shim = match op {
        VuOp::Move => return vu.write_vf(ft as usize & 31, dest, s),
        VuOp::Abs => return vu.write_vf(ft as usize & 31, dest, s.map(|x| x & !SIGN)),
        VuOp::Add => fpu::add,
        VuOp::Sub => fpu::sub,
        VuOp::Mul => fpu::mul,
    };

    let fd = fd as usize & 31;
    let mut out = vu.vf[fd];
    let mut flags = 0;
    for lane in 0..4 {
        if dest & (8 >> lane) == 0 {
            continue;
        }
        let r = shim(s[lane], t[lane]);
        out[lane] = r.bits;
        let bit = mac::lane_bit(lane);
        if fpu::exponent(r.bits) == 0 {
            flags |= bit << mac::ZERO_SHIFT;
        }
        if r.bits & SIGN != 0 {
            flags |= bit << mac::SIGN_SHIFT;
        }
        if r.underflowed() {
            flags |= bit << mac::UNDER_SHIFT;
        }
        if r.overflowed() {
            flags |= bit << mac::OVER_SHIFT;
        }
    }
    vu.write_vf(fd, dest, out);
    vu.mac = flags;
    vu.status.update_from_mac(flags);
}

/// `CpuState` offset of a control register CFC2 can read inline, or
/// `None` for the hard-wired zero of VI0.
fn control_offset(id: u8) -> Option<i32> {
    match id as usize & 31 {
        0 => None,
        CTRL_STATUS => Some(VU_STATUS_OFFSET),
        CTRL_MAC => Some(VU_MAC_OFFSET),
        i => Some(VU_CCR_OFFSET + 4 * i as i32),
    }
}

impl R5900Compiler<'_> {
    fn vu_sync(&mut self) {
        self.ra.flush_all(self.buf);
        self.call_helper(helper_vu0_sync as usize, &[]);
    }

    /// Copy VF `fs` to VF `ft`, optionally clearing the sign bits.
    fn vu_move_full(&mut self, ft: u8, fs: u8, abs: bool) {
        if ft == 0 {
            return;
        }
        let s = self.ra.bind_xmm(self.buf, GuestReg::Vf(fs), Intent::Read);
        let intent = if ft == fs { Intent::Modify } else { Intent::Write };
        let d = self.ra.bind_xmm(self.buf, GuestReg::Vf(ft), intent);
        if d != s {
            emit_move(self.buf, OpSize::PackedSingle, Operand::Xmm(d), Operand::Xmm(s));
        }
        if abs {
            emit_group1(
                self.buf,
                ArithOp::And,
                OpSize::PackedSingle,
                Operand::Xmm(d),
                Operand::Mem(Mem::env(ABS_MASK_OFFSET)),
            );
        }
    }

    pub(crate) fn lower_cop2(&mut self, op: Op) {
        self.vu_sync();
        match op {
            Op::Qmfc2 { rt, fs } => {
                if rt == 0 {
                    return;
                }
                let g = GuestReg::Gpr(rt);
                self.ra.invalidate(g);
                let x = self.ra.bind_xmm(self.buf, GuestReg::Vf(fs), Intent::Read);
                emit_sse_rm(self.buf, OPC_MOVUPS_WxVx, x, g.home());
            }
            Op::Qmtc2 { rt, fs } => {
                if fs == 0 {
                    return;
                }
                let g = GuestReg::Gpr(rt);
                self.ra.flush(self.buf, g);
                let x = self.ra.bind_xmm(self.buf, GuestReg::Vf(fs), Intent::Write);
                emit_sse_rm(self.buf, OPC_MOVUPS_VxWx, x, g.home());
            }
            Op::Cfc2 { rt, id } => {
                if rt == 0 {
                    return;
                }
                match control_offset(id) {
                    None => self.ra.set_const(self.buf, GuestReg::Gpr(rt), 0),
                    Some(off) => {
                        emit_load_ext(self.buf, OPC_MOVSLQ, SCRATCH0, Mem::env(off));
                        self.set_result(GuestReg::Gpr(rt), SCRATCH0);
                    }
                }
            }
            Op::Ctc2 { rt, id } => {
                self.call_helper(helper_ctc2 as usize, &[Arg::Imm(id as u64), Arg::Imm(rt as u64)]);
            }
            Op::Vu { op: VuOp::Move, dest: FULL_DEST, fs, ft, .. } => self.vu_move_full(ft, fs, false),
            Op::Vu { op: VuOp::Abs, dest: FULL_DEST, fs, ft, .. } => self.vu_move_full(ft, fs, true),
            Op::Vu { op, dest, fd, fs, ft } => {
                self.call_helper(
                    helper_vu0_op as usize,
                    &[
                        Arg::Imm(op as u64),
                        Arg::Imm(dest as u64),
                        Arg::Imm(fd as u64),
                        Arg::Imm(fs as u64),
                        Arg::Imm(ft as u64),
                    ],
                );
            }
            Op::Vnop => {}
            Op::Vcallms { imm } => {
                self.call_helper(helper_vu0_callms as usize, &[Arg::Imm((imm as u64) << 3)]);
            }
            other => unreachable!("{other:?} is not a COP2 instruction"),
        }
    }
}
