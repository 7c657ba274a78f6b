//! Reference semantics: a plain stepping interpreter over decoded
//! instructions, plus the interpreter collaborator used for the
//! instructions the compiler hands off.
//!
//! Compiled code is checked against `run_reference` on the same
//! program and initial state.

use eerec_core::flags::{FCR31_C, FCR31_O, FCR31_U, FCR31_WRITABLE};
use eerec_core::runtime::{Condition, Delivery, Interpreter, Runtime};
use eerec_core::{CpuState, GuestMemory, Quad, Width};
use eerec_frontend::r5900::cop2::vu_execute;
use eerec_frontend::r5900::fpu::{self, FpuRegs, SIGN};
use eerec_frontend::r5900::insn::{
    funct, opc, rtype, AluOp, BranchTest, FpuMoveKind, ImmOp, Insn, Op, ShiftKind,
};

fn sext32(v: u64) -> u64 {
    v as u32 as i32 as i64 as u64
}

// ── Fallback interpreter ──────────────────────────────────────

/// Interprets the handful of instructions the compiler never lowers:
/// multiply, divide and ERET (which returns to the address in k0).
#[derive(Debug, Default)]
pub struct FallbackInterp {
    pub calls: usize,
}

impl Interpreter for FallbackInterp {
    fn step(&mut self, cpu: &mut CpuState, _mem: &mut dyn GuestMemory, pc: u32, insn: u32) {
        self.calls += 1;
        let r = rtype(insn);
        let (rs, rt, rd) = (r.rs() as usize, r.rt() as usize, r.rd() as usize);
        let a = cpu.gpr(rs);
        let b = cpu.gpr(rt);
        match (r.op(), r.funct()) {
            (opc::SPECIAL, funct::MULT) => {
                let prod = (a as i32 as i64).wrapping_mul(b as i32 as i64);
                set_hilo(cpu, sext32(prod as u64), sext32((prod >> 32) as u64));
                cpu.set_gpr(rd, sext32(prod as u64));
            }
            (opc::SPECIAL, funct::MULTU) => {
                let prod = (a as u32 as u64) * (b as u32 as u64);
                set_hilo(cpu, sext32(prod), sext32(prod >> 32));
                cpu.set_gpr(rd, sext32(prod));
            }
            (opc::SPECIAL, funct::DIV) => {
                let (n, d) = (a as i32, b as i32);
                let (q, m) = if d == 0 {
                    (if n < 0 { 1 } else { -1 }, n)
                } else if n == i32::MIN && d == -1 {
                    (i32::MIN, 0)
                } else {
                    (n / d, n % d)
                };
                set_hilo(cpu, q as i64 as u64, m as i64 as u64);
            }
            (opc::SPECIAL, funct::DIVU) => {
                let (n, d) = (a as u32, b as u32);
                let (q, m) = if d == 0 { (u32::MAX, n) } else { (n / d, n % d) };
                set_hilo(cpu, sext32(q as u64), sext32(m as u64));
            }
            (opc::COP0, _) => cpu.pc = cpu.gpr(26) as u32,
            _ => panic!("no interpretation for {insn:#010x} at {pc:#010x}"),
        }
    }
}

fn set_hilo(cpu: &mut CpuState, lo: u64, hi: u64) {
    cpu.lo.lo = lo;
    cpu.hi.lo = hi;
}

// ── Reference stepper ─────────────────────────────────────────

/// How `run_reference` finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefExit {
    Stopped,
    StepLimit,
}

/// Execute from `cpu.pc` until a condition handler stops or
/// `max_steps` instructions (delay slots included) have run.
pub fn run_reference(cpu: &mut CpuState, rt: &mut Runtime<'_>, max_steps: usize) -> RefExit {
    let mut pc = cpu.pc;
    let mut steps = 0;
    while steps < max_steps {
        let insn = Insn::decode(pc, rt.memory.read_u32(pc));
        steps += 1;
        match insn.op {
            Op::Branch { .. } | Op::Jump { .. } | Op::JumpReg { .. } => {
                let (taken, target) = branch_outcome(cpu, &insn);
                link(cpu, &insn);
                let likely = matches!(insn.op, Op::Branch { likely: true, .. });
                if taken || !likely {
                    let delay = Insn::decode(pc.wrapping_add(4), rt.memory.read_u32(pc.wrapping_add(4)));
                    steps += 1;
                    delay_slot(cpu, rt, &delay);
                }
                pc = if taken { target } else { pc.wrapping_add(8) };
            }
            Op::Syscall { code } => {
                if deliver(cpu, rt, pc, Condition::Syscall { code }) {
                    return RefExit::Stopped;
                }
                pc = cpu.pc;
            }
            Op::Break { code } => {
                if deliver(cpu, rt, pc, Condition::Break { code }) {
                    return RefExit::Stopped;
                }
                pc = cpu.pc;
            }
            Op::FallbackJump => {
                cpu.pc = pc.wrapping_add(4);
                rt.interpreter.step(cpu, &mut *rt.memory, pc, insn.raw);
                pc = cpu.pc;
            }
            _ => {
                straight(cpu, rt, &insn);
                pc = pc.wrapping_add(4);
            }
        }
        cpu.pc = pc;
    }
    RefExit::StepLimit
}

fn deliver(cpu: &mut CpuState, rt: &mut Runtime<'_>, pc: u32, cond: Condition) -> bool {
    cpu.pc = pc;
    cpu.cause = cond.cause();
    rt.conditions.deliver(cpu, cond) == Delivery::Stop
}

fn branch_outcome(cpu: &CpuState, insn: &Insn) -> (bool, u32) {
    match insn.op {
        Op::Branch { test, .. } => {
            let taken = match test {
                BranchTest::Compare { cond, rs, rt } => {
                    cond.eval(cpu.gpr(rs as usize), cpu.gpr(rt as usize))
                }
                BranchTest::Fpu { on_true } => (cpu.fcr31 & FCR31_C != 0) == on_true,
            };
            (taken, insn.branch_target().unwrap_or_default())
        }
        Op::Jump { .. } => (true, insn.branch_target().unwrap_or_default()),
        Op::JumpReg { rs, .. } => (true, cpu.gpr(rs as usize) as u32),
        _ => unreachable!(),
    }
}

fn link(cpu: &mut CpuState, insn: &Insn) {
    let value = insn.pc.wrapping_add(8) as i32 as i64 as u64;
    match insn.op {
        Op::Branch { link: true, .. } | Op::Jump { link: true, .. } => cpu.set_gpr(31, value),
        Op::JumpReg { link: Some(rd), .. } => cpu.set_gpr(rd as usize, value),
        _ => {}
    }
}

fn delay_slot(cpu: &mut CpuState, rt: &mut Runtime<'_>, delay: &Insn) {
    if delay.is_branch() {
        return;
    }
    if delay.ends_block() {
        let saved = cpu.pc;
        cpu.pc = delay.pc.wrapping_add(4);
        rt.interpreter.step(cpu, &mut *rt.memory, delay.pc, delay.raw);
        cpu.pc = saved;
        return;
    }
    straight(cpu, rt, delay);
}

/// Execute one non-control-flow instruction.
fn straight(cpu: &mut CpuState, rt: &mut Runtime<'_>, insn: &Insn) {
    let g = |cpu: &CpuState, r: u8| cpu.gpr(r as usize);
    match insn.op {
        Op::Alu { op, rd, rs, rt: t } => {
            let (a, b) = (g(cpu, rs), g(cpu, t));
            let v = match op {
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
            };
            cpu.set_gpr(rd as usize, v);
        }
        Op::AluImm { op, rt: t, rs, imm } => {
            let a = g(cpu, rs);
            let s = imm as i16 as i64 as u64;
            let v = match op {
                ImmOp::Addiu => sext32(a.wrapping_add(s)),
                ImmOp::Daddiu => a.wrapping_add(s),
                ImmOp::Andi => a & imm as u64,
                ImmOp::Ori => a | imm as u64,
                ImmOp::Xori => a ^ imm as u64,
                ImmOp::Slti => ((a as i64) < (s as i64)) as u64,
                ImmOp::Sltiu => (a < s) as u64,
            };
            cpu.set_gpr(t as usize, v);
        }
        Op::Lui { rt: t, imm } => cpu.set_gpr(t as usize, ((imm as u32) << 16) as i32 as i64 as u64),
        Op::Shift { kind, rd, rt: t, sa } => {
            let v = shift(kind, g(cpu, t), sa as u32);
            cpu.set_gpr(rd as usize, v);
        }
        Op::ShiftVar { kind, rd, rt: t, rs } => {
            let v = shift(kind, g(cpu, t), g(cpu, rs) as u32);
            cpu.set_gpr(rd as usize, v);
        }
        Op::CondMove { rd, rs, rt: t, on_zero } => {
            if (g(cpu, t) == 0) == on_zero {
                let v = g(cpu, rs);
                cpu.set_gpr(rd as usize, v);
            }
        }
        Op::MoveFromHiLo { rd, hi } => {
            let v = if hi { cpu.hi.lo } else { cpu.lo.lo };
            cpu.set_gpr(rd as usize, v);
        }
        Op::MoveToHiLo { rs, hi } => {
            let v = g(cpu, rs);
            if hi {
                cpu.hi.lo = v;
            } else {
                cpu.lo.lo = v;
            }
        }
        Op::Plzcw { rd, rs } => {
            let half = |x: u32| {
                let y = x ^ ((x as i32 >> 31) as u32);
                (y.leading_zeros().max(1) - 1) as u64
            };
            let v = g(cpu, rs);
            cpu.set_gpr(rd as usize, half(v as u32) | half((v >> 32) as u32) << 32);
        }

        Op::Load { width, signed, rt: t, base, offset } => {
            let addr = effective(cpu, base, offset);
            if width == Width::B128 {
                let raw = rt.memory.read(width, addr & !15);
                if t != 0 {
                    cpu.gpr[t as usize] = Quad::from_u128(raw);
                }
                return;
            }
            let raw = rt.memory.read(width, addr) as u64;
            let v = match (width, signed) {
                (Width::B8, true) => raw as u8 as i8 as i64 as u64,
                (Width::B16, true) => raw as u16 as i16 as i64 as u64,
                (Width::B32, true) => raw as u32 as i32 as i64 as u64,
                _ => raw,
            };
            cpu.set_gpr(t as usize, v);
        }
        Op::Store { width, rt: t, base, offset } => {
            let addr = effective(cpu, base, offset);
            if width == Width::B128 {
                rt.memory.write(width, addr & !15, cpu.gpr[t as usize].to_u128());
            } else {
                rt.memory.write(width, addr, g(cpu, t) as u128 & width.value_mask());
            }
        }
        Op::Lwc1 { ft, base, offset } => {
            let addr = effective(cpu, base, offset);
            cpu.fpr[ft as usize] = rt.memory.read(Width::B32, addr) as u32;
        }
        Op::Swc1 { ft, base, offset } => {
            let addr = effective(cpu, base, offset);
            rt.memory.write(Width::B32, addr, cpu.fpr[ft as usize] as u128);
        }

        Op::Mfc1 { rt: t, fs } => cpu.set_gpr(t as usize, sext32(cpu.fpr[fs as usize] as u64)),
        Op::Mtc1 { rt: t, fs } => cpu.fpr[fs as usize] = g(cpu, t) as u32,
        Op::Cfc1 { rt: t, fs } => {
            let v = match fs {
                0 => 0x2e00,
                31 => sext32(cpu.fcr31 as u64),
                _ => 0,
            };
            cpu.set_gpr(t as usize, v);
        }
        Op::Ctc1 { rt: t, fs } => {
            if fs == 31 {
                cpu.fcr31 = g(cpu, t) as u32 & FCR31_WRITABLE;
            }
        }
        Op::FpuMove { kind, fd, fs } => {
            let s = cpu.fpr[fs as usize];
            cpu.fpr[fd as usize] = match kind {
                FpuMoveKind::Mov => s,
                FpuMoveKind::Abs => s & !SIGN,
                FpuMoveKind::Neg => s ^ SIGN,
            };
            if kind != FpuMoveKind::Mov {
                cpu.fcr31 &= !(FCR31_O | FCR31_U);
            }
        }
        Op::Fpu { op, fd, fs, ft } => {
            let effect = fpu::execute(
                op,
                FpuRegs {
                    fpr: &cpu.fpr,
                    acc: cpu.acc,
                    acc_flag: cpu.acc_flag != 0,
                    fcr31: cpu.fcr31,
                },
                fs,
                ft,
            );
            if let Some(bits) = effect.fd {
                cpu.fpr[fd as usize] = bits;
            }
            if let Some((acc, flag)) = effect.acc {
                cpu.acc = acc;
                cpu.acc_flag = flag as u32;
            }
            cpu.fcr31 = effect.fcr31;
        }

        Op::Qmfc2 { .. }
        | Op::Qmtc2 { .. }
        | Op::Cfc2 { .. }
        | Op::Ctc2 { .. }
        | Op::Vu { .. }
        | Op::Vnop
        | Op::Vcallms { .. } => cop2(cpu, rt, insn.op),

        Op::Fallback => {
            let saved = cpu.pc;
            cpu.pc = insn.pc.wrapping_add(4);
            rt.interpreter.step(cpu, &mut *rt.memory, insn.pc, insn.raw);
            cpu.pc = saved;
        }
        other => unreachable!("{other:?} is not straight-line"),
    }
}

fn cop2(cpu: &mut CpuState, rt: &mut Runtime<'_>, op: Op) {
    rt.vu.finish_pending(&mut cpu.vu0);
    match op {
        Op::Qmfc2 { rt: t, fs } => {
            if t != 0 {
                let v = cpu.vu0.vf[fs as usize];
                cpu.gpr[t as usize] = Quad::from_u128(
                    v[0] as u128 | (v[1] as u128) << 32 | (v[2] as u128) << 64 | (v[3] as u128) << 96,
                );
            }
        }
        Op::Qmtc2 { rt: t, fs } => {
            let q = cpu.gpr[t as usize].to_u128();
            let lanes = [q as u32, (q >> 32) as u32, (q >> 64) as u32, (q >> 96) as u32];
            cpu.vu0.write_vf(fs as usize, 0xf, lanes);
        }
        Op::Cfc2 { rt: t, id } => {
            let v = cpu.vu0.read_control(id as usize);
            cpu.set_gpr(t as usize, sext32(v as u64));
        }
        Op::Ctc2 { rt: t, id } => {
            let v = cpu.gpr(t as usize) as u32;
            cpu.vu0.write_control(id as usize, v);
        }
        Op::Vu { op, dest, fd, fs, ft } => vu_execute(op, &mut cpu.vu0, dest, fd, fs, ft),
        Op::Vnop => {}
        Op::Vcallms { imm } => rt.vu.start(&cpu.vu0, (imm as u32) << 3),
        _ => unreachable!(),
    }
}

fn shift(kind: ShiftKind, v: u64, sa: u32) -> u64 {
    match kind {
        ShiftKind::Sll => sext32(((v as u32) << (sa & 31)) as u64),
        ShiftKind::Srl => sext32(((v as u32) >> (sa & 31)) as u64),
        ShiftKind::Sra => ((v as u32 as i32) >> (sa & 31)) as i64 as u64,
        ShiftKind::Dsll => v << (sa & 63),
        ShiftKind::Dsrl => v >> (sa & 63),
        ShiftKind::Dsra => ((v as i64) >> (sa & 63)) as u64,
    }
}

fn effective(cpu: &CpuState, base: u8, offset: i16) -> u32 {
    (cpu.gpr(base as usize) as u32).wrapping_add(offset as i32 as u32)
}
