//! Runtime helpers called from generated code.
//!
//! All helpers take the env pointer as their first argument and are
//! only ever called with every guest register flushed to `CpuState`.

use eerec_core::runtime::{exit, Condition, Delivery, Runtime};
use eerec_core::{CpuState, Width};

use super::cop2::vu_execute;
use super::fpu::{self, FpuRegs};
use super::insn::{FpuOp, VuOp};
use super::mem::MemKind;

/// Execute one instruction through the interpreter. The guest PC is
/// left untouched so a pending indirect jump target survives.
#[no_mangle]
pub extern "C" fn helper_interpret(env: *mut CpuState, pc: u32, insn: u32) {
    let cpu = unsafe { &mut *env };
    let saved = cpu.pc;
    step(cpu, pc, insn);
    cpu.pc = saved;
}

/// Execute an instruction that may redirect control flow. `pc` holds
/// the resume address afterwards.
#[no_mangle]
pub extern "C" fn helper_interpret_jump(env: *mut CpuState, pc: u32, insn: u32) {
    let cpu = unsafe { &mut *env };
    step(cpu, pc, insn);
}

fn step(cpu: &mut CpuState, pc: u32, insn: u32) {
    tracing::trace!(pc = format_args!("{pc:#010x}"), insn = format_args!("{insn:#010x}"), "interpret");
    cpu.pc = pc.wrapping_add(4);
    let Runtime {
        memory,
        interpreter,
        ..
    } = unsafe { cpu.runtime_mut() };
    interpreter.step(cpu, &mut **memory, pc, insn);
}

/// Hand a SYSCALL/BREAK to the condition sink. Returns the exit code
/// generated code leaves the block with.
#[no_mangle]
pub extern "C" fn helper_deliver_condition(env: *mut CpuState, raw: u64) -> usize {
    let cpu = unsafe { &mut *env };
    let Some(cond) = Condition::from_raw(raw) else {
        panic!("bad condition word {raw:#x}");
    };
    cpu.cause = cond.cause();
    let rt = unsafe { cpu.runtime_mut() };
    match rt.conditions.deliver(cpu, cond) {
        Delivery::Resume => exit::INDIRECT,
        Delivery::Stop => exit::STOP,
    }
}

/// Guest load through the memory trait, for memories without a host
/// window.
#[no_mangle]
pub extern "C" fn helper_load(env: *mut CpuState, addr: u32, kind: u64, reg: u64) {
    let cpu = unsafe { &mut *env };
    let Some(kind) = MemKind::from_raw(kind as u32) else {
        panic!("bad load kind {kind}");
    };
    let rt = unsafe { cpu.runtime_mut() };
    let reg = reg as usize & 31;
    let width = kind.width();
    let addr = kind.align(addr);
    let raw = rt.memory.read(width, addr);
    match kind {
        MemKind::Lwc1 => cpu.fpr[reg] = raw as u32,
        MemKind::Lq => {
            if reg != 0 {
                cpu.gpr[reg] = eerec_core::Quad::from_u128(raw);
            }
        }
        _ => cpu.set_gpr(reg, kind.extend(raw as u64)),
    }
}

/// Guest store through the memory trait.
#[no_mangle]
pub extern "C" fn helper_store(env: *mut CpuState, addr: u32, kind: u64, reg: u64) {
    let cpu = unsafe { &mut *env };
    let Some(kind) = MemKind::from_raw(kind as u32) else {
        panic!("bad store kind {kind}");
    };
    let rt = unsafe { cpu.runtime_mut() };
    let reg = reg as usize & 31;
    let value = match kind {
        MemKind::Swc1 => cpu.fpr[reg] as u128,
        MemKind::Sq => cpu.gpr[reg].to_u128(),
        _ => cpu.gpr(reg) as u128,
    };
    let width = kind.width();
    rt.memory
        .write(width, kind.align(addr), value & width.value_mask());
}

/// COP1 arithmetic through the numeric shim.
#[no_mangle]
pub extern "C" fn helper_fpu(env: *mut CpuState, op: u64, fd: u64, fs: u64, ft: u64) {
    let cpu = unsafe { &mut *env };
    let Some(op) = FpuOp::from_raw(op as u32) else {
        panic!("bad fpu op {op}");
    };
    let effect = fpu::execute(
        op,
        FpuRegs {
            fpr: &cpu.fpr,
            acc: cpu.acc,
            acc_flag: cpu.acc_flag != 0,
            fcr31: cpu.fcr31,
        },
        fs as u8,
        ft as u8,
    );
    if let Some(bits) = effect.fd {
        cpu.fpr[fd as usize & 31] = bits;
    }
    if let Some((acc, flag)) = effect.acc {
        cpu.acc = acc;
        cpu.acc_flag = flag as u32;
    }
    cpu.fcr31 = effect.fcr31;
}

/// Wait for VU0 to finish any running micro-program.
#[no_mangle]
pub extern "C" fn helper_vu0_sync(env: *mut CpuState) {
    let cpu = unsafe { &mut *env };
    let rt = unsafe { cpu.runtime_mut() };
    rt.vu.finish_pending(&mut cpu.vu0);
}

/// VU0 macro arithmetic.
#[no_mangle]
pub extern "C" fn helper_vu0_op(env: *mut CpuState, op: u64, dest: u64, fd: u64, fs: u64, ft: u64) {
    let cpu = unsafe { &mut *env };
    let Some(op) = VuOp::from_raw(op as u32) else {
        panic!("bad vu op {op}");
    };
    vu_execute(op, &mut cpu.vu0, dest as u8, fd as u8, fs as u8, ft as u8);
}

/// CTC2 through the per-register write table.
#[no_mangle]
pub extern "C" fn helper_ctc2(env: *mut CpuState, id: u64, rt: u64) {
    let cpu = unsafe { &mut *env };
    let value = cpu.gpr(rt as usize & 31) as u32;
    cpu.vu0.write_control(id as usize, value);
}

/// VCALLMS: start a micro-program.
#[no_mangle]
pub extern "C" fn helper_vu0_callms(env: *mut CpuState, start_pc: u64) {
    let cpu = unsafe { &mut *env };
    let rt = unsafe { cpu.runtime_mut() };
    rt.vu.start(&cpu.vu0, start_pc as u32);
}

impl MemKind {
    /// Width of the guest access.
    pub fn width(self) -> Width {
        match self {
            MemKind::Lb | MemKind::Lbu | MemKind::Sb => Width::B8,
            MemKind::Lh | MemKind::Lhu | MemKind::Sh => Width::B16,
            MemKind::Lw | MemKind::Lwu | MemKind::Sw | MemKind::Lwc1 | MemKind::Swc1 => Width::B32,
            MemKind::Ld | MemKind::Sd => Width::B64,
            MemKind::Lq | MemKind::Sq => Width::B128,
        }
    }

    /// Quadword accesses ignore the low four address bits.
    pub fn align(self, addr: u32) -> u32 {
        match self {
            MemKind::Lq | MemKind::Sq => addr & !15,
            _ => addr,
        }
    }

    /// Sign- or zero-extend a loaded value to 64 bits.
    pub fn extend(self, raw: u64) -> u64 {
        match self {
            MemKind::Lb => raw as u8 as i8 as i64 as u64,
            MemKind::Lh => raw as u16 as i16 as i64 as u64,
            MemKind::Lw => raw as u32 as i32 as i64 as u64,
            MemKind::Lbu => raw as u8 as u64,
            MemKind::Lhu => raw as u16 as u64,
            MemKind::Lwu => raw as u32 as u64,
            _ => raw,
        }
    }
}
