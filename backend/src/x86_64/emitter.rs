#![allow(non_upper_case_globals)]

use eerec_core::cpu::MEM_BASE_OFFSET;
use eerec_core::Cond;

use crate::code_buffer::CodeBuffer;
use crate::x86_64::regs::{
    Reg, Xmm, CALLEE_SAVED, CALL_ARG_REGS, ENV_REG, MEM_BASE_REG, STACK_ADDEND,
};
use crate::HostCodeGen;

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F prefix
pub const P_EXT38: u32 = 0x200; // 0x0F 0x38 prefix
pub const P_DATA16: u32 = 0x400; // 0x66 prefix
pub const P_REXW: u32 = 0x1000; // REX.W = 1
pub const P_REXB_R: u32 = 0x2000; // REG field as byte register
pub const P_REXB_RM: u32 = 0x4000; // R/M field as byte register
pub const P_SIMDF3: u32 = 0x20000; // 0xF3 prefix

// -- Opcode constants (OPC_*) --

// Arithmetic
pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_EvIz: u32 = 0x81;
pub const OPC_ARITH_GvEv: u32 = 0x03;
pub const OPC_ARITH_EvGv: u32 = 0x01;

// Shift
pub const OPC_SHIFT_1: u32 = 0xD1;
pub const OPC_SHIFT_Ib: u32 = 0xC1;
pub const OPC_SHIFT_cl: u32 = 0xD3;

// Data movement
pub const OPC_MOVB_EvGv: u32 = 0x88;
pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;

// Extensions
pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
pub const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
pub const OPC_MOVSBL: u32 = 0xBE | P_EXT;
pub const OPC_MOVSWL: u32 = 0xBF | P_EXT;
pub const OPC_MOVSLQ: u32 = 0x63 | P_REXW;

// Branch
pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_CALL_Jz: u32 = 0xE8;

// Bit operations
pub const OPC_BSF: u32 = 0xBC | P_EXT;
pub const OPC_BSR: u32 = 0xBD | P_EXT;
pub const OPC_LZCNT: u32 = 0xBD | P_EXT | P_SIMDF3;
pub const OPC_TZCNT: u32 = 0xBC | P_EXT | P_SIMDF3;
pub const OPC_BT_EvGv: u32 = 0xA3 | P_EXT;

// Compare / conditional
pub const OPC_CMOVCC: u32 = 0x40 | P_EXT;
pub const OPC_SETCC: u32 = 0x90 | P_EXT | P_REXB_RM;
pub const OPC_TESTL: u32 = 0x85;

// Group opcodes
pub const OPC_GRP3_Ev: u32 = 0xF7;
pub const OPC_GRP5: u32 = 0xFF;
pub const OPC_GRPBT: u32 = 0xBA | P_EXT;

// Multiply
pub const OPC_IMUL_GvEv: u32 = 0xAF | P_EXT;

// Misc
pub const OPC_LEA: u32 = 0x8D;
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_RET: u32 = 0xC3;

// SSE
pub const OPC_MOVUPS_VxWx: u32 = 0x10 | P_EXT;
pub const OPC_MOVUPS_WxVx: u32 = 0x11 | P_EXT;
pub const OPC_MOVSS_VxWx: u32 = 0x10 | P_EXT | P_SIMDF3;
pub const OPC_MOVSS_WxVx: u32 = 0x11 | P_EXT | P_SIMDF3;
pub const OPC_MOVAPS: u32 = 0x28 | P_EXT;
pub const OPC_UCOMISS: u32 = 0x2E | P_EXT;
pub const OPC_ANDPS: u32 = 0x54 | P_EXT;
pub const OPC_ORPS: u32 = 0x56 | P_EXT;
pub const OPC_XORPS: u32 = 0x57 | P_EXT;
pub const OPC_ADDPS: u32 = 0x58 | P_EXT;
pub const OPC_MULPS: u32 = 0x59 | P_EXT;
pub const OPC_SUBPS: u32 = 0x5C | P_EXT;
pub const OPC_ADDSS: u32 = 0x58 | P_EXT | P_SIMDF3;
pub const OPC_MULSS: u32 = 0x59 | P_EXT | P_SIMDF3;
pub const OPC_SUBSS: u32 = 0x5C | P_EXT | P_SIMDF3;
pub const OPC_MOVD_VyEy: u32 = 0x6E | P_EXT | P_DATA16;
pub const OPC_MOVD_EyVy: u32 = 0x7E | P_EXT | P_DATA16;

// -- Sub-operation enums --

/// Arithmetic sub-opcodes (used in /r field of 0x81/0x83 and shifted into GvEv).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Shift sub-opcodes (used in /r field of 0xC1/0xD1/0xD3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Group 3 extension codes (used in /r field of 0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Test = 0,
    Not = 2,
    Neg = 3,
}

/// Group 5 extension codes (used in /r field of 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    CallN = 2,
    JmpN = 4,
}

/// x86 condition codes for Jcc/SETcc/CMOVcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

const X86_CONDS: [X86Cond; 16] = [
    X86Cond::Jo,
    X86Cond::Jno,
    X86Cond::Jb,
    X86Cond::Jae,
    X86Cond::Je,
    X86Cond::Jne,
    X86Cond::Jbe,
    X86Cond::Ja,
    X86Cond::Js,
    X86Cond::Jns,
    X86Cond::Jp,
    X86Cond::Jnp,
    X86Cond::Jl,
    X86Cond::Jge,
    X86Cond::Jle,
    X86Cond::Jg,
];

impl X86Cond {
    /// Map a guest comparison to the flag condition after `cmp a, b`.
    pub fn from_cond(cond: Cond) -> Self {
        match cond {
            Cond::Eq => X86Cond::Je,
            Cond::Ne => X86Cond::Jne,
            Cond::Lt => X86Cond::Jl,
            Cond::Ge => X86Cond::Jge,
            Cond::Le => X86Cond::Jle,
            Cond::Gt => X86Cond::Jg,
        }
    }

    /// Return the inverted condition.
    pub fn invert(self) -> Self {
        X86_CONDS[(self as u8 ^ 1) as usize]
    }
}

/// A memory operand `[base + index << shift + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub base: Reg,
    pub index: Option<Reg>,
    pub shift: u8,
    pub disp: i32,
}

impl Mem {
    pub const fn base(base: Reg, disp: i32) -> Self {
        Self {
            base,
            index: None,
            shift: 0,
            disp,
        }
    }

    pub const fn indexed(base: Reg, index: Reg, shift: u8, disp: i32) -> Self {
        Self {
            base,
            index: Some(index),
            shift,
            disp,
        }
    }

    /// A field of the guest register file.
    pub const fn env(disp: i32) -> Self {
        Self::base(ENV_REG, disp)
    }
}

// -- Core encoding functions --

/// Helper: return P_REXW if `rexw` is true.
#[inline]
pub fn rexw_flag(rexw: bool) -> u32 {
    if rexw {
        P_REXW
    } else {
        0
    }
}

/// Emit prefixes, REX and opcode bytes. `r`, `rm` and `index` are raw
/// register numbers (0-15); pass 0 for unused fields.
fn emit_opc_x(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if index >= 8 {
        rex |= 0x02;
    }
    if rm >= 8 {
        rex |= 0x01;
    }
    // SPL/BPL/SIL/DIL need an (empty) REX prefix to be addressable.
    if rex == 0
        && ((opc & P_REXB_R != 0 && r >= 4) || (opc & P_REXB_RM != 0 && rm >= 4))
    {
        rex = 0x40;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if opc & P_SIMDF3 != 0 {
        buf.emit_u8(0xF3);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & (P_EXT | P_EXT38) != 0 {
        buf.emit_u8(0x0F);
        if opc & P_EXT38 != 0 {
            buf.emit_u8(0x38);
        }
    }
    buf.emit_u8(opc as u8);
}

/// Emit opcode with REX prefix. `r` is the reg field, `rm` is the r/m field.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc_x(buf, opc, r, rm, 0);
}

/// Emit opcode + ModR/M for a register-register form (raw numbers, so
/// the same path serves GPRs and XMMs).
pub fn emit_modrm_raw(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc(buf, opc, r, rm);
    buf.emit_u8(0xC0 | ((r & 7) << 3) | (rm & 7));
}

/// Emit opcode + ModR/M for register-register operation.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_modrm_raw(buf, opc, r as u8, rm as u8);
}

/// Emit opcode + ModR/M with /r extension (for group opcodes).
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_modrm_raw(buf, opc, ext, rm as u8);
}

/// Emit opcode + ModR/M (+ SIB) + displacement for a memory operand.
/// `r` is the raw reg field: a register number or a /r extension.
pub fn emit_modrm_mem(buf: &mut CodeBuffer, opc: u32, r: u8, mem: Mem) {
    let r3 = r & 7;
    let b3 = mem.base.low3();
    let disp = mem.disp;
    // RBP/R13 as base always need a displacement.
    let (mode, disp_len) = if disp == 0 && b3 != 5 {
        (0x00, 0)
    } else if (-128..=127).contains(&disp) {
        (0x40, 1)
    } else {
        (0x80, 4)
    };

    match mem.index {
        None => {
            emit_opc(buf, opc, r, mem.base as u8);
            if b3 == 4 {
                // RSP/R12 as base need a SIB byte.
                buf.emit_u8(mode | (r3 << 3) | 0x04);
                buf.emit_u8(0x24);
            } else {
                buf.emit_u8(mode | (r3 << 3) | b3);
            }
        }
        Some(index) => {
            assert!(index != Reg::Rsp, "rsp cannot be an index register");
            emit_opc_x(buf, opc, r, mem.base as u8, index as u8);
            buf.emit_u8(mode | (r3 << 3) | 0x04);
            buf.emit_u8((mem.shift << 6) | (index.low3() << 3) | b3);
        }
    }
    match disp_len {
        1 => buf.emit_u8(disp as u8),
        4 => buf.emit_u32(disp as u32),
        _ => {}
    }
}

/// Emit opcode + ModR/M + displacement for memory [base + offset].
pub fn emit_modrm_offset(buf: &mut CodeBuffer, opc: u32, r: Reg, base: Reg, offset: i32) {
    emit_modrm_mem(buf, opc, r as u8, Mem::base(base, offset));
}

// -- Arithmetic instructions --

/// Emit arithmetic reg, reg (ADD/SUB/AND/OR/XOR/CMP/ADC/SBB).
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm(buf, opc, dst, src);
}

/// Emit arithmetic reg, imm (auto-selects imm8 vs imm32).
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm_ext(buf, OPC_ARITH_EvIb | w, op as u8, dst);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm_ext(buf, OPC_ARITH_EvIz | w, op as u8, dst);
        buf.emit_u32(imm as u32);
    }
}

/// Emit arithmetic [mem], reg (store-op).
pub fn emit_arith_mr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, mem: Mem, src: Reg) {
    let opc = (OPC_ARITH_EvGv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm_mem(buf, opc, src as u8, mem);
}

/// Emit arithmetic reg, [mem] (load-op).
pub fn emit_arith_rm(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, mem: Mem) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm_mem(buf, opc, dst as u8, mem);
}

/// Emit arithmetic [mem], imm32.
pub fn emit_arith_mi(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, mem: Mem, imm: i32) {
    emit_modrm_mem(buf, OPC_ARITH_EvIz | rexw_flag(rexw), op as u8, mem);
    buf.emit_u32(imm as u32);
}

/// Emit arithmetic [mem], imm8 (sign-extended).
pub fn emit_arith_mi8(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, mem: Mem, imm: i8) {
    emit_modrm_mem(buf, OPC_ARITH_EvIb | rexw_flag(rexw), op as u8, mem);
    buf.emit_u8(imm as u8);
}

/// Emit NEG reg.
pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Neg as u8, reg);
}

/// Emit NOT reg.
pub fn emit_not(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Not as u8, reg);
}

/// Emit two-operand IMUL: dst = dst * src.
pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_IMUL_GvEv | rexw_flag(rexw), dst, src);
}

// -- Shift instructions --

/// Emit shift reg, imm8.
pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg, imm: u8) {
    let w = rexw_flag(rexw);
    if imm == 1 {
        emit_modrm_ext(buf, OPC_SHIFT_1 | w, op as u8, dst);
    } else {
        emit_modrm_ext(buf, OPC_SHIFT_Ib | w, op as u8, dst);
        buf.emit_u8(imm);
    }
}

/// Emit shift reg, CL.
pub fn emit_shift_cl(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg) {
    emit_modrm_ext(buf, OPC_SHIFT_cl | rexw_flag(rexw), op as u8, dst);
}

// -- Data movement --

/// Emit MOV reg, reg (32-bit or 64-bit).
pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, dst);
}

/// Emit MOV reg, imm (32-bit or 64-bit), picking the shortest form.
pub fn emit_mov_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, val: u64) {
    if val == 0 {
        emit_modrm(buf, 0x31, reg, reg);
    } else if !rexw || val <= u32::MAX as u64 {
        emit_opc(buf, OPC_MOVL_Iv + (reg.low3() as u32), 0, reg as u8);
        buf.emit_u32(val as u32);
    } else if val as i64 >= i32::MIN as i64 && val as i64 <= i32::MAX as i64 {
        emit_modrm_ext(buf, OPC_MOVL_EvIz | P_REXW, 0, reg);
        buf.emit_u32(val as u32);
    } else {
        emit_opc(buf, (OPC_MOVL_Iv + (reg.low3() as u32)) | P_REXW, 0, reg as u8);
        buf.emit_u64(val);
    }
}

/// Emit a sign/zero extension reg ← reg (MOVSBL, MOVZWL, MOVSLQ, ...).
pub fn emit_ext_rr(buf: &mut CodeBuffer, opc: u32, dst: Reg, src: Reg) {
    emit_modrm(buf, opc, dst, src);
}

/// Emit MOV reg, [mem] (load).
pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, mem: Mem) {
    emit_modrm_mem(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst as u8, mem);
}

/// Emit an extending load (MOVZBL/MOVSBL/MOVZWL/MOVSWL/MOVSLQ).
pub fn emit_load_ext(buf: &mut CodeBuffer, opc: u32, dst: Reg, mem: Mem) {
    emit_modrm_mem(buf, opc, dst as u8, mem);
}

/// Emit MOV [mem], reg (store).
pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, mem: Mem) {
    emit_modrm_mem(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src as u8, mem);
}

/// Emit MOV word [mem], reg.
pub fn emit_store16(buf: &mut CodeBuffer, src: Reg, mem: Mem) {
    emit_modrm_mem(buf, OPC_MOVL_EvGv | P_DATA16, src as u8, mem);
}

/// Emit MOV byte [mem], reg.
pub fn emit_store8(buf: &mut CodeBuffer, src: Reg, mem: Mem) {
    emit_modrm_mem(buf, OPC_MOVB_EvGv | P_REXB_R, src as u8, mem);
}

/// Emit MOV [mem], imm32 (sign-extended for 64-bit stores).
pub fn emit_store_imm(buf: &mut CodeBuffer, rexw: bool, mem: Mem, imm: i32) {
    emit_modrm_mem(buf, OPC_MOVL_EvIz | rexw_flag(rexw), 0, mem);
    buf.emit_u32(imm as u32);
}

/// Emit LEA dst, [mem].
pub fn emit_lea(buf: &mut CodeBuffer, rexw: bool, dst: Reg, mem: Mem) {
    emit_modrm_mem(buf, OPC_LEA | rexw_flag(rexw), dst as u8, mem);
}

// -- Bit operations --

/// Emit BSF/BSR/LZCNT/TZCNT dst, src.
pub fn emit_bitscan_rr(buf: &mut CodeBuffer, opc: u32, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, opc | rexw_flag(rexw), dst, src);
}

/// Emit BSF/BSR/LZCNT/TZCNT dst, [mem].
pub fn emit_bitscan_rm(buf: &mut CodeBuffer, opc: u32, rexw: bool, dst: Reg, mem: Mem) {
    emit_modrm_mem(buf, opc | rexw_flag(rexw), dst as u8, mem);
}

/// Emit BT-group reg, imm8. `ext` is the /r code (4 = BT .. 7 = BTC).
pub fn emit_bt_ri(buf: &mut CodeBuffer, ext: u8, rexw: bool, reg: Reg, bit: u8) {
    emit_modrm_ext(buf, OPC_GRPBT | rexw_flag(rexw), ext, reg);
    buf.emit_u8(bit);
}

/// Emit BT-group [mem], imm8.
pub fn emit_bt_mi(buf: &mut CodeBuffer, ext: u8, rexw: bool, mem: Mem, bit: u8) {
    emit_modrm_mem(buf, OPC_GRPBT | rexw_flag(rexw), ext, mem);
    buf.emit_u8(bit);
}

/// Emit BT-group r/m, reg (0F A3/AB/B3/BB).
pub fn emit_bt_rr(buf: &mut CodeBuffer, ext: u8, rexw: bool, rm: Reg, bit: Reg) {
    let opc = (OPC_BT_EvGv + (((ext - 4) as u32) << 3)) | rexw_flag(rexw);
    emit_modrm(buf, opc, bit, rm);
}

/// Emit BT-group [mem], reg.
pub fn emit_bt_mr(buf: &mut CodeBuffer, ext: u8, rexw: bool, mem: Mem, bit: Reg) {
    let opc = (OPC_BT_EvGv + (((ext - 4) as u32) << 3)) | rexw_flag(rexw);
    emit_modrm_mem(buf, opc, bit as u8, mem);
}

// -- Branches and comparisons --

/// Emit Jcc rel32 to absolute offset.
pub fn emit_jcc(buf: &mut CodeBuffer, cond: X86Cond, target_offset: usize) {
    let field = emit_jcc_fwd(buf, cond);
    buf.patch_rel32(field, target_offset);
}

/// Emit Jcc rel32 with an unresolved displacement; returns the offset
/// of the displacement field.
pub fn emit_jcc_fwd(buf: &mut CodeBuffer, cond: X86Cond) -> usize {
    emit_opc(buf, OPC_JCC_long + (cond as u32), 0, 0);
    let field = buf.offset();
    buf.emit_u32(0);
    field
}

/// Emit JMP rel32 to absolute offset.
pub fn emit_jmp(buf: &mut CodeBuffer, target_offset: usize) {
    let field = emit_jmp_fwd(buf);
    buf.patch_rel32(field, target_offset);
}

/// Emit JMP rel32 with an unresolved displacement; returns the offset
/// of the displacement field.
pub fn emit_jmp_fwd(buf: &mut CodeBuffer) -> usize {
    buf.emit_u8(OPC_JMP_long as u8);
    let field = buf.offset();
    buf.emit_u32(0);
    field
}

/// Emit CALL rel32 to absolute offset.
pub fn emit_call(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_CALL_Jz as u8);
    let field = buf.offset();
    buf.emit_u32(0);
    buf.patch_rel32(field, target_offset);
}

/// Emit a call to a host function by absolute address (via RAX).
pub fn emit_call_abs(buf: &mut CodeBuffer, addr: usize) {
    emit_mov_ri(buf, true, Reg::Rax, addr as u64);
    emit_call_reg(buf, Reg::Rax);
}

/// Emit indirect JMP through register.
pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::JmpN as u8, reg);
}

/// Emit indirect CALL through register.
pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
}

/// Emit SETcc dst (set byte on condition).
pub fn emit_setcc(buf: &mut CodeBuffer, cond: X86Cond, dst: Reg) {
    emit_modrm_ext(buf, OPC_SETCC + (cond as u32), 0, dst);
}

/// Emit CMOVcc dst, src (conditional move).
pub fn emit_cmovcc(buf: &mut CodeBuffer, cond: X86Cond, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, (OPC_CMOVCC + (cond as u32)) | rexw_flag(rexw), dst, src);
}

/// Emit TEST reg, reg.
pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, r1: Reg, r2: Reg) {
    emit_modrm(buf, OPC_TESTL | rexw_flag(rexw), r1, r2);
}

/// Emit TEST reg, imm32.
pub fn emit_test_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, imm: i32) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Test as u8, reg);
    buf.emit_u32(imm as u32);
}

/// Emit TEST [mem], reg.
pub fn emit_test_mr(buf: &mut CodeBuffer, rexw: bool, mem: Mem, reg: Reg) {
    emit_modrm_mem(buf, OPC_TESTL | rexw_flag(rexw), reg as u8, mem);
}

/// Emit TEST [mem], imm32.
pub fn emit_test_mi(buf: &mut CodeBuffer, rexw: bool, mem: Mem, imm: i32) {
    emit_modrm_mem(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Test as u8, mem);
    buf.emit_u32(imm as u32);
}

// -- SSE --

/// Emit an SSE op xmm, xmm.
pub fn emit_sse_rr(buf: &mut CodeBuffer, opc: u32, dst: Xmm, src: Xmm) {
    emit_modrm_raw(buf, opc, dst as u8, src as u8);
}

/// Emit an SSE op xmm, [mem] (or [mem], xmm for store opcodes).
pub fn emit_sse_rm(buf: &mut CodeBuffer, opc: u32, reg: Xmm, mem: Mem) {
    emit_modrm_mem(buf, opc, reg as u8, mem);
}

/// Emit MOVD xmm, r32.
pub fn emit_movd_to_xmm(buf: &mut CodeBuffer, dst: Xmm, src: Reg) {
    emit_modrm_raw(buf, OPC_MOVD_VyEy, dst as u8, src as u8);
}

/// Emit MOVD r32, xmm.
pub fn emit_movd_from_xmm(buf: &mut CodeBuffer, dst: Reg, src: Xmm) {
    emit_modrm_raw(buf, OPC_MOVD_EyVy, src as u8, dst as u8);
}

// -- Miscellaneous --

/// Emit PUSH reg.
pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_PUSH_r32 + (reg.low3() as u32), 0, reg as u8);
}

/// Emit POP reg.
pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_POP_r32 + (reg.low3() as u32), 0, reg as u8);
}

/// Emit RET.
pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_RET as u8);
}

/// Emit `n` bytes of NOP padding using recommended multi-byte NOPs.
pub fn emit_nops(buf: &mut CodeBuffer, mut n: usize) {
    const NOPS: [&[u8]; 4] = [
        &[0x90],
        &[0x66, 0x90],
        &[0x0F, 0x1F, 0x00],
        &[0x0F, 0x1F, 0x40, 0x00],
    ];
    while n > 0 {
        let k = n.min(NOPS.len());
        buf.emit_bytes(NOPS[k - 1]);
        n -= k;
    }
}

// ==========================================================
// X86_64CodeGen
// ==========================================================

/// x86-64 entry/exit trampolines.
///
/// Generated blocks are entered through the prologue as
/// `fn(env: *mut CpuState, block: *const u8) -> usize` and leave by
/// loading an exit code into EAX and jumping to `tb_ret_offset`.
pub struct X86_64CodeGen {
    pub prologue_offset: usize,
    pub tb_ret_offset: usize,
    pub code_gen_start: usize,
}

impl X86_64CodeGen {
    pub fn new() -> Self {
        Self {
            prologue_offset: 0,
            tb_ret_offset: 0,
            code_gen_start: 0,
        }
    }
}

impl Default for X86_64CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCodeGen for X86_64CodeGen {
    fn emit_prologue(&mut self, buf: &mut CodeBuffer) {
        self.prologue_offset = buf.offset();

        for &reg in CALLEE_SAVED {
            emit_push(buf, reg);
        }

        // mov rbp, rdi (first argument = env)
        emit_mov_rr(buf, true, ENV_REG, CALL_ARG_REGS[0]);

        // mov r15, [rbp + mem_base]
        emit_load(buf, true, MEM_BASE_REG, Mem::env(MEM_BASE_OFFSET));

        // sub rsp, STACK_ADDEND
        emit_arith_ri(buf, ArithOp::Sub, true, Reg::Rsp, STACK_ADDEND as i32);

        // jmp *rsi (second argument = block entry)
        emit_jmp_reg(buf, CALL_ARG_REGS[1]);
    }

    fn emit_epilogue(&mut self, buf: &mut CodeBuffer) {
        // Block return path: eax already holds the exit code.
        self.tb_ret_offset = buf.offset();

        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, STACK_ADDEND as i32);

        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(buf, reg);
        }

        emit_ret(buf);
        self.code_gen_start = buf.offset();
    }

    fn emit_exit(&self, buf: &mut CodeBuffer, code: usize) {
        emit_mov_ri(buf, false, Reg::Rax, code as u64);
        emit_jmp(buf, self.tb_ret_offset);
    }

    fn emit_goto_block(&self, buf: &mut CodeBuffer) -> usize {
        // Keep the rel32 field 4-byte aligned so it is patched with a
        // single aligned store.
        let target_align = (buf.offset() + 1 + 3) & !3;
        emit_nops(buf, target_align - (buf.offset() + 1));

        let jump = buf.offset();
        emit_jmp_fwd(buf);
        jump
    }

    fn patch_jump(&self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize) {
        buf.patch_rel32(jump_offset + 1, target_offset);
    }

    fn epilogue_offset(&self) -> usize {
        self.tb_ret_offset
    }

    fn code_gen_start(&self) -> usize {
        self.code_gen_start
    }
}
