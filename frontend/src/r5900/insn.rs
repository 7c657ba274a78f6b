//! R5900 instruction formats and decoding.

use eerec_core::{Cond, Width};
use modular_bitfield::{bitfield, specifiers::*};

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct IType {
    pub imm: B16,
    pub rt: B5,
    pub rs: B5,
    pub op: B6,
}

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct JType {
    pub target: B26,
    pub op: B6,
}

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct RType {
    pub funct: B6,
    pub sa: B5,
    pub rd: B5,
    pub rt: B5,
    pub rs: B5,
    pub op: B6,
}

/// COP1 arithmetic format.
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct FType {
    pub funct: B6,
    pub fd: B5,
    pub fs: B5,
    pub ft: B5,
    pub fmt: B5,
    pub op: B6,
}

/// COP2 macro-instruction format.
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VType {
    pub funct: B6,
    pub fd: B5,
    pub fs: B5,
    pub ft: B5,
    /// Lane mask, x in bit 3.
    pub dest: B4,
    pub co: B1,
    pub op: B6,
}

pub fn itype(word: u32) -> IType {
    IType::from_bytes(word.to_le_bytes())
}

pub fn jtype(word: u32) -> JType {
    JType::from_bytes(word.to_le_bytes())
}

pub fn rtype(word: u32) -> RType {
    RType::from_bytes(word.to_le_bytes())
}

pub fn ftype(word: u32) -> FType {
    FType::from_bytes(word.to_le_bytes())
}

pub fn vtype(word: u32) -> VType {
    VType::from_bytes(word.to_le_bytes())
}

// -- Opcode numbers --

pub mod opc {
    pub const SPECIAL: u8 = 0x00;
    pub const REGIMM: u8 = 0x01;
    pub const J: u8 = 0x02;
    pub const JAL: u8 = 0x03;
    pub const BEQ: u8 = 0x04;
    pub const BNE: u8 = 0x05;
    pub const BLEZ: u8 = 0x06;
    pub const BGTZ: u8 = 0x07;
    pub const ADDI: u8 = 0x08;
    pub const ADDIU: u8 = 0x09;
    pub const SLTI: u8 = 0x0a;
    pub const SLTIU: u8 = 0x0b;
    pub const ANDI: u8 = 0x0c;
    pub const ORI: u8 = 0x0d;
    pub const XORI: u8 = 0x0e;
    pub const LUI: u8 = 0x0f;
    pub const COP0: u8 = 0x10;
    pub const COP1: u8 = 0x11;
    pub const COP2: u8 = 0x12;
    pub const BEQL: u8 = 0x14;
    pub const BNEL: u8 = 0x15;
    pub const BLEZL: u8 = 0x16;
    pub const BGTZL: u8 = 0x17;
    pub const DADDI: u8 = 0x18;
    pub const DADDIU: u8 = 0x19;
    pub const MMI: u8 = 0x1c;
    pub const LQ: u8 = 0x1e;
    pub const SQ: u8 = 0x1f;
    pub const LB: u8 = 0x20;
    pub const LH: u8 = 0x21;
    pub const LW: u8 = 0x23;
    pub const LBU: u8 = 0x24;
    pub const LHU: u8 = 0x25;
    pub const LWU: u8 = 0x27;
    pub const SB: u8 = 0x28;
    pub const SH: u8 = 0x29;
    pub const SW: u8 = 0x2b;
    pub const LWC1: u8 = 0x31;
    pub const LD: u8 = 0x37;
    pub const SWC1: u8 = 0x39;
    pub const SD: u8 = 0x3f;
}

pub mod funct {
    pub const SLL: u8 = 0x00;
    pub const SRL: u8 = 0x02;
    pub const SRA: u8 = 0x03;
    pub const SLLV: u8 = 0x04;
    pub const SRLV: u8 = 0x06;
    pub const SRAV: u8 = 0x07;
    pub const JR: u8 = 0x08;
    pub const JALR: u8 = 0x09;
    pub const MOVZ: u8 = 0x0a;
    pub const MOVN: u8 = 0x0b;
    pub const SYSCALL: u8 = 0x0c;
    pub const BREAK: u8 = 0x0d;
    pub const MFHI: u8 = 0x10;
    pub const MTHI: u8 = 0x11;
    pub const MFLO: u8 = 0x12;
    pub const MTLO: u8 = 0x13;
    pub const MULT: u8 = 0x18;
    pub const MULTU: u8 = 0x19;
    pub const DIV: u8 = 0x1a;
    pub const DIVU: u8 = 0x1b;
    pub const ADD: u8 = 0x20;
    pub const ADDU: u8 = 0x21;
    pub const SUB: u8 = 0x22;
    pub const SUBU: u8 = 0x23;
    pub const AND: u8 = 0x24;
    pub const OR: u8 = 0x25;
    pub const XOR: u8 = 0x26;
    pub const NOR: u8 = 0x27;
    pub const SLT: u8 = 0x2a;
    pub const SLTU: u8 = 0x2b;
    pub const DADD: u8 = 0x2c;
    pub const DADDU: u8 = 0x2d;
    pub const DSUB: u8 = 0x2e;
    pub const DSUBU: u8 = 0x2f;
    pub const DSLL: u8 = 0x38;
    pub const DSRL: u8 = 0x3a;
    pub const DSRA: u8 = 0x3b;
    pub const DSLL32: u8 = 0x3c;
    pub const DSRL32: u8 = 0x3e;
    pub const DSRA32: u8 = 0x3f;

    /// MMI function field of PLZCW.
    pub const PLZCW: u8 = 0x04;
}

pub mod regimm {
    pub const BLTZ: u8 = 0x00;
    pub const BGEZ: u8 = 0x01;
    pub const BLTZL: u8 = 0x02;
    pub const BGEZL: u8 = 0x03;
    pub const BLTZAL: u8 = 0x10;
    pub const BGEZAL: u8 = 0x11;
    pub const BLTZALL: u8 = 0x12;
    pub const BGEZALL: u8 = 0x13;
}

pub mod cop0 {
    /// Function code of ERET (with the CO bit set).
    pub const ERET: u8 = 0x18;
}

pub mod cop1 {
    pub const MFC1: u8 = 0x00;
    pub const CFC1: u8 = 0x02;
    pub const MTC1: u8 = 0x04;
    pub const CTC1: u8 = 0x06;
    pub const BC1: u8 = 0x08;
    pub const FMT_S: u8 = 0x10;
    pub const FMT_W: u8 = 0x14;

    pub const ADD: u8 = 0x00;
    pub const SUB: u8 = 0x01;
    pub const MUL: u8 = 0x02;
    pub const DIV: u8 = 0x03;
    pub const SQRT: u8 = 0x04;
    pub const ABS: u8 = 0x05;
    pub const MOV: u8 = 0x06;
    pub const NEG: u8 = 0x07;
    pub const RSQRT: u8 = 0x16;
    pub const ADDA: u8 = 0x18;
    pub const SUBA: u8 = 0x19;
    pub const MULA: u8 = 0x1a;
    pub const MADD: u8 = 0x1c;
    pub const MSUB: u8 = 0x1d;
    pub const MADDA: u8 = 0x1e;
    pub const MSUBA: u8 = 0x1f;
    pub const CVT_S: u8 = 0x20;
    pub const CVT_W: u8 = 0x24;
    pub const MAX: u8 = 0x28;
    pub const MIN: u8 = 0x29;
    pub const C_F: u8 = 0x30;
    pub const C_EQ: u8 = 0x32;
    pub const C_LT: u8 = 0x34;
    pub const C_LE: u8 = 0x36;
}

pub mod cop2 {
    pub const QMFC2: u8 = 0x01;
    pub const CFC2: u8 = 0x02;
    pub const QMTC2: u8 = 0x05;
    pub const CTC2: u8 = 0x06;

    pub const VADD: u8 = 0x28;
    pub const VMUL: u8 = 0x2a;
    pub const VSUB: u8 = 0x2c;
    pub const VCALLMS: u8 = 0x38;

    /// Special-2 index (`(bits 10..6 << 2) | funct & 3`).
    pub const VABS: u32 = 0x1d;
    pub const VNOP: u32 = 0x2f;
    pub const VMOVE: u32 = 0x30;
}

// -- Decoded form --

/// Three-register integer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Addu,
    Subu,
    Daddu,
    Dsubu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

/// Register-immediate integer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmOp {
    Addiu,
    Daddiu,
    Andi,
    Ori,
    Xori,
    Slti,
    Sltiu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Sll,
    Srl,
    Sra,
    Dsll,
    Dsrl,
    Dsra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuMoveKind {
    Mov,
    Abs,
    Neg,
}

/// FPU operations evaluated by the numeric shim at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FpuOp {
    Add = 0,
    Sub,
    Mul,
    Div,
    Sqrt,
    Rsqrt,
    Adda,
    Suba,
    Mula,
    Madd,
    Msub,
    Madda,
    Msuba,
    Max,
    Min,
    CvtW,
    CvtS,
    CF,
    CEq,
    CLt,
    CLe,
}

impl FpuOp {
    pub const ALL: [FpuOp; 21] = [
        FpuOp::Add,
        FpuOp::Sub,
        FpuOp::Mul,
        FpuOp::Div,
        FpuOp::Sqrt,
        FpuOp::Rsqrt,
        FpuOp::Adda,
        FpuOp::Suba,
        FpuOp::Mula,
        FpuOp::Madd,
        FpuOp::Msub,
        FpuOp::Madda,
        FpuOp::Msuba,
        FpuOp::Max,
        FpuOp::Min,
        FpuOp::CvtW,
        FpuOp::CvtS,
        FpuOp::CF,
        FpuOp::CEq,
        FpuOp::CLt,
        FpuOp::CLe,
    ];

    pub fn from_raw(raw: u32) -> Option<FpuOp> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Writes the accumulator instead of `fd`.
    pub fn writes_acc(self) -> bool {
        matches!(
            self,
            FpuOp::Adda | FpuOp::Suba | FpuOp::Mula | FpuOp::Madda | FpuOp::Msuba
        )
    }

    /// Reads the accumulator.
    pub fn reads_acc(self) -> bool {
        matches!(
            self,
            FpuOp::Madd | FpuOp::Msub | FpuOp::Madda | FpuOp::Msuba
        )
    }

    pub fn is_compare(self) -> bool {
        matches!(self, FpuOp::CF | FpuOp::CEq | FpuOp::CLt | FpuOp::CLe)
    }

    /// Unary operations read only `fs` (SQRT reads `ft`).
    pub fn is_unary(self) -> bool {
        matches!(self, FpuOp::Sqrt | FpuOp::CvtW | FpuOp::CvtS)
    }
}

/// VU0 macro operations evaluated through a helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VuOp {
    Add = 0,
    Sub,
    Mul,
    Abs,
    Move,
}

impl VuOp {
    pub fn from_raw(raw: u32) -> Option<VuOp> {
        [VuOp::Add, VuOp::Sub, VuOp::Mul, VuOp::Abs, VuOp::Move]
            .get(raw as usize)
            .copied()
    }
}

/// How a branch decides whether it is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTest {
    /// Compare two GPRs (`rt` is r0 for the compare-with-zero forms).
    Compare { cond: Cond, rs: u8, rt: u8 },
    /// Test the FCR31 condition bit.
    Fpu { on_true: bool },
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alu { op: AluOp, rd: u8, rs: u8, rt: u8 },
    AluImm { op: ImmOp, rt: u8, rs: u8, imm: u16 },
    Lui { rt: u8, imm: u16 },
    /// Shift by a constant; `sa` already includes the +32 of the
    /// `*32` forms.
    Shift { kind: ShiftKind, rd: u8, rt: u8, sa: u8 },
    ShiftVar { kind: ShiftKind, rd: u8, rt: u8, rs: u8 },
    CondMove { rd: u8, rs: u8, rt: u8, on_zero: bool },
    MoveFromHiLo { rd: u8, hi: bool },
    MoveToHiLo { rs: u8, hi: bool },
    Plzcw { rd: u8, rs: u8 },

    Load { width: Width, signed: bool, rt: u8, base: u8, offset: i16 },
    Store { width: Width, rt: u8, base: u8, offset: i16 },
    Lwc1 { ft: u8, base: u8, offset: i16 },
    Swc1 { ft: u8, base: u8, offset: i16 },

    Mfc1 { rt: u8, fs: u8 },
    Mtc1 { rt: u8, fs: u8 },
    Cfc1 { rt: u8, fs: u8 },
    Ctc1 { rt: u8, fs: u8 },
    FpuMove { kind: FpuMoveKind, fd: u8, fs: u8 },
    Fpu { op: FpuOp, fd: u8, fs: u8, ft: u8 },

    Qmfc2 { rt: u8, fs: u8 },
    Qmtc2 { rt: u8, fs: u8 },
    Cfc2 { rt: u8, id: u8 },
    Ctc2 { rt: u8, id: u8 },
    Vu { op: VuOp, dest: u8, fd: u8, fs: u8, ft: u8 },
    Vnop,
    Vcallms { imm: u16 },

    Branch { test: BranchTest, offset: i16, likely: bool, link: bool },
    Jump { target: u32, link: bool },
    JumpReg { rs: u8, link: Option<u8> },
    Syscall { code: u32 },
    Break { code: u32 },

    /// Not lowered; executed by the interpreter.
    Fallback,
    /// Not lowered and may change the PC.
    FallbackJump,
}

/// Bit sets of guest state an instruction reads or writes.
pub mod mask {
    pub type RegMask = u128;

    pub const fn gpr(r: u8) -> RegMask {
        if r == 0 {
            0
        } else {
            1 << (r & 31)
        }
    }

    pub const fn fpr(r: u8) -> RegMask {
        1 << (32 + (r & 31) as u32)
    }

    pub const fn vf(r: u8) -> RegMask {
        1 << (64 + (r & 31) as u32)
    }

    pub const HI: RegMask = 1 << 96;
    pub const LO: RegMask = 1 << 97;
    pub const FCR31: RegMask = 1 << 98;
    pub const ACC: RegMask = 1 << 99;
    pub const MEMORY: RegMask = 1 << 100;
    /// VU0 control state (status, MAC, VI, ACC).
    pub const VU_CTRL: RegMask = 1 << 101;
    pub const ALL: RegMask = !0;
}

use mask::RegMask;

/// One decoded guest instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    pub pc: u32,
    pub raw: u32,
    pub op: Op,
}

impl Insn {
    pub fn decode(pc: u32, raw: u32) -> Insn {
        Insn {
            pc,
            raw,
            op: decode_op(raw),
        }
    }

    /// Has a delay slot.
    pub fn is_branch(&self) -> bool {
        matches!(
            self.op,
            Op::Branch { .. } | Op::Jump { .. } | Op::JumpReg { .. }
        )
    }

    /// Ends the block without a delay slot.
    pub fn ends_block(&self) -> bool {
        matches!(
            self.op,
            Op::Syscall { .. } | Op::Break { .. } | Op::FallbackJump
        )
    }

    /// May be compiled ahead of a branch: lowered inline, with its
    /// effects fully described by `reads`/`writes`.
    pub fn is_simple(&self) -> bool {
        !self.is_branch()
            && !self.ends_block()
            && !matches!(
                self.op,
                Op::Fallback
                    | Op::Qmfc2 { .. }
                    | Op::Qmtc2 { .. }
                    | Op::Cfc2 { .. }
                    | Op::Ctc2 { .. }
                    | Op::Vu { .. }
                    | Op::Vnop
                    | Op::Vcallms { .. }
            )
    }

    /// Guest state read by this instruction.
    pub fn reads(&self) -> RegMask {
        use mask::*;
        match self.op {
            Op::Alu { rs, rt, .. } => gpr(rs) | gpr(rt),
            Op::AluImm { rs, .. } => gpr(rs),
            Op::Lui { .. } => 0,
            Op::Shift { rt, .. } => gpr(rt),
            Op::ShiftVar { rt, rs, .. } => gpr(rt) | gpr(rs),
            Op::CondMove { rd, rs, rt, .. } => gpr(rd) | gpr(rs) | gpr(rt),
            Op::MoveFromHiLo { hi, .. } => {
                if hi {
                    HI
                } else {
                    LO
                }
            }
            Op::MoveToHiLo { rs, .. } => gpr(rs),
            Op::Plzcw { rs, .. } => gpr(rs),
            Op::Load { base, .. } | Op::Lwc1 { base, .. } => gpr(base) | MEMORY,
            Op::Store { rt, base, .. } => gpr(rt) | gpr(base),
            Op::Swc1 { ft, base, .. } => fpr(ft) | gpr(base),
            Op::Mfc1 { fs, .. } => fpr(fs),
            Op::Mtc1 { rt, .. } => gpr(rt),
            Op::Cfc1 { .. } => FCR31,
            Op::Ctc1 { rt, .. } => gpr(rt),
            Op::FpuMove { fs, .. } => fpr(fs),
            Op::Fpu { op, fs, ft, .. } => {
                let acc = if op.reads_acc() { ACC } else { 0 };
                let src = match op {
                    FpuOp::Sqrt => fpr(ft),
                    o if o.is_unary() => fpr(fs),
                    _ => fpr(fs) | fpr(ft),
                };
                src | acc | FCR31
            }
            Op::Qmfc2 { fs, .. } => vf(fs),
            Op::Qmtc2 { rt, .. } => gpr(rt),
            Op::Cfc2 { .. } => VU_CTRL,
            Op::Ctc2 { rt, .. } => gpr(rt) | VU_CTRL,
            Op::Vu { fs, ft, .. } => vf(fs) | vf(ft) | VU_CTRL,
            Op::Vnop => 0,
            Op::Vcallms { .. } => ALL,
            Op::Branch { test, .. } => match test {
                BranchTest::Compare { rs, rt, .. } => gpr(rs) | gpr(rt),
                BranchTest::Fpu { .. } => FCR31,
            },
            Op::Jump { .. } => 0,
            Op::JumpReg { rs, .. } => gpr(rs),
            Op::Syscall { .. } | Op::Break { .. } | Op::Fallback | Op::FallbackJump => ALL,
        }
    }

    /// Guest state written by this instruction.
    pub fn writes(&self) -> RegMask {
        use mask::*;
        match self.op {
            Op::Alu { rd, .. }
            | Op::Shift { rd, .. }
            | Op::ShiftVar { rd, .. }
            | Op::CondMove { rd, .. }
            | Op::MoveFromHiLo { rd, .. }
            | Op::Plzcw { rd, .. } => gpr(rd),
            Op::AluImm { rt, .. } | Op::Lui { rt, .. } => gpr(rt),
            Op::MoveToHiLo { hi, .. } => {
                if hi {
                    HI
                } else {
                    LO
                }
            }
            Op::Load { rt, .. } => gpr(rt),
            Op::Store { .. } | Op::Swc1 { .. } => MEMORY,
            Op::Lwc1 { ft, .. } => fpr(ft),
            Op::Mfc1 { rt, .. } | Op::Cfc1 { rt, .. } => gpr(rt),
            Op::Mtc1 { fs, .. } => fpr(fs),
            Op::Ctc1 { .. } => FCR31,
            Op::FpuMove { kind, fd, .. } => match kind {
                FpuMoveKind::Mov => fpr(fd),
                _ => fpr(fd) | FCR31,
            },
            Op::Fpu { op, fd, .. } => {
                if op.is_compare() {
                    FCR31
                } else if op.writes_acc() {
                    ACC | FCR31
                } else {
                    fpr(fd) | FCR31
                }
            }
            Op::Qmfc2 { rt, .. } | Op::Cfc2 { rt, .. } => gpr(rt),
            Op::Qmtc2 { fs, .. } => vf(fs),
            Op::Ctc2 { .. } => VU_CTRL,
            Op::Vu { op, ft, fd, .. } => match op {
                VuOp::Abs | VuOp::Move => vf(ft),
                _ => vf(fd) | VU_CTRL,
            },
            Op::Vnop => 0,
            Op::Vcallms { .. } => ALL,
            Op::Branch { link, .. } => {
                if link {
                    gpr(31)
                } else {
                    0
                }
            }
            Op::Jump { link, .. } => {
                if link {
                    gpr(31)
                } else {
                    0
                }
            }
            Op::JumpReg { link, .. } => link.map_or(0, gpr),
            Op::Syscall { .. } | Op::Break { .. } | Op::Fallback | Op::FallbackJump => ALL,
        }
    }

    /// Static branch target of a PC-relative branch or a J/JAL.
    pub fn branch_target(&self) -> Option<u32> {
        match self.op {
            Op::Branch { offset, .. } => Some(
                self.pc
                    .wrapping_add(4)
                    .wrapping_add(((offset as i32) << 2) as u32),
            ),
            Op::Jump { target, .. } => {
                Some((self.pc.wrapping_add(4) & 0xf000_0000) | (target << 2))
            }
            _ => None,
        }
    }
}

/// Whether `delay` may be compiled before `branch`.
///
/// Neither instruction may write anything the other reads or writes.
pub fn independent(branch: &Insn, delay: &Insn) -> bool {
    let (br, bw) = (branch.reads(), branch.writes());
    let (dr, dw) = (delay.reads(), delay.writes());
    bw & (dr | dw) == 0 && dw & (br | bw) == 0
}

fn decode_op(word: u32) -> Op {
    let i = itype(word);
    let (rs, rt, imm) = (i.rs(), i.rt(), i.imm());
    let offset = imm as i16;
    match i.op() {
        opc::SPECIAL => decode_special(word),
        opc::REGIMM => decode_regimm(rs, rt, offset),
        opc::J | opc::JAL => Op::Jump {
            target: jtype(word).target(),
            link: i.op() == opc::JAL,
        },
        op @ (opc::BEQ | opc::BNE | opc::BEQL | opc::BNEL) => Op::Branch {
            test: BranchTest::Compare {
                cond: if op & 1 == 0 { Cond::Eq } else { Cond::Ne },
                rs,
                rt,
            },
            offset,
            likely: op >= opc::BEQL,
            link: false,
        },
        op @ (opc::BLEZ | opc::BGTZ | opc::BLEZL | opc::BGTZL) => Op::Branch {
            test: BranchTest::Compare {
                cond: if op & 1 == 0 { Cond::Le } else { Cond::Gt },
                rs,
                rt: 0,
            },
            offset,
            likely: op >= opc::BEQL,
            link: false,
        },
        // Overflow traps are not modelled.
        opc::ADDI | opc::ADDIU => Op::AluImm { op: ImmOp::Addiu, rt, rs, imm },
        opc::DADDI | opc::DADDIU => Op::AluImm { op: ImmOp::Daddiu, rt, rs, imm },
        opc::SLTI => Op::AluImm { op: ImmOp::Slti, rt, rs, imm },
        opc::SLTIU => Op::AluImm { op: ImmOp::Sltiu, rt, rs, imm },
        opc::ANDI => Op::AluImm { op: ImmOp::Andi, rt, rs, imm },
        opc::ORI => Op::AluImm { op: ImmOp::Ori, rt, rs, imm },
        opc::XORI => Op::AluImm { op: ImmOp::Xori, rt, rs, imm },
        opc::LUI => Op::Lui { rt, imm },
        opc::COP0 if word & (1 << 25) != 0 && rtype(word).funct() == cop0::ERET => Op::FallbackJump,
        opc::COP1 => decode_cop1(word),
        opc::COP2 => decode_cop2(word),
        opc::MMI => {
            let r = rtype(word);
            if r.funct() == funct::PLZCW && r.rt() == 0 && r.sa() == 0 {
                Op::Plzcw { rd: r.rd(), rs }
            } else {
                Op::Fallback
            }
        }
        op @ (opc::LB | opc::LBU | opc::LH | opc::LHU | opc::LW | opc::LWU | opc::LD | opc::LQ) => {
            let (width, signed) = match op {
                opc::LB => (Width::B8, true),
                opc::LBU => (Width::B8, false),
                opc::LH => (Width::B16, true),
                opc::LHU => (Width::B16, false),
                opc::LW => (Width::B32, true),
                opc::LWU => (Width::B32, false),
                opc::LD => (Width::B64, false),
                _ => (Width::B128, false),
            };
            Op::Load { width, signed, rt, base: rs, offset }
        }
        op @ (opc::SB | opc::SH | opc::SW | opc::SD | opc::SQ) => {
            let width = match op {
                opc::SB => Width::B8,
                opc::SH => Width::B16,
                opc::SW => Width::B32,
                opc::SD => Width::B64,
                _ => Width::B128,
            };
            Op::Store { width, rt, base: rs, offset }
        }
        opc::LWC1 => Op::Lwc1 { ft: rt, base: rs, offset },
        opc::SWC1 => Op::Swc1 { ft: rt, base: rs, offset },
        _ => Op::Fallback,
    }
}

fn decode_special(word: u32) -> Op {
    let r = rtype(word);
    let (rs, rt, rd, sa) = (r.rs(), r.rt(), r.rd(), r.sa());
    let alu = |op| Op::Alu { op, rd, rs, rt };
    let shift = |kind, sa| Op::Shift { kind, rd, rt, sa };
    let shiftv = |kind| Op::ShiftVar { kind, rd, rt, rs };
    match r.funct() {
        funct::SLL => shift(ShiftKind::Sll, sa),
        funct::SRL => shift(ShiftKind::Srl, sa),
        funct::SRA => shift(ShiftKind::Sra, sa),
        funct::DSLL => shift(ShiftKind::Dsll, sa),
        funct::DSRL => shift(ShiftKind::Dsrl, sa),
        funct::DSRA => shift(ShiftKind::Dsra, sa),
        funct::DSLL32 => shift(ShiftKind::Dsll, sa + 32),
        funct::DSRL32 => shift(ShiftKind::Dsrl, sa + 32),
        funct::DSRA32 => shift(ShiftKind::Dsra, sa + 32),
        funct::SLLV => shiftv(ShiftKind::Sll),
        funct::SRLV => shiftv(ShiftKind::Srl),
        funct::SRAV => shiftv(ShiftKind::Sra),
        funct::JR => Op::JumpReg { rs, link: None },
        funct::JALR => Op::JumpReg { rs, link: Some(rd) },
        funct::MOVZ => Op::CondMove { rd, rs, rt, on_zero: true },
        funct::MOVN => Op::CondMove { rd, rs, rt, on_zero: false },
        funct::SYSCALL => Op::Syscall { code: (word >> 6) & 0xf_ffff },
        funct::BREAK => Op::Break { code: (word >> 6) & 0xf_ffff },
        funct::MFHI => Op::MoveFromHiLo { rd, hi: true },
        funct::MFLO => Op::MoveFromHiLo { rd, hi: false },
        funct::MTHI => Op::MoveToHiLo { rs, hi: true },
        funct::MTLO => Op::MoveToHiLo { rs, hi: false },
        funct::ADD | funct::ADDU => alu(AluOp::Addu),
        funct::SUB | funct::SUBU => alu(AluOp::Subu),
        funct::DADD | funct::DADDU => alu(AluOp::Daddu),
        funct::DSUB | funct::DSUBU => alu(AluOp::Dsubu),
        funct::AND => alu(AluOp::And),
        funct::OR => alu(AluOp::Or),
        funct::XOR => alu(AluOp::Xor),
        funct::NOR => alu(AluOp::Nor),
        funct::SLT => alu(AluOp::Slt),
        funct::SLTU => alu(AluOp::Sltu),
        _ => Op::Fallback,
    }
}

fn decode_regimm(rs: u8, rt: u8, offset: i16) -> Op {
    let (cond, likely, link) = match rt {
        regimm::BLTZ => (Cond::Lt, false, false),
        regimm::BGEZ => (Cond::Ge, false, false),
        regimm::BLTZL => (Cond::Lt, true, false),
        regimm::BGEZL => (Cond::Ge, true, false),
        regimm::BLTZAL => (Cond::Lt, false, true),
        regimm::BGEZAL => (Cond::Ge, false, true),
        regimm::BLTZALL => (Cond::Lt, true, true),
        regimm::BGEZALL => (Cond::Ge, true, true),
        _ => return Op::Fallback,
    };
    Op::Branch {
        test: BranchTest::Compare { cond, rs, rt: 0 },
        offset,
        likely,
        link,
    }
}

fn decode_cop1(word: u32) -> Op {
    let f = ftype(word);
    let (fs, ft, fd) = (f.fs(), f.ft(), f.fd());
    match f.fmt() {
        cop1::MFC1 => Op::Mfc1 { rt: ft, fs },
        cop1::MTC1 => Op::Mtc1 { rt: ft, fs },
        cop1::CFC1 => Op::Cfc1 { rt: ft, fs },
        cop1::CTC1 => Op::Ctc1 { rt: ft, fs },
        cop1::BC1 => {
            let likely = ft & 2 != 0;
            Op::Branch {
                test: BranchTest::Fpu { on_true: ft & 1 != 0 },
                offset: (word & 0xffff) as u16 as i16,
                likely,
                link: false,
            }
        }
        cop1::FMT_S => {
            let fpu = |op| Op::Fpu { op, fd, fs, ft };
            match f.funct() {
                cop1::ADD => fpu(FpuOp::Add),
                cop1::SUB => fpu(FpuOp::Sub),
                cop1::MUL => fpu(FpuOp::Mul),
                cop1::DIV => fpu(FpuOp::Div),
                cop1::SQRT => fpu(FpuOp::Sqrt),
                cop1::RSQRT => fpu(FpuOp::Rsqrt),
                cop1::ADDA => fpu(FpuOp::Adda),
                cop1::SUBA => fpu(FpuOp::Suba),
                cop1::MULA => fpu(FpuOp::Mula),
                cop1::MADD => fpu(FpuOp::Madd),
                cop1::MSUB => fpu(FpuOp::Msub),
                cop1::MADDA => fpu(FpuOp::Madda),
                cop1::MSUBA => fpu(FpuOp::Msuba),
                cop1::MAX => fpu(FpuOp::Max),
                cop1::MIN => fpu(FpuOp::Min),
                cop1::CVT_W => fpu(FpuOp::CvtW),
                cop1::C_F => fpu(FpuOp::CF),
                cop1::C_EQ => fpu(FpuOp::CEq),
                cop1::C_LT => fpu(FpuOp::CLt),
                cop1::C_LE => fpu(FpuOp::CLe),
                cop1::ABS => Op::FpuMove { kind: FpuMoveKind::Abs, fd, fs },
                cop1::MOV => Op::FpuMove { kind: FpuMoveKind::Mov, fd, fs },
                cop1::NEG => Op::FpuMove { kind: FpuMoveKind::Neg, fd, fs },
                _ => Op::Fallback,
            }
        }
        cop1::FMT_W if f.funct() == cop1::CVT_S => Op::Fpu {
            op: FpuOp::CvtS,
            fd,
            fs,
            ft,
        },
        _ => Op::Fallback,
    }
}

fn decode_cop2(word: u32) -> Op {
    let v = vtype(word);
    let (fs, ft, fd, dest) = (v.fs(), v.ft(), v.fd(), v.dest());
    if v.co() == 0 {
        let r = rtype(word);
        return match r.rs() {
            cop2::QMFC2 => Op::Qmfc2 { rt: r.rt(), fs: r.rd() },
            cop2::QMTC2 => Op::Qmtc2 { rt: r.rt(), fs: r.rd() },
            cop2::CFC2 => Op::Cfc2 { rt: r.rt(), id: r.rd() },
            cop2::CTC2 => Op::Ctc2 { rt: r.rt(), id: r.rd() },
            _ => Op::Fallback,
        };
    }
    let vu = |op| Op::Vu { op, dest, fd, fs, ft };
    match v.funct() {
        cop2::VADD => vu(VuOp::Add),
        cop2::VSUB => vu(VuOp::Sub),
        cop2::VMUL => vu(VuOp::Mul),
        cop2::VCALLMS => Op::Vcallms {
            imm: ((word >> 6) & 0x7fff) as u16,
        },
        f @ 0x3c..=0x3f => match ((fd as u32) << 2) | (f as u32 & 3) {
            cop2::VABS => vu(VuOp::Abs),
            cop2::VMOVE => vu(VuOp::Move),
            cop2::VNOP => Op::Vnop,
            _ => Op::Fallback,
        },
        _ => Op::Fallback,
    }
}
