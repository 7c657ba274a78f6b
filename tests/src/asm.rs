//! R5900 instruction encoders.
//!
//! Register arguments are raw register numbers. Branch offsets are in
//! instructions relative to the delay slot, as in the encoding.

use eerec_frontend::r5900::insn::{cop0, cop1, cop2, funct, opc, regimm};

pub const NOP: u32 = 0;

// ── Formats ───────────────────────────────────────────────────

fn enc_r(op: u8, rs: u8, rt: u8, rd: u8, sa: u8, f: u8) -> u32 {
    (op as u32) << 26
        | (rs as u32 & 31) << 21
        | (rt as u32 & 31) << 16
        | (rd as u32 & 31) << 11
        | (sa as u32 & 31) << 6
        | (f as u32 & 63)
}

fn enc_i(op: u8, rs: u8, rt: u8, imm: u16) -> u32 {
    (op as u32) << 26 | (rs as u32 & 31) << 21 | (rt as u32 & 31) << 16 | imm as u32
}

fn special(rs: u8, rt: u8, rd: u8, sa: u8, f: u8) -> u32 {
    enc_r(opc::SPECIAL, rs, rt, rd, sa, f)
}

// ── Integer ───────────────────────────────────────────────────

pub fn addiu(rt: u8, rs: u8, imm: i16) -> u32 {
    enc_i(opc::ADDIU, rs, rt, imm as u16)
}
pub fn daddiu(rt: u8, rs: u8, imm: i16) -> u32 {
    enc_i(opc::DADDIU, rs, rt, imm as u16)
}
pub fn slti(rt: u8, rs: u8, imm: i16) -> u32 {
    enc_i(opc::SLTI, rs, rt, imm as u16)
}
pub fn sltiu(rt: u8, rs: u8, imm: i16) -> u32 {
    enc_i(opc::SLTIU, rs, rt, imm as u16)
}
pub fn andi(rt: u8, rs: u8, imm: u16) -> u32 {
    enc_i(opc::ANDI, rs, rt, imm)
}
pub fn ori(rt: u8, rs: u8, imm: u16) -> u32 {
    enc_i(opc::ORI, rs, rt, imm)
}
pub fn xori(rt: u8, rs: u8, imm: u16) -> u32 {
    enc_i(opc::XORI, rs, rt, imm)
}
pub fn lui(rt: u8, imm: u16) -> u32 {
    enc_i(opc::LUI, 0, rt, imm)
}

pub fn addu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::ADDU)
}
pub fn add(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::ADD)
}
pub fn subu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SUBU)
}
pub fn daddu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::DADDU)
}
pub fn dsubu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::DSUBU)
}
pub fn and(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::AND)
}
pub fn or(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::OR)
}
pub fn xor(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::XOR)
}
pub fn nor(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::NOR)
}
pub fn slt(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SLT)
}
pub fn sltu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SLTU)
}

pub fn sll(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::SLL)
}
pub fn srl(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::SRL)
}
pub fn sra(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::SRA)
}
pub fn dsll(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSLL)
}
pub fn dsrl(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSRL)
}
pub fn dsra(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSRA)
}
pub fn dsll32(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSLL32)
}
pub fn dsrl32(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSRL32)
}
pub fn dsra32(rd: u8, rt: u8, sa: u8) -> u32 {
    special(0, rt, rd, sa, funct::DSRA32)
}
pub fn sllv(rd: u8, rt: u8, rs: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SLLV)
}
pub fn srlv(rd: u8, rt: u8, rs: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SRLV)
}
pub fn srav(rd: u8, rt: u8, rs: u8) -> u32 {
    special(rs, rt, rd, 0, funct::SRAV)
}

pub fn movz(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::MOVZ)
}
pub fn movn(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::MOVN)
}
pub fn mfhi(rd: u8) -> u32 {
    special(0, 0, rd, 0, funct::MFHI)
}
pub fn mflo(rd: u8) -> u32 {
    special(0, 0, rd, 0, funct::MFLO)
}
pub fn mthi(rs: u8) -> u32 {
    special(rs, 0, 0, 0, funct::MTHI)
}
pub fn mtlo(rs: u8) -> u32 {
    special(rs, 0, 0, 0, funct::MTLO)
}
pub fn mult(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::MULT)
}
pub fn multu(rd: u8, rs: u8, rt: u8) -> u32 {
    special(rs, rt, rd, 0, funct::MULTU)
}
pub fn div(rs: u8, rt: u8) -> u32 {
    special(rs, rt, 0, 0, funct::DIV)
}
pub fn divu(rs: u8, rt: u8) -> u32 {
    special(rs, rt, 0, 0, funct::DIVU)
}
pub fn plzcw(rd: u8, rs: u8) -> u32 {
    enc_r(opc::MMI, rs, 0, rd, 0, funct::PLZCW)
}

// ── Control flow ──────────────────────────────────────────────

pub fn beq(rs: u8, rt: u8, off: i16) -> u32 {
    enc_i(opc::BEQ, rs, rt, off as u16)
}
pub fn bne(rs: u8, rt: u8, off: i16) -> u32 {
    enc_i(opc::BNE, rs, rt, off as u16)
}
pub fn beql(rs: u8, rt: u8, off: i16) -> u32 {
    enc_i(opc::BEQL, rs, rt, off as u16)
}
pub fn bnel(rs: u8, rt: u8, off: i16) -> u32 {
    enc_i(opc::BNEL, rs, rt, off as u16)
}
pub fn blez(rs: u8, off: i16) -> u32 {
    enc_i(opc::BLEZ, rs, 0, off as u16)
}
pub fn bgtz(rs: u8, off: i16) -> u32 {
    enc_i(opc::BGTZ, rs, 0, off as u16)
}
pub fn blezl(rs: u8, off: i16) -> u32 {
    enc_i(opc::BLEZL, rs, 0, off as u16)
}
pub fn bgtzl(rs: u8, off: i16) -> u32 {
    enc_i(opc::BGTZL, rs, 0, off as u16)
}
pub fn bltz(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BLTZ, off as u16)
}
pub fn bgez(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BGEZ, off as u16)
}
pub fn bltzl(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BLTZL, off as u16)
}
pub fn bgezl(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BGEZL, off as u16)
}
pub fn bltzal(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BLTZAL, off as u16)
}
pub fn bgezal(rs: u8, off: i16) -> u32 {
    enc_i(opc::REGIMM, rs, regimm::BGEZAL, off as u16)
}

/// J to absolute address `addr` (same 256 MiB region).
pub fn j(addr: u32) -> u32 {
    (opc::J as u32) << 26 | (addr >> 2) & 0x03ff_ffff
}
pub fn jal(addr: u32) -> u32 {
    (opc::JAL as u32) << 26 | (addr >> 2) & 0x03ff_ffff
}
pub fn jr(rs: u8) -> u32 {
    special(rs, 0, 0, 0, funct::JR)
}
pub fn jalr(rd: u8, rs: u8) -> u32 {
    special(rs, 0, rd, 0, funct::JALR)
}

pub fn syscall(code: u32) -> u32 {
    (code & 0xf_ffff) << 6 | funct::SYSCALL as u32
}
pub fn brk(code: u32) -> u32 {
    (code & 0xf_ffff) << 6 | funct::BREAK as u32
}
pub fn eret() -> u32 {
    (opc::COP0 as u32) << 26 | 1 << 25 | cop0::ERET as u32
}

// ── Memory ────────────────────────────────────────────────────

macro_rules! mem_op {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(rt: u8, base: u8, off: i16) -> u32 {
                enc_i(opc::$op, base, rt, off as u16)
            }
        )*
    };
}

mem_op! {
    lb => LB, lbu => LBU, lh => LH, lhu => LHU, lw => LW, lwu => LWU, ld => LD, lq => LQ,
    sb => SB, sh => SH, sw => SW, sd => SD, sq => SQ,
    lwc1 => LWC1, swc1 => SWC1,
}

// ── COP1 ──────────────────────────────────────────────────────

fn cop1_move(fmt: u8, rt: u8, fs: u8) -> u32 {
    enc_r(opc::COP1, fmt, rt, fs, 0, 0)
}

pub fn mfc1(rt: u8, fs: u8) -> u32 {
    cop1_move(cop1::MFC1, rt, fs)
}
pub fn mtc1(rt: u8, fs: u8) -> u32 {
    cop1_move(cop1::MTC1, rt, fs)
}
pub fn cfc1(rt: u8, fs: u8) -> u32 {
    cop1_move(cop1::CFC1, rt, fs)
}
pub fn ctc1(rt: u8, fs: u8) -> u32 {
    cop1_move(cop1::CTC1, rt, fs)
}

/// Single-precision arithmetic with function code `f`.
pub fn fpu_s(f: u8, fd: u8, fs: u8, ft: u8) -> u32 {
    enc_r(opc::COP1, cop1::FMT_S, ft, fs, fd, f)
}

pub fn add_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::ADD, fd, fs, ft)
}
pub fn sub_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::SUB, fd, fs, ft)
}
pub fn mul_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::MUL, fd, fs, ft)
}
pub fn div_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::DIV, fd, fs, ft)
}
pub fn sqrt_s(fd: u8, ft: u8) -> u32 {
    fpu_s(cop1::SQRT, fd, 0, ft)
}
pub fn abs_s(fd: u8, fs: u8) -> u32 {
    fpu_s(cop1::ABS, fd, fs, 0)
}
pub fn mov_s(fd: u8, fs: u8) -> u32 {
    fpu_s(cop1::MOV, fd, fs, 0)
}
pub fn neg_s(fd: u8, fs: u8) -> u32 {
    fpu_s(cop1::NEG, fd, fs, 0)
}
pub fn adda_s(fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::ADDA, 0, fs, ft)
}
pub fn madd_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::MADD, fd, fs, ft)
}
pub fn c_lt_s(fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::C_LT, 0, fs, ft)
}
pub fn c_eq_s(fs: u8, ft: u8) -> u32 {
    fpu_s(cop1::C_EQ, 0, fs, ft)
}
pub fn cvt_w_s(fd: u8, fs: u8) -> u32 {
    fpu_s(cop1::CVT_W, fd, fs, 0)
}
pub fn cvt_s_w(fd: u8, fs: u8) -> u32 {
    enc_r(opc::COP1, cop1::FMT_W, 0, fs, fd, cop1::CVT_S)
}

fn bc1(tf: u8, likely: bool, off: i16) -> u32 {
    enc_i(opc::COP1, cop1::BC1, (likely as u8) << 1 | tf, off as u16)
}
pub fn bc1f(off: i16) -> u32 {
    bc1(0, false, off)
}
pub fn bc1t(off: i16) -> u32 {
    bc1(1, false, off)
}
pub fn bc1fl(off: i16) -> u32 {
    bc1(0, true, off)
}
pub fn bc1tl(off: i16) -> u32 {
    bc1(1, true, off)
}

// ── COP2 ──────────────────────────────────────────────────────

pub fn qmfc2(rt: u8, fs: u8) -> u32 {
    enc_r(opc::COP2, cop2::QMFC2, rt, fs, 0, 0)
}
pub fn qmtc2(rt: u8, fs: u8) -> u32 {
    enc_r(opc::COP2, cop2::QMTC2, rt, fs, 0, 0)
}
pub fn cfc2(rt: u8, id: u8) -> u32 {
    enc_r(opc::COP2, cop2::CFC2, rt, id, 0, 0)
}
pub fn ctc2(rt: u8, id: u8) -> u32 {
    enc_r(opc::COP2, cop2::CTC2, rt, id, 0, 0)
}

fn vop(dest: u8, ft: u8, fs: u8, fd: u8, f: u8) -> u32 {
    (opc::COP2 as u32) << 26
        | 1 << 25
        | (dest as u32 & 15) << 21
        | (ft as u32 & 31) << 16
        | (fs as u32 & 31) << 11
        | (fd as u32 & 31) << 6
        | f as u32
}

pub fn vadd(dest: u8, fd: u8, fs: u8, ft: u8) -> u32 {
    vop(dest, ft, fs, fd, cop2::VADD)
}
pub fn vsub(dest: u8, fd: u8, fs: u8, ft: u8) -> u32 {
    vop(dest, ft, fs, fd, cop2::VSUB)
}
pub fn vmul(dest: u8, fd: u8, fs: u8, ft: u8) -> u32 {
    vop(dest, ft, fs, fd, cop2::VMUL)
}

/// Special-2 form: the index is split over the `fd` field and the low
/// two function bits.
fn vspecial2(dest: u8, ft: u8, fs: u8, index: u32) -> u32 {
    vop(dest, ft, fs, (index >> 2) as u8, 0x3c | (index & 3) as u8)
}

pub fn vabs(dest: u8, ft: u8, fs: u8) -> u32 {
    vspecial2(dest, ft, fs, cop2::VABS)
}
pub fn vmove(dest: u8, ft: u8, fs: u8) -> u32 {
    vspecial2(dest, ft, fs, cop2::VMOVE)
}
pub fn vnop() -> u32 {
    vspecial2(0, 0, 0, cop2::VNOP)
}
pub fn vcallms(imm: u16) -> u32 {
    (opc::COP2 as u32) << 26 | 1 << 25 | (imm as u32 & 0x7fff) << 6 | cop2::VCALLMS as u32
}

/// Serialize instruction words little-endian.
pub fn bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
