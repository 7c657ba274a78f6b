//! Operand-shape dispatch tables.
//!
//! Each instruction family is a static `[[Option<EncodeFn>; SHAPES]; OPS]`
//! indexed by sub-operation and by the shape of its operands. Lowering
//! code hands over whatever locations the register allocator produced
//! and the table picks the encoding; a missing entry means the family
//! has no such form and is a lowering bug.

use crate::code_buffer::CodeBuffer;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{Reg, Xmm};

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Xmm(Xmm),
    Mem(Mem),
    Imm(i32),
}

/// Operand shape, destination first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Shape {
    RegReg,
    RegMem,
    MemReg,
    RegImm,
    MemImm,
    MemImm8,
    XmmXmm,
    XmmMem,
    MemXmm,
    XmmReg,
    RegXmm,
}

pub const SHAPES: usize = 11;

/// Operation width. Integer families use `B32`/`B64`, SSE families the
/// scalar or packed single-precision forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSize {
    B32,
    B64,
    PackedSingle,
    ScalarSingle,
}

impl OpSize {
    fn rexw(self) -> bool {
        self == OpSize::B64
    }
}

pub type EncodeFn = fn(&mut CodeBuffer, u8, OpSize, Operand, Operand);

pub type OpTable<const N: usize> = [[Option<EncodeFn>; SHAPES]; N];

impl Shape {
    /// Classify an operand pair. `Mem, Imm` prefers the imm8 form when
    /// the value fits.
    pub fn of(dst: Operand, src: Operand) -> Option<Shape> {
        use Operand::*;
        Some(match (dst, src) {
            (Reg(_), Reg(_)) => Shape::RegReg,
            (Reg(_), Mem(_)) => Shape::RegMem,
            (Mem(_), Reg(_)) => Shape::MemReg,
            (Reg(_), Imm(_)) => Shape::RegImm,
            (Mem(_), Imm(i)) if (-128..=127).contains(&i) => Shape::MemImm8,
            (Mem(_), Imm(_)) => Shape::MemImm,
            (Xmm(_), Xmm(_)) => Shape::XmmXmm,
            (Xmm(_), Mem(_)) => Shape::XmmMem,
            (Mem(_), Xmm(_)) => Shape::MemXmm,
            (Xmm(_), Reg(_)) => Shape::XmmReg,
            (Reg(_), Xmm(_)) => Shape::RegXmm,
            _ => return None,
        })
    }
}

/// Encode `op dst, src` through `table`.
///
/// # Panics
/// If the family has no encoding for the operand shape.
pub fn encode<const N: usize>(
    table: &OpTable<N>,
    buf: &mut CodeBuffer,
    op: u8,
    size: OpSize,
    dst: Operand,
    src: Operand,
) {
    let shape = Shape::of(dst, src);
    let mut f = shape.and_then(|s| table[op as usize][s as usize]);
    // Tables without a dedicated imm8 slot take the imm32 form.
    if f.is_none() && shape == Some(Shape::MemImm8) {
        f = table[op as usize][Shape::MemImm as usize];
    }
    match f {
        Some(f) => f(buf, op, size, dst, src),
        None => panic!("no encoding for op {op} with {dst:?}, {src:?}"),
    }
}

/// Whether `table` has an encoding for `op` in `shape`.
pub fn supports<const N: usize>(table: &OpTable<N>, op: u8, shape: Shape) -> bool {
    table[op as usize][shape as usize].is_some()
}

fn reg(o: Operand) -> Reg {
    match o {
        Operand::Reg(r) => r,
        _ => unreachable!("expected register, got {o:?}"),
    }
}

fn xmm(o: Operand) -> Xmm {
    match o {
        Operand::Xmm(x) => x,
        _ => unreachable!("expected xmm, got {o:?}"),
    }
}

fn mem(o: Operand) -> Mem {
    match o {
        Operand::Mem(m) => m,
        _ => unreachable!("expected memory, got {o:?}"),
    }
}

fn imm(o: Operand) -> i32 {
    match o {
        Operand::Imm(i) => i,
        _ => unreachable!("expected immediate, got {o:?}"),
    }
}

// -- Group 1: ADD OR ADC SBB AND SUB XOR CMP --

const ARITH_OPS: [ArithOp; 8] = [
    ArithOp::Add,
    ArithOp::Or,
    ArithOp::Adc,
    ArithOp::Sbb,
    ArithOp::And,
    ArithOp::Sub,
    ArithOp::Xor,
    ArithOp::Cmp,
];

fn arith_rr(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_rr(buf, ARITH_OPS[op as usize], size.rexw(), reg(dst), reg(src));
}

fn arith_rm(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_rm(buf, ARITH_OPS[op as usize], size.rexw(), reg(dst), mem(src));
}

fn arith_mr(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_mr(buf, ARITH_OPS[op as usize], size.rexw(), mem(dst), reg(src));
}

fn arith_ri(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_ri(buf, ARITH_OPS[op as usize], size.rexw(), reg(dst), imm(src));
}

fn arith_mi(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_mi(buf, ARITH_OPS[op as usize], size.rexw(), mem(dst), imm(src));
}

fn arith_mi8(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_arith_mi8(buf, ARITH_OPS[op as usize], size.rexw(), mem(dst), imm(src) as i8);
}

fn sse_arith_opc(op: u8, size: OpSize) -> u32 {
    let base = match ARITH_OPS[op as usize] {
        ArithOp::Add => OPC_ADDPS,
        ArithOp::Sub => OPC_SUBPS,
        ArithOp::And => OPC_ANDPS,
        ArithOp::Or => OPC_ORPS,
        ArithOp::Xor => OPC_XORPS,
        ArithOp::Cmp => return OPC_UCOMISS,
        other => unreachable!("{other:?} has no SSE form"),
    };
    match size {
        OpSize::ScalarSingle if matches!(ARITH_OPS[op as usize], ArithOp::Add | ArithOp::Sub) => {
            base | P_SIMDF3
        }
        _ => base,
    }
}

fn arith_xx(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_sse_rr(buf, sse_arith_opc(op, size), xmm(dst), xmm(src));
}

fn arith_xm(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_sse_rm(buf, sse_arith_opc(op, size), xmm(dst), mem(src));
}

const fn group1_row(vector: bool) -> [Option<EncodeFn>; SHAPES] {
    let mut row: [Option<EncodeFn>; SHAPES] = [None; SHAPES];
    row[Shape::RegReg as usize] = Some(arith_rr);
    row[Shape::RegMem as usize] = Some(arith_rm);
    row[Shape::MemReg as usize] = Some(arith_mr);
    row[Shape::RegImm as usize] = Some(arith_ri);
    row[Shape::MemImm as usize] = Some(arith_mi);
    row[Shape::MemImm8 as usize] = Some(arith_mi8);
    if vector {
        row[Shape::XmmXmm as usize] = Some(arith_xx);
        row[Shape::XmmMem as usize] = Some(arith_xm);
    }
    row
}

/// Indexed by `ArithOp as u8`. ADC/SBB have no vector forms.
pub static GROUP1: OpTable<8> = [
    group1_row(true),  // Add
    group1_row(true),  // Or
    group1_row(false), // Adc
    group1_row(false), // Sbb
    group1_row(true),  // And
    group1_row(true),  // Sub
    group1_row(true),  // Xor
    group1_row(true),  // Cmp
];

// -- TEST and the BT group --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TestOp {
    Test = 0,
    Bt = 1,
    Bts = 2,
    Btr = 3,
    Btc = 4,
}

fn test_rr(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_test_rr(buf, size.rexw(), reg(dst), reg(src));
}

fn test_mr(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_test_mr(buf, size.rexw(), mem(dst), reg(src));
}

fn test_ri(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_test_ri(buf, size.rexw(), reg(dst), imm(src));
}

fn test_mi(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_test_mi(buf, size.rexw(), mem(dst), imm(src));
}

// TestOp::Bt..Btc map onto /4../7.
fn bt_ext(op: u8) -> u8 {
    op + 3
}

fn bt_rr(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bt_rr(buf, bt_ext(op), size.rexw(), reg(dst), reg(src));
}

fn bt_mr(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bt_mr(buf, bt_ext(op), size.rexw(), mem(dst), reg(src));
}

fn bt_ri(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bt_ri(buf, bt_ext(op), size.rexw(), reg(dst), imm(src) as u8);
}

fn bt_mi8(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bt_mi(buf, bt_ext(op), size.rexw(), mem(dst), imm(src) as u8);
}

const TEST_ROW: [Option<EncodeFn>; SHAPES] = {
    let mut row: [Option<EncodeFn>; SHAPES] = [None; SHAPES];
    row[Shape::RegReg as usize] = Some(test_rr);
    row[Shape::MemReg as usize] = Some(test_mr);
    row[Shape::RegImm as usize] = Some(test_ri);
    row[Shape::MemImm as usize] = Some(test_mi);
    row
};

const BT_ROW: [Option<EncodeFn>; SHAPES] = {
    let mut row: [Option<EncodeFn>; SHAPES] = [None; SHAPES];
    row[Shape::RegReg as usize] = Some(bt_rr);
    row[Shape::MemReg as usize] = Some(bt_mr);
    row[Shape::RegImm as usize] = Some(bt_ri);
    row[Shape::MemImm8 as usize] = Some(bt_mi8);
    row
};

/// Indexed by `TestOp as u8`.
pub static TEST_GROUP: OpTable<5> = [TEST_ROW, BT_ROW, BT_ROW, BT_ROW, BT_ROW];

// -- Bit scans --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanOp {
    Bsf = 0,
    Bsr = 1,
    Lzcnt = 2,
    Tzcnt = 3,
}

const SCAN_OPC: [u32; 4] = [OPC_BSF, OPC_BSR, OPC_LZCNT, OPC_TZCNT];

fn scan_rr(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bitscan_rr(buf, SCAN_OPC[op as usize], size.rexw(), reg(dst), reg(src));
}

fn scan_rm(buf: &mut CodeBuffer, op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_bitscan_rm(buf, SCAN_OPC[op as usize], size.rexw(), reg(dst), mem(src));
}

const SCAN_ROW: [Option<EncodeFn>; SHAPES] = {
    let mut row: [Option<EncodeFn>; SHAPES] = [None; SHAPES];
    row[Shape::RegReg as usize] = Some(scan_rr);
    row[Shape::RegMem as usize] = Some(scan_rm);
    row
};

/// Indexed by `ScanOp as u8`.
pub static BIT_SCAN: OpTable<4> = [SCAN_ROW; 4];

// -- Moves --

fn mov_rr(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_mov_rr(buf, size.rexw(), reg(dst), reg(src));
}

fn mov_rm(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_load(buf, size.rexw(), reg(dst), mem(src));
}

fn mov_mr(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_store(buf, size.rexw(), reg(src), mem(dst));
}

fn mov_ri(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    let v = imm(src);
    let val = if size.rexw() { v as i64 as u64 } else { v as u32 as u64 };
    emit_mov_ri(buf, size.rexw(), reg(dst), val);
}

fn mov_mi(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_store_imm(buf, size.rexw(), mem(dst), imm(src));
}

fn sse_load_opc(size: OpSize) -> u32 {
    match size {
        OpSize::ScalarSingle => OPC_MOVSS_VxWx,
        _ => OPC_MOVUPS_VxWx,
    }
}

fn sse_store_opc(size: OpSize) -> u32 {
    match size {
        OpSize::ScalarSingle => OPC_MOVSS_WxVx,
        _ => OPC_MOVUPS_WxVx,
    }
}

fn mov_xx(buf: &mut CodeBuffer, _op: u8, _size: OpSize, dst: Operand, src: Operand) {
    // Whole-register copy for both widths.
    emit_sse_rr(buf, OPC_MOVAPS, xmm(dst), xmm(src));
}

fn mov_xm(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_sse_rm(buf, sse_load_opc(size), xmm(dst), mem(src));
}

fn mov_mx(buf: &mut CodeBuffer, _op: u8, size: OpSize, dst: Operand, src: Operand) {
    emit_sse_rm(buf, sse_store_opc(size), xmm(src), mem(dst));
}

fn mov_xr(buf: &mut CodeBuffer, _op: u8, _size: OpSize, dst: Operand, src: Operand) {
    emit_movd_to_xmm(buf, xmm(dst), reg(src));
}

fn mov_rx(buf: &mut CodeBuffer, _op: u8, _size: OpSize, dst: Operand, src: Operand) {
    emit_movd_from_xmm(buf, reg(dst), xmm(src));
}

/// The single MOV family: integer moves, SSE loads/stores (MOVSS for
/// `ScalarSingle`, MOVUPS otherwise) and MOVD between the two files.
pub static MOVE: OpTable<1> = [[
    Some(mov_rr),
    Some(mov_rm),
    Some(mov_mr),
    Some(mov_ri),
    Some(mov_mi),
    None,
    Some(mov_xx),
    Some(mov_xm),
    Some(mov_mx),
    Some(mov_xr),
    Some(mov_rx),
]];

/// `mov dst, src` for any operand pair the allocator hands out.
pub fn emit_move(buf: &mut CodeBuffer, size: OpSize, dst: Operand, src: Operand) {
    encode(&MOVE, buf, 0, size, dst, src);
}

/// `op dst, src` for a group-1 operation.
pub fn emit_group1(buf: &mut CodeBuffer, op: ArithOp, size: OpSize, dst: Operand, src: Operand) {
    encode(&GROUP1, buf, op as u8, size, dst, src);
}
