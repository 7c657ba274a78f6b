use eerec_core::{Cond, Width};
use eerec_frontend::r5900::insn::mask;
use eerec_frontend::r5900::insn::*;

use crate::asm::*;

fn op(word: u32) -> Op {
    Insn::decode(0x1000, word).op
}

// ── integer ──

#[test]
fn test_decode_alu() {
    assert_eq!(
        op(addiu(1, 2, -3)),
        Op::AluImm { op: ImmOp::Addiu, rt: 1, rs: 2, imm: 0xfffd }
    );
    assert_eq!(op(ori(4, 5, 0xbeef)), Op::AluImm { op: ImmOp::Ori, rt: 4, rs: 5, imm: 0xbeef });
    assert_eq!(op(lui(7, 0x8000)), Op::Lui { rt: 7, imm: 0x8000 });
    assert_eq!(op(add(1, 2, 3)), Op::Alu { op: AluOp::Addu, rd: 1, rs: 2, rt: 3 });
    assert_eq!(op(dsubu(1, 2, 3)), Op::Alu { op: AluOp::Dsubu, rd: 1, rs: 2, rt: 3 });
    assert_eq!(op(nor(9, 8, 7)), Op::Alu { op: AluOp::Nor, rd: 9, rs: 8, rt: 7 });
    assert_eq!(op(sltu(1, 2, 3)), Op::Alu { op: AluOp::Sltu, rd: 1, rs: 2, rt: 3 });
}

#[test]
fn test_decode_shifts() {
    assert_eq!(op(sll(1, 2, 3)), Op::Shift { kind: ShiftKind::Sll, rd: 1, rt: 2, sa: 3 });
    assert_eq!(op(dsll32(3, 4, 5)), Op::Shift { kind: ShiftKind::Dsll, rd: 3, rt: 4, sa: 37 });
    assert_eq!(op(dsra32(3, 4, 0)), Op::Shift { kind: ShiftKind::Dsra, rd: 3, rt: 4, sa: 32 });
    assert_eq!(op(srav(1, 2, 3)), Op::ShiftVar { kind: ShiftKind::Sra, rd: 1, rt: 2, rs: 3 });
}

#[test]
fn test_decode_moves() {
    assert_eq!(op(movz(1, 2, 3)), Op::CondMove { rd: 1, rs: 2, rt: 3, on_zero: true });
    assert_eq!(op(movn(1, 2, 3)), Op::CondMove { rd: 1, rs: 2, rt: 3, on_zero: false });
    assert_eq!(op(mfhi(5)), Op::MoveFromHiLo { rd: 5, hi: true });
    assert_eq!(op(mtlo(6)), Op::MoveToHiLo { rs: 6, hi: false });
    assert_eq!(op(plzcw(3, 4)), Op::Plzcw { rd: 3, rs: 4 });
}

#[test]
fn test_unlowered_instructions_fall_back() {
    assert_eq!(op(mult(1, 2, 3)), Op::Fallback);
    assert_eq!(op(div(2, 3)), Op::Fallback);
    assert_eq!(op(divu(2, 3)), Op::Fallback);
    assert_eq!(op(eret()), Op::FallbackJump);
    // MFC0
    assert_eq!(op(0x4000_0000 | 1 << 16 | 12 << 11), Op::Fallback);
}

// ── memory ──

#[test]
fn test_decode_memory() {
    assert_eq!(
        op(lb(1, 2, -4)),
        Op::Load { width: Width::B8, signed: true, rt: 1, base: 2, offset: -4 }
    );
    assert_eq!(
        op(lhu(1, 2, 6)),
        Op::Load { width: Width::B16, signed: false, rt: 1, base: 2, offset: 6 }
    );
    assert_eq!(
        op(lw(1, 2, 0)),
        Op::Load { width: Width::B32, signed: true, rt: 1, base: 2, offset: 0 }
    );
    assert_eq!(
        op(lq(3, 29, 16)),
        Op::Load { width: Width::B128, signed: false, rt: 3, base: 29, offset: 16 }
    );
    assert_eq!(op(sq(3, 29, -16)), Op::Store { width: Width::B128, rt: 3, base: 29, offset: -16 });
    assert_eq!(op(sh(1, 2, 2)), Op::Store { width: Width::B16, rt: 1, base: 2, offset: 2 });
    assert_eq!(op(lwc1(3, 4, 8)), Op::Lwc1 { ft: 3, base: 4, offset: 8 });
    assert_eq!(op(swc1(3, 4, 8)), Op::Swc1 { ft: 3, base: 4, offset: 8 });
}

// ── control flow ──

#[test]
fn test_decode_branches() {
    assert_eq!(
        op(beq(1, 2, 3)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Eq, rs: 1, rt: 2 },
            offset: 3,
            likely: false,
            link: false
        }
    );
    assert_eq!(
        op(bnel(1, 2, -3)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Ne, rs: 1, rt: 2 },
            offset: -3,
            likely: true,
            link: false
        }
    );
    assert_eq!(
        op(blezl(5, 2)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Le, rs: 5, rt: 0 },
            offset: 2,
            likely: true,
            link: false
        }
    );
    assert_eq!(
        op(bgtz(5, 2)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Gt, rs: 5, rt: 0 },
            offset: 2,
            likely: false,
            link: false
        }
    );
    assert_eq!(
        op(bgezal(5, -1)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Ge, rs: 5, rt: 0 },
            offset: -1,
            likely: false,
            link: true
        }
    );
    assert_eq!(
        op(bltzl(4, 1)),
        Op::Branch {
            test: BranchTest::Compare { cond: Cond::Lt, rs: 4, rt: 0 },
            offset: 1,
            likely: true,
            link: false
        }
    );
    assert_eq!(
        op(bc1tl(4)),
        Op::Branch { test: BranchTest::Fpu { on_true: true }, offset: 4, likely: true, link: false }
    );
    assert_eq!(
        op(bc1f(-2)),
        Op::Branch { test: BranchTest::Fpu { on_true: false }, offset: -2, likely: false, link: false }
    );
}

#[test]
fn test_decode_jumps() {
    assert_eq!(op(jr(31)), Op::JumpReg { rs: 31, link: None });
    assert_eq!(op(jalr(31, 4)), Op::JumpReg { rs: 4, link: Some(31) });
    assert_eq!(op(jal(0x40)), Op::Jump { target: 0x10, link: true });
    assert_eq!(op(syscall(0x123)), Op::Syscall { code: 0x123 });
    assert_eq!(op(brk(7)), Op::Break { code: 7 });
}

#[test]
fn test_branch_targets() {
    let b = Insn::decode(0x2000, beq(0, 0, -1));
    assert_eq!(b.branch_target(), Some(0x2000));
    let b = Insn::decode(0x2000, bne(1, 2, 4));
    assert_eq!(b.branch_target(), Some(0x2014));
    let jmp = Insn::decode(0x1000_0000, j(0x1000_0040));
    assert_eq!(jmp.branch_target(), Some(0x1000_0040));
    // J keeps the region of the delay slot.
    let jmp = Insn::decode(0x2fff_fffc, j(0x0000_0100));
    assert_eq!(jmp.branch_target(), Some(0x3000_0100));
    assert_eq!(Insn::decode(0, jr(4)).branch_target(), None);
}

// ── coprocessors ──

#[test]
fn test_decode_cop1() {
    assert_eq!(op(mfc1(2, 3)), Op::Mfc1 { rt: 2, fs: 3 });
    assert_eq!(op(mtc1(2, 3)), Op::Mtc1 { rt: 2, fs: 3 });
    assert_eq!(op(cfc1(2, 31)), Op::Cfc1 { rt: 2, fs: 31 });
    assert_eq!(op(ctc1(4, 31)), Op::Ctc1 { rt: 4, fs: 31 });
    assert_eq!(op(add_s(1, 2, 3)), Op::Fpu { op: FpuOp::Add, fd: 1, fs: 2, ft: 3 });
    assert_eq!(op(div_s(1, 2, 3)), Op::Fpu { op: FpuOp::Div, fd: 1, fs: 2, ft: 3 });
    assert_eq!(op(sqrt_s(1, 5)), Op::Fpu { op: FpuOp::Sqrt, fd: 1, fs: 0, ft: 5 });
    assert_eq!(op(madd_s(1, 2, 3)), Op::Fpu { op: FpuOp::Madd, fd: 1, fs: 2, ft: 3 });
    assert_eq!(op(adda_s(2, 3)), Op::Fpu { op: FpuOp::Adda, fd: 0, fs: 2, ft: 3 });
    assert_eq!(op(c_lt_s(2, 3)), Op::Fpu { op: FpuOp::CLt, fd: 0, fs: 2, ft: 3 });
    assert_eq!(op(cvt_w_s(1, 2)), Op::Fpu { op: FpuOp::CvtW, fd: 1, fs: 2, ft: 0 });
    assert_eq!(op(cvt_s_w(1, 2)), Op::Fpu { op: FpuOp::CvtS, fd: 1, fs: 2, ft: 0 });
    assert_eq!(op(abs_s(2, 3)), Op::FpuMove { kind: FpuMoveKind::Abs, fd: 2, fs: 3 });
    assert_eq!(op(neg_s(2, 3)), Op::FpuMove { kind: FpuMoveKind::Neg, fd: 2, fs: 3 });
    assert_eq!(op(mov_s(2, 3)), Op::FpuMove { kind: FpuMoveKind::Mov, fd: 2, fs: 3 });
}

#[test]
fn test_decode_cop2() {
    assert_eq!(op(qmfc2(5, 6)), Op::Qmfc2 { rt: 5, fs: 6 });
    assert_eq!(op(qmtc2(5, 6)), Op::Qmtc2 { rt: 5, fs: 6 });
    assert_eq!(op(cfc2(3, 16)), Op::Cfc2 { rt: 3, id: 16 });
    assert_eq!(op(ctc2(3, 16)), Op::Ctc2 { rt: 3, id: 16 });
    assert_eq!(
        op(vadd(0xf, 1, 2, 3)),
        Op::Vu { op: VuOp::Add, dest: 0xf, fd: 1, fs: 2, ft: 3 }
    );
    assert_eq!(op(vmul(0x8, 1, 2, 3)), Op::Vu { op: VuOp::Mul, dest: 0x8, fd: 1, fs: 2, ft: 3 });
    assert!(matches!(
        op(vabs(0x8, 4, 5)),
        Op::Vu { op: VuOp::Abs, dest: 0x8, fs: 5, ft: 4, .. }
    ));
    assert!(matches!(
        op(vmove(0x3, 4, 5)),
        Op::Vu { op: VuOp::Move, dest: 0x3, fs: 5, ft: 4, .. }
    ));
    assert_eq!(op(vnop()), Op::Vnop);
    assert_eq!(op(vcallms(0x40)), Op::Vcallms { imm: 0x40 });
}

#[test]
fn test_fpu_op_table() {
    for (i, f) in FpuOp::ALL.iter().enumerate() {
        assert_eq!(FpuOp::from_raw(i as u32), Some(*f));
    }
    assert_eq!(FpuOp::from_raw(FpuOp::ALL.len() as u32), None);
    assert!(FpuOp::Madda.writes_acc() && FpuOp::Madda.reads_acc());
    assert!(!FpuOp::Madd.writes_acc() && FpuOp::Madd.reads_acc());
    assert_eq!(VuOp::from_raw(4), Some(VuOp::Move));
    assert_eq!(VuOp::from_raw(5), None);
}

// ── dependencies ──

#[test]
fn test_reads_and_writes() {
    let i = Insn::decode(0, addu(1, 2, 3));
    assert_eq!(i.reads(), mask::gpr(2) | mask::gpr(3));
    assert_eq!(i.writes(), mask::gpr(1));

    assert_eq!(Insn::decode(0, addu(0, 2, 3)).writes(), 0);
    assert_eq!(Insn::decode(0, lw(1, 2, 0)).reads(), mask::gpr(2) | mask::MEMORY);
    assert_eq!(Insn::decode(0, sw(1, 2, 0)).writes(), mask::MEMORY);
    assert_eq!(Insn::decode(0, bgezal(4, 1)).writes(), mask::gpr(31));
    assert_eq!(Insn::decode(0, jalr(5, 6)).writes(), mask::gpr(5));
    assert_eq!(Insn::decode(0, mtlo(6)).writes(), mask::LO);
    assert_ne!(Insn::decode(0, add_s(1, 2, 3)).writes() & mask::FCR31, 0);
    assert_eq!(Insn::decode(0, mov_s(1, 2)).writes(), mask::fpr(1));
    assert_eq!(Insn::decode(0, adda_s(1, 2)).writes(), mask::ACC | mask::FCR31);
    assert_eq!(Insn::decode(0, sqrt_s(1, 2)).reads(), mask::fpr(2) | mask::FCR31);
    assert_eq!(Insn::decode(0, syscall(0)).reads(), mask::ALL);
}

#[test]
fn test_independence() {
    let beq_12 = Insn::decode(0, beq(1, 2, 4));
    assert!(independent(&beq_12, &Insn::decode(4, addiu(3, 4, 1))));
    assert!(!independent(&beq_12, &Insn::decode(4, addiu(1, 1, 1))));
    assert!(independent(&beq_12, &Insn::decode(4, addiu(5, 1, 1))));

    let link = Insn::decode(0, bgezal(5, 4));
    assert!(!independent(&link, &Insn::decode(4, addu(6, 31, 0))));
    assert!(!independent(&link, &Insn::decode(4, addiu(31, 0, 1))));

    let fpu = Insn::decode(0, bc1t(4));
    assert!(!independent(&fpu, &Insn::decode(4, c_lt_s(1, 2))));
    assert!(independent(&fpu, &Insn::decode(4, mtc1(1, 2))));
}

#[test]
fn test_instruction_classes() {
    assert!(Insn::decode(0, beq(1, 2, 1)).is_branch());
    assert!(Insn::decode(0, jr(31)).is_branch());
    assert!(!Insn::decode(0, syscall(0)).is_branch());
    assert!(Insn::decode(0, syscall(0)).ends_block());
    assert!(Insn::decode(0, brk(0)).ends_block());
    assert!(Insn::decode(0, eret()).ends_block());
    assert!(Insn::decode(0, lw(1, 2, 0)).is_simple());
    assert!(Insn::decode(0, add_s(1, 2, 3)).is_simple());
    assert!(!Insn::decode(0, vadd(0xf, 1, 2, 3)).is_simple());
    assert!(!Insn::decode(0, mult(1, 2, 3)).is_simple());
    assert!(!Insn::decode(0, beq(1, 2, 1)).is_simple());
}
