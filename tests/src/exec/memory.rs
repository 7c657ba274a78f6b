use eerec_core::{CpuState, Quad};
use eerec_exec::ExitReason;

use crate::asm::*;
use crate::harness::{
    assert_equivalent, flat, test_config, Harness, Image, Reference, Windowless, STOP_CODE,
};
use crate::reference::RefExit;

const DATA: u64 = 0x8000;

fn program() -> Vec<u32> {
    vec![
        sw(2, 1, 0),
        sb(2, 1, 5),
        sh(2, 1, 10),
        sd(2, 1, 16),
        sq(3, 1, 32),
        sw(2, 1, -4),
        lq(4, 1, 36),
        lb(5, 1, 0),
        lbu(6, 1, 0),
        lh(7, 1, 2),
        lhu(8, 1, 2),
        lw(9, 1, -4),
        lwu(10, 1, 0),
        ld(11, 1, 16),
        lwc1(2, 1, 4),
        swc1(2, 1, 48),
        lw(0, 1, 0),
        // Wraps around the end of guest memory.
        sw(2, 12, 0x40),
        lw(13, 1, 0x40),
        syscall(STOP_CODE),
    ]
}

fn setup(cpu: &mut CpuState) {
    cpu.set_gpr(1, DATA);
    cpu.set_gpr(2, 0xfedc_ba98_8765_4321);
    cpu.gpr[3] = Quad::new(0x0011_2233_4455_6677, 0x8899_aabb_ccdd_eeff);
    cpu.set_gpr(12, 0x0001_0000 + DATA);
}

#[test]
fn test_loads_and_stores_inline() {
    let h = assert_equivalent(&program(), test_config(), setup);
    assert_eq!(h.gpr(5), 0x21);
    assert_eq!(h.gpr(6), 0x21);
    assert_eq!(h.gpr(7), 0xffff_ffff_ffff_8765);
    assert_eq!(h.gpr(8), 0x8765);
    assert_eq!(h.gpr(9), 0xffff_ffff_8765_4321);
    assert_eq!(h.gpr(10), 0x8765_4321);
    assert_eq!(h.gpr(11), 0xfedc_ba98_8765_4321);
    assert_eq!(h.cpu.gpr[4], Quad::new(0x0011_2233_4455_6677, 0x8899_aabb_ccdd_eeff));
    assert_eq!(h.gpr(13), 0xffff_ffff_8765_4321);
    assert_eq!(h.gpr(0), 0);
    let word = |a: usize| u32::from_le_bytes(h.mem.as_slice()[a..a + 4].try_into().unwrap());
    assert_eq!(word(DATA as usize + 48), h.cpu.fpr[2]);
}

#[test]
fn test_loads_and_stores_through_helpers() {
    let program = program();
    let mut reference = Reference::new(&program);
    setup(&mut reference.cpu);
    assert_eq!(reference.run(10_000), RefExit::Stopped);

    let mut h = Harness::with(test_config(), Windowless(flat()), &program);
    setup(&mut h.cpu);
    assert_eq!(h.run(10_000), ExitReason::Stopped);

    assert!(h.cpu.same_architectural_state(&reference.cpu));
    assert!(h.mem.bytes() == reference.mem.as_slice());
    assert!(h.cpu.mem_base.is_null());
}

#[test]
fn test_windowed_and_helper_paths_agree_with_folded_base() {
    // A constant base register exercises the folded address path.
    let program = [
        lui(1, 0),
        ori(1, 1, DATA as u16),
        sw(2, 1, 8),
        lw(3, 1, 8),
        lbu(4, 1, 9),
        syscall(STOP_CODE),
    ];
    let h = assert_equivalent(&program, test_config(), |cpu| cpu.set_gpr(2, 0x1234_5678));
    assert_eq!(h.gpr(3), 0x1234_5678);
    assert_eq!(h.gpr(4), 0x56);

    let mut w = Harness::with(test_config(), Windowless(flat()), &program);
    w.cpu.set_gpr(2, 0x1234_5678);
    w.run(100);
    assert!(w.cpu.same_architectural_state(&h.cpu));
}
