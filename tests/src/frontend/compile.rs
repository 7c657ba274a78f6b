use eerec_backend::{CodeBuffer, HostCodeGen, X86_64CodeGen};
use eerec_core::cpu::BUDGET_OFFSET;
use eerec_core::{BlockPhase, CodeBlock, FlatMemory, GuestMemory, RecConfig, Width};
use eerec_frontend::{compile_block, CompileEnv};

use crate::asm::*;
use crate::harness::{flat, BASE};

struct Fixture {
    buf: CodeBuffer,
    backend: X86_64CodeGen,
    mem: FlatMemory,
    config: RecConfig,
    start: usize,
}

impl Fixture {
    fn new(program: &[u32]) -> Self {
        Self::with(RecConfig::default(), program)
    }

    fn with(config: RecConfig, program: &[u32]) -> Self {
        let mut buf = CodeBuffer::new(1 << 16).unwrap();
        let mut backend = X86_64CodeGen::new();
        backend.emit_prologue(&mut buf);
        backend.emit_epilogue(&mut buf);
        let start = buf.offset();
        let mut mem = flat();
        for (i, w) in program.iter().enumerate() {
            mem.write(Width::B32, BASE + 4 * i as u32, *w as u128);
        }
        Self {
            buf,
            backend,
            mem,
            config,
            start,
        }
    }

    fn compile(&mut self, pc: u32) -> CodeBlock {
        let window_mask = self.mem.host_window().map(|w| w.mask);
        compile_block(
            CompileEnv {
                buf: &mut self.buf,
                backend: &self.backend,
                memory: &mut self.mem,
                window_mask,
                config: &self.config,
            },
            pc,
        )
    }
}

fn targets(block: &CodeBlock) -> Vec<u32> {
    block.exits.iter().map(|e| e.fixup.target).collect()
}

fn nop() -> u32 {
    sll(0, 0, 0)
}

// ── block shape ──

#[test]
fn test_straight_line_ending_in_syscall() {
    let mut f = Fixture::new(&[addiu(1, 0, 5), addiu(2, 1, 3), syscall(0)]);
    let block = f.compile(BASE);

    assert_eq!(block.pc, BASE);
    assert_eq!(block.icount, 3);
    assert_eq!(block.size, 12);
    assert!(block.exits.is_empty());
    assert_eq!(block.phase, BlockPhase::Linking);
    assert_eq!(block.host_offset, f.start);
    assert_eq!(block.host_size, f.buf.offset() - f.start);
}

#[test]
fn test_budget_charge_is_patched() {
    let mut f = Fixture::new(&[addiu(1, 0, 1), addiu(1, 1, 1), addiu(1, 1, 1), syscall(0)]);
    let block = f.compile(BASE);

    // sub qword [rbp + BUDGET], imm32
    let code = &f.buf.as_slice()[block.host_offset..];
    assert_eq!(code[0], 0x48);
    assert_eq!(code[1], 0x81);
    let disp_len = if (-128..128).contains(&BUDGET_OFFSET) { 1 } else { 4 };
    let imm = block.host_offset + 3 + disp_len;
    assert_eq!(f.buf.read_u32(imm), 4);
    // followed by jl to the budget stub
    assert_eq!(&f.buf.as_slice()[imm + 4..imm + 6], &[0x0f, 0x8c]);
    let stub = f.buf.rel32_target(imm + 6);
    assert!(stub > imm && stub < block.host_offset + block.host_size);
}

#[test]
fn test_block_length_limit() {
    let config = RecConfig {
        max_block_insns: 4,
        ..RecConfig::default()
    };
    let mut f = Fixture::with(config, &[addiu(1, 1, 1); 10]);
    let block = f.compile(BASE);

    assert_eq!(block.icount, 4);
    assert_eq!(block.size, 16);
    assert_eq!(targets(&block), vec![BASE + 16]);
    assert_eq!(block.exits[0].dest, None);
}

#[test]
fn test_branch_is_never_split_from_its_delay_slot() {
    let config = RecConfig {
        max_block_insns: 2,
        ..RecConfig::default()
    };
    let mut f = Fixture::with(config, &[addiu(1, 1, 1), bne(1, 2, 3), nop()]);
    let block = f.compile(BASE);

    assert_eq!(block.icount, 3);
    assert_eq!(block.size, 12);
}

#[test]
fn test_consecutive_blocks_are_packed() {
    let mut f = Fixture::new(&[addiu(1, 0, 1), syscall(0), addiu(2, 0, 2), syscall(0)]);
    let first = f.compile(BASE);
    let second = f.compile(BASE + 8);
    assert_eq!(second.host_offset, first.host_offset + first.host_size);
    assert_eq!(second.pc, BASE + 8);
}

// ── exits ──

#[test]
fn test_always_taken_branch_has_one_exit() {
    let mut f = Fixture::new(&[addiu(1, 0, 1), beq(0, 0, 3), nop()]);
    let block = f.compile(BASE);

    assert_eq!(block.icount, 3);
    assert_eq!(block.size, 12);
    assert_eq!(targets(&block), vec![BASE + 20]);
}

#[test]
fn test_runtime_branch_has_two_exits() {
    let mut f = Fixture::new(&[bne(1, 2, 3), nop()]);
    let block = f.compile(BASE);
    assert_eq!(targets(&block), vec![BASE + 16, BASE + 8]);

    let mut f = Fixture::new(&[beql(1, 2, -1), nop()]);
    let block = f.compile(BASE);
    assert_eq!(targets(&block), vec![BASE, BASE + 8]);

    let mut f = Fixture::new(&[bc1t(2), nop()]);
    let block = f.compile(BASE);
    assert_eq!(targets(&block), vec![BASE + 12, BASE + 8]);
}

#[test]
fn test_folded_constants_resolve_branches() {
    let program = [addiu(1, 0, 5), bne(1, 0, 2), nop()];

    let mut f = Fixture::new(&program);
    assert_eq!(targets(&f.compile(BASE)), vec![BASE + 16]);

    let config = RecConfig {
        const_folding: false,
        ..RecConfig::default()
    };
    let mut f = Fixture::with(config, &program);
    assert_eq!(targets(&f.compile(BASE)), vec![BASE + 16, BASE + 12]);
}

#[test]
fn test_never_taken_branch_falls_through() {
    let mut f = Fixture::new(&[bne(0, 0, 5), nop()]);
    assert_eq!(targets(&f.compile(BASE)), vec![BASE + 8]);
}

#[test]
fn test_jumps() {
    let mut f = Fixture::new(&[j(BASE + 0x100), nop()]);
    let block = f.compile(BASE);
    assert_eq!(targets(&block), vec![BASE + 0x100]);
    assert_eq!(block.icount, 2);

    let mut f = Fixture::new(&[jal(BASE + 0x40), nop()]);
    assert_eq!(targets(&f.compile(BASE)), vec![BASE + 0x40]);
}

#[test]
fn test_register_jump_targets() {
    // Unknown target: returns to dispatch without a linkable exit.
    let mut f = Fixture::new(&[jr(31), nop()]);
    let block = f.compile(BASE);
    assert!(block.exits.is_empty());
    assert_eq!(block.size, 8);

    // Known target: links like a direct jump.
    let mut f = Fixture::new(&[ori(4, 0, 0x2000), jr(4), nop()]);
    let block = f.compile(BASE);
    assert_eq!(targets(&block), vec![0x2000]);
    assert_eq!(block.icount, 3);
}

#[test]
fn test_interpreted_jump_ends_block() {
    let mut f = Fixture::new(&[addiu(1, 0, 1), eret(), addiu(2, 0, 2)]);
    let block = f.compile(BASE);
    assert_eq!(block.icount, 2);
    assert_eq!(block.size, 8);
    assert!(block.exits.is_empty());
}

#[test]
fn test_exit_stubs_start_unlinked() {
    let mut f = Fixture::new(&[bne(1, 2, 3), nop()]);
    let block = f.compile(BASE);
    for exit in &block.exits {
        // The jump field is 4-byte aligned and initially lands on its stub.
        assert_eq!((exit.fixup.jump + 1) % 4, 0);
        assert_eq!(f.buf.rel32_target(exit.fixup.jump + 1), exit.fixup.stub);
        assert!(exit.fixup.stub < block.host_offset + block.host_size);
    }
}
