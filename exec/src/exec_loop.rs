use eerec_core::runtime::exit;
use eerec_core::{CpuState, Result};
use eerec_frontend::{compile_block, CompileEnv};

use crate::ExecEnv;

/// Why `ExecEnv::execute` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `cpu.budget` went negative; `cpu.pc` is the next block to run.
    BudgetExhausted,
    /// A condition handler asked to stop.
    Stopped,
}

/// Main dispatch loop.
///
/// Looks up or compiles the block at `cpu.pc` and enters it. Linked
/// blocks jump straight into each other; control only comes back here
/// through an unlinked stub, an indirect jump, the budget check or a
/// condition.
///
/// # Safety
/// `cpu.runtime` must point at a live `Runtime` for the whole call.
pub(crate) unsafe fn cpu_exec_loop(env: &mut ExecEnv, cpu: &mut CpuState) -> Result<ExitReason> {
    loop {
        let pc = cpu.pc;
        let idx = block_find(env, cpu, pc)?;
        match cpu_block_exec(env, cpu, idx) {
            exit::LINK | exit::INDIRECT => {}
            exit::BUDGET => return Ok(ExitReason::BudgetExhausted),
            exit::STOP => return Ok(ExitReason::Stopped),
            other => panic!("generated code returned unknown exit code {other}"),
        }
    }
}

/// Find the block for `pc`, compiling it on a miss.
unsafe fn block_find(env: &mut ExecEnv, cpu: &mut CpuState, pc: u32) -> Result<usize> {
    if let Some(idx) = env.jump_cache.lookup(pc) {
        let b = env.store.get(idx);
        if !b.invalid && b.pc == pc {
            return Ok(idx);
        }
    }

    if let Some(idx) = env.store.lookup(pc) {
        env.jump_cache.insert(pc, idx);
        return Ok(idx);
    }

    block_gen_code(env, cpu, pc)
}

/// Compile, store and seal a new block.
unsafe fn block_gen_code(env: &mut ExecEnv, cpu: &mut CpuState, pc: u32) -> Result<usize> {
    if env.code_buf.remaining() < env.config.headroom {
        let (used, capacity) = env.code_buf.usage();
        tracing::debug!(used, capacity, blocks = env.store.len(), "code buffer full, dropping all blocks");
        env.flush();
    }

    env.code_buf.set_writable()?;
    let runtime = cpu.runtime_mut();
    let block = compile_block(
        CompileEnv {
            buf: &mut env.code_buf,
            backend: &env.backend,
            memory: &mut *runtime.memory,
            window_mask: env.window_mask,
            config: &env.config,
        },
        pc,
    );
    let (icount, host_size) = (block.icount, block.host_size);
    let idx = env.store.insert(block);
    env.store.seal(idx, &mut env.code_buf, &env.backend);
    env.code_buf.set_executable()?;

    env.jump_cache.insert(pc, idx);
    tracing::debug!(pc = format_args!("{pc:#010x}"), icount, host_size, "compiled block");
    Ok(idx)
}

/// Enter a block through the prologue and return its exit code.
unsafe fn cpu_block_exec(env: &ExecEnv, cpu: &mut CpuState, idx: usize) -> usize {
    let entry = env.code_buf.ptr_at(env.store.get(idx).host_offset);
    let prologue: unsafe extern "C" fn(*mut CpuState, *const u8) -> usize =
        core::mem::transmute(env.code_buf.ptr_at(env.backend.prologue_offset));
    prologue(cpu as *mut CpuState, entry)
}
