//! Execution engine: block cache, linking and the dispatch loop.
//!
//! Drives the lookup → compile → execute cycle. Blocks live in one
//! code buffer, are indexed by a hash table with a direct-mapped jump
//! cache in front, and jump straight into each other once linked.

pub mod block_store;
pub mod exec_loop;
pub mod vu;

pub use block_store::BlockStore;
pub use exec_loop::ExitReason;
pub use vu::VuWorker;

use std::ffi::c_void;

use eerec_backend::{CodeBuffer, HostCodeGen, X86_64CodeGen};
use eerec_core::{CpuState, JumpCache, RecConfig, Result, Runtime};

/// Execution environment holding all compilation state.
pub struct ExecEnv {
    pub store: BlockStore,
    pub jump_cache: JumpCache,
    pub code_buf: CodeBuffer,
    pub backend: X86_64CodeGen,
    pub config: RecConfig,
    /// Offset where block code starts (after the prologue/epilogue).
    pub code_gen_start: usize,
    /// Memory mask the current blocks were compiled against; `None`
    /// means accesses go through the helpers.
    window_mask: Option<u32>,
}

impl ExecEnv {
    /// Allocate the code buffer and emit the entry/exit trampolines.
    pub fn new(config: RecConfig) -> Result<Self> {
        config.validate()?;
        let mut code_buf = CodeBuffer::new(config.code_buffer_size)?;
        let mut backend = X86_64CodeGen::new();
        backend.emit_prologue(&mut code_buf);
        backend.emit_epilogue(&mut code_buf);
        let code_gen_start = code_buf.offset();
        code_buf.set_executable()?;
        tracing::debug!(
            capacity = code_buf.capacity(),
            max_block_insns = config.max_block_insns,
            "execution environment ready"
        );

        Ok(Self {
            store: BlockStore::new(),
            jump_cache: JumpCache::new(),
            code_buf,
            backend,
            config,
            code_gen_start,
            window_mask: None,
        })
    }

    /// Run guest code from `cpu.pc` until the budget in `cpu.budget` is
    /// spent or a condition handler asks to stop.
    pub fn execute(&mut self, cpu: &mut CpuState, runtime: &mut Runtime<'_>) -> Result<ExitReason> {
        let window = runtime.memory.host_window();
        let mask = window.map(|w| w.mask);
        if mask != self.window_mask {
            if !self.store.is_empty() {
                tracing::debug!(?mask, "guest memory layout changed, dropping all blocks");
                self.flush();
            }
            self.window_mask = mask;
        }
        cpu.mem_base = window.map_or(std::ptr::null_mut(), |w| w.base);
        cpu.runtime = runtime as *mut Runtime<'_> as *mut c_void;

        // SAFETY: the runtime stays borrowed for the whole loop and is
        // uninstalled before returning.
        let reason = unsafe { exec_loop::cpu_exec_loop(self, cpu) };
        cpu.runtime = std::ptr::null_mut();
        reason
    }

    /// `(used, capacity)` of the code buffer in bytes.
    pub fn code_usage(&self) -> (usize, usize) {
        self.code_buf.usage()
    }

    /// Drop every block covering guest address `pc` and unlink the jumps
    /// into them.
    pub fn invalidate(&mut self, pc: u32) -> Result<()> {
        let hits = self.store.blocks_containing(pc);
        if hits.is_empty() {
            return Ok(());
        }
        self.code_buf.set_writable()?;
        for &idx in &hits {
            self.store.invalidate(idx, &mut self.code_buf, &self.backend);
            self.jump_cache.remove(self.store.get(idx).pc);
        }
        self.code_buf.set_executable()?;
        tracing::debug!(pc = format_args!("{pc:#010x}"), blocks = hits.len(), "invalidated");
        Ok(())
    }

    /// Drop all blocks and reclaim the whole code buffer.
    pub fn flush(&mut self) {
        self.store.flush();
        self.jump_cache.invalidate();
        self.code_buf.reset_to(self.code_gen_start);
    }
}
