//! Guest-register to host-register binding.
//!
//! Guest registers live in `CpuState` ("home" slots addressed off the
//! env register). While a block is compiled, any of them may be cached
//! in a host register, possibly dirty, or known to hold a compile-time
//! constant. The allocator keeps that mapping and emits the loads,
//! stores and immediate materializations needed to move between the
//! states.

use eerec_core::cpu::{fpr_offset, gpr_offset, vf_offset, HI_OFFSET, LO_OFFSET};
use eerec_core::RegSet;

use crate::code_buffer::CodeBuffer;
use crate::x86_64::emitter::{emit_load, emit_mov_ri, emit_sse_rm, emit_store, emit_store_imm, Mem};
use crate::x86_64::emitter::{OPC_MOVSS_VxWx, OPC_MOVSS_WxVx, OPC_MOVUPS_VxWx, OPC_MOVUPS_WxVx};
use crate::x86_64::regs::{Reg, Xmm, GPR_POOL, SCRATCH0, XMM_POOL};
use crate::x86_64::tables::{OpSize, Operand};

/// A guest register the allocator can cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestReg {
    /// Low doubleword of a general-purpose register.
    Gpr(u8),
    /// FPU register (single precision bits).
    Fpr(u8),
    /// VU0 vector register, all four lanes.
    Vf(u8),
    Hi,
    Lo,
}

const NUM_GUEST: usize = 32 + 32 + 32 + 2;

impl GuestReg {
    fn index(self) -> usize {
        match self {
            GuestReg::Gpr(r) => r as usize & 31,
            GuestReg::Fpr(r) => 32 + (r as usize & 31),
            GuestReg::Vf(r) => 64 + (r as usize & 31),
            GuestReg::Hi => 96,
            GuestReg::Lo => 97,
        }
    }

    fn from_index(i: usize) -> GuestReg {
        match i {
            0..=31 => GuestReg::Gpr(i as u8),
            32..=63 => GuestReg::Fpr((i - 32) as u8),
            64..=95 => GuestReg::Vf((i - 64) as u8),
            96 => GuestReg::Hi,
            _ => GuestReg::Lo,
        }
    }

    /// Home slot in `CpuState`.
    pub fn home(self) -> Mem {
        Mem::env(match self {
            GuestReg::Gpr(r) => gpr_offset(r as usize & 31),
            GuestReg::Fpr(r) => fpr_offset(r as usize & 31),
            GuestReg::Vf(r) => vf_offset(r as usize & 31),
            GuestReg::Hi => HI_OFFSET,
            GuestReg::Lo => LO_OFFSET,
        })
    }

    /// Whether the register is cached in an XMM register.
    pub fn is_vector(self) -> bool {
        matches!(self, GuestReg::Fpr(_) | GuestReg::Vf(_))
    }

    /// Width of the home slot as an encoder size.
    pub fn op_size(self) -> OpSize {
        match self {
            GuestReg::Gpr(_) | GuestReg::Hi | GuestReg::Lo => OpSize::B64,
            GuestReg::Fpr(_) => OpSize::ScalarSingle,
            GuestReg::Vf(_) => OpSize::PackedSingle,
        }
    }
}

/// Where a guest register's current value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Only in the home slot.
    Unbound,
    Scalar { reg: Reg, dirty: bool },
    Vector { reg: Xmm, dirty: bool },
    /// Known at compile time; the home slot may be stale.
    Const(u64),
}

/// How the caller is going to use a bound register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Needs the value in a host register.
    Read,
    /// Accepts a register, the home slot or a 32-bit immediate.
    ReadAny,
    /// Overwrites the value without reading it.
    Write,
    /// Reads and then overwrites.
    Modify,
}

/// Guest → host register mapping for one block compilation.
///
/// Cloning produces a snapshot that can be restored to compile a second
/// control-flow path from the same starting state.
#[derive(Debug, Clone)]
pub struct RegAlloc {
    bindings: [Binding; NUM_GUEST],
    gpr_owner: [Option<GuestReg>; 16],
    xmm_owner: [Option<GuestReg>; 16],
    gpr_lru: [u64; 16],
    xmm_lru: [u64; 16],
    tick: u64,
    gpr_pool: RegSet,
    xmm_pool: RegSet,
    pinned_gpr: RegSet,
    pinned_xmm: RegSet,
    const_folding: bool,
}

impl RegAlloc {
    pub fn new(const_folding: bool) -> Self {
        Self::with_pools(GPR_POOL, XMM_POOL, const_folding)
    }

    /// An allocator restricted to the given host registers.
    pub fn with_pools(gpr_pool: RegSet, xmm_pool: RegSet, const_folding: bool) -> Self {
        let mut bindings = [Binding::Unbound; NUM_GUEST];
        bindings[GuestReg::Gpr(0).index()] = Binding::Const(0);
        Self {
            bindings,
            gpr_owner: [None; 16],
            xmm_owner: [None; 16],
            gpr_lru: [0; 16],
            xmm_lru: [0; 16],
            tick: 0,
            gpr_pool,
            xmm_pool,
            pinned_gpr: RegSet::EMPTY,
            pinned_xmm: RegSet::EMPTY,
            const_folding,
        }
    }

    pub fn binding(&self, g: GuestReg) -> Binding {
        self.bindings[g.index()]
    }

    /// The compile-time value of `g`, if known.
    pub fn const_value(&self, g: GuestReg) -> Option<u64> {
        match self.binding(g) {
            Binding::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn const_folding(&self) -> bool {
        self.const_folding
    }

    /// Record that `g` now holds `value`.
    ///
    /// With constant folding disabled the value is stored to the home
    /// slot immediately instead.
    pub fn set_const(&mut self, buf: &mut CodeBuffer, g: GuestReg, value: u64) {
        debug_assert!(!g.is_vector(), "constants are tracked for scalar registers only");
        if g == GuestReg::Gpr(0) {
            return;
        }
        self.release(g);
        if self.const_folding {
            self.bindings[g.index()] = Binding::Const(value);
        } else {
            store_const(buf, g.home(), value);
        }
    }

    /// Make `g` available for `intent` and pin its host register until
    /// the next `unpin_all`.
    pub fn bind(&mut self, buf: &mut CodeBuffer, g: GuestReg, intent: Intent) -> Operand {
        debug_assert!(
            g != GuestReg::Gpr(0) || matches!(intent, Intent::Read | Intent::ReadAny),
            "r0 is read-only"
        );
        let idx = g.index();
        match (self.bindings[idx], intent) {
            (Binding::Const(v), Intent::ReadAny) if fits_i32(v) => Operand::Imm(v as i32),
            (Binding::Unbound, Intent::ReadAny) => Operand::Mem(g.home()),

            (Binding::Scalar { reg, dirty }, _) => {
                let dirty = dirty || matches!(intent, Intent::Write | Intent::Modify);
                self.bindings[idx] = Binding::Scalar { reg, dirty };
                self.touch_gpr(reg);
                self.pinned_gpr = self.pinned_gpr.set(reg as u8);
                Operand::Reg(reg)
            }
            (Binding::Vector { reg, dirty }, _) => {
                let dirty = dirty || matches!(intent, Intent::Write | Intent::Modify);
                self.bindings[idx] = Binding::Vector { reg, dirty };
                self.touch_xmm(reg);
                self.pinned_xmm = self.pinned_xmm.set(reg as u8);
                Operand::Xmm(reg)
            }

            (current, _) => {
                let loads = intent != Intent::Write;
                if g.is_vector() {
                    let reg = self.alloc_xmm(buf);
                    if loads {
                        let opc = match g.op_size() {
                            OpSize::ScalarSingle => OPC_MOVSS_VxWx,
                            _ => OPC_MOVUPS_VxWx,
                        };
                        emit_sse_rm(buf, opc, reg, g.home());
                    }
                    self.assign_xmm(reg, g, intent != Intent::Read && intent != Intent::ReadAny);
                    Operand::Xmm(reg)
                } else {
                    let reg = self.alloc_gpr(buf);
                    // A materialized constant is newer than the home slot.
                    let mut dirty = matches!(intent, Intent::Write | Intent::Modify);
                    match current {
                        Binding::Const(v) if loads => {
                            emit_mov_ri(buf, true, reg, v);
                            dirty = true;
                        }
                        Binding::Unbound if loads => emit_load(buf, true, reg, g.home()),
                        _ => {}
                    }
                    self.assign_gpr(reg, g, dirty);
                    Operand::Reg(reg)
                }
            }
        }
    }

    /// Bind `g` for reading into a host GPR.
    pub fn read_gpr(&mut self, buf: &mut CodeBuffer, g: GuestReg) -> Reg {
        match self.bind(buf, g, Intent::Read) {
            Operand::Reg(r) => r,
            other => unreachable!("{g:?} bound to {other:?}"),
        }
    }

    /// Bind `g` for writing into a host GPR.
    pub fn write_gpr(&mut self, buf: &mut CodeBuffer, g: GuestReg) -> Reg {
        match self.bind(buf, g, Intent::Write) {
            Operand::Reg(r) => r,
            other => unreachable!("{g:?} bound to {other:?}"),
        }
    }

    /// Bind `g` into an XMM register with the given intent.
    pub fn bind_xmm(&mut self, buf: &mut CodeBuffer, g: GuestReg, intent: Intent) -> Xmm {
        debug_assert!(intent != Intent::ReadAny);
        match self.bind(buf, g, intent) {
            Operand::Xmm(x) => x,
            other => unreachable!("{g:?} bound to {other:?}"),
        }
    }

    pub fn pin(&mut self, g: GuestReg) {
        match self.binding(g) {
            Binding::Scalar { reg, .. } => self.pinned_gpr = self.pinned_gpr.set(reg as u8),
            Binding::Vector { reg, .. } => self.pinned_xmm = self.pinned_xmm.set(reg as u8),
            _ => {}
        }
    }

    pub fn unpin_all(&mut self) {
        self.pinned_gpr = RegSet::EMPTY;
        self.pinned_xmm = RegSet::EMPTY;
    }

    /// Write `g` back if needed and drop its binding.
    pub fn flush(&mut self, buf: &mut CodeBuffer, g: GuestReg) {
        self.write_back(buf, g);
        self.release(g);
    }

    /// Write every guest register back and drop all bindings. Required
    /// before any helper call and at every block exit.
    pub fn flush_all(&mut self, buf: &mut CodeBuffer) {
        for i in 0..NUM_GUEST {
            self.flush(buf, GuestReg::from_index(i));
        }
        self.unpin_all();
    }

    /// Write dirty registers and constants back, keeping the bindings.
    pub fn flush_dirty(&mut self, buf: &mut CodeBuffer) {
        for i in 1..NUM_GUEST {
            let g = GuestReg::from_index(i);
            self.write_back(buf, g);
            match self.bindings[i] {
                Binding::Scalar { reg, .. } => {
                    self.bindings[i] = Binding::Scalar { reg, dirty: false }
                }
                Binding::Vector { reg, .. } => {
                    self.bindings[i] = Binding::Vector { reg, dirty: false }
                }
                _ => {}
            }
        }
    }

    /// Copy of the current bindings, for compiling a second path from
    /// the same state.
    pub fn snapshot(&self) -> RegAlloc {
        self.clone()
    }

    /// Return to a state taken with `snapshot`.
    pub fn restore(&mut self, snapshot: RegAlloc) {
        *self = snapshot;
    }

    /// Drop the binding of `g` without writing it back. Used after the
    /// home slot was written directly.
    pub fn invalidate(&mut self, g: GuestReg) {
        self.release(g);
    }

    /// Drop every binding without writing anything back.
    pub fn invalidate_all(&mut self) {
        for i in 0..NUM_GUEST {
            self.release(GuestReg::from_index(i));
        }
        self.unpin_all();
    }

    /// Host register currently caching `g`, if any.
    pub fn host_reg(&self, g: GuestReg) -> Option<Operand> {
        match self.binding(g) {
            Binding::Scalar { reg, .. } => Some(Operand::Reg(reg)),
            Binding::Vector { reg, .. } => Some(Operand::Xmm(reg)),
            _ => None,
        }
    }

    /// Whether any binding is dirty or a non-zero constant.
    pub fn has_pending_writes(&self) -> bool {
        self.bindings[1..].iter().any(|b| {
            matches!(
                b,
                Binding::Scalar { dirty: true, .. }
                    | Binding::Vector { dirty: true, .. }
                    | Binding::Const(_)
            )
        })
    }

    /// Check that no two guest registers share a host register and that
    /// the owner tables agree with the bindings.
    pub fn is_consistent(&self) -> bool {
        for (i, b) in self.bindings.iter().enumerate() {
            let g = GuestReg::from_index(i);
            let ok = match *b {
                Binding::Scalar { reg, .. } => {
                    !g.is_vector() && self.gpr_owner[reg as usize] == Some(g)
                }
                Binding::Vector { reg, .. } => {
                    g.is_vector() && self.xmm_owner[reg as usize] == Some(g)
                }
                Binding::Const(_) => !g.is_vector(),
                Binding::Unbound => true,
            };
            if !ok {
                return false;
            }
        }
        let gprs = self.gpr_owner.iter().enumerate().all(|(r, o)| match o {
            Some(g) => self.bindings[g.index()] == self.scalar_binding_of(*g, r),
            None => true,
        });
        let xmms = self.xmm_owner.iter().enumerate().all(|(r, o)| match o {
            Some(g) => matches!(self.bindings[g.index()], Binding::Vector { reg, .. } if reg as usize == r),
            None => true,
        });
        gprs && xmms
    }

    fn scalar_binding_of(&self, g: GuestReg, r: usize) -> Binding {
        match self.bindings[g.index()] {
            b @ Binding::Scalar { reg, .. } if reg as usize == r => b,
            _ => Binding::Unbound,
        }
    }

    // -- internals --

    fn write_back(&self, buf: &mut CodeBuffer, g: GuestReg) {
        if g == GuestReg::Gpr(0) {
            return;
        }
        match self.binding(g) {
            Binding::Scalar { reg, dirty: true } => emit_store(buf, true, reg, g.home()),
            Binding::Vector { reg, dirty: true } => {
                let opc = match g.op_size() {
                    OpSize::ScalarSingle => OPC_MOVSS_WxVx,
                    _ => OPC_MOVUPS_WxVx,
                };
                emit_sse_rm(buf, opc, reg, g.home());
            }
            Binding::Const(v) => store_const(buf, g.home(), v),
            _ => {}
        }
    }

    fn release(&mut self, g: GuestReg) {
        let idx = g.index();
        match self.bindings[idx] {
            Binding::Scalar { reg, .. } => self.gpr_owner[reg as usize] = None,
            Binding::Vector { reg, .. } => self.xmm_owner[reg as usize] = None,
            _ => {}
        }
        // r0 may be materialized into a host register but always reads
        // as zero once released.
        self.bindings[idx] = if g == GuestReg::Gpr(0) {
            Binding::Const(0)
        } else {
            Binding::Unbound
        };
    }

    fn touch_gpr(&mut self, reg: Reg) {
        self.tick += 1;
        self.gpr_lru[reg as usize] = self.tick;
    }

    fn touch_xmm(&mut self, reg: Xmm) {
        self.tick += 1;
        self.xmm_lru[reg as usize] = self.tick;
    }

    fn assign_gpr(&mut self, reg: Reg, g: GuestReg, dirty: bool) {
        debug_assert!(self.gpr_owner[reg as usize].is_none(), "{reg:?} already bound");
        self.gpr_owner[reg as usize] = Some(g);
        self.bindings[g.index()] = Binding::Scalar { reg, dirty };
        self.touch_gpr(reg);
        self.pinned_gpr = self.pinned_gpr.set(reg as u8);
    }

    fn assign_xmm(&mut self, reg: Xmm, g: GuestReg, dirty: bool) {
        debug_assert!(self.xmm_owner[reg as usize].is_none(), "{reg:?} already bound");
        self.xmm_owner[reg as usize] = Some(g);
        self.bindings[g.index()] = Binding::Vector { reg, dirty };
        self.touch_xmm(reg);
        self.pinned_xmm = self.pinned_xmm.set(reg as u8);
    }

    fn alloc_gpr(&mut self, buf: &mut CodeBuffer) -> Reg {
        if let Some(r) = self
            .gpr_pool
            .iter()
            .find(|&r| self.gpr_owner[r as usize].is_none())
        {
            return Reg::from_index(r);
        }
        let victim = self
            .gpr_pool
            .subtract(self.pinned_gpr)
            .iter()
            .min_by_key(|&r| self.gpr_lru[r as usize])
            .unwrap_or_else(|| panic!("all host GPRs pinned"));
        if let Some(g) = self.gpr_owner[victim as usize] {
            tracing::trace!(?g, host = victim, "evicting");
            self.flush(buf, g);
        }
        Reg::from_index(victim)
    }

    fn alloc_xmm(&mut self, buf: &mut CodeBuffer) -> Xmm {
        if let Some(r) = self
            .xmm_pool
            .iter()
            .find(|&r| self.xmm_owner[r as usize].is_none())
        {
            return Xmm::from_index(r);
        }
        let victim = self
            .xmm_pool
            .subtract(self.pinned_xmm)
            .iter()
            .min_by_key(|&r| self.xmm_lru[r as usize])
            .unwrap_or_else(|| panic!("all host XMM registers pinned"));
        if let Some(g) = self.xmm_owner[victim as usize] {
            tracing::trace!(?g, host = victim, "evicting");
            self.flush(buf, g);
        }
        Xmm::from_index(victim)
    }
}

fn fits_i32(v: u64) -> bool {
    v as i64 >= i32::MIN as i64 && v as i64 <= i32::MAX as i64
}

/// Store a 64-bit constant to a home slot. Clobbers RAX when the value
/// does not sign-extend from 32 bits.
fn store_const(buf: &mut CodeBuffer, home: Mem, value: u64) {
    if fits_i32(value) {
        emit_store_imm(buf, true, home, value as i32);
    } else {
        emit_mov_ri(buf, true, SCRATCH0, value);
        emit_store(buf, true, SCRATCH0, home);
    }
}
