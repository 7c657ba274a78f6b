//! Guest loads and stores.
//!
//! With a host window the access is inlined as `[r15 + (addr & mask)]`;
//! otherwise every register is flushed and the access goes through
//! `helper_load` / `helper_store`.

use eerec_backend::x86_64::emitter::{
    emit_arith_ri, emit_load, emit_load_ext, emit_mov_ri, emit_sse_rm, emit_store, emit_store16,
    emit_store8, ArithOp, Mem, OPC_MOVSBL, OPC_MOVSLQ, OPC_MOVSS_VxWx, OPC_MOVSS_WxVx,
    OPC_MOVSWL, OPC_MOVUPS_VxWx, OPC_MOVUPS_WxVx, OPC_MOVZBL, OPC_MOVZWL, P_REXW,
};
use eerec_backend::x86_64::regs::{MEM_BASE_REG, SCRATCH0, SCRATCH2, XSCRATCH0};
use eerec_backend::x86_64::tables::emit_move;
use eerec_backend::x86_64::{OpSize, Operand};
use eerec_backend::{GuestReg, Intent};
use eerec_core::Width;

use super::helpers::{helper_load, helper_store};
use super::{Arg, R5900Compiler};

/// Access kinds passed to the memory helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MemKind {
    Lb = 0,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwu,
    Ld,
    Lq,
    Sb,
    Sh,
    Sw,
    Sd,
    Sq,
    Lwc1,
    Swc1,
}

impl MemKind {
    const ALL: [MemKind; 15] = [
        MemKind::Lb,
        MemKind::Lbu,
        MemKind::Lh,
        MemKind::Lhu,
        MemKind::Lw,
        MemKind::Lwu,
        MemKind::Ld,
        MemKind::Lq,
        MemKind::Sb,
        MemKind::Sh,
        MemKind::Sw,
        MemKind::Sd,
        MemKind::Sq,
        MemKind::Lwc1,
        MemKind::Swc1,
    ];

    pub fn from_raw(raw: u32) -> Option<MemKind> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn load(width: Width, signed: bool) -> MemKind {
        match (width, signed) {
            (Width::B8, true) => MemKind::Lb,
            (Width::B8, false) => MemKind::Lbu,
            (Width::B16, true) => MemKind::Lh,
            (Width::B16, false) => MemKind::Lhu,
            (Width::B32, true) => MemKind::Lw,
            (Width::B32, false) => MemKind::Lwu,
            (Width::B64, _) => MemKind::Ld,
            (Width::B128, _) => MemKind::Lq,
        }
    }

    pub fn store(width: Width) -> MemKind {
        match width {
            Width::B8 => MemKind::Sb,
            Width::B16 => MemKind::Sh,
            Width::B32 => MemKind::Sw,
            Width::B64 => MemKind::Sd,
            Width::B128 => MemKind::Sq,
        }
    }
}

/// Host operand of an inline access once the address is in RAX.
fn guest_mem() -> Mem {
    Mem::indexed(MEM_BASE_REG, SCRATCH0, 0, 0)
}

impl R5900Compiler<'_> {
    /// Compute the effective address into EAX, masked into the host
    /// window when there is one.
    fn address_to_scratch(&mut self, base: u8, offset: i16, quad: bool) {
        let mask = self.window_mask.map(|m| if quad { m & !15 } else { m });
        if let Some(b) = self.known(base) {
            let addr = (b as u32).wrapping_add(offset as i32 as u32);
            let addr = mask.map_or(addr, |m| addr & m);
            emit_mov_ri(self.buf, false, SCRATCH0, addr as u64);
            return;
        }
        self.load_into(SCRATCH0, GuestReg::Gpr(base), OpSize::B32);
        if offset != 0 {
            emit_arith_ri(self.buf, ArithOp::Add, false, SCRATCH0, offset as i32);
        }
        if let Some(m) = mask {
            emit_arith_ri(self.buf, ArithOp::And, false, SCRATCH0, m as i32);
        }
    }

    fn call_mem_helper(&mut self, func: usize, kind: MemKind, reg: u8, base: u8, offset: i16) {
        self.ra.flush_all(self.buf);
        self.address_to_scratch(base, offset, false);
        self.ra.unpin_all();
        self.call_helper(
            func,
            &[Arg::Scratch, Arg::Imm(kind as u64), Arg::Imm(reg as u64)],
        );
    }

    pub(crate) fn lower_load(&mut self, width: Width, signed: bool, rt: u8, base: u8, offset: i16) {
        if self.window_mask.is_none() {
            let kind = MemKind::load(width, signed);
            self.call_mem_helper(helper_load as usize, kind, rt, base, offset);
            return;
        }
        if rt == 0 {
            return;
        }

        self.address_to_scratch(base, offset, width == Width::B128);
        let m = guest_mem();
        let g = GuestReg::Gpr(rt);
        if width == Width::B128 {
            // The upper doubleword is not cached; go through the home slot.
            self.ra.invalidate(g);
            emit_sse_rm(self.buf, OPC_MOVUPS_VxWx, XSCRATCH0, m);
            emit_sse_rm(self.buf, OPC_MOVUPS_WxVx, XSCRATCH0, g.home());
            return;
        }
        let d = self.ra.write_gpr(self.buf, g);
        match (width, signed) {
            (Width::B8, true) => emit_load_ext(self.buf, OPC_MOVSBL | P_REXW, d, m),
            (Width::B8, false) => emit_load_ext(self.buf, OPC_MOVZBL, d, m),
            (Width::B16, true) => emit_load_ext(self.buf, OPC_MOVSWL | P_REXW, d, m),
            (Width::B16, false) => emit_load_ext(self.buf, OPC_MOVZWL, d, m),
            (Width::B32, true) => emit_load_ext(self.buf, OPC_MOVSLQ, d, m),
            (Width::B32, false) => emit_load(self.buf, false, d, m),
            _ => emit_load(self.buf, true, d, m),
        }
    }

    pub(crate) fn lower_store(&mut self, width: Width, rt: u8, base: u8, offset: i16) {
        if self.window_mask.is_none() {
            let kind = MemKind::store(width);
            self.call_mem_helper(helper_store as usize, kind, rt, base, offset);
            return;
        }

        let m = guest_mem();
        let g = GuestReg::Gpr(rt);
        if width == Width::B128 {
            self.ra.flush(self.buf, g);
            self.address_to_scratch(base, offset, true);
            emit_sse_rm(self.buf, OPC_MOVUPS_VxWx, XSCRATCH0, g.home());
            emit_sse_rm(self.buf, OPC_MOVUPS_WxVx, XSCRATCH0, m);
            return;
        }

        self.address_to_scratch(base, offset, false);
        let v = self.ra.bind(self.buf, g, Intent::ReadAny);
        emit_move(self.buf, OpSize::B64, Operand::Reg(SCRATCH2), v);
        match width {
            Width::B8 => emit_store8(self.buf, SCRATCH2, m),
            Width::B16 => emit_store16(self.buf, SCRATCH2, m),
            Width::B32 => emit_store(self.buf, false, SCRATCH2, m),
            _ => emit_store(self.buf, true, SCRATCH2, m),
        }
    }

    pub(crate) fn lower_lwc1(&mut self, ft: u8, base: u8, offset: i16) {
        if self.window_mask.is_none() {
            self.call_mem_helper(helper_load as usize, MemKind::Lwc1, ft, base, offset);
            return;
        }
        self.address_to_scratch(base, offset, false);
        let x = self.ra.bind_xmm(self.buf, GuestReg::Fpr(ft), Intent::Write);
        emit_sse_rm(self.buf, OPC_MOVSS_VxWx, x, guest_mem());
    }

    pub(crate) fn lower_swc1(&mut self, ft: u8, base: u8, offset: i16) {
        if self.window_mask.is_none() {
            self.call_mem_helper(helper_store as usize, MemKind::Swc1, ft, base, offset);
            return;
        }
        self.address_to_scratch(base, offset, false);
        let x = self.ra.bind_xmm(self.buf, GuestReg::Fpr(ft), Intent::Read);
        emit_sse_rm(self.buf, OPC_MOVSS_WxVx, x, guest_mem());
    }
}
