//! VU0 register block as seen from the main processor (macro mode).

use crate::flags::FlagState;

/// Number of VF (vector float) registers.
pub const NUM_VF: usize = 32;
/// Number of control registers addressable through CFC2/CTC2.
pub const NUM_CONTROL: usize = 32;

/// Control register indices (CFC2/CTC2 `rd` field).
pub const CTRL_STATUS: usize = 16;
pub const CTRL_MAC: usize = 17;
pub const CTRL_CLIP: usize = 18;
pub const CTRL_R: usize = 20;
pub const CTRL_I: usize = 21;
pub const CTRL_Q: usize = 22;

/// 1.0f in the w lane of VF0.
const ONE: u32 = 0x3f80_0000;

/// VU0 architectural state.
///
/// Lanes are stored `[x, y, z, w]`. VF0 reads as `(0, 0, 0, 1)` and
/// ignores writes; VI0 reads as zero.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuRegs {
    pub vf: [[u32; 4]; NUM_VF],
    pub acc: [u32; 4],
    /// VI0-VI15 followed by the raw backing words of the other control
    /// registers. Status and MAC live in `status` / `mac`.
    pub ccr: [u32; NUM_CONTROL],
    pub status: FlagState,
    pub mac: u32,
}

impl VuRegs {
    pub fn new() -> Self {
        let mut vf = [[0u32; 4]; NUM_VF];
        vf[0][3] = ONE;
        Self {
            vf,
            acc: [0; 4],
            ccr: [0; NUM_CONTROL],
            status: FlagState::default(),
            mac: 0,
        }
    }

    /// CFC2 view of a control register.
    pub fn read_control(&self, idx: usize) -> u32 {
        match idx {
            0 => 0,
            CTRL_STATUS => self.status.packed,
            CTRL_MAC => self.mac,
            _ => self.ccr[idx & (NUM_CONTROL - 1)],
        }
    }

    /// CTC2: dispatch through the per-register write table.
    pub fn write_control(&mut self, idx: usize, value: u32) {
        let idx = idx & (NUM_CONTROL - 1);
        CONTROL_WRITE[idx](self, idx, value);
    }

    /// Write a VF register under a `dest` field mask (bit 3 = x).
    pub fn write_vf(&mut self, reg: usize, dest: u8, value: [u32; 4]) {
        if reg == 0 {
            return;
        }
        for (lane, v) in value.iter().enumerate() {
            if dest & (8 >> lane) != 0 {
                self.vf[reg][lane] = *v;
            }
        }
    }
}

impl Default for VuRegs {
    fn default() -> Self {
        Self::new()
    }
}

/// Write handler for one control register slot.
pub type ControlWrite = fn(&mut VuRegs, usize, u32);

fn write_ignore(_vu: &mut VuRegs, _idx: usize, _value: u32) {}

fn write_vi(vu: &mut VuRegs, idx: usize, value: u32) {
    vu.ccr[idx] = value & 0xffff;
}

fn write_status(vu: &mut VuRegs, _idx: usize, value: u32) {
    vu.status.write_sticky(value);
}

fn write_clip(vu: &mut VuRegs, idx: usize, value: u32) {
    vu.ccr[idx] = value & 0x00ff_ffff;
}

fn write_r(vu: &mut VuRegs, idx: usize, value: u32) {
    vu.ccr[idx] = value & 0x007f_ffff;
}

fn write_raw(vu: &mut VuRegs, idx: usize, value: u32) {
    vu.ccr[idx] = value;
}

/// Dense per-register CTC2 handlers, indexed by control register id.
pub static CONTROL_WRITE: [ControlWrite; NUM_CONTROL] = {
    let mut t = [write_raw as ControlWrite; NUM_CONTROL];
    t[0] = write_ignore;
    let mut i = 1;
    while i < 16 {
        t[i] = write_vi;
        i += 1;
    }
    t[CTRL_STATUS] = write_status;
    t[CTRL_MAC] = write_ignore;
    t[CTRL_CLIP] = write_clip;
    t[CTRL_R] = write_r;
    t
};
