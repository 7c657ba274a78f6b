//! Guest status flags.
//!
//! FCR31 bit layout for the FPU, and the VU status register in its two
//! representations: the packed 12-bit form the guest reads and writes,
//! and a wide form with per-lane zero/sign bits that is cheap to build
//! from host compare results.

/// FCR31: condition bit set by `C.cond.S`.
pub const FCR31_C: u32 = 0x0080_0000;
/// FCR31: invalid operation (0/0, sqrt of a negative).
pub const FCR31_I: u32 = 0x0002_0000;
/// FCR31: division by zero.
pub const FCR31_D: u32 = 0x0001_0000;
/// FCR31: overflow.
pub const FCR31_O: u32 = 0x0000_8000;
/// FCR31: underflow.
pub const FCR31_U: u32 = 0x0000_4000;
/// FCR31: sticky invalid.
pub const FCR31_SI: u32 = 0x0000_0040;
/// FCR31: sticky divide.
pub const FCR31_SD: u32 = 0x0000_0020;
/// FCR31: sticky overflow.
pub const FCR31_SO: u32 = 0x0000_0010;
/// FCR31: sticky underflow.
pub const FCR31_SU: u32 = 0x0000_0008;

/// Bits user code may write through CTC1.
pub const FCR31_WRITABLE: u32 = FCR31_C
    | FCR31_I
    | FCR31_D
    | FCR31_O
    | FCR31_U
    | FCR31_SI
    | FCR31_SD
    | FCR31_SO
    | FCR31_SU
    | 0x0000_0003;

/// Packed VU status bits.
pub mod status {
    pub const Z: u32 = 1 << 0;
    pub const S: u32 = 1 << 1;
    pub const U: u32 = 1 << 2;
    pub const O: u32 = 1 << 3;
    pub const I: u32 = 1 << 4;
    pub const D: u32 = 1 << 5;
    pub const ZS: u32 = 1 << 6;
    pub const SS: u32 = 1 << 7;
    pub const US: u32 = 1 << 8;
    pub const OS: u32 = 1 << 9;
    pub const IS: u32 = 1 << 10;
    pub const DS: u32 = 1 << 11;
    /// All defined bits of the packed register.
    pub const MASK: u32 = 0xfff;
    /// Bits writable through CTC2 (the sticky half).
    pub const STICKY: u32 = ZS | SS | US | OS | IS | DS;
}

/// Wide-form field masks.
pub mod wide {
    pub const STICKY_ZERO: u32 = 0x0000_000f;
    pub const STICKY_SIGN: u32 = 0x0000_00f0;
    pub const ZERO: u32 = 0x0000_0f00;
    pub const SIGN: u32 = 0x0000_f000;
    pub const U: u32 = 1 << 16;
    pub const O: u32 = 1 << 17;
    pub const I: u32 = 1 << 18;
    pub const D: u32 = 1 << 19;
    pub const US: u32 = 1 << 22;
    pub const OS: u32 = 1 << 23;
    pub const IS: u32 = 1 << 24;
    pub const DS: u32 = 1 << 25;
    /// Flag bits that map one-to-one onto the packed form.
    pub const FLAG_BITS: u32 = 0x03cf_0000;
}

/// Per-lane MAC flag nibbles (lane x is bit 3 of each nibble).
pub mod mac {
    pub const ZERO_SHIFT: u32 = 0;
    pub const SIGN_SHIFT: u32 = 4;
    pub const UNDER_SHIFT: u32 = 8;
    pub const OVER_SHIFT: u32 = 12;

    /// MAC bit position for `lane` (0 = x .. 3 = w).
    #[inline]
    pub const fn lane_bit(lane: usize) -> u32 {
        1 << (3 - lane as u32)
    }
}

/// VU status flags in both representations.
///
/// The two halves are always kept consistent by the setters; writing
/// either field directly is allowed but then the other one is stale
/// until the next `set_*` call.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagState {
    pub wide: u32,
    pub packed: u32,
}

impl FlagState {
    /// Wide → packed.
    pub const fn pack(w: u32) -> u32 {
        let mut p = (w & wide::FLAG_BITS) >> 14;
        if w & wide::ZERO != 0 {
            p |= status::Z;
        }
        if w & wide::SIGN != 0 {
            p |= status::S;
        }
        if w & wide::STICKY_ZERO != 0 {
            p |= status::ZS;
        }
        if w & wide::STICKY_SIGN != 0 {
            p |= status::SS;
        }
        p
    }

    /// Packed → wide. Lane information that the packed form does not
    /// carry is reconstructed on a single lane.
    pub const fn unpack(packed: u32) -> u32 {
        ((packed >> 3) & 0x18) | ((packed << 11) & 0x1800) | ((packed << 14) & wide::FLAG_BITS)
    }

    pub fn set_wide(&mut self, w: u32) {
        self.wide = w;
        self.packed = Self::pack(w);
    }

    pub fn set_packed(&mut self, packed: u32) {
        self.packed = packed & status::MASK;
        self.wide = Self::unpack(self.packed);
    }

    /// Fold a fresh MAC result into the status: the non-sticky lane and
    /// U/O bits are replaced, sticky bits accumulate, I/D are untouched.
    pub fn update_from_mac(&mut self, mac_flags: u32) {
        let zero = (mac_flags >> mac::ZERO_SHIFT) & 0xf;
        let sign = (mac_flags >> mac::SIGN_SHIFT) & 0xf;
        let under = (mac_flags >> mac::UNDER_SHIFT) & 0xf != 0;
        let over = (mac_flags >> mac::OVER_SHIFT) & 0xf != 0;

        let keep = self.wide
            & (wide::STICKY_ZERO
                | wide::STICKY_SIGN
                | wide::I
                | wide::D
                | wide::US
                | wide::OS
                | wide::IS
                | wide::DS);
        let mut w = keep | zero | (sign << 4) | (zero << 8) | (sign << 12);
        if under {
            w |= wide::U | wide::US;
        }
        if over {
            w |= wide::O | wide::OS;
        }
        self.set_wide(w);
    }

    /// CTC2 to the status register: only the sticky half is writable.
    pub fn write_sticky(&mut self, value: u32) {
        let packed = (self.packed & !status::STICKY) | (value & status::STICKY);
        let mut w = self.wide
            & (wide::ZERO | wide::SIGN | wide::U | wide::O | wide::I | wide::D);
        if packed & status::ZS != 0 {
            let lanes = self.wide & wide::STICKY_ZERO;
            w |= if lanes != 0 { lanes } else { 0x08 };
        }
        if packed & status::SS != 0 {
            let lanes = self.wide & wide::STICKY_SIGN;
            w |= if lanes != 0 { lanes } else { 0x10 };
        }
        w |= (packed << 14) & (wide::US | wide::OS | wide::IS | wide::DS);
        self.set_wide(w);
    }
}
