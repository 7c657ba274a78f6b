/// Register comparison of a conditional branch. Guest branches only
/// compare signed 64-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Le,
    Gt,
}

impl Cond {
    /// The same test with its operands exchanged.
    pub const fn swap(self) -> Cond {
        match self {
            Cond::Eq | Cond::Ne => self,
            Cond::Lt => Cond::Gt,
            Cond::Ge => Cond::Le,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
        }
    }

    /// Outcome for two register values known at compile time.
    pub const fn eval(self, a: u64, b: u64) -> bool {
        let (a, b) = (a as i64, b as i64);
        match self {
            Cond::Eq => a == b,
            Cond::Ne => a != b,
            Cond::Lt => a < b,
            Cond::Ge => a >= b,
            Cond::Le => a <= b,
            Cond::Gt => a > b,
        }
    }
}

/// Width of a guest memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Width {
    B8 = 0,
    B16 = 1,
    B32 = 2,
    B64 = 3,
    B128 = 4,
}

impl Width {
    pub const fn size_bytes(self) -> u32 {
        1 << self as u32
    }

    /// Mask that keeps the low `size_bytes * 8` bits of a value.
    pub const fn value_mask(self) -> u128 {
        match self {
            Width::B128 => u128::MAX,
            w => (1u128 << (w.size_bytes() * 8)) - 1,
        }
    }
}

/// Host registers available to, or pinned by, the allocator. Bit `n`
/// is register number `n`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RegSet(u32);

impl RegSet {
    pub const EMPTY: RegSet = RegSet(0);

    pub const fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn of(regs: &[u8]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < regs.len() {
            bits |= 1 << regs[i];
            i += 1;
        }
        Self(bits)
    }

    pub const fn set(self, reg: u8) -> Self {
        Self(self.0 | 1 << reg)
    }

    pub const fn subtract(self, other: RegSet) -> Self {
        Self(self.0 & !other.0)
    }

    /// Register numbers, lowest first.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..16u8).filter(move |&r| self.0 & 1 << r != 0)
    }
}

impl std::fmt::Debug for RegSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
