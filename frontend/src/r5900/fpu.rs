//! Guest floating-point semantics.
//!
//! The R5900 FPU is IEEE-754 shaped but not compliant: there are no
//! infinities, NaNs or denormals, exponent 255 encodes ordinary numbers,
//! results are clamped instead of overflowing and the adder drops the
//! guard bits. Every operation here works on raw bit patterns, computes
//! in `f64` (which holds any guest value exactly) and narrows back with
//! the guest's rounding, returning the result together with the FCR31
//! bits it raised.

use eerec_core::flags::{
    FCR31_C, FCR31_D, FCR31_I, FCR31_O, FCR31_SD, FCR31_SI, FCR31_SO, FCR31_SU, FCR31_U,
};

pub const SIGN: u32 = 0x8000_0000;
/// Largest guest magnitude.
pub const MAX: u32 = 0x7fff_ffff;

/// Flags every arithmetic operation clears before it runs.
pub const CLEAR_ARITH: u32 = FCR31_O | FCR31_U;
/// Flags DIV/SQRT/RSQRT clear before they run.
pub const CLEAR_DIV: u32 = FCR31_O | FCR31_U | FCR31_I | FCR31_D;

const OVERFLOW: u32 = FCR31_O | FCR31_SO;
const UNDERFLOW: u32 = FCR31_U | FCR31_SU;
const INVALID: u32 = FCR31_I | FCR31_SI;
const DIVIDE: u32 = FCR31_D | FCR31_SD;

/// Result bits plus the FCR31 flags the operation raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub bits: u32,
    pub flags: u32,
}

impl Outcome {
    const fn new(bits: u32, flags: u32) -> Self {
        Self { bits, flags }
    }

    pub fn overflowed(&self) -> bool {
        self.flags & FCR31_O != 0
    }

    pub fn underflowed(&self) -> bool {
        self.flags & FCR31_U != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Toward zero.
    Chop,
    /// To nearest, ties to even.
    Nearest,
}

#[inline]
pub const fn exponent(bits: u32) -> u32 {
    (bits >> 23) & 0xff
}

#[inline]
const fn is_zero(bits: u32) -> bool {
    exponent(bits) == 0
}

/// Widen a guest single to a double. Exponent 0 is a signed zero
/// whatever the mantissa; exponent 255 is an ordinary number.
pub fn to_double(bits: u32) -> f64 {
    let sign = ((bits & SIGN) as u64) << 32;
    let exp = exponent(bits);
    if exp == 0 {
        return f64::from_bits(sign);
    }
    let mant = (bits & 0x007f_ffff) as u64;
    let exp64 = (exp as u64 + 1023 - 127) << 52;
    f64::from_bits(sign | exp64 | (mant << 29))
}

/// Narrow a double to a guest single.
///
/// `keep_denormal` selects the adder's underflow behaviour, which keeps
/// the top mantissa bits under a zero exponent instead of flushing.
pub fn narrow(x: f64, round: Round, keep_denormal: bool) -> Outcome {
    let bits = x.to_bits();
    let sign = ((bits >> 32) as u32) & SIGN;
    if x == 0.0 {
        return Outcome::new(sign, 0);
    }

    let mut exp = ((bits >> 52) & 0x7ff) as i32 - 1023 + 127;
    let mant52 = bits & ((1u64 << 52) - 1);
    // Underflow is decided on the unrounded magnitude.
    if exp <= 0 {
        let kept = if keep_denormal {
            sign | (mant52 >> 29) as u32
        } else {
            sign
        };
        return Outcome::new(kept, UNDERFLOW);
    }

    let mut mant = (mant52 >> 29) as u32;
    if round == Round::Nearest {
        let rem = mant52 & ((1 << 29) - 1);
        let half = 1u64 << 28;
        if rem > half || (rem == half && mant & 1 != 0) {
            mant += 1;
            if mant == 1 << 23 {
                mant = 0;
                exp += 1;
            }
        }
    }

    if exp >= 256 {
        return Outcome::new(sign | MAX, OVERFLOW);
    }
    Outcome::new(sign | ((exp as u32) << 23) | mant, 0)
}

/// Drop the bits of the smaller operand that fall below the larger
/// operand's guard position.
pub fn mask_guard_bits(a: u32, b: u32) -> (u32, u32) {
    let diff = exponent(a) as i32 - exponent(b) as i32;
    match diff {
        d if d >= 25 => (a, b & SIGN),
        d @ 1..=24 => (a, b & (!0u32 << (d - 1))),
        d if d <= -25 => (a & SIGN, b),
        d @ -24..=-1 => (a & (!0u32 << (-d - 1)), b),
        _ => (a, b),
    }
}

pub fn add(a: u32, b: u32) -> Outcome {
    let (a, b) = mask_guard_bits(a, b);
    narrow(to_double(a) + to_double(b), Round::Chop, true)
}

pub fn sub(a: u32, b: u32) -> Outcome {
    let (a, b) = mask_guard_bits(a, b);
    narrow(to_double(a) - to_double(b), Round::Chop, true)
}

pub fn mul(a: u32, b: u32) -> Outcome {
    narrow(to_double(a) * to_double(b), Round::Chop, false)
}

/// `a / b`.
pub fn div(a: u32, b: u32) -> Outcome {
    if is_zero(b) {
        let flags = if is_zero(a) { INVALID } else { DIVIDE };
        return Outcome::new(((a ^ b) & SIGN) | MAX, flags);
    }
    narrow(to_double(a) / to_double(b), Round::Nearest, false)
}

/// Square root of `b`. Negative operands use their magnitude and raise
/// invalid; any zero yields +0.
pub fn sqrt(b: u32) -> Outcome {
    if is_zero(b) {
        return Outcome::new(0, 0);
    }
    let mut flags = 0;
    let mut b = b;
    if b & SIGN != 0 {
        flags |= INVALID;
        b &= !SIGN;
    }
    let mut out = narrow(to_double(b).sqrt(), Round::Nearest, false);
    out.flags |= flags;
    out
}

/// `a / sqrt(b)`.
pub fn rsqrt(a: u32, b: u32) -> Outcome {
    let mut flags = 0;
    let mut b = b;
    if b & SIGN != 0 {
        flags |= INVALID;
        b &= !SIGN;
    }
    if is_zero(b) {
        flags |= if is_zero(a) { INVALID } else { DIVIDE };
        return Outcome::new((a & SIGN) | MAX, flags);
    }
    let mut out = narrow(to_double(a) / to_double(b).sqrt(), Round::Nearest, false);
    out.flags |= flags;
    out
}

/// Result of a multiply-accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacOutcome {
    pub result: Outcome,
    /// The clamp path was taken.
    pub overflowed: bool,
}

/// `acc ± a * b`. When the product overflows, or the accumulator is
/// already flagged as overflowed, the sum is not computed and the
/// result is the signed maximum.
pub fn madd(acc: u32, acc_overflowed: bool, a: u32, b: u32, subtract: bool) -> MacOutcome {
    let prod = mul(a, b);
    let negate = if subtract { SIGN } else { 0 };
    if prod.overflowed() || acc_overflowed {
        let sign = if prod.overflowed() {
            (prod.bits ^ negate) & SIGN
        } else {
            acc & SIGN
        };
        return MacOutcome {
            result: Outcome::new(sign | MAX, (prod.flags & !FCR31_U) | OVERFLOW),
            overflowed: true,
        };
    }
    // Only the sticky bits of the multiply stage survive the accumulate.
    let sum = add(acc, prod.bits ^ negate);
    MacOutcome {
        result: Outcome::new(sum.bits, (prod.flags & !CLEAR_ARITH) | sum.flags),
        overflowed: sum.overflowed(),
    }
}

/// Ordering key for MAX/MIN: sign-magnitude order of the raw bits.
fn minmax_key(bits: u32) -> f64 {
    let hi = (bits & SIGN) | 0x4000_0000;
    f64::from_bits(((hi as u64) << 32) | bits as u64)
}

pub fn max(a: u32, b: u32) -> u32 {
    if minmax_key(a) >= minmax_key(b) {
        a
    } else {
        b
    }
}

pub fn min(a: u32, b: u32) -> u32 {
    if minmax_key(a) <= minmax_key(b) {
        a
    } else {
        b
    }
}

/// CVT.W.S: truncate, saturating by sign.
pub fn cvt_w(bits: u32) -> u32 {
    if exponent(bits) >= 127 + 31 {
        return if bits & SIGN != 0 { 0x8000_0000 } else { 0x7fff_ffff };
    }
    to_double(bits) as i32 as u32
}

/// CVT.S.W: integer to guest single, rounded toward zero.
pub fn cvt_s(word: u32) -> u32 {
    narrow(word as i32 as f64, Round::Chop, false).bits
}

/// Evaluate a C.cond comparison.
pub fn compare(cond: CompareCond, a: u32, b: u32) -> bool {
    let (x, y) = (to_double(a), to_double(b));
    match cond {
        CompareCond::False => false,
        CompareCond::Eq => x == y,
        CompareCond::Lt => x < y,
        CompareCond::Le => x <= y,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareCond {
    False,
    Eq,
    Lt,
    Le,
}

/// Merge an outcome's flags into FCR31 after clearing `cleared`.
#[inline]
pub fn apply_flags(fcr31: u32, cleared: u32, raised: u32) -> u32 {
    (fcr31 & !cleared) | raised
}

/// Set or clear the FCR31 condition bit.
#[inline]
pub fn set_condition(fcr31: u32, value: bool) -> u32 {
    if value {
        fcr31 | FCR31_C
    } else {
        fcr31 & !FCR31_C
    }
}

// -- FPU state transitions --

use super::insn::FpuOp;

/// The FPU registers an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpuRegs<'a> {
    pub fpr: &'a [u32; 32],
    pub acc: u32,
    pub acc_flag: bool,
    pub fcr31: u32,
}

/// Where an FPU operation's result goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpuEffect {
    /// New value for `fd`, if written.
    pub fd: Option<u32>,
    /// New accumulator and its overflow flag, if written.
    pub acc: Option<(u32, bool)>,
    pub fcr31: u32,
}

/// Apply one COP1 arithmetic operation to the FPU state.
pub fn execute(op: FpuOp, regs: FpuRegs<'_>, fs: u8, ft: u8) -> FpuEffect {
    let s = regs.fpr[fs as usize & 31];
    let t = regs.fpr[ft as usize & 31];
    let fcr = regs.fcr31;
    let arith = |out: Outcome| FpuEffect {
        fd: Some(out.bits),
        acc: None,
        fcr31: apply_flags(fcr, CLEAR_ARITH, out.flags),
    };
    let divide = |out: Outcome| FpuEffect {
        fd: Some(out.bits),
        acc: None,
        fcr31: apply_flags(fcr, CLEAR_DIV, out.flags),
    };
    let to_acc = |out: Outcome| FpuEffect {
        fd: None,
        acc: Some((out.bits, out.overflowed())),
        fcr31: apply_flags(fcr, CLEAR_ARITH, out.flags),
    };
    let plain = |bits: u32| FpuEffect {
        fd: Some(bits),
        acc: None,
        fcr31: fcr,
    };
    let cond = |c: CompareCond| FpuEffect {
        fd: None,
        acc: None,
        fcr31: set_condition(fcr, compare(c, s, t)),
    };

    match op {
        FpuOp::Add => arith(add(s, t)),
        FpuOp::Sub => arith(sub(s, t)),
        FpuOp::Mul => arith(mul(s, t)),
        FpuOp::Div => divide(div(s, t)),
        FpuOp::Sqrt => divide(sqrt(t)),
        FpuOp::Rsqrt => divide(rsqrt(s, t)),
        FpuOp::Adda => to_acc(add(s, t)),
        FpuOp::Suba => to_acc(sub(s, t)),
        FpuOp::Mula => to_acc(mul(s, t)),
        FpuOp::Madd | FpuOp::Msub | FpuOp::Madda | FpuOp::Msuba => {
            let subtract = matches!(op, FpuOp::Msub | FpuOp::Msuba);
            let m = madd(regs.acc, regs.acc_flag, s, t, subtract);
            let fcr31 = apply_flags(fcr, CLEAR_ARITH, m.result.flags);
            if op.writes_acc() {
                FpuEffect {
                    fd: None,
                    acc: Some((m.result.bits, m.overflowed)),
                    fcr31,
                }
            } else {
                FpuEffect {
                    fd: Some(m.result.bits),
                    acc: None,
                    fcr31,
                }
            }
        }
        FpuOp::Max => arith(Outcome::new(max(s, t), 0)),
        FpuOp::Min => arith(Outcome::new(min(s, t), 0)),
        FpuOp::CvtW => plain(cvt_w(s)),
        FpuOp::CvtS => plain(cvt_s(s)),
        FpuOp::CF => cond(CompareCond::False),
        FpuOp::CEq => cond(CompareCond::Eq),
        FpuOp::CLt => cond(CompareCond::Lt),
        FpuOp::CLe => cond(CompareCond::Le),
    }
}
