//! 17.14 signed fixed-point arithmetic.
//!
//! The MLFQS statistics (`recent_cpu`, `load_avg`) are real numbers, but
//! the kernel has no floating point. Values are stored as `i32` with the
//! low 14 bits holding the fraction: 17 integer bits, 14 fraction bits
//! and the sign.

/// One in fixed-point representation (2^14).
const F: i32 = 1 << 14;

/// A 17.14 fixed-point number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Real(i32);

impl Real {
    pub const ZERO: Real = Real(0);

    pub const fn from_int(n: i32) -> Real {
        Real(n * F)
    }

    /// Quotient of two integers, kept in fixed point (e.g. 59/60).
    pub const fn from_ratio(num: i32, den: i32) -> Real {
        Real::from_int(num).div(Real::from_int(den))
    }

    pub const fn add(self, other: Real) -> Real {
        Real(self.0 + other.0)
    }

    pub const fn sub(self, other: Real) -> Real {
        Real(self.0 - other.0)
    }

    pub const fn add_int(self, n: i32) -> Real {
        Real(self.0 + n * F)
    }

    pub const fn sub_int(self, n: i32) -> Real {
        Real(self.0 - n * F)
    }

    pub const fn mul(self, other: Real) -> Real {
        Real(((self.0 as i64 * other.0 as i64) / F as i64) as i32)
    }

    pub const fn mul_int(self, n: i32) -> Real {
        Real(self.0 * n)
    }

    pub const fn div(self, other: Real) -> Real {
        Real(((self.0 as i64 * F as i64) / other.0 as i64) as i32)
    }

    pub const fn div_int(self, n: i32) -> Real {
        Real(self.0 / n)
    }

    /// Integer part, rounded toward zero.
    pub const fn to_int_trunc(self) -> i32 {
        self.0 / F
    }

    /// Nearest integer; halves round away from zero.
    pub const fn to_int_nearest(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}
