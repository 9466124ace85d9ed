//! WAD fixed-point arithmetic
//!
//! Ratios are unsigned integers scaled by 10^18, matching the reward token's
//! decimal precision. Every division truncates toward zero so that payouts
//! derived from a ratio can only err in the pool's favour.

use alloy_primitives::{Uint, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 512-bit intermediate for products of up to four `u128` factors
type U512 = Uint<512, 8>;

/// Fixed-point scale (10^18)
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// A ratio in the closed unit interval, stored as a WAD-scaled integer
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ratio(u128);

impl Ratio {
    /// 0%
    pub const ZERO: Self = Self(0);

    /// 100%
    pub const ONE: Self = Self(WAD);

    /// Build from a raw WAD value, saturating at [`Ratio::ONE`]
    pub fn from_wad(raw: u128) -> Self {
        Self(raw.min(WAD))
    }

    /// `floor(num * WAD / den)`, saturating at [`Ratio::ONE`].
    ///
    /// A zero denominator yields [`Ratio::ONE`].
    pub fn from_fraction(num: u128, den: u128) -> Self {
        if den == 0 || num >= den {
            return Self::ONE;
        }
        let scaled = U256::from(num) * U256::from(WAD) / U256::from(den);
        // num < den, so the quotient is below WAD
        Self(u128::try_from(scaled).unwrap_or(WAD))
    }

    /// `floor(num^2 * WAD / den^2)`, saturating at [`Ratio::ONE`].
    pub fn from_fraction_squared(num: u64, den: u64) -> Self {
        if den == 0 || num >= den {
            return Self::ONE;
        }
        let num_sq = U256::from(num) * U256::from(num);
        let den_sq = U256::from(den) * U256::from(den);
        let scaled = num_sq * U256::from(WAD) / den_sq;
        Self(u128::try_from(scaled).unwrap_or(WAD))
    }

    /// Raw WAD-scaled value
    pub fn raw(self) -> u128 {
        self.0
    }

    /// `1 - self`
    pub fn complement(self) -> Self {
        Self(WAD - self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_one(self) -> bool {
        self.0 == WAD
    }

    /// Lossy conversion for display and reporting only
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / WAD as f64
    }
}

impl fmt::Debug for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ratio({})", self)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WAD;
        let frac = self.0 % WAD;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// `floor(product(numerators) / product(denominators))` in 512-bit precision.
///
/// Returns `None` when a denominator is zero, an intermediate product
/// overflows 512 bits, or the quotient does not fit in `u128`.
pub fn mul_div<const N: usize, const D: usize>(
    numerators: [u128; N],
    denominators: [u128; D],
) -> Option<u128> {
    let mut num = U512::from(1u8);
    for n in numerators {
        num = num.checked_mul(U512::from(n))?;
    }
    let mut den = U512::from(1u8);
    for d in denominators {
        if d == 0 {
            return None;
        }
        den = den.checked_mul(U512::from(d))?;
    }
    u128::try_from(num / den).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fraction_truncates() {
        // 1/3 = 0.333..., never rounded up
        assert_eq!(Ratio::from_fraction(1, 3).raw(), 333_333_333_333_333_333);
        assert_eq!(Ratio::from_fraction(2, 3).raw(), 666_666_666_666_666_666);
    }

    #[test]
    fn test_fraction_saturates() {
        assert_eq!(Ratio::from_fraction(5, 4), Ratio::ONE);
        assert_eq!(Ratio::from_fraction(1, 0), Ratio::ONE);
        assert_eq!(Ratio::from_fraction_squared(7, 7), Ratio::ONE);
        assert_eq!(Ratio::from_wad(WAD * 3), Ratio::ONE);
    }

    #[test]
    fn test_fraction_squared() {
        // (53/193)^2 = 2809/37249
        let r = Ratio::from_fraction_squared(53, 193);
        assert_eq!(r.raw(), 2809 * WAD / 37249);
        assert_eq!(Ratio::from_fraction_squared(0, 193), Ratio::ZERO);
    }

    #[test]
    fn test_complement_and_display() {
        let quarter = Ratio::from_fraction(1, 4);
        assert_eq!(quarter.complement(), Ratio::from_fraction(3, 4));
        assert_eq!(quarter.to_string(), "0.25");
        assert_eq!(Ratio::ONE.to_string(), "1");
        assert_eq!(Ratio::ZERO.complement(), Ratio::ONE);
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div([1000, 250, WAD, WAD], [WAD, WAD, 250]), Some(1000));
        assert_eq!(mul_div([10, 10], [3]), Some(33));
        assert_eq!(mul_div([1], [0]), None);
        assert_eq!(mul_div([u128::MAX, u128::MAX], [1]), None);
        assert_eq!(mul_div([u128::MAX, u128::MAX, u128::MAX], [u128::MAX, u128::MAX]), Some(u128::MAX));
    }

    proptest! {
        #[test]
        fn prop_fraction_in_unit_interval(num in any::<u64>(), den in 1u64..) {
            let r = Ratio::from_fraction(num as u128, den as u128);
            prop_assert!(r <= Ratio::ONE);
            let sq = Ratio::from_fraction_squared(num, den);
            prop_assert!(sq <= Ratio::ONE);
            if num < den {
                prop_assert!(sq <= r);
            }
        }

        #[test]
        fn prop_fraction_monotone_in_numerator(a in any::<u32>(), b in any::<u32>(), den in 1u64..=u32::MAX as u64) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Ratio::from_fraction(lo as u128, den as u128) <= Ratio::from_fraction(hi as u128, den as u128));
            prop_assert!(Ratio::from_fraction_squared(lo as u64, den) <= Ratio::from_fraction_squared(hi as u64, den));
        }
    }
}
