//! The managed 128-bit `Decimal` primitive.
//!
//! A value is `mantissa / 10^scale` with `|mantissa| < 2^96` and `scale <= 28`,
//! matching the managed runtime's representation. Arithmetic that would exceed the
//! mantissa first gives up fractional digits (rounding half to even); when no fraction
//! is left the operation overflows.

use std::{cmp::Ordering, fmt};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive};

/// Largest mantissa magnitude, `2^96 - 1`.
pub const MAX_MANTISSA: i128 = (1 << 96) - 1;
/// Largest number of fractional digits.
pub const MAX_SCALE: u8 = 28;

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    pub const ZERO: Self = Self { mantissa: 0, scale: 0 };

    /// Builds a decimal from a mantissa and scale, reducing the scale if needed.
    #[must_use]
    pub fn new(mantissa: &BigInt, scale: u32) -> Option<Self> {
        let (mantissa, scale) = fit(mantissa.clone(), scale)?;
        Some(Self { mantissa, scale })
    }

    #[must_use]
    pub fn from_bigint(value: &BigInt) -> Option<Self> {
        Self::new(value, 0)
    }

    /// Converts a float through its shortest round-trip decimal text.
    ///
    /// Returns `None` for NaN, infinities and magnitudes above the decimal range.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // `Display` for f64 never uses exponent notation and round-trips exactly.
        let text = format!("{value}");
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.as_str()),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let mut all_digits = String::with_capacity(int_part.len() + frac_part.len());
        all_digits.push_str(int_part);
        all_digits.push_str(frac_part);
        let mut mantissa: BigInt = all_digits.parse().ok()?;
        if negative {
            mantissa = -mantissa;
        }
        let scale = u32::try_from(frac_part.len()).ok()?;
        Self::new(&mantissa, scale)
    }

    #[must_use]
    pub fn mantissa(self) -> i128 {
        self.mantissa
    }

    #[must_use]
    pub fn scale(self) -> u8 {
        self.scale
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.mantissa == 0
    }

    #[must_use]
    pub fn to_f64(self) -> f64 {
        // Parsing the exact text gives a correctly rounded result.
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Integer part, truncated toward zero.
    #[must_use]
    pub fn trunc(self) -> BigInt {
        let divisor = pow10(u32::from(self.scale));
        BigInt::from(self.mantissa) / divisor
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        let (a, b, scale) = align(self, other);
        Self::new(&(a + b), scale)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let (a, b, scale) = align(self, other);
        Self::new(&(a - b), scale)
    }

    #[must_use]
    pub fn checked_mul(self, other: Self) -> Option<Self> {
        let product = BigInt::from(self.mantissa) * BigInt::from(other.mantissa);
        Self::new(&product, u32::from(self.scale) + u32::from(other.scale))
    }

    #[must_use]
    pub fn neg(self) -> Self {
        Self {
            mantissa: -self.mantissa,
            scale: self.scale,
        }
    }
}

fn pow10(exp: u32) -> BigInt {
    num_traits::pow(BigInt::from(10), exp as usize)
}

fn align(a: Decimal, b: Decimal) -> (BigInt, BigInt, u32) {
    let scale = u32::from(a.scale.max(b.scale));
    let am = BigInt::from(a.mantissa) * pow10(scale - u32::from(a.scale));
    let bm = BigInt::from(b.mantissa) * pow10(scale - u32::from(b.scale));
    (am, bm, scale)
}

/// Drops fractional digits until the mantissa and scale fit.
fn fit(mut mantissa: BigInt, mut scale: u32) -> Option<(i128, u8)> {
    let max = BigInt::from(MAX_MANTISSA);
    let ten = BigInt::from(10);
    while scale > u32::from(MAX_SCALE) || (mantissa.abs() > max && scale > 0) {
        mantissa = round_half_even_div(&mantissa, &ten);
        scale -= 1;
    }
    if mantissa.abs() > max {
        return None;
    }
    let mantissa = mantissa.to_i128()?;
    Some((mantissa, u8::try_from(scale).ok()?))
}

fn round_half_even_div(value: &BigInt, divisor: &BigInt) -> BigInt {
    let (quotient, remainder) = value.div_rem(divisor);
    let twice = remainder.abs() * 2u32;
    let divisor_abs = divisor.abs();
    let round_away = match twice.cmp(&divisor_abs) {
        Ordering::Greater => true,
        Ordering::Equal => quotient.is_odd(),
        Ordering::Less => false,
    };
    if !round_away {
        quotient
    } else if value.is_negative() {
        quotient - 1
    } else {
        quotient + 1
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = align(*self, *other);
        a.cmp(&b)
    }
}

impl std::hash::Hash for Decimal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        mantissa.hash(state);
        scale.hash(state);
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        let scale = usize::from(self.scale);
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() <= scale {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        } else {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{int_part}.{frac_part}")
        }
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self {
            mantissa: i128::from(value),
            scale: 0,
        }
    }
}
