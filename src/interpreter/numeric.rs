//! Numeric values and arithmetic
//!
//! Integers stay in a machine word while they fit and move to arbitrary
//! precision when an operation overflows. Non-integral results are exact
//! rationals rounded to the process-wide number of decimal places.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::error::{EvalResult, RuntimeError};
use crate::diagnostics::error_codes::runtime as codes;

/// Decimal places kept when no settings have been applied
pub const DEFAULT_PRECISION: u32 = 100;

static PRECISION: OnceLock<u32> = OnceLock::new();

/// Decimal places kept by non-integral arithmetic
pub fn precision() -> u32 {
    PRECISION.get().copied().unwrap_or(DEFAULT_PRECISION)
}

/// Set by [`crate::settings::Settings::apply`] at most once per process;
/// returns the precision in force afterwards
pub(crate) fn install_precision(digits: u32) -> u32 {
    *PRECISION.get_or_init(|| digits.max(1))
}

/// The narrowest numeric type a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericKind {
    NatOne,
    Nat,
    Int,
    Real,
}

/// A numeric value.
///
/// `Big` never holds a value that fits in `i64` and `Ratio` never holds an
/// integer; the constructors keep that normal form so equal numbers always
/// share a representation.
#[derive(Debug, Clone)]
pub enum Numeric {
    Small(i64),
    Big(BigInt),
    Ratio(BigRational),
}

impl Numeric {
    pub fn from_bigint(n: BigInt) -> Self {
        match n.to_i64() {
            Some(small) => Numeric::Small(small),
            None => Numeric::Big(n),
        }
    }

    /// Exact conversion, no rounding
    pub fn from_rational(r: BigRational) -> Self {
        if r.is_integer() {
            Self::from_bigint(r.to_integer())
        } else {
            Numeric::Ratio(r)
        }
    }

    /// Conversion rounded to the current precision
    pub fn rounded(r: BigRational) -> Self {
        Self::from_rational(round_to_precision(r))
    }

    pub fn zero() -> Self {
        Numeric::Small(0)
    }

    pub fn kind(&self) -> NumericKind {
        let sign = match self {
            Numeric::Small(n) => n.signum(),
            Numeric::Big(n) if n.is_negative() => -1,
            Numeric::Big(_) => 1,
            Numeric::Ratio(_) => return NumericKind::Real,
        };
        match sign {
            1 => NumericKind::NatOne,
            0 => NumericKind::Nat,
            _ => NumericKind::Int,
        }
    }

    pub fn is_integral(&self) -> bool {
        !matches!(self, Numeric::Ratio(_))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Numeric::Small(0))
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Numeric::Small(n) => *n < 0,
            Numeric::Big(n) => n.is_negative(),
            Numeric::Ratio(r) => r.is_negative(),
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Numeric::Small(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_usize(&self) -> Option<usize> {
        self.to_i64().and_then(|n| usize::try_from(n).ok())
    }

    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Numeric::Small(n) => Some(BigInt::from(*n)),
            Numeric::Big(n) => Some(n.clone()),
            Numeric::Ratio(_) => None,
        }
    }

    pub fn to_rational(&self) -> BigRational {
        match self {
            Numeric::Small(n) => BigRational::from_integer(BigInt::from(*n)),
            Numeric::Big(n) => BigRational::from_integer(n.clone()),
            Numeric::Ratio(r) => r.clone(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Numeric::Small(n) => *n as f64,
            Numeric::Big(n) => n.to_f64().unwrap_or(f64::NAN),
            Numeric::Ratio(r) => {
                let numer = r.numer().to_f64().unwrap_or(f64::NAN);
                let denom = r.denom().to_f64().unwrap_or(f64::NAN);
                numer / denom
            }
        }
    }

    pub fn floor(&self) -> Numeric {
        match self {
            Numeric::Ratio(r) => Self::from_bigint(r.floor().to_integer()),
            other => other.clone(),
        }
    }

    pub fn ceil(&self) -> Numeric {
        match self {
            Numeric::Ratio(r) => Self::from_bigint(r.ceil().to_integer()),
            other => other.clone(),
        }
    }

    pub fn negate(&self) -> Numeric {
        match self {
            Numeric::Small(n) => match n.checked_neg() {
                Some(m) => Numeric::Small(m),
                None => Numeric::Big(-BigInt::from(*n)),
            },
            Numeric::Big(n) => Self::from_bigint(-n.clone()),
            Numeric::Ratio(r) => Numeric::Ratio(-r.clone()),
        }
    }

    pub fn abs(&self) -> Numeric {
        if self.is_negative() {
            self.negate()
        } else {
            self.clone()
        }
    }

    pub fn plus(&self, other: &Numeric) -> Numeric {
        if let (Numeric::Small(x), Numeric::Small(y)) = (self, other) {
            let r = x.wrapping_add(*y);
            // overflow iff both operands differ in sign from the result
            if ((x ^ r) & (y ^ r)) >= 0 {
                return Numeric::Small(r);
            }
        }
        self.combine(other, |a, b| a + b, |a, b| a + b)
    }

    pub fn minus(&self, other: &Numeric) -> Numeric {
        if let (Numeric::Small(x), Numeric::Small(y)) = (self, other) {
            let r = x.wrapping_sub(*y);
            // overflow iff the operands differ in sign and the result
            // differs from the minuend
            if ((x ^ y) & (x ^ r)) >= 0 {
                return Numeric::Small(r);
            }
        }
        self.combine(other, |a, b| a - b, |a, b| a - b)
    }

    pub fn times(&self, other: &Numeric) -> Numeric {
        if let (Numeric::Small(x), Numeric::Small(y)) = (self, other) {
            if let Some(r) = x.checked_mul(*y) {
                return Numeric::Small(r);
            }
        }
        self.combine(other, |a, b| a * b, |a, b| a * b)
    }

    fn combine(
        &self,
        other: &Numeric,
        int_op: fn(BigInt, BigInt) -> BigInt,
        rat_op: fn(BigRational, BigRational) -> BigRational,
    ) -> Numeric {
        match (self.to_bigint(), other.to_bigint()) {
            (Some(a), Some(b)) => Self::from_bigint(int_op(a, b)),
            _ => Self::rounded(rat_op(self.to_rational(), other.to_rational())),
        }
    }

    /// Real division `/`
    pub fn divide(&self, other: &Numeric) -> EvalResult<Numeric> {
        if other.is_zero() {
            return Err(RuntimeError::division_by_zero());
        }
        if let (Numeric::Small(x), Numeric::Small(y)) = (self, other) {
            if let (Some(0), Some(q)) = (x.checked_rem(*y), x.checked_div(*y)) {
                return Ok(Numeric::Small(q));
            }
        }
        Ok(Self::rounded(self.to_rational() / other.to_rational()))
    }

    /// `div`: the quotient truncated toward zero
    pub fn int_div(&self, other: &Numeric) -> EvalResult<Numeric> {
        self.integer_op(other, "div", |x, y| x.checked_div(y), |a, b| a / b)
    }

    /// `rem`: the remainder takes the sign of the dividend
    pub fn int_rem(&self, other: &Numeric) -> EvalResult<Numeric> {
        self.integer_op(other, "rem", |x, y| x.checked_rem(y), |a, b| a % b)
    }

    /// `mod`: the remainder takes the sign of the divisor
    pub fn int_mod(&self, other: &Numeric) -> EvalResult<Numeric> {
        self.integer_op(
            other,
            "mod",
            |x, y| if y == -1 { Some(0) } else { Some(x.mod_floor(&y)) },
            |a, b| a.mod_floor(b),
        )
    }

    fn integer_op(
        &self,
        other: &Numeric,
        name: &str,
        small: impl Fn(i64, i64) -> Option<i64>,
        big: impl Fn(&BigInt, &BigInt) -> BigInt,
    ) -> EvalResult<Numeric> {
        if other.is_zero() {
            return Err(RuntimeError::division_by_zero());
        }
        if let (Numeric::Small(x), Numeric::Small(y)) = (self, other) {
            if let Some(r) = small(*x, *y) {
                return Ok(Numeric::Small(r));
            }
        }
        match (self.to_bigint(), other.to_bigint()) {
            (Some(a), Some(b)) => Ok(Self::from_bigint(big(&a, &b))),
            _ => Err(RuntimeError::new(
                codes::EXPECTED_INTEGER,
                format!(
                    "'{}' requires integer operands, found {} and {}",
                    name, self, other
                ),
            )),
        }
    }

    /// `**` on numbers
    pub fn power(&self, exponent: &Numeric) -> EvalResult<Numeric> {
        if let Some(e) = exponent.to_bigint() {
            if let (Some(base), false) = (self.to_bigint(), e.is_negative()) {
                return self.integer_power(&base, &e);
            }
            return self.rational_power(&e);
        }
        if self.is_negative() {
            return Err(RuntimeError::new(
                codes::POWER_TROUBLE,
                format!("{} ** {} has no real result", self, exponent),
            ));
        }
        let result = self.to_f64().powf(exponent.to_f64());
        BigRational::from_float(result)
            .map(Self::rounded)
            .ok_or_else(|| {
                RuntimeError::new(
                    codes::NUMERIC_TROUBLE,
                    format!("{} ** {} is out of range", self, exponent),
                )
            })
    }

    fn integer_power(&self, base: &BigInt, exponent: &BigInt) -> EvalResult<Numeric> {
        let Some(e) = exponent.to_u32() else {
            if base.is_zero() || base.is_one() {
                return Ok(Self::from_bigint(base.clone()));
            }
            if *base == -BigInt::one() {
                let sign = if exponent.is_even() { 1 } else { -1 };
                return Ok(Numeric::Small(sign));
            }
            return Err(RuntimeError::new(
                codes::NUMERIC_TROUBLE,
                format!("exponent {} is too large", exponent),
            ));
        };
        if let Numeric::Small(x) = self {
            if let Some(r) = x.checked_pow(e) {
                return Ok(Numeric::Small(r));
            }
        }
        Ok(Self::from_bigint(base.pow(e)))
    }

    fn rational_power(&self, exponent: &BigInt) -> EvalResult<Numeric> {
        let Some(e) = exponent.to_i32() else {
            return Err(RuntimeError::new(
                codes::NUMERIC_TROUBLE,
                format!("exponent {} is too large", exponent),
            ));
        };
        let base = self.to_rational();
        if base.is_zero() && e < 0 {
            return Err(RuntimeError::division_by_zero());
        }
        let magnitude = e.unsigned_abs();
        let raised = BigRational::new(base.numer().pow(magnitude), base.denom().pow(magnitude));
        let result = if e < 0 { raised.recip() } else { raised };
        Ok(Self::rounded(result))
    }
}

fn round_to_precision(r: BigRational) -> BigRational {
    if r.is_integer() {
        return r;
    }
    let scale = BigRational::from_integer(BigInt::from(10u32).pow(precision()));
    (r * scale.clone()).round() / scale
}

impl From<i64> for Numeric {
    fn from(n: i64) -> Self {
        Numeric::Small(n)
    }
}

impl From<BigInt> for Numeric {
    fn from(n: BigInt) -> Self {
        Self::from_bigint(n)
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Numeric {}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Numeric {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Numeric::Small(a), Numeric::Small(b)) => a.cmp(b),
            _ => self.to_rational().cmp(&other.to_rational()),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Small(n) => write!(f, "{}", n),
            Numeric::Big(n) => write!(f, "{}", n),
            Numeric::Ratio(r) => write!(f, "{}", format_rational(r)),
        }
    }
}

/// Parse decimal notation such as `2.5`, `-0.125` or `1.5E-3`
pub fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (mantissa, exponent) = match text.find(|c| c == 'e' || c == 'E') {
        Some(i) => (&text[..i], text[i + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part
        .chars()
        .chain(frac_part.chars())
        .all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let numer: BigInt = format!("{}{}", int_part, frac_part).parse().ok()?;
    let scale = exponent.checked_sub(i32::try_from(frac_part.len()).ok()?)?;
    let ten = BigInt::from(10u32);
    let value = if scale >= 0 {
        BigRational::from_integer(numer * ten.pow(scale.unsigned_abs()))
    } else {
        BigRational::new(numer, ten.pow(scale.unsigned_abs()))
    };
    Some(if negative { -value } else { value })
}

/// Decimal rendering, exact for terminating fractions and cut at the current
/// precision otherwise
pub fn format_rational(r: &BigRational) -> String {
    if r.is_integer() {
        return r.to_integer().to_string();
    }
    let sign = if r.is_negative() { "-" } else { "" };
    let magnitude = r.abs();
    let whole = magnitude.trunc();
    let ten = BigRational::from_integer(BigInt::from(10u32));
    let mut frac = magnitude - whole.clone();
    let mut digits = String::new();
    for _ in 0..precision() {
        if frac.is_zero() {
            break;
        }
        frac = frac * ten.clone();
        let digit = frac.trunc();
        digits.push_str(&digit.to_integer().to_string());
        frac = frac - digit;
    }
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        format!("{}{}", sign, whole.to_integer())
    } else {
        format!("{}{}.{}", sign, whole.to_integer(), digits)
    }
}
