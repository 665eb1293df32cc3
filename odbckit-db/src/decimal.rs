//! Scaled fixed-point decimal for exact numeric columns.
//!
//! A [`Decimal`] stores `scaled / 10^scale` in an `i64`, so `DECIMAL` and
//! `NUMERIC` values survive arithmetic without binary floating point drift.
//! The power of ten is cached next to the scale; every path that changes the
//! scale recomputes it.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use thiserror::Error;

/// Scale used when none is given.
pub const DEFAULT_SCALE: i8 = 2;

/// Largest supported scale; `10^18` is the largest power of ten in an `i64`.
pub const MAX_SCALE: i8 = 18;

/// Errors from constructing or combining decimals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    /// Scale outside `0..=18`.
    #[error("invalid_scale: {0}")]
    InvalidScale(i8),
    /// The result does not fit in 64 bits.
    #[error("overflow")]
    Overflow,
    /// Floating point input was NaN or infinite.
    #[error("not_finite")]
    NotFinite,
    /// Text input was not a decimal number.
    #[error("invalid_number: {0}")]
    Parse(String),
    /// The column text was cut off by a buffer too small for the value.
    #[error("truncated_value: {0}")]
    Truncated(String),
}

/// `10^scale`, or an error for an unsupported scale.
fn multiplier_for(scale: i8) -> Result<i64, DecimalError> {
    if !(0..=MAX_SCALE).contains(&scale) {
        return Err(DecimalError::InvalidScale(scale));
    }
    Ok(10_i64.pow(u32::from(scale.unsigned_abs())))
}

/// Exact value `scaled / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    scaled: i64,
    scale: i8,
    multiplier: i64,
}

impl Decimal {
    /// Wraps an already scaled integer: `Decimal::new(123, 2)` is `1.23`.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError::InvalidScale`] outside `0..=18`.
    pub fn new(scaled: i64, scale: i8) -> Result<Self, DecimalError> {
        let multiplier = multiplier_for(scale)?;
        Ok(Self {
            scaled,
            scale,
            multiplier,
        })
    }

    /// Wraps a scaled integer at the default scale of 2.
    #[must_use]
    pub const fn from_int(scaled: i64) -> Self {
        Self {
            scaled,
            scale: DEFAULT_SCALE,
            multiplier: 100,
        }
    }

    /// Converts a float, multiplying by `10^scale` and truncating toward
    /// zero. Round first if truncation is not wanted.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid scale, a non-finite input, or a
    /// value that does not fit once scaled.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn from_f64(value: f64, scale: i8) -> Result<Self, DecimalError> {
        let multiplier = multiplier_for(scale)?;
        if !value.is_finite() {
            return Err(DecimalError::NotFinite);
        }
        let scaled = (value * multiplier as f64).trunc();
        if scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return Err(DecimalError::Overflow);
        }
        Ok(Self {
            scaled: scaled as i64,
            scale,
            multiplier,
        })
    }

    /// Parses `text` at a fixed `scale`. Extra fraction digits are
    /// truncated, missing ones are zero.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid scale, malformed text or overflow.
    pub fn parse_with_scale(text: &str, scale: i8) -> Result<Self, DecimalError> {
        let multiplier = multiplier_for(scale)?;
        let invalid = || DecimalError::Parse(text.to_string());

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut scaled: i64 = 0;
        for digit in whole.bytes() {
            scaled = scaled
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(digit - b'0')))
                .ok_or(DecimalError::Overflow)?;
        }
        scaled = scaled.checked_mul(multiplier).ok_or(DecimalError::Overflow)?;

        let mut place = multiplier;
        for digit in fraction.bytes().take(usize::from(scale.unsigned_abs())) {
            place /= 10;
            scaled = scaled
                .checked_add(i64::from(digit - b'0') * place)
                .ok_or(DecimalError::Overflow)?;
        }

        Ok(Self {
            scaled: if negative { -scaled } else { scaled },
            scale,
            multiplier,
        })
    }

    /// The raw scaled integer.
    #[must_use]
    pub const fn to_i64(self) -> i64 {
        self.scaled
    }

    /// Digits after the decimal point.
    #[must_use]
    pub const fn scale(self) -> i8 {
        self.scale
    }

    /// The cached `10^scale`.
    #[must_use]
    pub const fn multiplier(self) -> i64 {
        self.multiplier
    }

    /// Approximate value, for display only.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.scaled as f64 / self.multiplier as f64
    }

    /// The scaled integer this value would have at `target` scale.
    ///
    /// Scaling down truncates. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid target scale or overflow.
    pub fn rescale_to(&self, target: i8) -> Result<i64, DecimalError> {
        multiplier_for(target)?;
        match target.cmp(&self.scale) {
            std::cmp::Ordering::Equal => Ok(self.scaled),
            std::cmp::Ordering::Greater => {
                let factor = multiplier_for(target - self.scale)?;
                self.scaled.checked_mul(factor).ok_or(DecimalError::Overflow)
            }
            std::cmp::Ordering::Less => {
                let factor = multiplier_for(self.scale - target)?;
                Ok(self.scaled / factor)
            }
        }
    }

    /// Changes the scale in place, rescaling the stored integer.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid target scale or overflow; `self` is
    /// unchanged in that case.
    pub fn set_scale(&mut self, target: i8) -> Result<(), DecimalError> {
        let scaled = self.rescale_to(target)?;
        self.multiplier = multiplier_for(target)?;
        self.scaled = scaled;
        self.scale = target;
        Ok(())
    }

    /// Sum at the larger of the two scales.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError::Overflow`] if the sum does not fit.
    pub fn checked_add(&self, other: &Self) -> Result<Self, DecimalError> {
        let scale = self.scale.max(other.scale);
        let sum = self
            .rescale_to(scale)?
            .checked_add(other.rescale_to(scale)?)
            .ok_or(DecimalError::Overflow)?;
        Self::new(sum, scale)
    }
}

impl Add for Decimal {
    type Output = Self;

    /// # Panics
    ///
    /// Panics on overflow, like the primitive integer types.
    fn add(self, rhs: Self) -> Self {
        match self.checked_add(&rhs) {
            Ok(sum) => sum,
            Err(err) => panic!("decimal addition failed: {err}"),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.scaled < 0 { "-" } else { "" };
        let magnitude = self.scaled.unsigned_abs();
        let multiplier = self.multiplier.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / multiplier,
            magnitude % multiplier,
            width = usize::from(self.scale.unsigned_abs())
        )
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    /// Parses at the scale written in the text: `"5.730"` has scale 3.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fraction_digits = text.split_once('.').map_or(0, |(_, fraction)| fraction.len());
        let scale = i8::try_from(fraction_digits)
            .map_err(|_| DecimalError::Parse(text.to_string()))?;
        if scale > MAX_SCALE {
            return Err(DecimalError::Parse(text.to_string()));
        }
        Self::parse_with_scale(text, scale)
    }
}
