//! Lazy, type-promoting numeric parsing.
//!
//! A column's textual form is classified and parsed only when an accessor
//! asks for it, into the narrowest representation that fits: `i32`, then
//! `i64`, then [`BigInt`] for integral text; `f64` by default and
//! [`BigDecimal`] on demand for everything else. Every computed
//! representation is cached per column; widening reuses the narrowest exact
//! cached value and never re-parses text, with one deliberate exception:
//! a decimal requested after a double was computed re-derives from the
//! original text, never from the lossy double. The reverse direction
//! (double from decimal) is an accepted precision loss.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::error::CsvError;

/// Largest `i64` magnitude as digit strings, for the 19-digit boundary
/// comparison.
const MAX_I64_DIGITS: &str = "9223372036854775807";
const MIN_I64_DIGITS: &str = "9223372036854775808";

/// Per-column cache of computed numeric representations.
///
/// Each field being `Some` means that representation has been computed for
/// the current column text; [`reset`](Self::reset) clears all of them.
#[derive(Debug, Default)]
pub(crate) struct NumberCoercion {
    int: Option<i32>,
    long: Option<i64>,
    big: Option<BigInt>,
    double: Option<f64>,
    decimal: Option<BigDecimal>,
}

impl NumberCoercion {
    pub(crate) fn reset(&mut self) {
        self.int = None;
        self.long = None;
        self.big = None;
        self.double = None;
        self.decimal = None;
    }

    /// True iff `text` is an optional sign followed by one or more ASCII
    /// digits.
    pub(crate) fn looks_like_int(text: &str) -> bool {
        let digits = strip_sign(text);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }

    pub(crate) fn as_i32(&mut self, text: &str) -> Result<i32, CsvError> {
        if let Some(v) = self.int {
            return Ok(v);
        }
        if let Some(v) = self.long {
            let narrow = i32::try_from(v).map_err(|_| range_error(text, "i32"))?;
            self.int = Some(narrow);
            return Ok(narrow);
        }
        if let Some(big) = &self.big {
            let narrow = big.to_i32().ok_or_else(|| range_error(text, "i32"))?;
            self.int = Some(narrow);
            return Ok(narrow);
        }
        if let Some(d) = self.double {
            if d < f64::from(i32::MIN) || d > f64::from(i32::MAX) || d.is_nan() {
                return Err(range_error(text, "i32"));
            }
            let narrow = d as i32;
            self.int = Some(narrow);
            return Ok(narrow);
        }
        self.parse_narrowest(text)?;
        self.as_i32(text)
    }

    pub(crate) fn as_i64(&mut self, text: &str) -> Result<i64, CsvError> {
        if let Some(v) = self.long {
            return Ok(v);
        }
        if let Some(v) = self.int {
            let wide = i64::from(v);
            self.long = Some(wide);
            return Ok(wide);
        }
        if let Some(big) = &self.big {
            let narrow = big.to_i64().ok_or_else(|| range_error(text, "i64"))?;
            self.long = Some(narrow);
            return Ok(narrow);
        }
        if let Some(d) = self.double {
            #[allow(clippy::cast_precision_loss)]
            if d < i64::MIN as f64 || d > i64::MAX as f64 || d.is_nan() {
                return Err(range_error(text, "i64"));
            }
            let narrow = d as i64;
            self.long = Some(narrow);
            return Ok(narrow);
        }
        self.parse_narrowest(text)?;
        self.as_i64(text)
    }

    pub(crate) fn as_big_integer(&mut self, text: &str) -> Result<BigInt, CsvError> {
        if let Some(big) = &self.big {
            return Ok(big.clone());
        }
        if let Some(v) = self.long {
            let wide = BigInt::from(v);
            self.big = Some(wide.clone());
            return Ok(wide);
        }
        if let Some(v) = self.int {
            let wide = BigInt::from(v);
            self.big = Some(wide.clone());
            return Ok(wide);
        }
        if let Some(d) = self.double {
            let narrow =
                BigInt::from_f64(d.trunc()).ok_or_else(|| range_error(text, "big integer"))?;
            self.big = Some(narrow.clone());
            return Ok(narrow);
        }
        self.parse_narrowest(text)?;
        self.as_big_integer(text)
    }

    pub(crate) fn as_f64(&mut self, text: &str) -> Result<f64, CsvError> {
        if let Some(d) = self.double {
            return Ok(d);
        }
        if let Some(v) = self.int {
            let wide = f64::from(v);
            self.double = Some(wide);
            return Ok(wide);
        }
        #[allow(clippy::cast_precision_loss)]
        if let Some(v) = self.long {
            let wide = v as f64;
            self.double = Some(wide);
            return Ok(wide);
        }
        if let Some(big) = &self.big {
            let wide = big.to_f64().unwrap_or(f64::INFINITY);
            self.double = Some(wide);
            return Ok(wide);
        }
        if let Some(decimal) = &self.decimal {
            // Accepted precision loss in this direction only.
            let wide = decimal.to_f64().unwrap_or(f64::INFINITY);
            self.double = Some(wide);
            return Ok(wide);
        }
        let parsed = f64::from_str(text).map_err(|_| malformed(text))?;
        self.double = Some(parsed);
        Ok(parsed)
    }

    pub(crate) fn as_big_decimal(&mut self, text: &str) -> Result<BigDecimal, CsvError> {
        if let Some(decimal) = &self.decimal {
            return Ok(decimal.clone());
        }
        if let Some(v) = self.int {
            let wide = BigDecimal::from(v);
            self.decimal = Some(wide.clone());
            return Ok(wide);
        }
        if let Some(v) = self.long {
            let wide = BigDecimal::from(v);
            self.decimal = Some(wide.clone());
            return Ok(wide);
        }
        if let Some(big) = &self.big {
            let wide = BigDecimal::from(big.clone());
            self.decimal = Some(wide.clone());
            return Ok(wide);
        }
        // Even when a double is already cached, the decimal is derived from
        // the original text to avoid double-rounding.
        let parsed = BigDecimal::from_str(text).map_err(|_| malformed(text))?;
        self.decimal = Some(parsed.clone());
        Ok(parsed)
    }

    /// Parses `text` into the narrowest-fitting representation, populating
    /// exactly one cache field.
    fn parse_narrowest(&mut self, text: &str) -> Result<(), CsvError> {
        if Self::looks_like_int(text) {
            self.parse_integral(text)
        } else {
            let parsed = f64::from_str(text).map_err(|_| malformed(text))?;
            self.double = Some(parsed);
            Ok(())
        }
    }

    fn parse_integral(&mut self, text: &str) -> Result<(), CsvError> {
        let negative = text.starts_with('-');
        let digits = strip_sign(text);
        if digits.len() <= 9 {
            let v = parse_digits_i32(digits);
            self.int = Some(if negative { -v } else { v });
        } else if digits.len() <= 18 {
            let v = parse_digits_i64(digits);
            let v = if negative { -v } else { v };
            // The 10-digit case can still fit in 32 bits.
            if let Ok(small) = i32::try_from(v) {
                self.int = Some(small);
            } else {
                self.long = Some(v);
            }
        } else if in_i64_range(digits, negative) {
            let v = i64::from_str(text).map_err(|_| malformed(text))?;
            self.long = Some(v);
        } else {
            let v = BigInt::from_str(text).map_err(|_| malformed(text))?;
            self.big = Some(v);
        }
        Ok(())
    }
}

fn strip_sign(text: &str) -> &str {
    text.strip_prefix(['-', '+']).unwrap_or(text)
}

/// Parses up to 9 ASCII digits; cannot overflow.
fn parse_digits_i32(digits: &str) -> i32 {
    debug_assert!(digits.len() <= 9);
    digits
        .bytes()
        .fold(0i32, |acc, b| acc * 10 + i32::from(b - b'0'))
}

/// Parses 10 to 18 digits as two sub-parses of at most 9 digits each.
fn parse_digits_i64(digits: &str) -> i64 {
    debug_assert!(digits.len() > 9 && digits.len() <= 18);
    let split = digits.len() - 9;
    let head = i64::from(parse_digits_i32(&digits[..split]));
    let tail = i64::from(parse_digits_i32(&digits[split..]));
    head * 1_000_000_000 + tail
}

/// Digit-for-digit comparison against the `i64` boundary, for 19+ digit
/// magnitudes.
fn in_i64_range(digits: &str, negative: bool) -> bool {
    let bound = if negative {
        MIN_I64_DIGITS
    } else {
        MAX_I64_DIGITS
    };
    match digits.len().cmp(&bound.len()) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => digits <= bound,
    }
}

fn range_error(text: &str, target: &'static str) -> CsvError {
    CsvError::NumberRange {
        text: text.to_owned(),
        target,
    }
}

fn malformed(text: &str) -> CsvError {
    CsvError::MalformedNumber {
        text: text.to_owned(),
    }
}
