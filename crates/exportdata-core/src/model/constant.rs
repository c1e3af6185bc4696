//! Exact constant values.
//!
//! Constants are kept in the representation the producer wrote: integers as
//! sign plus big-endian magnitude of arbitrary length, floats as an unreduced
//! numerator/denominator pair. Nothing is narrowed to a machine type.

use std::fmt;

/// Arbitrary-precision signed integer.
///
/// The magnitude is big-endian without leading zero bytes; zero has an empty
/// magnitude and is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Integer {
    negative: bool,
    magnitude: Vec<u8>,
}

impl Integer {
    /// The value zero
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds an integer from a sign and a big-endian magnitude, normalizing it
    pub fn from_parts(negative: bool, magnitude: impl Into<Vec<u8>>) -> Self {
        let mut magnitude = magnitude.into();
        let leading = magnitude.iter().take_while(|&&b| b == 0).count();
        magnitude.drain(..leading);
        let negative = negative && !magnitude.is_empty();
        Self {
            negative,
            magnitude,
        }
    }

    /// Returns true for values below zero
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Returns true for zero
    pub fn is_zero(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// Big-endian magnitude without leading zeros
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    /// Returns the value as `i128` if it fits
    pub fn to_i128(&self) -> Option<i128> {
        if self.magnitude.len() > 16 {
            return None;
        }
        let abs = self
            .magnitude
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
        if self.negative {
            if abs <= i128::MAX as u128 {
                Some(-(abs as i128))
            } else if abs == i128::MAX as u128 + 1 {
                Some(i128::MIN)
            } else {
                None
            }
        } else {
            i128::try_from(abs).ok()
        }
    }

    /// Returns the value as `i64` if it fits
    pub fn to_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|v| i64::try_from(v).ok())
    }

    fn from_u128(negative: bool, abs: u128) -> Self {
        Self::from_parts(negative, abs.to_be_bytes().to_vec())
    }
}

impl From<i64> for Integer {
    fn from(value: i64) -> Self {
        Self::from_u128(value < 0, u128::from(value.unsigned_abs()))
    }
}

impl From<u64> for Integer {
    fn from(value: u64) -> Self {
        Self::from_u128(false, u128::from(value))
    }
}

impl From<i128> for Integer {
    fn from(value: i128) -> Self {
        Self::from_u128(value < 0, value.unsigned_abs())
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }

        // Repeated division by ten over the base-256 digits.
        let mut digits = self.magnitude.clone();
        let mut decimal = Vec::new();
        while !digits.is_empty() {
            let mut rem = 0u32;
            let mut quotient = Vec::with_capacity(digits.len());
            for &byte in &digits {
                let cur = rem * 256 + u32::from(byte);
                let q = (cur / 10) as u8;
                rem = cur % 10;
                if !(quotient.is_empty() && q == 0) {
                    quotient.push(q);
                }
            }
            decimal.push(b'0' + rem as u8);
            digits = quotient;
        }

        if self.negative {
            f.write_str("-")?;
        }
        for &d in decimal.iter().rev() {
            write!(f, "{}", d as char)?;
        }
        Ok(())
    }
}

/// Exact rational number with a positive denominator.
///
/// The fraction is not reduced, so a value survives decode/encode unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rational {
    num: Integer,
    den: Integer,
}

impl Rational {
    /// Builds `num / den`; returns `None` for a zero or negative denominator
    pub fn new(num: Integer, den: Integer) -> Option<Self> {
        if den.is_zero() || den.is_negative() {
            return None;
        }
        Some(Self { num, den })
    }

    /// Builds an integral rational `value / 1`
    pub fn integer(value: Integer) -> Self {
        Self {
            num: value,
            den: Integer::from(1i64),
        }
    }

    /// Numerator
    pub fn numerator(&self) -> &Integer {
        &self.num
    }

    /// Denominator, always positive
    pub fn denominator(&self) -> &Integer {
        &self.den
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.to_i64() == Some(1) {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Value of a constant member
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Boolean constant
    Bool(bool),
    /// String constant
    String(String),
    /// Integer constant (also runes)
    Int(Integer),
    /// Floating-point constant as an exact rational
    Float(Rational),
    /// Complex constant
    Complex {
        /// Real part
        re: Rational,
        /// Imaginary part
        im: Rational,
    },
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::String(s) => write!(f, "{s:?}"),
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Float(r) => write!(f, "{r}"),
            ConstValue::Complex { re, im } => write!(f, "({re} + {im}i)"),
        }
    }
}
