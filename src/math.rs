//! Fixed-point helpers.
//!
//! Every multiply-then-divide in the ledger goes through here so the rounding
//! direction is one decision: floor. For unsigned values floor and truncation agree;
//! for signed values the quotient is rounded toward negative infinity, which is NOT
//! what the `/` operator does for negative numerators.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
}

/// `a * b / c`, floored.
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    a.checked_mul(b).ok_or(MathError::Overflow).map(|p| p / c)
}

/// `a * b / c` for signed operands, floored toward negative infinity. `c` must be positive.
pub fn mul_div_signed(a: i128, b: i128, c: i128) -> Result<i128, MathError> {
    if c <= 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product.div_euclid(c))
}

/// Floor division for a signed numerator and positive denominator.
pub fn div_floor(a: i128, c: i128) -> Result<i128, MathError> {
    if c <= 0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(a.div_euclid(c))
}

pub fn add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn mul(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

pub fn to_signed(value: u128) -> Result<i128, MathError> {
    i128::try_from(value).map_err(|_| MathError::Overflow)
}

/// `(v1 * w1 + v2 * w2) / (w1 + w2)`, floored. Weights must not both be zero.
pub fn weighted_average(v1: u128, w1: u128, v2: u128, w2: u128) -> Result<u128, MathError> {
    let numerator = add(mul(v1, w1)?, mul(v2, w2)?)?;
    let denominator = add(w1, w2)?;
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(numerator / denominator)
}

/// Signed values with unsigned weights, floored toward negative infinity.
pub fn weighted_average_signed(v1: i128, w1: u128, v2: i128, w2: u128) -> Result<i128, MathError> {
    let w1 = to_signed(w1)?;
    let w2 = to_signed(w2)?;
    let numerator = v1
        .checked_mul(w1)
        .and_then(|a| v2.checked_mul(w2).and_then(|b| a.checked_add(b)))
        .ok_or(MathError::Overflow)?;
    let denominator = w1.checked_add(w2).ok_or(MathError::Overflow)?;
    div_floor(numerator, denominator)
}
