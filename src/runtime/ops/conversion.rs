//! Trapping float-to-integer truncation
//!
//! f32 operands are widened to f64 first; every f32 is exactly
//! representable as an f64 so the range checks below hold for both.

use crate::runtime::Trap;

/// Truncate toward zero, trapping on NaN
fn truncate(value: f64) -> Result<f64, Trap> {
    if value.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    Ok(value.trunc())
}

/// i32.trunc_f64_s
pub fn trunc_i32_s(value: f64) -> Result<i32, Trap> {
    let t = truncate(value)?;
    if !(-2147483648.0..=2147483647.0).contains(&t) {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i32)
}

/// i32.trunc_f64_u
pub fn trunc_i32_u(value: f64) -> Result<i32, Trap> {
    let t = truncate(value)?;
    if t < 0.0 || t > 4294967295.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u32 as i32)
}

/// i64.trunc_f64_s
pub fn trunc_i64_s(value: f64) -> Result<i64, Trap> {
    let t = truncate(value)?;
    // 2^63 is exact in f64; i64::MAX is not
    if t < -9223372036854775808.0 || t >= 9223372036854775808.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i64)
}

/// i64.trunc_f64_u
pub fn trunc_i64_u(value: f64) -> Result<i64, Trap> {
    let t = truncate(value)?;
    if t < 0.0 || t >= 18446744073709551616.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u64 as i64)
}
