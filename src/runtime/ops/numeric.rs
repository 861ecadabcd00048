//! Arithmetic that can trap or needs more than a one-line expression

use crate::runtime::Trap;

// ============================================================================
// integer division
// ============================================================================

/// i32.div_s
pub fn i32_div_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    a.checked_div(b).ok_or(Trap::IntegerOverflow)
}

/// i32.div_u
pub fn i32_div_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u32) / (b as u32)) as i32)
}

/// i32.rem_s
///
/// `i32::MIN % -1` is 0, not an overflow.
pub fn i32_rem_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(a.wrapping_rem(b))
}

/// i32.rem_u
pub fn i32_rem_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u32) % (b as u32)) as i32)
}

/// i64.div_s
pub fn i64_div_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    a.checked_div(b).ok_or(Trap::IntegerOverflow)
}

/// i64.div_u
pub fn i64_div_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u64) / (b as u64)) as i64)
}

/// i64.rem_s
pub fn i64_rem_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(a.wrapping_rem(b))
}

/// i64.rem_u
pub fn i64_rem_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u64) % (b as u64)) as i64)
}

// ============================================================================
// float min / max / nearest
// ============================================================================

macro_rules! float_min_max {
    ($min:ident, $max:ident, $t:ty) => {
        /// NaN if either operand is NaN; -0 is less than +0
        pub fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == b {
                // only differs for signed zeros
                return if a.is_sign_negative() { a } else { b };
            }
            if a < b {
                a
            } else {
                b
            }
        }

        /// NaN if either operand is NaN; +0 is greater than -0
        pub fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == b {
                return if a.is_sign_positive() { a } else { b };
            }
            if a > b {
                a
            } else {
                b
            }
        }
    };
}

float_min_max!(f32_min, f32_max, f32);
float_min_max!(f64_min, f64_max, f64);

/// f32.nearest: round half to even
pub fn f32_nearest(x: f32) -> f32 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let rounded = if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    };
    // keep the sign of values that round to zero
    if rounded == 0.0 {
        (0.0f32).copysign(x)
    } else {
        rounded
    }
}

/// f64.nearest: round half to even
pub fn f64_nearest(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let rounded = if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    };
    if rounded == 0.0 {
        (0.0f64).copysign(x)
    } else {
        rounded
    }
}
