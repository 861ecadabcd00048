//! Instruction semantics
//!
//! Stack-only instructions are dispatched through [`numeric`]. Memory
//! instructions live in [`memory`]; control flow is handled by the
//! executor itself because it manipulates frames and labels.

pub mod conversion;
pub mod memory;
pub mod numeric;

use crate::parser::instruction::NumericOp;
use crate::runtime::stack::Stack;
use crate::runtime::{Trap, Value};

macro_rules! unop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let a = $stack.$pop()?;
        $stack.push(Value::from(($f)(a)))
    }};
}

macro_rules! binop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let b = $stack.$pop()?;
        let a = $stack.$pop()?;
        $stack.push(Value::from(($f)(a, b)))
    }};
}

macro_rules! try_unop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let a = $stack.$pop()?;
        $stack.push(Value::from(($f)(a)?))
    }};
}

macro_rules! try_binop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let b = $stack.$pop()?;
        let a = $stack.$pop()?;
        $stack.push(Value::from(($f)(a, b)?))
    }};
}

macro_rules! testop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let a = $stack.$pop()?;
        $stack.push(Value::I32(($f)(a) as i32))
    }};
}

macro_rules! relop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let b = $stack.$pop()?;
        let a = $stack.$pop()?;
        $stack.push(Value::I32(($f)(a, b) as i32))
    }};
}

/// Execute a stack-only numeric instruction
pub fn numeric(op: NumericOp, stack: &mut Stack) -> Result<(), Trap> {
    use conversion as cv;
    use numeric as n;
    use NumericOp::*;

    match op {
        // ====================================================================
        // i32 comparisons
        // ====================================================================
        I32Eqz => testop!(stack, pop_i32, |a: i32| a == 0),
        I32Eq => relop!(stack, pop_i32, |a: i32, b: i32| a == b),
        I32Ne => relop!(stack, pop_i32, |a: i32, b: i32| a != b),
        I32LtS => relop!(stack, pop_i32, |a: i32, b: i32| a < b),
        I32LtU => relop!(stack, pop_i32, |a: i32, b: i32| (a as u32) < (b as u32)),
        I32GtS => relop!(stack, pop_i32, |a: i32, b: i32| a > b),
        I32GtU => relop!(stack, pop_i32, |a: i32, b: i32| (a as u32) > (b as u32)),
        I32LeS => relop!(stack, pop_i32, |a: i32, b: i32| a <= b),
        I32LeU => relop!(stack, pop_i32, |a: i32, b: i32| (a as u32) <= (b as u32)),
        I32GeS => relop!(stack, pop_i32, |a: i32, b: i32| a >= b),
        I32GeU => relop!(stack, pop_i32, |a: i32, b: i32| (a as u32) >= (b as u32)),

        // ====================================================================
        // i64 comparisons
        // ====================================================================
        I64Eqz => testop!(stack, pop_i64, |a: i64| a == 0),
        I64Eq => relop!(stack, pop_i64, |a: i64, b: i64| a == b),
        I64Ne => relop!(stack, pop_i64, |a: i64, b: i64| a != b),
        I64LtS => relop!(stack, pop_i64, |a: i64, b: i64| a < b),
        I64LtU => relop!(stack, pop_i64, |a: i64, b: i64| (a as u64) < (b as u64)),
        I64GtS => relop!(stack, pop_i64, |a: i64, b: i64| a > b),
        I64GtU => relop!(stack, pop_i64, |a: i64, b: i64| (a as u64) > (b as u64)),
        I64LeS => relop!(stack, pop_i64, |a: i64, b: i64| a <= b),
        I64LeU => relop!(stack, pop_i64, |a: i64, b: i64| (a as u64) <= (b as u64)),
        I64GeS => relop!(stack, pop_i64, |a: i64, b: i64| a >= b),
        I64GeU => relop!(stack, pop_i64, |a: i64, b: i64| (a as u64) >= (b as u64)),

        // ====================================================================
        // float comparisons
        // ====================================================================
        F32Eq => relop!(stack, pop_f32, |a: f32, b: f32| a == b),
        F32Ne => relop!(stack, pop_f32, |a: f32, b: f32| a != b),
        F32Lt => relop!(stack, pop_f32, |a: f32, b: f32| a < b),
        F32Gt => relop!(stack, pop_f32, |a: f32, b: f32| a > b),
        F32Le => relop!(stack, pop_f32, |a: f32, b: f32| a <= b),
        F32Ge => relop!(stack, pop_f32, |a: f32, b: f32| a >= b),
        F64Eq => relop!(stack, pop_f64, |a: f64, b: f64| a == b),
        F64Ne => relop!(stack, pop_f64, |a: f64, b: f64| a != b),
        F64Lt => relop!(stack, pop_f64, |a: f64, b: f64| a < b),
        F64Gt => relop!(stack, pop_f64, |a: f64, b: f64| a > b),
        F64Le => relop!(stack, pop_f64, |a: f64, b: f64| a <= b),
        F64Ge => relop!(stack, pop_f64, |a: f64, b: f64| a >= b),

        // ====================================================================
        // i32 arithmetic
        // ====================================================================
        I32Clz => unop!(stack, pop_i32, |a: i32| a.leading_zeros() as i32),
        I32Ctz => unop!(stack, pop_i32, |a: i32| a.trailing_zeros() as i32),
        I32Popcnt => unop!(stack, pop_i32, |a: i32| a.count_ones() as i32),
        I32Add => binop!(stack, pop_i32, |a: i32, b: i32| a.wrapping_add(b)),
        I32Sub => binop!(stack, pop_i32, |a: i32, b: i32| a.wrapping_sub(b)),
        I32Mul => binop!(stack, pop_i32, |a: i32, b: i32| a.wrapping_mul(b)),
        I32DivS => try_binop!(stack, pop_i32, n::i32_div_s),
        I32DivU => try_binop!(stack, pop_i32, n::i32_div_u),
        I32RemS => try_binop!(stack, pop_i32, n::i32_rem_s),
        I32RemU => try_binop!(stack, pop_i32, n::i32_rem_u),
        I32And => binop!(stack, pop_i32, |a: i32, b: i32| a & b),
        I32Or => binop!(stack, pop_i32, |a: i32, b: i32| a | b),
        I32Xor => binop!(stack, pop_i32, |a: i32, b: i32| a ^ b),
        I32Shl => binop!(stack, pop_i32, |a: i32, b: i32| a.wrapping_shl(b as u32)),
        I32ShrS => binop!(stack, pop_i32, |a: i32, b: i32| a.wrapping_shr(b as u32)),
        I32ShrU => binop!(stack, pop_i32, |a: i32, b: i32| (a as u32).wrapping_shr(b as u32) as i32),
        I32Rotl => binop!(stack, pop_i32, |a: i32, b: i32| (a as u32).rotate_left(b as u32 % 32) as i32),
        I32Rotr => binop!(stack, pop_i32, |a: i32, b: i32| (a as u32).rotate_right(b as u32 % 32) as i32),

        // ====================================================================
        // i64 arithmetic
        // ====================================================================
        I64Clz => unop!(stack, pop_i64, |a: i64| a.leading_zeros() as i64),
        I64Ctz => unop!(stack, pop_i64, |a: i64| a.trailing_zeros() as i64),
        I64Popcnt => unop!(stack, pop_i64, |a: i64| a.count_ones() as i64),
        I64Add => binop!(stack, pop_i64, |a: i64, b: i64| a.wrapping_add(b)),
        I64Sub => binop!(stack, pop_i64, |a: i64, b: i64| a.wrapping_sub(b)),
        I64Mul => binop!(stack, pop_i64, |a: i64, b: i64| a.wrapping_mul(b)),
        I64DivS => try_binop!(stack, pop_i64, n::i64_div_s),
        I64DivU => try_binop!(stack, pop_i64, n::i64_div_u),
        I64RemS => try_binop!(stack, pop_i64, n::i64_rem_s),
        I64RemU => try_binop!(stack, pop_i64, n::i64_rem_u),
        I64And => binop!(stack, pop_i64, |a: i64, b: i64| a & b),
        I64Or => binop!(stack, pop_i64, |a: i64, b: i64| a | b),
        I64Xor => binop!(stack, pop_i64, |a: i64, b: i64| a ^ b),
        I64Shl => binop!(stack, pop_i64, |a: i64, b: i64| a.wrapping_shl(b as u32)),
        I64ShrS => binop!(stack, pop_i64, |a: i64, b: i64| a.wrapping_shr(b as u32)),
        I64ShrU => binop!(stack, pop_i64, |a: i64, b: i64| (a as u64).wrapping_shr(b as u32) as i64),
        I64Rotl => binop!(stack, pop_i64, |a: i64, b: i64| (a as u64).rotate_left((b as u64 % 64) as u32) as i64),
        I64Rotr => binop!(stack, pop_i64, |a: i64, b: i64| (a as u64).rotate_right((b as u64 % 64) as u32) as i64),

        // ====================================================================
        // f32 arithmetic
        // ====================================================================
        F32Abs => unop!(stack, pop_f32, |a: f32| a.abs()),
        F32Neg => unop!(stack, pop_f32, |a: f32| -a),
        F32Ceil => unop!(stack, pop_f32, |a: f32| a.ceil()),
        F32Floor => unop!(stack, pop_f32, |a: f32| a.floor()),
        F32Trunc => unop!(stack, pop_f32, |a: f32| a.trunc()),
        F32Nearest => unop!(stack, pop_f32, n::f32_nearest),
        F32Sqrt => unop!(stack, pop_f32, |a: f32| a.sqrt()),
        F32Add => binop!(stack, pop_f32, |a: f32, b: f32| a + b),
        F32Sub => binop!(stack, pop_f32, |a: f32, b: f32| a - b),
        F32Mul => binop!(stack, pop_f32, |a: f32, b: f32| a * b),
        F32Div => binop!(stack, pop_f32, |a: f32, b: f32| a / b),
        F32Min => binop!(stack, pop_f32, n::f32_min),
        F32Max => binop!(stack, pop_f32, n::f32_max),
        F32Copysign => binop!(stack, pop_f32, |a: f32, b: f32| a.copysign(b)),

        // ====================================================================
        // f64 arithmetic
        // ====================================================================
        F64Abs => unop!(stack, pop_f64, |a: f64| a.abs()),
        F64Neg => unop!(stack, pop_f64, |a: f64| -a),
        F64Ceil => unop!(stack, pop_f64, |a: f64| a.ceil()),
        F64Floor => unop!(stack, pop_f64, |a: f64| a.floor()),
        F64Trunc => unop!(stack, pop_f64, |a: f64| a.trunc()),
        F64Nearest => unop!(stack, pop_f64, n::f64_nearest),
        F64Sqrt => unop!(stack, pop_f64, |a: f64| a.sqrt()),
        F64Add => binop!(stack, pop_f64, |a: f64, b: f64| a + b),
        F64Sub => binop!(stack, pop_f64, |a: f64, b: f64| a - b),
        F64Mul => binop!(stack, pop_f64, |a: f64, b: f64| a * b),
        F64Div => binop!(stack, pop_f64, |a: f64, b: f64| a / b),
        F64Min => binop!(stack, pop_f64, n::f64_min),
        F64Max => binop!(stack, pop_f64, n::f64_max),
        F64Copysign => binop!(stack, pop_f64, |a: f64, b: f64| a.copysign(b)),

        // ====================================================================
        // conversions
        // ====================================================================
        I32WrapI64 => unop!(stack, pop_i64, |a: i64| a as i32),
        I32TruncF32S => try_unop!(stack, pop_f32, |a: f32| cv::trunc_i32_s(a as f64)),
        I32TruncF32U => try_unop!(stack, pop_f32, |a: f32| cv::trunc_i32_u(a as f64)),
        I32TruncF64S => try_unop!(stack, pop_f64, cv::trunc_i32_s),
        I32TruncF64U => try_unop!(stack, pop_f64, cv::trunc_i32_u),
        I64ExtendI32S => unop!(stack, pop_i32, |a: i32| a as i64),
        I64ExtendI32U => unop!(stack, pop_i32, |a: i32| a as u32 as i64),
        I64TruncF32S => try_unop!(stack, pop_f32, |a: f32| cv::trunc_i64_s(a as f64)),
        I64TruncF32U => try_unop!(stack, pop_f32, |a: f32| cv::trunc_i64_u(a as f64)),
        I64TruncF64S => try_unop!(stack, pop_f64, cv::trunc_i64_s),
        I64TruncF64U => try_unop!(stack, pop_f64, cv::trunc_i64_u),
        F32ConvertI32S => unop!(stack, pop_i32, |a: i32| a as f32),
        F32ConvertI32U => unop!(stack, pop_i32, |a: i32| a as u32 as f32),
        F32ConvertI64S => unop!(stack, pop_i64, |a: i64| a as f32),
        F32ConvertI64U => unop!(stack, pop_i64, |a: i64| a as u64 as f32),
        F32DemoteF64 => unop!(stack, pop_f64, |a: f64| a as f32),
        F64ConvertI32S => unop!(stack, pop_i32, |a: i32| a as f64),
        F64ConvertI32U => unop!(stack, pop_i32, |a: i32| a as u32 as f64),
        F64ConvertI64S => unop!(stack, pop_i64, |a: i64| a as f64),
        F64ConvertI64U => unop!(stack, pop_i64, |a: i64| a as u64 as f64),
        F64PromoteF32 => unop!(stack, pop_f32, |a: f32| a as f64),
        I32ReinterpretF32 => unop!(stack, pop_f32, |a: f32| a.to_bits() as i32),
        I64ReinterpretF64 => unop!(stack, pop_f64, |a: f64| a.to_bits() as i64),
        F32ReinterpretI32 => unop!(stack, pop_i32, |a: i32| f32::from_bits(a as u32)),
        F64ReinterpretI64 => unop!(stack, pop_i64, |a: i64| f64::from_bits(a as u64)),
        I32Extend8S => unop!(stack, pop_i32, |a: i32| a as i8 as i32),
        I32Extend16S => unop!(stack, pop_i32, |a: i32| a as i16 as i32),
        I64Extend8S => unop!(stack, pop_i64, |a: i64| a as i8 as i64),
        I64Extend16S => unop!(stack, pop_i64, |a: i64| a as i16 as i64),
        I64Extend32S => unop!(stack, pop_i64, |a: i64| a as i32 as i64),

        // saturating truncation: `as` already clamps and maps NaN to zero
        I32TruncSatF32S => unop!(stack, pop_f32, |a: f32| a as i32),
        I32TruncSatF32U => unop!(stack, pop_f32, |a: f32| a as u32 as i32),
        I32TruncSatF64S => unop!(stack, pop_f64, |a: f64| a as i32),
        I32TruncSatF64U => unop!(stack, pop_f64, |a: f64| a as u32 as i32),
        I64TruncSatF32S => unop!(stack, pop_f32, |a: f32| a as i64),
        I64TruncSatF32U => unop!(stack, pop_f32, |a: f32| a as u64 as i64),
        I64TruncSatF64S => unop!(stack, pop_f64, |a: f64| a as i64),
        I64TruncSatF64U => unop!(stack, pop_f64, |a: f64| a as u64 as i64),
    }
}
