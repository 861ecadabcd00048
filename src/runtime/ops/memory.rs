//! Memory instructions
//!
//! Effective addresses are computed in 64 bits so `base + offset` can
//! never wrap back into bounds.

use crate::parser::instruction::{LoadOp, MemArg, StoreOp};
use crate::runtime::memory::Memory;
use crate::runtime::stack::Stack;
use crate::runtime::{Trap, Value};

fn effective_address(stack: &mut Stack, memarg: &MemArg) -> Result<u64, Trap> {
    let base = stack.pop_i32()? as u32 as u64;
    Ok(base + memarg.offset as u64)
}

/// Memory-less modules fail every access the same way an empty memory would
fn require(memory: Option<&Memory>) -> Result<&Memory, Trap> {
    memory.ok_or(Trap::OutOfBounds)
}

fn require_mut(memory: Option<&mut Memory>) -> Result<&mut Memory, Trap> {
    memory.ok_or(Trap::OutOfBounds)
}

// ============================================================================
// load / store
// ============================================================================

/// All `*.load*` instructions
pub fn load(op: LoadOp, memarg: &MemArg, memory: Option<&Memory>, stack: &mut Stack) -> Result<(), Trap> {
    let addr = effective_address(stack, memarg)?;
    let memory = require(memory)?;
    let value = match op {
        LoadOp::I32Load => Value::I32(i32::from_le_bytes(memory.load::<4>(addr)?)),
        LoadOp::I64Load => Value::I64(i64::from_le_bytes(memory.load::<8>(addr)?)),
        LoadOp::F32Load => Value::F32(f32::from_le_bytes(memory.load::<4>(addr)?)),
        LoadOp::F64Load => Value::F64(f64::from_le_bytes(memory.load::<8>(addr)?)),
        LoadOp::I32Load8S => Value::I32(i8::from_le_bytes(memory.load::<1>(addr)?) as i32),
        LoadOp::I32Load8U => Value::I32(u8::from_le_bytes(memory.load::<1>(addr)?) as i32),
        LoadOp::I32Load16S => Value::I32(i16::from_le_bytes(memory.load::<2>(addr)?) as i32),
        LoadOp::I32Load16U => Value::I32(u16::from_le_bytes(memory.load::<2>(addr)?) as i32),
        LoadOp::I64Load8S => Value::I64(i8::from_le_bytes(memory.load::<1>(addr)?) as i64),
        LoadOp::I64Load8U => Value::I64(u8::from_le_bytes(memory.load::<1>(addr)?) as i64),
        LoadOp::I64Load16S => Value::I64(i16::from_le_bytes(memory.load::<2>(addr)?) as i64),
        LoadOp::I64Load16U => Value::I64(u16::from_le_bytes(memory.load::<2>(addr)?) as i64),
        LoadOp::I64Load32S => Value::I64(i32::from_le_bytes(memory.load::<4>(addr)?) as i64),
        LoadOp::I64Load32U => Value::I64(u32::from_le_bytes(memory.load::<4>(addr)?) as i64),
    };
    stack.push(value)
}

/// All `*.store*` instructions; the value is on top of the address
pub fn store(op: StoreOp, memarg: &MemArg, memory: Option<&mut Memory>, stack: &mut Stack) -> Result<(), Trap> {
    match op {
        StoreOp::I32Store => {
            let value = stack.pop_i32()?;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::I64Store => {
            let value = stack.pop_i64()?;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::F32Store => {
            let value = stack.pop_f32()?;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::F64Store => {
            let value = stack.pop_f64()?;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::I32Store8 => {
            let value = stack.pop_i32()? as u8;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &[value])
        }
        StoreOp::I32Store16 => {
            let value = stack.pop_i32()? as u16;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::I64Store8 => {
            let value = stack.pop_i64()? as u8;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &[value])
        }
        StoreOp::I64Store16 => {
            let value = stack.pop_i64()? as u16;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
        StoreOp::I64Store32 => {
            let value = stack.pop_i64()? as u32;
            let addr = effective_address(stack, memarg)?;
            require_mut(memory)?.store(addr, &value.to_le_bytes())
        }
    }
}

// ============================================================================
// size / grow / bulk
// ============================================================================

/// memory.size
pub fn size(memory: Option<&Memory>, stack: &mut Stack) -> Result<(), Trap> {
    let pages = require(memory)?.size();
    stack.push(Value::I32(pages as i32))
}

/// memory.grow: pushes the previous size, or -1 if the memory cannot grow
pub fn grow(memory: Option<&mut Memory>, stack: &mut Stack) -> Result<(), Trap> {
    let delta = stack.pop_i32()? as u32;
    let memory = require_mut(memory)?;
    let result = match memory.grow(delta) {
        Some(previous) => previous as i32,
        None => -1,
    };
    stack.push(Value::I32(result))
}

/// memory.copy
pub fn copy(memory: Option<&mut Memory>, stack: &mut Stack) -> Result<(), Trap> {
    let len = stack.pop_i32()? as u32;
    let src = stack.pop_i32()? as u32;
    let dst = stack.pop_i32()? as u32;
    require_mut(memory)?.copy_within(dst, src, len)
}

/// memory.fill
pub fn fill(memory: Option<&mut Memory>, stack: &mut Stack) -> Result<(), Trap> {
    let len = stack.pop_i32()? as u32;
    let value = stack.pop_i32()? as u8;
    let dst = stack.pop_i32()? as u32;
    require_mut(memory)?.fill(dst, value, len)
}
