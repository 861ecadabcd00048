//! Execution stack
//!
//! Holds the operand stack for every activation of one execution context
//! and enforces the context's fixed stack budget. The budget is charged in
//! bytes: each activation costs [`FRAME_HEADER_SIZE`] plus one
//! [`SLOT_SIZE`] per parameter and local, and each operand costs one slot.
//! Running past the budget traps with [`Trap::StackOverflow`].

use super::allocator::{Allocator, Reservation};
use super::{Error, Trap, Value};
use crate::parser::module::ValueType;

/// Bytes charged per operand, parameter or local
pub const SLOT_SIZE: usize = 8;

/// Bytes charged per activation on top of its slots
pub const FRAME_HEADER_SIZE: usize = 64;

#[derive(Debug)]
pub struct Stack {
    values: Vec<Value>,
    /// Bytes charged by live activations
    frame_bytes: usize,
    capacity: usize,
    _region: Reservation,
}

impl Stack {
    /// Reserve a stack of `size` bytes from the allocator
    pub fn new(allocator: &Allocator, size: usize) -> Result<Stack, Error> {
        if size < FRAME_HEADER_SIZE {
            return Err(Error::ResourceExhausted(format!(
                "stack size {size} is smaller than a single frame ({FRAME_HEADER_SIZE} bytes)"
            )));
        }
        let region = allocator
            .reserve(size)
            .ok_or_else(|| Error::ResourceExhausted(format!("allocator cannot provide a {size} byte stack")))?;
        Ok(Stack {
            values: Vec::new(),
            frame_bytes: 0,
            capacity: size,
            _region: region,
        })
    }

    /// Stack budget in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently charged against the budget
    pub fn used(&self) -> usize {
        self.frame_bytes + self.values.len() * SLOT_SIZE
    }

    /// Charge an activation with `slots` parameters and locals
    pub fn enter_frame(&mut self, slots: usize) -> Result<usize, Trap> {
        let cost = slots
            .checked_mul(SLOT_SIZE)
            .and_then(|bytes| bytes.checked_add(FRAME_HEADER_SIZE))
            .ok_or(Trap::StackOverflow)?;
        if self.used() + cost > self.capacity {
            return Err(Trap::StackOverflow);
        }
        self.frame_bytes += cost;
        Ok(cost)
    }

    pub fn leave_frame(&mut self, cost: usize) {
        self.frame_bytes -= cost;
    }

    pub fn push(&mut self, value: Value) -> Result<(), Trap> {
        if self.used() + SLOT_SIZE > self.capacity {
            return Err(Trap::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn push_all(&mut self, values: &[Value]) -> Result<(), Trap> {
        for value in values {
            self.push(*value)?;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.values.pop().ok_or(Trap::StackUnderflow)
    }

    pub fn pop_typed(&mut self, expected: ValueType) -> Result<Value, Trap> {
        let value = self.pop()?;
        if value.typ() != expected {
            return Err(Trap::type_mismatch(expected, value.typ()));
        }
        Ok(value)
    }

    pub fn pop_i32(&mut self) -> Result<i32, Trap> {
        match self.pop()? {
            Value::I32(v) => Ok(v),
            other => Err(Trap::type_mismatch(ValueType::I32, other.typ())),
        }
    }

    pub fn pop_i64(&mut self) -> Result<i64, Trap> {
        match self.pop()? {
            Value::I64(v) => Ok(v),
            other => Err(Trap::type_mismatch(ValueType::I64, other.typ())),
        }
    }

    pub fn pop_f32(&mut self) -> Result<f32, Trap> {
        match self.pop()? {
            Value::F32(v) => Ok(v),
            other => Err(Trap::type_mismatch(ValueType::F32, other.typ())),
        }
    }

    pub fn pop_f64(&mut self) -> Result<f64, Trap> {
        match self.pop()? {
            Value::F64(v) => Ok(v),
            other => Err(Trap::type_mismatch(ValueType::F64, other.typ())),
        }
    }

    /// Pop `n` values, returned in push order
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Trap> {
        if n > self.values.len() {
            return Err(Trap::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    /// Drop everything between `height` and the top `keep` values
    pub fn unwind(&mut self, height: usize, keep: usize) -> Result<(), Trap> {
        let len = self.values.len();
        if len < height + keep {
            return Err(Trap::StackUnderflow);
        }
        self.values.drain(height..len - keep);
        Ok(())
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discard all operands and activations after an aborted call
    pub fn reset(&mut self) {
        self.values.clear();
        self.frame_bytes = 0;
    }
}
