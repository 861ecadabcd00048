//! Guest code interpreter
//!
//! Runs one call at a time against borrowed instance state. Activations are
//! kept on an explicit frame stack so deep guest recursion is bounded by the
//! context's [`Stack`] budget and never by the host's own call stack.

use super::control::{block_arity, Label, LabelKind};
use super::frame::CallFrame;
use super::imports::{HostContext, HostFunction};
use super::memory::Memory;
use super::stack::Stack;
use super::{ops, Trap, Value};
use crate::parser::instruction::Instruction;
use crate::parser::module::{Module, ValueType};

pub struct Executor<'a> {
    module: &'a Module,
    memory: Option<&'a mut Memory>,
    globals: &'a mut [Value],
    table: &'a [Option<u32>],
    imports: &'a [HostFunction],
    stack: &'a mut Stack,
    frames: Vec<CallFrame>,
    imported_functions: u32,
    /// Instructions left before the call is aborted
    fuel: Option<u64>,
}

impl<'a> Executor<'a> {
    pub fn new(
        module: &'a Module,
        memory: Option<&'a mut Memory>,
        globals: &'a mut [Value],
        table: &'a [Option<u32>],
        imports: &'a [HostFunction],
        stack: &'a mut Stack,
    ) -> Executor<'a> {
        Executor {
            module,
            memory,
            globals,
            table,
            imports,
            stack,
            frames: Vec::new(),
            imported_functions: module.imported_function_count() as u32,
            fuel: None,
        }
    }

    pub fn with_instruction_budget(mut self, budget: Option<u64>) -> Executor<'a> {
        self.fuel = budget;
        self
    }

    /// Call `func_idx` with `args`, returning its results
    ///
    /// Arguments are type checked against the function's signature. On a
    /// trap every activation of this call is discarded and the stack is left
    /// empty, ready for the next call.
    pub fn invoke(&mut self, func_idx: u32, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let result = self.run(func_idx, args);
        self.frames.clear();
        self.stack.reset();
        result
    }

    fn run(&mut self, func_idx: u32, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let module = self.module;
        let signature = module.function_type(func_idx).ok_or(Trap::UndefinedElement)?;
        check_types(&signature.parameters, args)?;

        self.stack.push_all(args)?;
        self.call(func_idx)?;
        self.execute()?;

        let results = self.stack.pop_n(signature.return_types.len())?;
        check_types(&signature.return_types, &results)?;
        Ok(results)
    }

    fn frame(&mut self) -> Result<&mut CallFrame, Trap> {
        self.frames.last_mut().ok_or(Trap::StackUnderflow)
    }

    /* CALLS *****************************************************************/

    fn call(&mut self, func_idx: u32) -> Result<(), Trap> {
        if func_idx < self.imported_functions {
            return self.call_host(func_idx);
        }

        let module = self.module;
        let signature = module.function_type(func_idx).ok_or(Trap::UndefinedElement)?;
        let body = module
            .code
            .get((func_idx - self.imported_functions) as usize)
            .ok_or(Trap::UndefinedElement)?;

        let mut locals = self.stack.pop_n(signature.parameters.len())?;
        check_types(&signature.parameters, &locals)?;
        locals.extend(body.local_types().map(Value::default_for));

        let frame_bytes = self.stack.enter_frame(locals.len())?;
        self.frames.push(CallFrame {
            func_idx,
            ip: 0,
            locals,
            labels: Vec::new(),
            stack_height: self.stack.len(),
            arity: signature.return_types.len(),
            frame_bytes,
        });
        Ok(())
    }

    fn call_host(&mut self, func_idx: u32) -> Result<(), Trap> {
        let imports = self.imports;
        let function = imports.get(func_idx as usize).ok_or(Trap::UndefinedElement)?;
        let args = self.stack.pop_n(function.signature().parameters.len())?;
        check_types(&function.signature().parameters, &args)?;

        let mut context = HostContext::new(self.module, self.memory.as_deref_mut());
        let results = function.call(&mut context, &args)?;
        self.stack.push_all(&results)
    }

    fn return_from_frame(&mut self) -> Result<(), Trap> {
        let frame = self.frames.pop().ok_or(Trap::StackUnderflow)?;
        self.stack.unwind(frame.stack_height, frame.arity)?;
        self.stack.leave_frame(frame.frame_bytes);
        Ok(())
    }

    fn call_indirect(&mut self, type_idx: u32) -> Result<(), Trap> {
        let module = self.module;
        let element = self.stack.pop_i32()? as u32;
        let entry = self.table.get(element as usize).ok_or(Trap::UndefinedElement)?;
        let func_idx = entry.ok_or(Trap::UninitializedElement(element))?;

        let expected = module.types.get(type_idx as usize).ok_or(Trap::UndefinedElement)?;
        let actual = module.function_type(func_idx).ok_or(Trap::UndefinedElement)?;
        if expected != actual {
            return Err(Trap::IndirectCallTypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        self.call(func_idx)
    }

    /* CONTROL ***************************************************************/

    fn push_label(&mut self, kind: LabelKind, params: usize, arity: usize, continuation: usize) -> Result<(), Trap> {
        let stack_height = self.stack.len().checked_sub(params).ok_or(Trap::StackUnderflow)?;
        self.frame()?.labels.push(Label {
            kind,
            arity,
            continuation,
            stack_height,
        });
        Ok(())
    }

    /// Branch to the label `depth` levels out; the outermost level returns
    fn branch(&mut self, depth: u32) -> Result<(), Trap> {
        let frame = self.frames.last_mut().ok_or(Trap::StackUnderflow)?;
        let depth = depth as usize;
        if depth >= frame.labels.len() {
            return self.return_from_frame();
        }

        let target = frame.labels.len() - 1 - depth;
        let label = frame.labels[target].clone();
        self.stack.unwind(label.stack_height, label.arity)?;
        // a loop stays entered when branched to
        frame.labels.truncate(if label.is_loop() { target + 1 } else { target });
        frame.ip = label.continuation;
        Ok(())
    }

    /* EXECUTION *************************************************************/

    fn execute(&mut self) -> Result<(), Trap> {
        let module = self.module;
        while let Some(frame) = self.frames.last_mut() {
            let body = &module.code[(frame.func_idx - self.imported_functions) as usize];
            let Some(instruction) = body.instructions.get(frame.ip) else {
                // fell off the end without an `end`
                self.return_from_frame()?;
                continue;
            };
            frame.ip += 1;

            if let Some(fuel) = self.fuel.as_mut() {
                if *fuel == 0 {
                    return Err(Trap::InstructionBudgetExhausted);
                }
                *fuel -= 1;
            }

            self.step(instruction)?;
        }
        Ok(())
    }

    fn step(&mut self, instruction: &Instruction) -> Result<(), Trap> {
        let module = self.module;
        match instruction {
            Instruction::Unreachable => return Err(Trap::Unreachable),
            Instruction::Nop => {}

            Instruction::Block { block_type, end } => {
                let (params, results) = block_arity(module, block_type)?;
                self.push_label(LabelKind::Block, params, results, *end as usize + 1)?;
            }
            Instruction::Loop { block_type } => {
                let (params, _) = block_arity(module, block_type)?;
                // continue at the first instruction of the body
                let continuation = self.frame()?.ip;
                self.push_label(LabelKind::Loop, params, params, continuation)?;
            }
            Instruction::If { block_type, else_at, end } => {
                let condition = self.stack.pop_i32()?;
                let (params, results) = block_arity(module, block_type)?;
                self.push_label(LabelKind::If, params, results, *end as usize + 1)?;
                if condition == 0 {
                    // without an else the `end` itself pops the label
                    self.frame()?.ip = match else_at {
                        Some(else_at) => *else_at as usize + 1,
                        None => *end as usize,
                    };
                }
            }
            Instruction::Else { end } => {
                self.frame()?.ip = *end as usize;
            }
            Instruction::End => {
                if self.frame()?.labels.pop().is_none() {
                    self.return_from_frame()?;
                }
            }
            Instruction::Br(depth) => self.branch(*depth)?,
            Instruction::BrIf(depth) => {
                if self.stack.pop_i32()? != 0 {
                    self.branch(*depth)?;
                }
            }
            Instruction::BrTable { targets, default } => {
                let index = self.stack.pop_i32()? as u32 as usize;
                let depth = targets.get(index).copied().unwrap_or(*default);
                self.branch(depth)?;
            }
            Instruction::Return => self.return_from_frame()?,
            Instruction::Call(func_idx) => self.call(*func_idx)?,
            Instruction::CallIndirect { type_idx, .. } => self.call_indirect(*type_idx)?,

            Instruction::Drop => {
                self.stack.pop()?;
            }
            Instruction::Select => {
                let condition = self.stack.pop_i32()?;
                let second = self.stack.pop()?;
                let first = self.stack.pop()?;
                if first.typ() != second.typ() {
                    return Err(Trap::type_mismatch(first.typ(), second.typ()));
                }
                self.stack.push(if condition != 0 { first } else { second })?;
            }

            Instruction::LocalGet(idx) => {
                let value = *self.frame()?.locals.get(*idx as usize).ok_or(Trap::UndefinedElement)?;
                self.stack.push(value)?;
            }
            Instruction::LocalSet(idx) => {
                let value = self.stack.pop()?;
                self.set_local(*idx, value)?;
            }
            Instruction::LocalTee(idx) => {
                let value = *self.stack.peek().ok_or(Trap::StackUnderflow)?;
                self.set_local(*idx, value)?;
            }
            Instruction::GlobalGet(idx) => {
                let value = *self.globals.get(*idx as usize).ok_or(Trap::UndefinedElement)?;
                self.stack.push(value)?;
            }
            Instruction::GlobalSet(idx) => {
                let value = self.stack.pop()?;
                let slot = self.globals.get_mut(*idx as usize).ok_or(Trap::UndefinedElement)?;
                if slot.typ() != value.typ() {
                    return Err(Trap::type_mismatch(slot.typ(), value.typ()));
                }
                *slot = value;
            }

            Instruction::Load { op, memarg } => ops::memory::load(*op, memarg, self.memory.as_deref(), self.stack)?,
            Instruction::Store { op, memarg } => {
                ops::memory::store(*op, memarg, self.memory.as_deref_mut(), self.stack)?
            }
            Instruction::MemorySize => ops::memory::size(self.memory.as_deref(), self.stack)?,
            Instruction::MemoryGrow => ops::memory::grow(self.memory.as_deref_mut(), self.stack)?,
            Instruction::MemoryCopy => ops::memory::copy(self.memory.as_deref_mut(), self.stack)?,
            Instruction::MemoryFill => ops::memory::fill(self.memory.as_deref_mut(), self.stack)?,

            Instruction::I32Const(v) => self.stack.push(Value::I32(*v))?,
            Instruction::I64Const(v) => self.stack.push(Value::I64(*v))?,
            Instruction::F32Const(v) => self.stack.push(Value::F32(*v))?,
            Instruction::F64Const(v) => self.stack.push(Value::F64(*v))?,

            Instruction::Numeric(op) => ops::numeric(*op, self.stack)?,
        }
        Ok(())
    }

    fn set_local(&mut self, idx: u32, value: Value) -> Result<(), Trap> {
        let slot = self.frame()?.locals.get_mut(idx as usize).ok_or(Trap::UndefinedElement)?;
        if slot.typ() != value.typ() {
            return Err(Trap::type_mismatch(slot.typ(), value.typ()));
        }
        *slot = value;
        Ok(())
    }
}

fn check_types(expected: &[ValueType], values: &[Value]) -> Result<(), Trap> {
    if expected.len() != values.len() {
        return Err(Trap::StackUnderflow);
    }
    for (value, typ) in values.iter().zip(expected) {
        if value.typ() != *typ {
            return Err(Trap::type_mismatch(typ, value.typ()));
        }
    }
    Ok(())
}
