//! Module instances
//!
//! An [`Instance`] holds everything a module needs at run time: its linear
//! memory, globals, function table and bound host imports, plus the
//! exception text left behind by the last trapped call.
//!
//! Lifecycle: `Created` while linking, `Instantiated` once segments are
//! applied and the start function has run, `Running` for the duration of a
//! call and `Deinstantiated` after release. Every operation on a
//! deinstantiated instance fails with `UseAfterDestroy`.

use super::allocator::{Allocator, Reservation};
use super::context::ContextHandle;
use super::executor::Executor;
use super::imports::{HostFunction, NativeImports};
use super::memory::{Memory, PAGE_SIZE};
use super::stack::Stack;
use super::store::ModuleHandle;
use super::{Error, LinkError, Trap, Value};
use crate::parser::instruction::ConstExpr;
use crate::parser::module::{Export, Module};
use std::mem::size_of;
use std::sync::Arc;

/// Instance handle - index into the runtime's instance table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Created,
    Instantiated,
    Running,
    Deinstantiated,
}

#[derive(Debug)]
pub struct Instance {
    module: Arc<Module>,
    module_handle: ModuleHandle,
    state: InstanceState,
    memory: Option<Memory>,
    globals: Vec<Value>,
    table: Vec<Option<u32>>,
    /// Allocator charge for `table`
    table_region: Option<Reservation>,
    imports: Vec<HostFunction>,
    exception: Option<String>,
    default_context: Option<ContextHandle>,
}

impl Instance {
    /// Link `module` against `imports` and lay out its memory and table
    ///
    /// The start function is not run here; see [`Instance::run_start`].
    pub fn new(
        module: Arc<Module>,
        module_handle: ModuleHandle,
        allocator: &Allocator,
        imports: &NativeImports,
        heap_size: usize,
    ) -> Result<Instance, Error> {
        let imports = imports.resolve(&module)?;

        let memory = match module.memory_limits() {
            Some(limits) => Some(Memory::new(allocator, limits, heap_size)?),
            None => None,
        };

        let mut globals = Vec::with_capacity(module.globals.len());
        for global in &module.globals {
            let value = eval_const(&global.init, &globals)?;
            globals.push(value);
        }

        let table_size = module.table_type().map_or(0, |table| table.limits.min as usize);
        let (table, table_region) = allocate_table(allocator, table_size)?;
        let mut instance = Instance {
            module,
            module_handle,
            state: InstanceState::Created,
            memory,
            globals,
            table,
            table_region: Some(table_region),
            imports,
            exception: None,
            default_context: None,
        };
        instance.apply_segments()?;
        Ok(instance)
    }

    /// Copy element and data segments into place
    ///
    /// Every segment is bounds checked before any is written.
    fn apply_segments(&mut self) -> Result<(), Error> {
        let module = Arc::clone(&self.module);

        let mut elements = Vec::with_capacity(module.elements.len());
        for segment in &module.elements {
            let offset = eval_offset(&segment.offset, &self.globals)?;
            if offset + segment.functions.len() as u64 > self.table.len() as u64 {
                return Err(LinkError::ElementOutOfBounds {
                    offset,
                    len: segment.functions.len(),
                    table_size: self.table.len(),
                }
                .into());
            }
            elements.push((offset as usize, &segment.functions));
        }

        let memory_size = self.memory.as_ref().map_or(0, Memory::byte_len);
        let mut data = Vec::with_capacity(module.data.len());
        for segment in &module.data {
            let offset = eval_offset(&segment.offset, &self.globals)?;
            if offset + segment.bytes.len() as u64 > memory_size as u64 {
                return Err(LinkError::DataOutOfBounds {
                    offset,
                    len: segment.bytes.len(),
                    memory_size,
                }
                .into());
            }
            data.push((offset as u32, &segment.bytes));
        }

        for (offset, functions) in elements {
            for (slot, func_idx) in self.table[offset..].iter_mut().zip(functions.iter()) {
                *slot = Some(*func_idx);
            }
        }
        if let Some(memory) = self.memory.as_mut() {
            for (offset, bytes) in data {
                memory.write_bytes(offset, bytes)?;
            }
        }
        Ok(())
    }

    /// Run the start function, if any, and finish instantiation
    pub fn run_start(&mut self, stack: &mut Stack, instruction_budget: Option<u64>) -> Result<(), Error> {
        if let Some(start) = self.module.start {
            self.executor(stack, instruction_budget)
                .invoke(start, &[])
                .map_err(LinkError::StartFunction)?;
        }
        self.state = InstanceState::Instantiated;
        Ok(())
    }

    /// Interpreter bound to this instance's state
    pub fn executor<'a>(&'a mut self, stack: &'a mut Stack, instruction_budget: Option<u64>) -> Executor<'a> {
        Executor::new(
            &self.module,
            self.memory.as_mut(),
            &mut self.globals,
            &self.table,
            &self.imports,
            stack,
        )
        .with_instruction_budget(instruction_budget)
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn module_handle(&self) -> ModuleHandle {
        self.module_handle
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn ensure_live(&self) -> Result<(), Error> {
        match self.state {
            InstanceState::Deinstantiated => Err(Error::UseAfterDestroy("instance")),
            _ => Ok(()),
        }
    }

    pub fn begin_call(&mut self) -> Result<(), Error> {
        match self.state {
            InstanceState::Instantiated => {
                self.state = InstanceState::Running;
                Ok(())
            }
            InstanceState::Running => Err(Error::AlreadyRunning),
            InstanceState::Created => Err(Error::InvalidHandle("instance")),
            InstanceState::Deinstantiated => Err(Error::UseAfterDestroy("instance")),
        }
    }

    pub fn end_call(&mut self) {
        if self.state == InstanceState::Running {
            self.state = InstanceState::Instantiated;
        }
    }

    pub fn exports(&self) -> &[Export] {
        &self.module.exports
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        self.memory.as_mut()
    }

    /// Grow linear memory, returning the previous size in pages
    pub fn grow_memory(&mut self, delta_pages: u32) -> Result<u32, Error> {
        let memory = self
            .memory
            .as_mut()
            .ok_or_else(|| Error::NotFound("linear memory".to_string()))?;
        let requested = memory.size() as u64 + delta_pages as u64;
        if requested > memory.max_pages() as u64 {
            return Err(Error::MemoryLimitExceeded {
                required: requested * PAGE_SIZE as u64,
                budget: memory.max_pages() as u64 * PAGE_SIZE as u64,
            });
        }
        memory.grow(delta_pages).ok_or_else(|| {
            Error::ResourceExhausted(format!("allocator cannot grow linear memory to {requested} pages"))
        })
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn set_exception(&mut self, trap: &Trap) {
        self.exception = Some(trap.to_string());
    }

    pub fn clear_exception(&mut self) {
        self.exception = None;
    }

    pub fn default_context(&self) -> Option<ContextHandle> {
        self.default_context
    }

    pub fn set_default_context(&mut self, context: ContextHandle) {
        self.default_context = Some(context);
    }

    /// Drop memory, globals and bindings; the handle stays dead afterwards
    pub fn release(&mut self) {
        self.memory = None;
        self.globals = Vec::new();
        self.table = Vec::new();
        self.table_region = None;
        self.imports = Vec::new();
        self.exception = None;
        self.default_context = None;
        self.state = InstanceState::Deinstantiated;
    }
}

/// Function table of `size` empty slots, charged to `allocator`
fn allocate_table(allocator: &Allocator, size: usize) -> Result<(Vec<Option<u32>>, Reservation), Error> {
    let exhausted = || Error::ResourceExhausted(format!("allocator cannot provide a table of {size} elements"));
    let bytes = size.checked_mul(size_of::<Option<u32>>()).ok_or_else(exhausted)?;
    let region = allocator.reserve(bytes).ok_or_else(exhausted)?;
    let mut table = Vec::new();
    table.try_reserve_exact(size).map_err(|_| exhausted())?;
    table.resize(size, None);
    Ok((table, region))
}

fn eval_const(expr: &ConstExpr, globals: &[Value]) -> Result<Value, Error> {
    Ok(match expr {
        ConstExpr::I32(v) => Value::I32(*v),
        ConstExpr::I64(v) => Value::I64(*v),
        ConstExpr::F32(v) => Value::F32(*v),
        ConstExpr::F64(v) => Value::F64(*v),
        ConstExpr::GlobalGet(idx) => *globals.get(*idx as usize).ok_or(Trap::UndefinedElement)?,
    })
}

fn eval_offset(expr: &ConstExpr, globals: &[Value]) -> Result<u64, Error> {
    match eval_const(expr, globals)? {
        Value::I32(offset) => Ok(offset as u32 as u64),
        other => Err(Trap::type_mismatch("i32", other.typ()).into()),
    }
}
