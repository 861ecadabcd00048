//! Validation of decoded modules
//!
//! Checks that every index refers to something that exists, that limits
//! are consistent and that the module declares at most one memory and one
//! table. Function bodies are type checked with an operand stack and a
//! control stack, following the validation algorithm in the appendix of
//! the WebAssembly core specification.

use super::instruction::{BlockType, ConstExpr, Instruction};
use super::module::{ExportKind, FunctionType, ImportKind, Limits, Module, ValueType};
use crate::runtime::memory::MAX_PAGES;
use std::collections::HashSet;
use thiserror::Error;

/// Upper bound on declared locals (excluding parameters) per function
pub const MAX_LOCALS: u64 = 50_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("type mismatch")]
    TypeMismatch,

    #[error("unknown type {0}")]
    UnknownType(u32),

    #[error("unknown function {0}")]
    UnknownFunction(u32),

    #[error("unknown local {0}")]
    UnknownLocal(u32),

    #[error("unknown global {0}")]
    UnknownGlobal(u32),

    #[error("unknown label {0}")]
    UnknownLabel(u32),

    #[error("unknown memory")]
    UnknownMemory,

    #[error("unknown table")]
    UnknownTable,

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("alignment must not be larger than natural")]
    BadAlignment,

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("multiple memories")]
    MultipleMemories,

    #[error("multiple tables")]
    MultipleTables,

    #[error("size minimum must not be greater than maximum")]
    InvalidLimits,

    #[error("memory size must be at most 65536 pages (4GiB), found {0}")]
    MemoryTooLarge(u32),

    #[error("start function must have type () -> nil, found {0}")]
    StartFunctionType(FunctionType),

    #[error("constant expression required")]
    ConstantExpressionRequired,

    #[error("data count and data section have inconsistent lengths ({declared} vs {actual})")]
    DataCountMismatch { declared: u32, actual: usize },

    #[error("too many locals: {0}")]
    TooManyLocals(u64),

    #[error("function {func}: {error}")]
    InFunction { func: u32, error: Box<ValidationError> },
}

/// Validate a decoded module
pub fn validate(module: &Module) -> Result<(), ValidationError> {
    validate_imports(module)?;

    for type_idx in &module.functions {
        check_type(module, *type_idx)?;
    }

    if module.memory_count() > 1 {
        return Err(ValidationError::MultipleMemories);
    }
    if module.table_count() > 1 {
        return Err(ValidationError::MultipleTables);
    }
    for limits in &module.memories {
        validate_memory_limits(limits)?;
    }
    for table in &module.tables {
        validate_limits(&table.limits)?;
    }

    validate_globals(module)?;
    validate_exports(module)?;
    validate_start(module)?;
    validate_elements(module)?;
    validate_data(module)?;

    let imported = module.imported_function_count() as u32;
    for i in 0..module.code.len() {
        let func = imported + i as u32;
        validate_function(module, func).map_err(|error| ValidationError::InFunction {
            func,
            error: Box::new(error),
        })?;
    }

    Ok(())
}

fn check_type(module: &Module, type_idx: u32) -> Result<&FunctionType, ValidationError> {
    module
        .types
        .get(type_idx as usize)
        .ok_or(ValidationError::UnknownType(type_idx))
}

fn validate_limits(limits: &Limits) -> Result<(), ValidationError> {
    match limits.max {
        Some(max) if max < limits.min => Err(ValidationError::InvalidLimits),
        _ => Ok(()),
    }
}

fn validate_memory_limits(limits: &Limits) -> Result<(), ValidationError> {
    if limits.min > MAX_PAGES {
        return Err(ValidationError::MemoryTooLarge(limits.min));
    }
    if let Some(max) = limits.max {
        if max > MAX_PAGES {
            return Err(ValidationError::MemoryTooLarge(max));
        }
    }
    validate_limits(limits)
}

fn validate_imports(module: &Module) -> Result<(), ValidationError> {
    for import in &module.imports {
        match &import.kind {
            ImportKind::Function(type_idx) => {
                check_type(module, *type_idx)?;
            }
            ImportKind::Memory(limits) => validate_memory_limits(limits)?,
            ImportKind::Table(table) => validate_limits(&table.limits)?,
            ImportKind::Global(_) => {}
        }
    }
    Ok(())
}

/// Type of a constant expression. `global.get` may only reference
/// imported globals.
fn const_expr_type(module: &Module, expr: &ConstExpr) -> Result<ValueType, ValidationError> {
    match expr {
        ConstExpr::I32(_) => Ok(ValueType::I32),
        ConstExpr::I64(_) => Ok(ValueType::I64),
        ConstExpr::F32(_) => Ok(ValueType::F32),
        ConstExpr::F64(_) => Ok(ValueType::F64),
        ConstExpr::GlobalGet(idx) => {
            if *idx as usize >= module.imported_global_count() {
                return Err(ValidationError::UnknownGlobal(*idx));
            }
            let global = module.global_type(*idx).ok_or(ValidationError::UnknownGlobal(*idx))?;
            if global.mutable {
                return Err(ValidationError::ConstantExpressionRequired);
            }
            Ok(global.value_type)
        }
    }
}

fn expect_const_type(module: &Module, expr: &ConstExpr, expected: ValueType) -> Result<(), ValidationError> {
    if const_expr_type(module, expr)? != expected {
        return Err(ValidationError::TypeMismatch);
    }
    Ok(())
}

fn validate_globals(module: &Module) -> Result<(), ValidationError> {
    for global in &module.globals {
        expect_const_type(module, &global.init, global.global_type.value_type)?;
    }
    Ok(())
}

fn validate_exports(module: &Module) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for export in &module.exports {
        if !names.insert(export.name.as_str()) {
            return Err(ValidationError::DuplicateExport(export.name.clone()));
        }
        let index = export.index;
        match export.kind {
            ExportKind::Function if index as usize >= module.function_count() => {
                return Err(ValidationError::UnknownFunction(index))
            }
            ExportKind::Global if index as usize >= module.global_count() => {
                return Err(ValidationError::UnknownGlobal(index))
            }
            ExportKind::Memory if index as usize >= module.memory_count() => return Err(ValidationError::UnknownMemory),
            ExportKind::Table if index as usize >= module.table_count() => return Err(ValidationError::UnknownTable),
            _ => {}
        }
    }
    Ok(())
}

fn validate_start(module: &Module) -> Result<(), ValidationError> {
    if let Some(start) = module.start {
        let signature = module.function_type(start).ok_or(ValidationError::UnknownFunction(start))?;
        if !signature.parameters.is_empty() || !signature.return_types.is_empty() {
            return Err(ValidationError::StartFunctionType(signature.clone()));
        }
    }
    Ok(())
}

fn validate_elements(module: &Module) -> Result<(), ValidationError> {
    for segment in &module.elements {
        if module.table_count() == 0 {
            return Err(ValidationError::UnknownTable);
        }
        expect_const_type(module, &segment.offset, ValueType::I32)?;
        for func in &segment.functions {
            if *func as usize >= module.function_count() {
                return Err(ValidationError::UnknownFunction(*func));
            }
        }
    }
    Ok(())
}

fn validate_data(module: &Module) -> Result<(), ValidationError> {
    if let Some(declared) = module.data_count {
        if declared as usize != module.data.len() {
            return Err(ValidationError::DataCountMismatch {
                declared,
                actual: module.data.len(),
            });
        }
    }
    for segment in &module.data {
        if segment.memory as usize >= module.memory_count() {
            return Err(ValidationError::UnknownMemory);
        }
        expect_const_type(module, &segment.offset, ValueType::I32)?;
    }
    Ok(())
}

/// Parameter and result types of a structured block
fn block_signature(module: &Module, block_type: &BlockType) -> Result<(Vec<ValueType>, Vec<ValueType>), ValidationError> {
    match block_type {
        BlockType::Empty => Ok((vec![], vec![])),
        BlockType::Value(value_type) => Ok((vec![], vec![*value_type])),
        BlockType::FuncType(type_idx) => {
            let signature = check_type(module, *type_idx)?;
            Ok((signature.parameters.clone(), signature.return_types.clone()))
        }
    }
}

fn check_alignment(align: u32, width: u32) -> Result<(), ValidationError> {
    if align >= 32 || 1u64 << align > width as u64 {
        return Err(ValidationError::BadAlignment);
    }
    Ok(())
}

/* TYPE CHECKING **************************************************/

/// Entry on the operand stack. `Unknown` is produced by popping past the
/// height of an unreachable frame and matches any type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Known(ValueType),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
struct CtrlFrame {
    kind: FrameKind,
    start_types: Vec<ValueType>,
    end_types: Vec<ValueType>,
    height: usize,
    unreachable: bool,
}

impl CtrlFrame {
    /// Types a branch to this frame must carry
    fn label_types(&self) -> &[ValueType] {
        match self.kind {
            FrameKind::Loop => &self.start_types,
            _ => &self.end_types,
        }
    }
}

#[derive(Debug, Default)]
struct TypeChecker {
    vals: Vec<Operand>,
    ctrls: Vec<CtrlFrame>,
}

impl TypeChecker {
    fn push_val(&mut self, value_type: ValueType) {
        self.vals.push(Operand::Known(value_type));
    }

    fn push_vals(&mut self, types: &[ValueType]) {
        self.vals.extend(types.iter().map(|t| Operand::Known(*t)));
    }

    fn pop_val(&mut self) -> Result<Operand, ValidationError> {
        let frame = self.ctrls.last().ok_or(ValidationError::TypeMismatch)?;
        if self.vals.len() == frame.height {
            if frame.unreachable {
                return Ok(Operand::Unknown);
            }
            return Err(ValidationError::TypeMismatch);
        }
        self.vals.pop().ok_or(ValidationError::TypeMismatch)
    }

    fn pop_expected(&mut self, expected: ValueType) -> Result<(), ValidationError> {
        match self.pop_val()? {
            Operand::Known(actual) if actual != expected => Err(ValidationError::TypeMismatch),
            _ => Ok(()),
        }
    }

    /// Pop `types` off the stack; the last type is on top
    fn pop_expecteds(&mut self, types: &[ValueType]) -> Result<(), ValidationError> {
        for value_type in types.iter().rev() {
            self.pop_expected(*value_type)?;
        }
        Ok(())
    }

    fn push_ctrl(&mut self, kind: FrameKind, start_types: Vec<ValueType>, end_types: Vec<ValueType>) {
        self.push_vals(&start_types);
        self.ctrls.push(CtrlFrame {
            kind,
            height: self.vals.len() - start_types.len(),
            start_types,
            end_types,
            unreachable: false,
        });
    }

    fn pop_ctrl(&mut self) -> Result<CtrlFrame, ValidationError> {
        let end_types = self.ctrls.last().ok_or(ValidationError::TypeMismatch)?.end_types.clone();
        self.pop_expecteds(&end_types)?;
        let frame = self.ctrls.pop().ok_or(ValidationError::TypeMismatch)?;
        if self.vals.len() != frame.height {
            return Err(ValidationError::TypeMismatch);
        }
        Ok(frame)
    }

    fn label_types_at(&self, label: u32) -> Result<Vec<ValueType>, ValidationError> {
        let idx = self
            .ctrls
            .len()
            .checked_sub(label as usize + 1)
            .ok_or(ValidationError::UnknownLabel(label))?;
        Ok(self.ctrls[idx].label_types().to_vec())
    }

    /// Everything after this point up to the end of the frame is dead code
    fn unreachable(&mut self) -> Result<(), ValidationError> {
        let frame = self.ctrls.last_mut().ok_or(ValidationError::TypeMismatch)?;
        self.vals.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }
}

fn validate_function(module: &Module, func: u32) -> Result<(), ValidationError> {
    let imported = module.imported_function_count();
    let body = &module.code[func as usize - imported];
    let signature = module.function_type(func).ok_or(ValidationError::UnknownFunction(func))?;

    let declared = body.local_count();
    if declared > MAX_LOCALS {
        return Err(ValidationError::TooManyLocals(declared));
    }
    let locals: Vec<ValueType> = signature.parameters.iter().copied().chain(body.local_types()).collect();
    let has_memory = module.memory_count() > 0;
    let local_type = |idx: u32| locals.get(idx as usize).copied().ok_or(ValidationError::UnknownLocal(idx));
    let require_memory = || {
        if has_memory {
            Ok(())
        } else {
            Err(ValidationError::UnknownMemory)
        }
    };

    let mut checker = TypeChecker::default();
    checker.push_ctrl(FrameKind::Function, vec![], signature.return_types.clone());

    for instruction in &body.instructions {
        // nothing may follow the final end
        if checker.ctrls.is_empty() {
            return Err(ValidationError::TypeMismatch);
        }
        match instruction {
            Instruction::Unreachable => checker.unreachable()?,
            Instruction::Nop => {}
            Instruction::Block { block_type, .. } | Instruction::Loop { block_type } | Instruction::If { block_type, .. } => {
                let (start_types, end_types) = block_signature(module, block_type)?;
                let kind = match instruction {
                    Instruction::Block { .. } => FrameKind::Block,
                    Instruction::Loop { .. } => FrameKind::Loop,
                    _ => {
                        checker.pop_expected(ValueType::I32)?;
                        FrameKind::If
                    }
                };
                checker.pop_expecteds(&start_types)?;
                checker.push_ctrl(kind, start_types, end_types);
            }
            Instruction::Else { .. } => {
                let frame = checker.pop_ctrl()?;
                if frame.kind != FrameKind::If {
                    return Err(ValidationError::TypeMismatch);
                }
                checker.push_ctrl(FrameKind::Else, frame.start_types, frame.end_types);
            }
            Instruction::End => {
                let frame = checker.pop_ctrl()?;
                // an if without else passes its parameters through unchanged
                if frame.kind == FrameKind::If && frame.start_types != frame.end_types {
                    return Err(ValidationError::TypeMismatch);
                }
                checker.push_vals(&frame.end_types);
            }
            Instruction::Br(label) => {
                let label_types = checker.label_types_at(*label)?;
                checker.pop_expecteds(&label_types)?;
                checker.unreachable()?;
            }
            Instruction::BrIf(label) => {
                checker.pop_expected(ValueType::I32)?;
                let label_types = checker.label_types_at(*label)?;
                checker.pop_expecteds(&label_types)?;
                checker.push_vals(&label_types);
            }
            Instruction::BrTable { targets, default } => {
                checker.pop_expected(ValueType::I32)?;
                let default_types = checker.label_types_at(*default)?;
                for label in targets.iter() {
                    let label_types = checker.label_types_at(*label)?;
                    if label_types.len() != default_types.len() {
                        return Err(ValidationError::TypeMismatch);
                    }
                    checker.pop_expecteds(&label_types)?;
                    checker.push_vals(&label_types);
                }
                checker.pop_expecteds(&default_types)?;
                checker.unreachable()?;
            }
            Instruction::Return => {
                checker.pop_expecteds(&signature.return_types)?;
                checker.unreachable()?;
            }
            Instruction::Call(callee) => {
                let callee_type = module
                    .function_type(*callee)
                    .ok_or(ValidationError::UnknownFunction(*callee))?;
                checker.pop_expecteds(&callee_type.parameters)?;
                checker.push_vals(&callee_type.return_types);
            }
            Instruction::CallIndirect { type_idx, table_idx } => {
                let callee_type = check_type(module, *type_idx)?;
                if *table_idx as usize >= module.table_count() {
                    return Err(ValidationError::UnknownTable);
                }
                checker.pop_expected(ValueType::I32)?;
                checker.pop_expecteds(&callee_type.parameters)?;
                checker.push_vals(&callee_type.return_types);
            }
            Instruction::Drop => {
                checker.pop_val()?;
            }
            Instruction::Select => {
                checker.pop_expected(ValueType::I32)?;
                let first = checker.pop_val()?;
                let second = checker.pop_val()?;
                match (first, second) {
                    (Operand::Known(a), Operand::Known(b)) if a != b => return Err(ValidationError::TypeMismatch),
                    (Operand::Unknown, other) => checker.vals.push(other),
                    (known, _) => checker.vals.push(known),
                }
            }
            Instruction::LocalGet(idx) => checker.push_val(local_type(*idx)?),
            Instruction::LocalSet(idx) => checker.pop_expected(local_type(*idx)?)?,
            Instruction::LocalTee(idx) => {
                let value_type = local_type(*idx)?;
                checker.pop_expected(value_type)?;
                checker.push_val(value_type);
            }
            Instruction::GlobalGet(idx) => {
                let global = module.global_type(*idx).ok_or(ValidationError::UnknownGlobal(*idx))?;
                checker.push_val(global.value_type);
            }
            Instruction::GlobalSet(idx) => {
                let global = module.global_type(*idx).ok_or(ValidationError::UnknownGlobal(*idx))?;
                if !global.mutable {
                    return Err(ValidationError::ImmutableGlobal(*idx));
                }
                checker.pop_expected(global.value_type)?;
            }
            Instruction::Load { op, memarg } => {
                require_memory()?;
                check_alignment(memarg.align, op.width())?;
                checker.pop_expected(ValueType::I32)?;
                checker.push_val(op.value_type());
            }
            Instruction::Store { op, memarg } => {
                require_memory()?;
                check_alignment(memarg.align, op.width())?;
                checker.pop_expected(op.value_type())?;
                checker.pop_expected(ValueType::I32)?;
            }
            Instruction::MemorySize => {
                require_memory()?;
                checker.push_val(ValueType::I32);
            }
            Instruction::MemoryGrow => {
                require_memory()?;
                checker.pop_expected(ValueType::I32)?;
                checker.push_val(ValueType::I32);
            }
            Instruction::MemoryCopy | Instruction::MemoryFill => {
                require_memory()?;
                checker.pop_expecteds(&[ValueType::I32; 3])?;
            }
            Instruction::I32Const(_) => checker.push_val(ValueType::I32),
            Instruction::I64Const(_) => checker.push_val(ValueType::I64),
            Instruction::F32Const(_) => checker.push_val(ValueType::F32),
            Instruction::F64Const(_) => checker.push_val(ValueType::F64),
            Instruction::Numeric(op) => {
                let (inputs, output) = op.signature();
                checker.pop_expecteds(inputs)?;
                checker.push_val(output);
            }
        }
    }

    // the body must close the function frame
    if !checker.ctrls.is_empty() {
        return Err(ValidationError::TypeMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::instruction::{LoadOp, MemArg, NumericOp, StoreOp};
    use crate::parser::module::{Export, FunctionBody, Global, GlobalType, Locals};
    use rstest::rstest;

    fn module_with_body(params: Vec<ValueType>, instructions: Vec<Instruction>) -> Module {
        module_with_signature(params, vec![], instructions)
    }

    fn module_with_signature(params: Vec<ValueType>, results: Vec<ValueType>, instructions: Vec<Instruction>) -> Module {
        let mut module = Module::new();
        module.types.push(FunctionType::new(params, results));
        module.functions.push(0);
        module.code.push(FunctionBody {
            locals: vec![],
            instructions,
        });
        module
    }

    fn unwrap_function_error(err: ValidationError) -> ValidationError {
        match err {
            ValidationError::InFunction { error, .. } => *error,
            other => other,
        }
    }

    #[test]
    fn test_valid_module() {
        let module = module_with_body(vec![ValueType::I32], vec![Instruction::LocalGet(0), Instruction::Drop, Instruction::End]);
        assert_eq!(validate(&module), Ok(()));
    }

    #[test]
    fn test_unknown_type() {
        let mut module = module_with_body(vec![], vec![Instruction::End]);
        module.functions[0] = 5;
        assert_eq!(validate(&module), Err(ValidationError::UnknownType(5)));
    }

    #[test]
    fn test_unknown_local() {
        let module = module_with_body(vec![ValueType::I32], vec![Instruction::LocalGet(1), Instruction::End]);
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::UnknownLocal(1));
    }

    #[test]
    fn test_unknown_function_call() {
        let module = module_with_body(vec![], vec![Instruction::Call(3), Instruction::End]);
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::UnknownFunction(3));
    }

    #[test]
    fn test_unknown_label() {
        let module = module_with_body(vec![], vec![Instruction::Br(0), Instruction::Br(1), Instruction::End]);
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::UnknownLabel(1));
    }

    #[test]
    fn test_memory_required() {
        let module = module_with_body(
            vec![],
            vec![
                Instruction::I32Const(0),
                Instruction::Load {
                    op: LoadOp::I32Load,
                    memarg: MemArg { align: 2, offset: 0 },
                },
                Instruction::Drop,
                Instruction::End,
            ],
        );
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::UnknownMemory);
    }

    #[test]
    fn test_bad_alignment() {
        let mut module = module_with_body(
            vec![],
            vec![
                Instruction::I32Const(0),
                Instruction::Load {
                    op: LoadOp::I32Load8U,
                    memarg: MemArg { align: 1, offset: 0 },
                },
                Instruction::Drop,
                Instruction::End,
            ],
        );
        module.memories.push(Limits { min: 1, max: None });
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::BadAlignment);
    }

    #[test]
    fn test_memory_limits() {
        let mut module = Module::new();
        module.memories.push(Limits { min: 2, max: Some(1) });
        assert_eq!(validate(&module), Err(ValidationError::InvalidLimits));

        let mut module = Module::new();
        module.memories.push(Limits {
            min: 1,
            max: Some(MAX_PAGES + 1),
        });
        assert_eq!(validate(&module), Err(ValidationError::MemoryTooLarge(MAX_PAGES + 1)));

        let mut module = Module::new();
        module.memories.push(Limits { min: 1, max: None });
        module.memories.push(Limits { min: 1, max: None });
        assert_eq!(validate(&module), Err(ValidationError::MultipleMemories));
    }

    #[test]
    fn test_duplicate_export() {
        let mut module = module_with_body(vec![], vec![Instruction::End]);
        for _ in 0..2 {
            module.exports.push(Export {
                name: "f".to_string(),
                kind: ExportKind::Function,
                index: 0,
            });
        }
        assert_eq!(validate(&module), Err(ValidationError::DuplicateExport("f".to_string())));
    }

    #[test]
    fn test_start_function_type() {
        let mut module = module_with_body(vec![ValueType::I32], vec![Instruction::End]);
        module.start = Some(0);
        assert!(matches!(validate(&module), Err(ValidationError::StartFunctionType(_))));
    }

    #[test]
    fn test_immutable_global() {
        let mut module = module_with_body(vec![], vec![Instruction::I32Const(1), Instruction::GlobalSet(0), Instruction::End]);
        module.globals.push(Global {
            global_type: GlobalType {
                value_type: ValueType::I32,
                mutable: false,
            },
            init: ConstExpr::I32(0),
        });
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::ImmutableGlobal(0));
    }

    #[test]
    fn test_global_init_type() {
        let mut module = Module::new();
        module.globals.push(Global {
            global_type: GlobalType {
                value_type: ValueType::I64,
                mutable: true,
            },
            init: ConstExpr::I32(0),
        });
        assert_eq!(validate(&module), Err(ValidationError::TypeMismatch));
    }

    #[test]
    fn test_too_many_locals() {
        let mut module = module_with_body(vec![], vec![Instruction::End]);
        module.code[0].locals.push(Locals {
            count: u32::MAX,
            value_type: ValueType::I64,
        });
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::TooManyLocals(u32::MAX as u64));
    }

    use Instruction::*;

    fn block(block_type: BlockType) -> Instruction {
        Block { block_type, end: 0 }
    }

    fn if_(block_type: BlockType) -> Instruction {
        If {
            block_type,
            else_at: None,
            end: 0,
        }
    }

    #[rstest]
    #[case::result_from_block(vec![], vec![block(BlockType::Value(ValueType::I32)), I32Const(1), End, End])]
    #[case::dead_code_is_polymorphic(vec![], vec![Unreachable, Numeric(NumericOp::I32Add), End])]
    #[case::return_skips_rest(vec![ValueType::I32], vec![I64Const(1), LocalGet(0), Return, End])]
    #[case::branch_carries_result(vec![], vec![block(BlockType::Value(ValueType::I32)), I32Const(7), Br(0), End, End])]
    #[case::select_same_types(vec![ValueType::I32], vec![LocalGet(0), LocalGet(0), I32Const(1), Select, End])]
    #[case::if_else_results(vec![ValueType::I32], vec![
        LocalGet(0),
        If { block_type: BlockType::Value(ValueType::I32), else_at: Some(3), end: 5 },
        I32Const(1),
        Else { end: 5 },
        I32Const(2),
        End,
        End,
    ])]
    #[case::conversion(vec![], vec![F64Const(1.5), Numeric(NumericOp::I32TruncF64S), End])]
    fn test_well_typed(#[case] params: Vec<ValueType>, #[case] instructions: Vec<Instruction>) {
        let module = module_with_signature(params, vec![ValueType::I32], instructions);
        assert_eq!(validate(&module), Ok(()));
    }

    #[rstest]
    #[case::wrong_result_type(vec![F32Const(1.0), End])]
    #[case::missing_result(vec![End])]
    #[case::extra_operand(vec![I32Const(1), I32Const(2), End])]
    #[case::mixed_operands(vec![I32Const(1), I64Const(2), Numeric(NumericOp::I32Add), End])]
    #[case::empty_stack(vec![Numeric(NumericOp::I32Eqz), End])]
    #[case::block_leaks_operand(vec![block(BlockType::Empty), I32Const(1), End, I32Const(1), End])]
    #[case::operand_crosses_block(vec![I32Const(1), block(BlockType::Value(ValueType::I32)), End, End])]
    #[case::if_without_else(vec![I32Const(1), if_(BlockType::Value(ValueType::I32)), I32Const(1), End, End])]
    #[case::select_mixed(vec![I32Const(1), F32Const(1.0), I32Const(0), Select, End])]
    #[case::branch_wrong_type(vec![block(BlockType::Value(ValueType::I32)), F64Const(1.0), Br(0), End, End])]
    #[case::br_table_arity(vec![
        block(BlockType::Empty),
        block(BlockType::Value(ValueType::I32)),
        I32Const(1),
        I32Const(0),
        BrTable { targets: vec![0].into_boxed_slice(), default: 1 },
        End,
        End,
        I32Const(1),
        End,
    ])]
    fn test_ill_typed(#[case] instructions: Vec<Instruction>) {
        let module = module_with_signature(vec![], vec![ValueType::I32], instructions);
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::TypeMismatch);
    }

    #[test]
    fn test_store_operand_order() {
        let store = |op| Store {
            op,
            memarg: MemArg { align: 0, offset: 0 },
        };
        let mut module = module_with_body(vec![], vec![I32Const(0), I64Const(1), store(StoreOp::I64Store8), End]);
        module.memories.push(Limits { min: 1, max: None });
        assert_eq!(validate(&module), Ok(()));

        module.code[0].instructions = vec![I64Const(1), I32Const(0), store(StoreOp::I64Store8), End];
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::TypeMismatch);
    }

    #[test]
    fn test_call_signature() {
        let mut module = module_with_body(vec![ValueType::I64], vec![I32Const(1), Call(0), End]);
        let err = unwrap_function_error(validate(&module).unwrap_err());
        assert_eq!(err, ValidationError::TypeMismatch);

        module.code[0].instructions = vec![I64Const(1), Call(0), End];
        assert_eq!(validate(&module), Ok(()));
    }
}
