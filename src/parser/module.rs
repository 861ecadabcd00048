use std::fmt;

use super::instruction::{ConstExpr, Instruction};
use super::ParseError;

/// Decoded module
///
/// Index spaces follow the binary format: function, table, memory and
/// global indices count imports first, then local definitions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// Type index for each locally defined function
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data_count: Option<u32>,
    pub code: Vec<FunctionBody>,
    pub data: Vec<DataSegment>,
    /// Name and payload length of each custom section, in order
    pub custom_sections: Vec<(String, usize)>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    fn imports_of<'a, T: 'a>(&'a self, f: impl Fn(&'a ImportKind) -> Option<T> + 'a) -> impl Iterator<Item = T> + 'a {
        self.imports.iter().filter_map(move |import| f(&import.kind))
    }

    pub fn imported_function_count(&self) -> usize {
        self.imports_of(|kind| match kind {
            ImportKind::Function(type_idx) => Some(*type_idx),
            _ => None,
        })
        .count()
    }

    pub fn imported_global_count(&self) -> usize {
        self.imported_globals().count()
    }

    pub fn imported_globals(&self) -> impl Iterator<Item = &GlobalType> {
        self.imports_of(|kind| match kind {
            ImportKind::Global(global_type) => Some(global_type),
            _ => None,
        })
    }

    pub fn has_imported_memory(&self) -> bool {
        self.imported_memory().is_some()
    }

    pub fn imported_memory(&self) -> Option<&Limits> {
        self.imports_of(|kind| match kind {
            ImportKind::Memory(limits) => Some(limits),
            _ => None,
        })
        .next()
    }

    pub fn imported_table(&self) -> Option<&TableType> {
        self.imports_of(|kind| match kind {
            ImportKind::Table(table_type) => Some(table_type),
            _ => None,
        })
        .next()
    }

    /// Total size of the function index space
    pub fn function_count(&self) -> usize {
        self.imported_function_count() + self.functions.len()
    }

    /// Total size of the global index space
    pub fn global_count(&self) -> usize {
        self.imported_global_count() + self.globals.len()
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len() + usize::from(self.has_imported_memory())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len() + usize::from(self.imported_table().is_some())
    }

    /// Type index of a function in the combined index space
    pub fn function_type_index(&self, func_idx: u32) -> Option<u32> {
        let func_idx = func_idx as usize;
        let imported = self.imported_function_count();
        if func_idx < imported {
            self.imports_of(|kind| match kind {
                ImportKind::Function(type_idx) => Some(*type_idx),
                _ => None,
            })
            .nth(func_idx)
        } else {
            self.functions.get(func_idx - imported).copied()
        }
    }

    /// Signature of a function in the combined index space
    pub fn function_type(&self, func_idx: u32) -> Option<&FunctionType> {
        self.function_type_index(func_idx)
            .and_then(|type_idx| self.types.get(type_idx as usize))
    }

    /// Type of a global in the combined index space
    pub fn global_type(&self, global_idx: u32) -> Option<&GlobalType> {
        let global_idx = global_idx as usize;
        let imported = self.imported_global_count();
        if global_idx < imported {
            self.imported_globals().nth(global_idx)
        } else {
            self.globals.get(global_idx - imported).map(|g| &g.global_type)
        }
    }

    /// Memory limits, whether declared locally or imported
    pub fn memory_limits(&self) -> Option<&Limits> {
        self.memories.first().or_else(|| self.imported_memory())
    }

    /// Table limits, whether declared locally or imported
    pub fn table_type(&self) -> Option<&TableType> {
        self.tables.first().or_else(|| self.imported_table())
    }

    /// Exported function index by name
    pub fn exported_function(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|export| export.kind == ExportKind::Function && export.name == name)
            .map(|export| export.index)
    }
}

/* TYPES **********************************************************/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn decode(byte: u8) -> Result<ValueType, ParseError> {
        match byte {
            0x7f => Ok(ValueType::I32),
            0x7e => Ok(ValueType::I64),
            0x7d => Ok(ValueType::F32),
            0x7c => Ok(ValueType::F64),
            _ => Err(ParseError::InvalidValueType(byte)),
        }
    }

    pub fn from_name(s: &str) -> Option<ValueType> {
        match s {
            "i32" => Some(ValueType::I32),
            "i64" => Some(ValueType::I64),
            "f32" => Some(ValueType::F32),
            "f64" => Some(ValueType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: Vec<ValueType>, return_types: Vec<ValueType>) -> FunctionType {
        FunctionType {
            parameters,
            return_types,
        }
    }
}

fn join(types: &[ValueType]) -> String {
    types.iter().map(ToString::to_string).collect::<Vec<String>>().join(", ")
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let results = match self.return_types.len() {
            0 => "nil".to_string(),
            1 => join(&self.return_types),
            _ => format!("({})", join(&self.return_types)),
        };
        write!(f, "({}) -> {}", join(&self.parameters), results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "min={} max={}", self.min, max),
            None => write!(f, "min={}", self.min),
        }
    }
}

/// Only `funcref` tables exist in this module format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    /// Type index
    Function(u32),
    Table(TableType),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match &self.kind {
            ImportKind::Function(type_idx) => format!("func sig={}", type_idx),
            ImportKind::Table(table) => format!("table {}", table.limits),
            ImportKind::Memory(limits) => format!("memory {}", limits),
            ImportKind::Global(global) => format!("global {}", global.value_type),
        };
        write!(f, "<{}.{}> {}", self.module, self.name, kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ExportKind::Function => "func",
            ExportKind::Table => "table",
            ExportKind::Memory => "memory",
            ExportKind::Global => "global",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// Active element segment targeting table 0
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub offset: ConstExpr,
    pub functions: Vec<u32>,
}

/// Active data segment
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub memory: u32,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locals {
    pub count: u32,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    pub locals: Vec<Locals>,
    pub instructions: Vec<Instruction>,
}

impl FunctionBody {
    /// Expanded local types, excluding parameters
    pub fn local_types(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.locals
            .iter()
            .flat_map(|locals| std::iter::repeat(locals.value_type).take(locals.count as usize))
    }

    pub fn local_count(&self) -> u64 {
        self.locals.iter().map(|locals| locals.count as u64).sum()
    }
}
