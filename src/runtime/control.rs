//! Labels for structured control flow
//!
//! Each `block`, `loop` and `if` pushes a [`Label`] recording where a
//! branch to it continues and how many values it carries. Branches to a
//! loop carry the loop's parameters back to its start; branches to any
//! other label carry its results past its `end`.

use crate::parser::instruction::BlockType;
use crate::parser::module::Module;
use super::Trap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Block,
    Loop,
    If,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub kind: LabelKind,
    /// Values carried by a branch to this label
    pub arity: usize,
    /// Instruction index a branch continues at
    pub continuation: usize,
    /// Operand stack height below the block's parameters
    pub stack_height: usize,
}

impl Label {
    pub fn is_loop(&self) -> bool {
        self.kind == LabelKind::Loop
    }
}

/// Parameter and result counts of a block type
pub fn block_arity(module: &Module, block_type: &BlockType) -> Result<(usize, usize), Trap> {
    match block_type {
        BlockType::Empty => Ok((0, 0)),
        BlockType::Value(_) => Ok((0, 1)),
        BlockType::FuncType(type_idx) => module
            .types
            .get(*type_idx as usize)
            .map(|ft| (ft.parameters.len(), ft.return_types.len()))
            .ok_or(Trap::UndefinedElement),
    }
}
