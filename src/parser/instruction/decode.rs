//! Instruction decoding from binary format

use super::{BlockType, ConstExpr, Instruction, LoadOp, MemArg, NumericOp, StoreOp};
use crate::parser::module::{FunctionBody, Locals, ValueType};
use crate::parser::reader::Reader;
use crate::parser::ParseError;

/// Open structured instruction awaiting its `end`
enum OpenBlock {
    Block(usize),
    Loop,
    If { at: usize, else_at: Option<usize> },
}

impl MemArg {
    pub fn decode(reader: &mut Reader) -> Result<Self, ParseError> {
        let align = reader.read_vu32()?;
        let offset = reader.read_vu32()?;
        Ok(MemArg { align, offset })
    }
}

impl BlockType {
    pub fn decode(reader: &mut Reader) -> Result<Self, ParseError> {
        let offset = reader.pos();
        match reader.peek() {
            Some(0x40) => {
                reader.read_byte()?;
                Ok(BlockType::Empty)
            }
            Some(b @ 0x7c..=0x7f) => {
                reader.read_byte()?;
                Ok(BlockType::Value(ValueType::decode(b)?))
            }
            _ => {
                let type_idx = reader.read_vs33()?;
                if type_idx < 0 {
                    return Err(ParseError::Malformed {
                        offset,
                        message: format!("invalid block type {type_idx}"),
                    });
                }
                Ok(BlockType::FuncType(type_idx as u32))
            }
        }
    }
}

/// Memory index immediates must be a single zero byte in this format
fn read_zero_byte(reader: &mut Reader) -> Result<(), ParseError> {
    let offset = reader.pos();
    match reader.read_byte()? {
        0x00 => Ok(()),
        _ => Err(ParseError::Malformed {
            offset,
            message: "zero byte expected".to_string(),
        }),
    }
}

fn load(op: LoadOp, reader: &mut Reader) -> Result<Instruction, ParseError> {
    Ok(Instruction::Load {
        op,
        memarg: MemArg::decode(reader)?,
    })
}

fn store(op: StoreOp, reader: &mut Reader) -> Result<Instruction, ParseError> {
    Ok(Instruction::Store {
        op,
        memarg: MemArg::decode(reader)?,
    })
}

/// Decode one instruction. Control instructions are returned with
/// placeholder targets; [`decode_function_body`] fixes them up.
pub fn decode_instruction(reader: &mut Reader) -> Result<Instruction, ParseError> {
    let offset = reader.pos();
    let opcode = reader.read_byte()?;

    use Instruction::*;
    match opcode {
        0x00 => Ok(Unreachable),
        0x01 => Ok(Nop),
        0x02 => Ok(Block {
            block_type: BlockType::decode(reader)?,
            end: 0,
        }),
        0x03 => Ok(Loop {
            block_type: BlockType::decode(reader)?,
        }),
        0x04 => Ok(If {
            block_type: BlockType::decode(reader)?,
            else_at: None,
            end: 0,
        }),
        0x05 => Ok(Else { end: 0 }),
        0x0b => Ok(End),
        0x0c => Ok(Br(reader.read_vu32()?)),
        0x0d => Ok(BrIf(reader.read_vu32()?)),
        0x0e => {
            let count = reader.read_vu32()?;
            // each target needs at least one byte
            if count as usize > reader.remaining() {
                return Err(ParseError::UnexpectedEof {
                    offset: reader.pos() + reader.remaining(),
                });
            }
            let mut targets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                targets.push(reader.read_vu32()?);
            }
            let default = reader.read_vu32()?;
            Ok(BrTable {
                targets: targets.into_boxed_slice(),
                default,
            })
        }
        0x0f => Ok(Return),
        0x10 => Ok(Call(reader.read_vu32()?)),
        0x11 => {
            let type_idx = reader.read_vu32()?;
            let table_idx = reader.read_vu32()?;
            Ok(CallIndirect { type_idx, table_idx })
        }

        0x1a => Ok(Drop),
        0x1b => Ok(Select),

        0x20 => Ok(LocalGet(reader.read_vu32()?)),
        0x21 => Ok(LocalSet(reader.read_vu32()?)),
        0x22 => Ok(LocalTee(reader.read_vu32()?)),
        0x23 => Ok(GlobalGet(reader.read_vu32()?)),
        0x24 => Ok(GlobalSet(reader.read_vu32()?)),

        0x28 => load(LoadOp::I32Load, reader),
        0x29 => load(LoadOp::I64Load, reader),
        0x2a => load(LoadOp::F32Load, reader),
        0x2b => load(LoadOp::F64Load, reader),
        0x2c => load(LoadOp::I32Load8S, reader),
        0x2d => load(LoadOp::I32Load8U, reader),
        0x2e => load(LoadOp::I32Load16S, reader),
        0x2f => load(LoadOp::I32Load16U, reader),
        0x30 => load(LoadOp::I64Load8S, reader),
        0x31 => load(LoadOp::I64Load8U, reader),
        0x32 => load(LoadOp::I64Load16S, reader),
        0x33 => load(LoadOp::I64Load16U, reader),
        0x34 => load(LoadOp::I64Load32S, reader),
        0x35 => load(LoadOp::I64Load32U, reader),
        0x36 => store(StoreOp::I32Store, reader),
        0x37 => store(StoreOp::I64Store, reader),
        0x38 => store(StoreOp::F32Store, reader),
        0x39 => store(StoreOp::F64Store, reader),
        0x3a => store(StoreOp::I32Store8, reader),
        0x3b => store(StoreOp::I32Store16, reader),
        0x3c => store(StoreOp::I64Store8, reader),
        0x3d => store(StoreOp::I64Store16, reader),
        0x3e => store(StoreOp::I64Store32, reader),
        0x3f => {
            read_zero_byte(reader)?;
            Ok(MemorySize)
        }
        0x40 => {
            read_zero_byte(reader)?;
            Ok(MemoryGrow)
        }

        0x41 => Ok(I32Const(reader.read_vs32()?)),
        0x42 => Ok(I64Const(reader.read_vs64()?)),
        0x43 => Ok(F32Const(reader.read_f32()?)),
        0x44 => Ok(F64Const(reader.read_f64()?)),

        0xfc => decode_0xfc(reader, offset),

        _ => NumericOp::from_opcode(opcode)
            .map(Numeric)
            .ok_or(ParseError::UnknownOpcode { opcode, offset }),
    }
}

/// Decode 0xFC prefix instructions
fn decode_0xfc(reader: &mut Reader, offset: usize) -> Result<Instruction, ParseError> {
    let sub = reader.read_vu32()?;
    match sub {
        0..=7 => NumericOp::from_prefixed(sub)
            .map(Instruction::Numeric)
            .ok_or(ParseError::UnknownPrefixedOpcode { prefix: 0xfc, sub, offset }),
        10 => {
            read_zero_byte(reader)?;
            read_zero_byte(reader)?;
            Ok(Instruction::MemoryCopy)
        }
        11 => {
            read_zero_byte(reader)?;
            Ok(Instruction::MemoryFill)
        }
        _ => Err(ParseError::UnknownPrefixedOpcode { prefix: 0xfc, sub, offset }),
    }
}

/// Decode a function body: local declarations followed by an expression
///
/// Structured instructions are matched with their `else`/`end` here so
/// unbalanced bodies are rejected at decode time.
pub fn decode_function_body(reader: &mut Reader) -> Result<FunctionBody, ParseError> {
    let group_count = reader.read_vu32()?;
    let mut locals = Vec::new();
    for _ in 0..group_count {
        let count = reader.read_vu32()?;
        let value_type = ValueType::decode(reader.read_byte()?)?;
        locals.push(Locals { count, value_type });
    }

    let mut instructions: Vec<Instruction> = Vec::new();
    let mut open: Vec<OpenBlock> = Vec::new();

    loop {
        let offset = reader.pos();
        if reader.is_empty() {
            return Err(ParseError::Malformed {
                offset,
                message: "END opcode expected".to_string(),
            });
        }
        let instruction = decode_instruction(reader)?;
        let here = instructions.len();

        match &instruction {
            Instruction::Block { .. } => open.push(OpenBlock::Block(here)),
            Instruction::Loop { .. } => open.push(OpenBlock::Loop),
            Instruction::If { .. } => open.push(OpenBlock::If { at: here, else_at: None }),
            Instruction::Else { .. } => match open.last_mut() {
                Some(OpenBlock::If { else_at, .. }) if else_at.is_none() => *else_at = Some(here),
                _ => {
                    return Err(ParseError::Malformed {
                        offset,
                        message: "else without matching if".to_string(),
                    })
                }
            },
            Instruction::End => match open.pop() {
                Some(block) => close_block(&mut instructions, block, here),
                None => {
                    instructions.push(Instruction::End);
                    if !reader.is_empty() {
                        return Err(ParseError::Malformed {
                            offset: reader.pos(),
                            message: "operators remaining after end of function".to_string(),
                        });
                    }
                    return Ok(FunctionBody { locals, instructions });
                }
            },
            _ => {}
        }

        instructions.push(instruction);
    }
}

fn close_block(instructions: &mut [Instruction], block: OpenBlock, end_at: usize) {
    let end_at_u32 = end_at as u32;
    match block {
        OpenBlock::Loop => {}
        OpenBlock::Block(at) => {
            if let Instruction::Block { end, .. } = &mut instructions[at] {
                *end = end_at_u32;
            }
        }
        OpenBlock::If { at, else_at } => {
            if let Instruction::If { end, else_at: target, .. } = &mut instructions[at] {
                *end = end_at_u32;
                *target = else_at.map(|e| e as u32);
            }
            if let Some(e) = else_at {
                if let Instruction::Else { end } = &mut instructions[e] {
                    *end = end_at_u32;
                }
            }
        }
    }
}

/// Decode a constant expression: a single constant or `global.get`
/// followed by `end`
pub fn decode_const_expr(reader: &mut Reader) -> Result<ConstExpr, ParseError> {
    let offset = reader.pos();
    let expr = match reader.read_byte()? {
        0x41 => ConstExpr::I32(reader.read_vs32()?),
        0x42 => ConstExpr::I64(reader.read_vs64()?),
        0x43 => ConstExpr::F32(reader.read_f32()?),
        0x44 => ConstExpr::F64(reader.read_f64()?),
        0x23 => ConstExpr::GlobalGet(reader.read_vu32()?),
        opcode => {
            return Err(ParseError::Malformed {
                offset,
                message: format!("constant expression required, found opcode 0x{opcode:02x}"),
            })
        }
    };
    let end_offset = reader.pos();
    if reader.read_byte()? != 0x0b {
        return Err(ParseError::Malformed {
            offset: end_offset,
            message: "END opcode expected after constant expression".to_string(),
        });
    }
    Ok(expr)
}
