//! Instruction representation
//!
//! Function bodies are decoded into a flat `Vec<Instruction>`. Structured
//! control instructions carry the indices of their matching `else`/`end`
//! so the interpreter can branch without rescanning the body.

pub mod decode;

use super::module::ValueType;
use fhex::ToHex;
use std::fmt;

/// Memory argument for load and store instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// Alignment hint as a power of 2
    pub align: u32,
    pub offset: u32,
}

/// Block type for structured control instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
    /// Type index for multi-value blocks
    FuncType(u32),
}

/// Initializer for globals and segment offsets
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    GlobalGet(u32),
}

impl fmt::Display for ConstExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstExpr::I32(v) => write!(f, "i32.const {v}"),
            ConstExpr::I64(v) => write!(f, "i64.const {v}"),
            ConstExpr::F32(v) => write!(f, "f32.const {}", v.to_hex()),
            ConstExpr::F64(v) => write!(f, "f64.const {}", v.to_hex()),
            ConstExpr::GlobalGet(idx) => write!(f, "global.get {idx}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

impl LoadOp {
    /// Access width in bytes
    pub fn width(self) -> u32 {
        use LoadOp::*;
        match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U => 1,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U => 2,
            I32Load | F32Load | I64Load32S | I64Load32U => 4,
            I64Load | F64Load => 8,
        }
    }

    /// Type pushed by the load
    pub fn value_type(self) -> ValueType {
        use LoadOp::*;
        match self {
            I32Load | I32Load8S | I32Load8U | I32Load16S | I32Load16U => ValueType::I32,
            I64Load | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S | I64Load32U => ValueType::I64,
            F32Load => ValueType::F32,
            F64Load => ValueType::F64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

impl StoreOp {
    /// Access width in bytes
    pub fn width(self) -> u32 {
        use StoreOp::*;
        match self {
            I32Store8 | I64Store8 => 1,
            I32Store16 | I64Store16 => 2,
            I32Store | F32Store | I64Store32 => 4,
            I64Store | F64Store => 8,
        }
    }

    /// Type of the stored operand
    pub fn value_type(self) -> ValueType {
        use StoreOp::*;
        match self {
            I32Store | I32Store8 | I32Store16 => ValueType::I32,
            I64Store | I64Store8 | I64Store16 | I64Store32 => ValueType::I64,
            F32Store => ValueType::F32,
            F64Store => ValueType::F64,
        }
    }
}

macro_rules! numeric_ops {
    (
        plain { $($name:ident = $opcode:literal => $text:literal,)* }
        prefixed { $($pname:ident = $subop:literal => $ptext:literal,)* }
    ) => {
        /// Stack-only numeric, comparison and conversion instructions
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum NumericOp {
            $($name,)*
            $($pname,)*
        }

        impl NumericOp {
            /// Single byte opcode
            pub fn from_opcode(opcode: u8) -> Option<NumericOp> {
                match opcode {
                    $($opcode => Some(NumericOp::$name),)*
                    _ => None,
                }
            }

            /// 0xFC prefixed sub-opcode
            pub fn from_prefixed(subop: u32) -> Option<NumericOp> {
                match subop {
                    $($subop => Some(NumericOp::$pname),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(NumericOp::$name => $text,)*
                    $(NumericOp::$pname => $ptext,)*
                }
            }
        }
    };
}

numeric_ops! {
    plain {
        I32Eqz = 0x45 => "i32.eqz",
        I32Eq = 0x46 => "i32.eq",
        I32Ne = 0x47 => "i32.ne",
        I32LtS = 0x48 => "i32.lt_s",
        I32LtU = 0x49 => "i32.lt_u",
        I32GtS = 0x4a => "i32.gt_s",
        I32GtU = 0x4b => "i32.gt_u",
        I32LeS = 0x4c => "i32.le_s",
        I32LeU = 0x4d => "i32.le_u",
        I32GeS = 0x4e => "i32.ge_s",
        I32GeU = 0x4f => "i32.ge_u",
        I64Eqz = 0x50 => "i64.eqz",
        I64Eq = 0x51 => "i64.eq",
        I64Ne = 0x52 => "i64.ne",
        I64LtS = 0x53 => "i64.lt_s",
        I64LtU = 0x54 => "i64.lt_u",
        I64GtS = 0x55 => "i64.gt_s",
        I64GtU = 0x56 => "i64.gt_u",
        I64LeS = 0x57 => "i64.le_s",
        I64LeU = 0x58 => "i64.le_u",
        I64GeS = 0x59 => "i64.ge_s",
        I64GeU = 0x5a => "i64.ge_u",
        F32Eq = 0x5b => "f32.eq",
        F32Ne = 0x5c => "f32.ne",
        F32Lt = 0x5d => "f32.lt",
        F32Gt = 0x5e => "f32.gt",
        F32Le = 0x5f => "f32.le",
        F32Ge = 0x60 => "f32.ge",
        F64Eq = 0x61 => "f64.eq",
        F64Ne = 0x62 => "f64.ne",
        F64Lt = 0x63 => "f64.lt",
        F64Gt = 0x64 => "f64.gt",
        F64Le = 0x65 => "f64.le",
        F64Ge = 0x66 => "f64.ge",
        I32Clz = 0x67 => "i32.clz",
        I32Ctz = 0x68 => "i32.ctz",
        I32Popcnt = 0x69 => "i32.popcnt",
        I32Add = 0x6a => "i32.add",
        I32Sub = 0x6b => "i32.sub",
        I32Mul = 0x6c => "i32.mul",
        I32DivS = 0x6d => "i32.div_s",
        I32DivU = 0x6e => "i32.div_u",
        I32RemS = 0x6f => "i32.rem_s",
        I32RemU = 0x70 => "i32.rem_u",
        I32And = 0x71 => "i32.and",
        I32Or = 0x72 => "i32.or",
        I32Xor = 0x73 => "i32.xor",
        I32Shl = 0x74 => "i32.shl",
        I32ShrS = 0x75 => "i32.shr_s",
        I32ShrU = 0x76 => "i32.shr_u",
        I32Rotl = 0x77 => "i32.rotl",
        I32Rotr = 0x78 => "i32.rotr",
        I64Clz = 0x79 => "i64.clz",
        I64Ctz = 0x7a => "i64.ctz",
        I64Popcnt = 0x7b => "i64.popcnt",
        I64Add = 0x7c => "i64.add",
        I64Sub = 0x7d => "i64.sub",
        I64Mul = 0x7e => "i64.mul",
        I64DivS = 0x7f => "i64.div_s",
        I64DivU = 0x80 => "i64.div_u",
        I64RemS = 0x81 => "i64.rem_s",
        I64RemU = 0x82 => "i64.rem_u",
        I64And = 0x83 => "i64.and",
        I64Or = 0x84 => "i64.or",
        I64Xor = 0x85 => "i64.xor",
        I64Shl = 0x86 => "i64.shl",
        I64ShrS = 0x87 => "i64.shr_s",
        I64ShrU = 0x88 => "i64.shr_u",
        I64Rotl = 0x89 => "i64.rotl",
        I64Rotr = 0x8a => "i64.rotr",
        F32Abs = 0x8b => "f32.abs",
        F32Neg = 0x8c => "f32.neg",
        F32Ceil = 0x8d => "f32.ceil",
        F32Floor = 0x8e => "f32.floor",
        F32Trunc = 0x8f => "f32.trunc",
        F32Nearest = 0x90 => "f32.nearest",
        F32Sqrt = 0x91 => "f32.sqrt",
        F32Add = 0x92 => "f32.add",
        F32Sub = 0x93 => "f32.sub",
        F32Mul = 0x94 => "f32.mul",
        F32Div = 0x95 => "f32.div",
        F32Min = 0x96 => "f32.min",
        F32Max = 0x97 => "f32.max",
        F32Copysign = 0x98 => "f32.copysign",
        F64Abs = 0x99 => "f64.abs",
        F64Neg = 0x9a => "f64.neg",
        F64Ceil = 0x9b => "f64.ceil",
        F64Floor = 0x9c => "f64.floor",
        F64Trunc = 0x9d => "f64.trunc",
        F64Nearest = 0x9e => "f64.nearest",
        F64Sqrt = 0x9f => "f64.sqrt",
        F64Add = 0xa0 => "f64.add",
        F64Sub = 0xa1 => "f64.sub",
        F64Mul = 0xa2 => "f64.mul",
        F64Div = 0xa3 => "f64.div",
        F64Min = 0xa4 => "f64.min",
        F64Max = 0xa5 => "f64.max",
        F64Copysign = 0xa6 => "f64.copysign",
        I32WrapI64 = 0xa7 => "i32.wrap_i64",
        I32TruncF32S = 0xa8 => "i32.trunc_f32_s",
        I32TruncF32U = 0xa9 => "i32.trunc_f32_u",
        I32TruncF64S = 0xaa => "i32.trunc_f64_s",
        I32TruncF64U = 0xab => "i32.trunc_f64_u",
        I64ExtendI32S = 0xac => "i64.extend_i32_s",
        I64ExtendI32U = 0xad => "i64.extend_i32_u",
        I64TruncF32S = 0xae => "i64.trunc_f32_s",
        I64TruncF32U = 0xaf => "i64.trunc_f32_u",
        I64TruncF64S = 0xb0 => "i64.trunc_f64_s",
        I64TruncF64U = 0xb1 => "i64.trunc_f64_u",
        F32ConvertI32S = 0xb2 => "f32.convert_i32_s",
        F32ConvertI32U = 0xb3 => "f32.convert_i32_u",
        F32ConvertI64S = 0xb4 => "f32.convert_i64_s",
        F32ConvertI64U = 0xb5 => "f32.convert_i64_u",
        F32DemoteF64 = 0xb6 => "f32.demote_f64",
        F64ConvertI32S = 0xb7 => "f64.convert_i32_s",
        F64ConvertI32U = 0xb8 => "f64.convert_i32_u",
        F64ConvertI64S = 0xb9 => "f64.convert_i64_s",
        F64ConvertI64U = 0xba => "f64.convert_i64_u",
        F64PromoteF32 = 0xbb => "f64.promote_f32",
        I32ReinterpretF32 = 0xbc => "i32.reinterpret_f32",
        I64ReinterpretF64 = 0xbd => "i64.reinterpret_f64",
        F32ReinterpretI32 = 0xbe => "f32.reinterpret_i32",
        F64ReinterpretI64 = 0xbf => "f64.reinterpret_i64",
        I32Extend8S = 0xc0 => "i32.extend8_s",
        I32Extend16S = 0xc1 => "i32.extend16_s",
        I64Extend8S = 0xc2 => "i64.extend8_s",
        I64Extend16S = 0xc3 => "i64.extend16_s",
        I64Extend32S = 0xc4 => "i64.extend32_s",
    }
    prefixed {
        I32TruncSatF32S = 0 => "i32.trunc_sat_f32_s",
        I32TruncSatF32U = 1 => "i32.trunc_sat_f32_u",
        I32TruncSatF64S = 2 => "i32.trunc_sat_f64_s",
        I32TruncSatF64U = 3 => "i32.trunc_sat_f64_u",
        I64TruncSatF32S = 4 => "i64.trunc_sat_f32_s",
        I64TruncSatF32U = 5 => "i64.trunc_sat_f32_u",
        I64TruncSatF64S = 6 => "i64.trunc_sat_f64_s",
        I64TruncSatF64U = 7 => "i64.trunc_sat_f64_u",
    }
}

/* OPERAND TYPES **************************************************/

const I32: ValueType = ValueType::I32;
const I64: ValueType = ValueType::I64;
const F32: ValueType = ValueType::F32;
const F64: ValueType = ValueType::F64;

impl NumericOp {
    /// Operand types consumed and the result type produced
    pub fn signature(self) -> (&'static [ValueType], ValueType) {
        use NumericOp::*;
        match self {
            // itestop
            I32Eqz => (&[I32], I32),
            I64Eqz => (&[I64], I32),

            // irelop
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS | I32GeU => (&[I32, I32], I32),
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS | I64GeU => (&[I64, I64], I32),

            // frelop
            F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => (&[F32, F32], I32),
            F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => (&[F64, F64], I32),

            // iunop
            I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S => (&[I32], I32),
            I64Clz | I64Ctz | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S => (&[I64], I64),

            // ibinop
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or | I32Xor | I32Shl
            | I32ShrS | I32ShrU | I32Rotl | I32Rotr => (&[I32, I32], I32),
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or | I64Xor | I64Shl
            | I64ShrS | I64ShrU | I64Rotl | I64Rotr => (&[I64, I64], I64),

            // funop
            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => (&[F32], F32),
            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => (&[F64], F64),

            // fbinop
            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => (&[F32, F32], F32),
            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => (&[F64, F64], F64),

            // cvtop
            I32WrapI64 => (&[I64], I32),
            I32TruncF32S | I32TruncF32U | I32TruncSatF32S | I32TruncSatF32U | I32ReinterpretF32 => (&[F32], I32),
            I32TruncF64S | I32TruncF64U | I32TruncSatF64S | I32TruncSatF64U => (&[F64], I32),
            I64ExtendI32S | I64ExtendI32U => (&[I32], I64),
            I64TruncF32S | I64TruncF32U | I64TruncSatF32S | I64TruncSatF32U => (&[F32], I64),
            I64TruncF64S | I64TruncF64U | I64TruncSatF64S | I64TruncSatF64U | I64ReinterpretF64 => (&[F64], I64),
            F32ConvertI32S | F32ConvertI32U | F32ReinterpretI32 => (&[I32], F32),
            F32ConvertI64S | F32ConvertI64U => (&[I64], F32),
            F32DemoteF64 => (&[F64], F32),
            F64ConvertI32S | F64ConvertI32U => (&[I32], F64),
            F64ConvertI64S | F64ConvertI64U | F64ReinterpretI64 => (&[I64], F64),
            F64PromoteF32 => (&[F32], F64),
        }
    }
}

/// Decoded instruction
///
/// `end` and `else_at` fields are indices into the owning function's
/// instruction vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Control
    Unreachable,
    Nop,
    Block { block_type: BlockType, end: u32 },
    Loop { block_type: BlockType },
    If { block_type: BlockType, else_at: Option<u32>, end: u32 },
    Else { end: u32 },
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_idx: u32, table_idx: u32 },

    // Parametric
    Drop,
    Select,

    // Variable
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Memory
    Load { op: LoadOp, memarg: MemArg },
    Store { op: StoreOp, memarg: MemArg },
    MemorySize,
    MemoryGrow,
    MemoryCopy,
    MemoryFill,

    // Constants
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    Numeric(NumericOp),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Unreachable => write!(f, "unreachable"),
            Nop => write!(f, "nop"),
            Block { .. } => write!(f, "block"),
            Loop { .. } => write!(f, "loop"),
            If { .. } => write!(f, "if"),
            Else { .. } => write!(f, "else"),
            End => write!(f, "end"),
            Br(depth) => write!(f, "br {depth}"),
            BrIf(depth) => write!(f, "br_if {depth}"),
            BrTable { targets, default } => {
                write!(f, "br_table")?;
                for target in targets.iter() {
                    write!(f, " {target}")?;
                }
                write!(f, " {default}")
            }
            Return => write!(f, "return"),
            Call(idx) => write!(f, "call {idx}"),
            CallIndirect { type_idx, .. } => write!(f, "call_indirect (type {type_idx})"),
            Drop => write!(f, "drop"),
            Select => write!(f, "select"),
            LocalGet(idx) => write!(f, "local.get {idx}"),
            LocalSet(idx) => write!(f, "local.set {idx}"),
            LocalTee(idx) => write!(f, "local.tee {idx}"),
            GlobalGet(idx) => write!(f, "global.get {idx}"),
            GlobalSet(idx) => write!(f, "global.set {idx}"),
            Load { op, memarg } => write!(f, "{op:?} offset={}", memarg.offset),
            Store { op, memarg } => write!(f, "{op:?} offset={}", memarg.offset),
            MemorySize => write!(f, "memory.size"),
            MemoryGrow => write!(f, "memory.grow"),
            MemoryCopy => write!(f, "memory.copy"),
            MemoryFill => write!(f, "memory.fill"),
            I32Const(v) => write!(f, "i32.const {v}"),
            I64Const(v) => write!(f, "i64.const {v}"),
            F32Const(v) => write!(f, "f32.const {}", v.to_hex()),
            F64Const(v) => write!(f, "f64.const {}", v.to_hex()),
            Numeric(op) => write!(f, "{}", op.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_opcode_table() {
        assert_eq!(NumericOp::from_opcode(0x6a), Some(NumericOp::I32Add));
        assert_eq!(NumericOp::from_opcode(0xc4), Some(NumericOp::I64Extend32S));
        assert_eq!(NumericOp::from_opcode(0xc5), None);
        assert_eq!(NumericOp::from_opcode(0x44), None);
        assert_eq!(NumericOp::from_prefixed(7), Some(NumericOp::I64TruncSatF64U));
        assert_eq!(NumericOp::from_prefixed(8), None);
        assert_eq!(NumericOp::I32TruncF64U.name(), "i32.trunc_f64_u");
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Numeric(NumericOp::F64Sqrt).to_string(), "f64.sqrt");
        assert_eq!(Instruction::LocalGet(3).to_string(), "local.get 3");
        assert_eq!(
            Instruction::BrTable {
                targets: vec![0, 1].into_boxed_slice(),
                default: 2
            }
            .to_string(),
            "br_table 0 1 2"
        );
    }

    #[test]
    fn test_access_widths() {
        assert_eq!(LoadOp::I64Load32U.width(), 4);
        assert_eq!(LoadOp::F64Load.width(), 8);
        assert_eq!(StoreOp::I32Store8.width(), 1);
        assert_eq!(StoreOp::I64Store16.width(), 2);
    }

    #[test]
    fn test_operand_types() {
        assert_eq!(NumericOp::I64LtU.signature(), (&[ValueType::I64, ValueType::I64][..], ValueType::I32));
        assert_eq!(NumericOp::F64PromoteF32.signature(), (&[ValueType::F32][..], ValueType::F64));
        assert_eq!(NumericOp::I32TruncSatF64U.signature(), (&[ValueType::F64][..], ValueType::I32));
        assert_eq!(LoadOp::I64Load8S.value_type(), ValueType::I64);
        assert_eq!(StoreOp::F32Store.value_type(), ValueType::F32);
    }
}
