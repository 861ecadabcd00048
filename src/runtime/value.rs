//! Typed values crossing the host/guest boundary

use crate::parser::module::ValueType;
use fhex::ToHex;
use std::fmt;
use std::str::FromStr;

/// One of the four primitive kinds a guest function can accept or return
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// Zero value for a type, used to initialise locals
    pub fn default_for(typ: ValueType) -> Value {
        match typ {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse a value of a known type from text
    ///
    /// Integers accept signed or unsigned decimal and `0x` hex. Floats accept
    /// decimal notation, or `0x` followed by the raw IEEE 754 bits.
    pub fn parse_typed(typ: ValueType, text: &str) -> Result<Value, String> {
        let hex = text.strip_prefix("0x");
        match typ {
            ValueType::I32 => match hex {
                Some(hex) => u32::from_str_radix(hex, 16).map(|v| Value::I32(v as i32)),
                None => text
                    .parse::<i32>()
                    .or_else(|_| text.parse::<u32>().map(|v| v as i32))
                    .map(Value::I32),
            }
            .map_err(|e| format!("invalid i32 {text:?}: {e}")),
            ValueType::I64 => match hex {
                Some(hex) => u64::from_str_radix(hex, 16).map(|v| Value::I64(v as i64)),
                None => text
                    .parse::<i64>()
                    .or_else(|_| text.parse::<u64>().map(|v| v as i64))
                    .map(Value::I64),
            }
            .map_err(|e| format!("invalid i64 {text:?}: {e}")),
            ValueType::F32 => match hex {
                Some(hex) => u32::from_str_radix(hex, 16)
                    .map(|bits| Value::F32(f32::from_bits(bits)))
                    .map_err(|e| e.to_string()),
                None => text.parse::<f32>().map(Value::F32).map_err(|e| e.to_string()),
            }
            .map_err(|e| format!("invalid f32 {text:?}: {e}")),
            ValueType::F64 => match hex {
                Some(hex) => u64::from_str_radix(hex, 16)
                    .map(|bits| Value::F64(f64::from_bits(bits)))
                    .map_err(|e| e.to_string()),
                None => text.parse::<f64>().map(Value::F64).map_err(|e| e.to_string()),
            }
            .map_err(|e| format!("invalid f64 {text:?}: {e}")),
        }
    }
}

/// `type:value`, the same shape `Display` produces for integers
impl FromStr for Value {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (typ, text) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <type>:<value>, got {s:?}"))?;
        let typ = ValueType::from_name(typ).ok_or_else(|| format!("unknown value type {typ:?}"))?;
        Value::parse_typed(typ, text)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
        }
    }
}

/// Render a value list as `(i32, f64)` for signature error messages
pub fn kinds(values: &[Value]) -> String {
    let kinds: Vec<String> = values.iter().map(|v| v.typ().to_string()).collect();
    format!("({})", kinds.join(", "))
}
