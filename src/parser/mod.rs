//! WebAssembly binary format decoder
//!
//! [`parse`] turns a `.wasm` byte buffer into a [`Module`]. Decoding is
//! strictly syntactic: it rejects malformed headers, truncated input,
//! out-of-order sections and unknown opcodes. Semantic checks (index
//! ranges, limits, export uniqueness) live in [`validate`].
//!
//! The input buffer is only borrowed; everything the runtime needs is
//! copied into the returned `Module`, so the caller may drop its bytes as
//! soon as `parse` returns.

pub mod instruction;
pub mod module;
pub mod reader;
pub mod validate;

pub use module::Module;
pub use validate::{validate, ValidationError};

use instruction::decode::{decode_const_expr, decode_function_body};
use module::{
    DataSegment, ElementSegment, Export, ExportKind, FunctionType, Global, GlobalType, Import, ImportKind, Limits,
    TableType, ValueType,
};
use reader::Reader;
use thiserror::Error;

/// `\0asm`
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// Binary format version understood by the decoder
pub const VERSION: u32 = 1;

/// Errors raised while decoding a binary module
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("bad magic number: {found}")]
    BadMagic { found: String },

    #[error("unsupported binary version {0}")]
    UnsupportedVersion(u32),

    #[error("integer too large at offset {offset}")]
    IntegerTooLarge { offset: usize },

    #[error("integer representation too long at offset {offset}")]
    IntegerRepresentationTooLong { offset: usize },

    #[error("malformed UTF-8 encoding at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },

    #[error("section {id} out of order")]
    SectionOutOfOrder { id: u8 },

    #[error("section {id} size mismatch: declared {declared} bytes, consumed {consumed}")]
    SectionSizeMismatch { id: u8, declared: u32, consumed: usize },

    #[error("invalid value type 0x{0:02x}")]
    InvalidValueType(u8),

    #[error("illegal opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("illegal opcode 0x{prefix:02x} {sub} at offset {offset}")]
    UnknownPrefixedOpcode { prefix: u8, sub: u32, offset: usize },

    #[error("malformed module at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },
}

/// Decode a binary module
///
/// The result has not been validated; call [`validate`] before handing it
/// to the runtime.
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)?;

    let mut module = Module::new();
    let mut last_rank = 0u8;

    while !reader.is_empty() {
        let section_offset = reader.pos();
        let id = reader.read_byte()?;
        let size = reader.read_vu32()?;
        let mut section = reader.sub_reader(size as usize)?;

        if id != 0 {
            let rank = section_rank(id).ok_or(ParseError::UnknownSection {
                id,
                offset: section_offset,
            })?;
            if rank <= last_rank {
                return Err(ParseError::SectionOutOfOrder { id });
            }
            last_rank = rank;
        }

        read_section(id, &mut section, &mut module)?;

        if !section.is_empty() {
            return Err(ParseError::SectionSizeMismatch {
                id,
                declared: size,
                consumed: section.pos(),
            });
        }
    }

    if module.functions.len() != module.code.len() {
        return Err(ParseError::Malformed {
            offset: reader.pos(),
            message: format!(
                "function and code section have inconsistent lengths ({} vs {})",
                module.functions.len(),
                module.code.len()
            ),
        });
    }

    Ok(module)
}

fn read_header(reader: &mut Reader) -> Result<(), ParseError> {
    let magic = reader.read_bytes(4)?;
    if magic != MAGIC {
        return Err(ParseError::BadMagic {
            found: hex::encode(magic),
        });
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Position of a section id in the mandated ordering. The data count
/// section (12) sits between element (9) and code (10).
fn section_rank(id: u8) -> Option<u8> {
    match id {
        1..=9 => Some(id),
        12 => Some(10),
        10 => Some(11),
        11 => Some(12),
        _ => None,
    }
}

fn read_section(id: u8, reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    match id {
        0 => {
            // custom section: name followed by opaque payload
            let name = reader.read_string()?;
            let payload = reader.read_bytes(reader.remaining())?;
            module.custom_sections.push((name, payload.len()));
            Ok(())
        }
        1 => read_section_type(reader, module),
        2 => read_section_import(reader, module),
        3 => read_section_function(reader, module),
        4 => read_section_table(reader, module),
        5 => read_section_memory(reader, module),
        6 => read_section_global(reader, module),
        7 => read_section_export(reader, module),
        8 => {
            module.start = Some(reader.read_vu32()?);
            Ok(())
        }
        9 => read_section_element(reader, module),
        10 => read_section_code(reader, module),
        11 => read_section_data(reader, module),
        12 => {
            module.data_count = Some(reader.read_vu32()?);
            Ok(())
        }
        _ => Err(ParseError::UnknownSection {
            id,
            offset: reader.pos(),
        }),
    }
}

/* SECTION READERS ************************************************/

fn read_result_types(reader: &mut Reader) -> Result<Vec<ValueType>, ParseError> {
    let count = reader.read_vu32()?;
    let mut types = Vec::new();
    for _ in 0..count {
        types.push(ValueType::decode(reader.read_byte()?)?);
    }
    Ok(types)
}

fn read_limits(reader: &mut Reader) -> Result<Limits, ParseError> {
    let offset = reader.pos();
    match reader.read_byte()? {
        0x00 => Ok(Limits {
            min: reader.read_vu32()?,
            max: None,
        }),
        0x01 => {
            let min = reader.read_vu32()?;
            let max = reader.read_vu32()?;
            Ok(Limits { min, max: Some(max) })
        }
        flag => Err(ParseError::Malformed {
            offset,
            message: format!("invalid limits flag 0x{flag:02x}"),
        }),
    }
}

fn read_table_type(reader: &mut Reader) -> Result<TableType, ParseError> {
    let offset = reader.pos();
    let elem_type = reader.read_byte()?;
    if elem_type != 0x70 {
        return Err(ParseError::Malformed {
            offset,
            message: format!("unsupported table element type 0x{elem_type:02x}"),
        });
    }
    Ok(TableType {
        limits: read_limits(reader)?,
    })
}

fn read_global_type(reader: &mut Reader) -> Result<GlobalType, ParseError> {
    let value_type = ValueType::decode(reader.read_byte()?)?;
    let offset = reader.pos();
    let mutable = match reader.read_byte()? {
        0x00 => false,
        0x01 => true,
        flag => {
            return Err(ParseError::Malformed {
                offset,
                message: format!("invalid mutability flag 0x{flag:02x}"),
            })
        }
    };
    Ok(GlobalType { value_type, mutable })
}

fn read_section_type(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let offset = reader.pos();
        if reader.read_byte()? != 0x60 {
            return Err(ParseError::Malformed {
                offset,
                message: "expected 0x60 to lead function type".to_string(),
            });
        }
        let parameters = read_result_types(reader)?;
        let return_types = read_result_types(reader)?;
        module.types.push(FunctionType {
            parameters,
            return_types,
        });
    }
    Ok(())
}

fn read_section_import(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let module_name = reader.read_string()?;
        let name = reader.read_string()?;
        let offset = reader.pos();
        let kind = match reader.read_byte()? {
            0x00 => ImportKind::Function(reader.read_vu32()?),
            0x01 => ImportKind::Table(read_table_type(reader)?),
            0x02 => ImportKind::Memory(read_limits(reader)?),
            0x03 => ImportKind::Global(read_global_type(reader)?),
            kind => {
                return Err(ParseError::Malformed {
                    offset,
                    message: format!("invalid import kind 0x{kind:02x}"),
                })
            }
        };
        module.imports.push(Import {
            module: module_name,
            name,
            kind,
        });
    }
    Ok(())
}

fn read_section_function(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        module.functions.push(reader.read_vu32()?);
    }
    Ok(())
}

fn read_section_table(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        module.tables.push(read_table_type(reader)?);
    }
    Ok(())
}

fn read_section_memory(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        module.memories.push(read_limits(reader)?);
    }
    Ok(())
}

fn read_section_global(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let global_type = read_global_type(reader)?;
        let init = decode_const_expr(reader)?;
        module.globals.push(Global { global_type, init });
    }
    Ok(())
}

fn read_section_export(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let name = reader.read_string()?;
        let offset = reader.pos();
        let kind = match reader.read_byte()? {
            0x00 => ExportKind::Function,
            0x01 => ExportKind::Table,
            0x02 => ExportKind::Memory,
            0x03 => ExportKind::Global,
            kind => {
                return Err(ParseError::Malformed {
                    offset,
                    message: format!("invalid export kind 0x{kind:02x}"),
                })
            }
        };
        let index = reader.read_vu32()?;
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn read_section_element(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let offset = reader.pos();
        let flags = reader.read_vu32()?;
        // Only the active, table 0, function index form is supported
        if flags != 0 {
            return Err(ParseError::Malformed {
                offset,
                message: format!("unsupported element segment form {flags}"),
            });
        }
        let segment_offset = decode_const_expr(reader)?;
        let len = reader.read_vu32()?;
        let mut functions = Vec::new();
        for _ in 0..len {
            functions.push(reader.read_vu32()?);
        }
        module.elements.push(ElementSegment {
            offset: segment_offset,
            functions,
        });
    }
    Ok(())
}

fn read_section_code(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let size = reader.read_vu32()?;
        let mut body = reader.sub_reader(size as usize)?;
        module.code.push(decode_function_body(&mut body)?);
    }
    Ok(())
}

fn read_section_data(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    for _ in 0..count {
        let offset = reader.pos();
        let flags = reader.read_vu32()?;
        let memory = match flags {
            0 => 0,
            2 => reader.read_vu32()?,
            _ => {
                return Err(ParseError::Malformed {
                    offset,
                    message: format!("unsupported data segment form {flags}"),
                })
            }
        };
        let segment_offset = decode_const_expr(reader)?;
        let len = reader.read_vu32()?;
        let bytes = reader.read_bytes(len as usize)?.to_vec();
        module.data.push(DataSegment {
            memory,
            offset: segment_offset,
            bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    fn with_header(sections: &[u8]) -> Vec<u8> {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(sections);
        bytes
    }

    #[test]
    fn test_empty_module() {
        let module = parse(&HEADER).unwrap();
        assert!(module.types.is_empty());
        assert!(module.exports.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let err = parse(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            ParseError::BadMagic {
                found: "0061736e".to_string()
            }
        );
    }

    #[test]
    fn test_bad_version() {
        let err = parse(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, ParseError::UnsupportedVersion(2));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            parse(&[0x00, 0x61, 0x73]),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_type_section() {
        // (func (param i32 i64) (result f64))
        let bytes = with_header(&[0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7e, 0x01, 0x7c]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.types[0].parameters, vec![ValueType::I32, ValueType::I64]);
        assert_eq!(module.types[0].return_types, vec![ValueType::F64]);
    }

    #[test]
    fn test_section_out_of_order() {
        // function section (3) before type section (1)
        let bytes = with_header(&[0x03, 0x01, 0x00, 0x01, 0x01, 0x00]);
        assert_eq!(parse(&bytes).unwrap_err(), ParseError::SectionOutOfOrder { id: 1 });
    }

    #[test]
    fn test_duplicate_section() {
        let bytes = with_header(&[0x01, 0x01, 0x00, 0x01, 0x01, 0x00]);
        assert_eq!(parse(&bytes).unwrap_err(), ParseError::SectionOutOfOrder { id: 1 });
    }

    #[test]
    fn test_custom_section_anywhere() {
        let bytes = with_header(&[0x01, 0x01, 0x00, 0x00, 0x03, 0x01, b'x', 0xff, 0x03, 0x01, 0x00]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.custom_sections, vec![("x".to_string(), 1)]);
    }

    #[test]
    fn test_unknown_section() {
        let bytes = with_header(&[0x0d, 0x00]);
        assert!(matches!(
            parse(&bytes),
            Err(ParseError::UnknownSection { id: 0x0d, .. })
        ));
    }

    #[test]
    fn test_section_size_mismatch() {
        // type section claims 2 bytes but the vector only needs 1
        let bytes = with_header(&[0x01, 0x02, 0x00, 0x00]);
        assert!(matches!(
            parse(&bytes),
            Err(ParseError::SectionSizeMismatch { id: 1, .. })
        ));
    }

    #[test]
    fn test_function_code_mismatch() {
        let bytes = with_header(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00]);
        assert!(matches!(parse(&bytes), Err(ParseError::Malformed { .. })));
    }

    #[test]
    fn test_memory_and_export() {
        let bytes = with_header(&[
            0x05, 0x04, 0x01, 0x01, 0x01, 0x02, // memory min 1 max 2
            0x07, 0x07, 0x01, 0x03, b'm', b'e', b'm', 0x02, 0x00, // export "mem" memory 0
        ]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.memories, vec![Limits { min: 1, max: Some(2) }]);
        assert_eq!(module.exports[0].name, "mem");
        assert_eq!(module.exports[0].kind, ExportKind::Memory);
    }
}
