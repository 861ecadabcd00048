use byteorder::{ByteOrder, LittleEndian};

use super::ParseError;

/// Cursor over a borrowed byte buffer
///
/// Every read is bounds checked and reports the offset of the failure
/// relative to the start of the buffer the reader was created over.
/// Sub-readers created for sections keep their parent's base offset so
/// error positions always refer to the whole module.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0, base: 0 }
    }

    // Basic operations --------------------------------------------------------

    /// Absolute offset of the next byte
    pub fn pos(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eof(&self) -> ParseError {
        ParseError::UnexpectedEof { offset: self.pos() }
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_byte(&mut self) -> Result<u8, ParseError> {
        let byte = self.peek().ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if len > self.remaining() {
            return Err(ParseError::UnexpectedEof {
                offset: self.base + self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Split off the next `len` bytes as an independent reader
    pub fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, ParseError> {
        let base = self.pos();
        let bytes = self.read_bytes(len)?;
        Ok(Reader { bytes, pos: 0, base })
    }

    // Read and interpret types ------------------------------------------------

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ParseError> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ParseError> {
        Ok(LittleEndian::read_f64(self.read_bytes(8)?))
    }

    pub fn read_vu32(&mut self) -> Result<u32, ParseError> {
        Ok(self.read_vu(32)? as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, ParseError> {
        self.read_vu(64)
    }

    pub fn read_vs32(&mut self) -> Result<i32, ParseError> {
        Ok(self.read_vs(32)? as i32)
    }

    /// Signed 33 bit integer, used for block type indices
    pub fn read_vs33(&mut self) -> Result<i64, ParseError> {
        self.read_vs(33)
    }

    pub fn read_vs64(&mut self) -> Result<i64, ParseError> {
        self.read_vs(64)
    }

    pub fn read_string(&mut self) -> Result<String, ParseError> {
        let len = self.read_vu32()? as usize;
        let offset = self.pos();
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8 { offset })
    }

    // LEB128 ------------------------------------------------------------------

    fn read_vu(&mut self, bits: u32) -> Result<u64, ParseError> {
        let start = self.pos();
        let max_bytes = (bits + 6) / 7;
        let mut result: u64 = 0;
        let mut shift = 0u32;

        for i in 0..max_bytes {
            let b = self.read_byte()?;
            let last = i == max_bytes - 1;
            if last {
                if b & 0x80 != 0 {
                    return Err(ParseError::IntegerRepresentationTooLong { offset: start });
                }
                // bits beyond the target width must be zero
                let used = bits - shift;
                if used < 7 && (b & 0x7f) >> used != 0 {
                    return Err(ParseError::IntegerTooLarge { offset: start });
                }
            }
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(ParseError::IntegerRepresentationTooLong { offset: start })
    }

    fn read_vs(&mut self, bits: u32) -> Result<i64, ParseError> {
        let start = self.pos();
        let max_bytes = (bits + 6) / 7;
        let mut result: i64 = 0;
        let mut shift = 0u32;

        for i in 0..max_bytes {
            let b = self.read_byte()?;
            let last = i == max_bytes - 1;
            if last {
                if b & 0x80 != 0 {
                    return Err(ParseError::IntegerRepresentationTooLong { offset: start });
                }
                // unused high bits must all match the sign bit
                let used = bits - shift;
                if used < 7 {
                    let mask = 0x7f >> (used - 1);
                    let high = (b & 0x7f) >> (used - 1);
                    if high != 0 && high != mask {
                        return Err(ParseError::IntegerTooLarge { offset: start });
                    }
                }
            }
            result |= ((b & 0x7f) as i64) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 64 && b & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }

        Err(ParseError::IntegerRepresentationTooLong { offset: start })
    }
}
