//! WASI preview1 constants
//!
//! Only the error codes, file type and rights the standard streams need.
//!
//! See: <https://github.com/WebAssembly/WASI/blob/wasi-0.1/preview1/docs.md#errno>

use crate::runtime::Trap;

/// Error codes returned to the guest as the `errno` result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WasiErrno {
    Success = 0,
    /// Bad file descriptor
    BadF = 8,
    /// A pointer argument lies outside linear memory
    Fault = 21,
    Inval = 28,
    Io = 29,
    Overflow = 61,
    /// Invalid seek
    Spipe = 70,
}

impl WasiErrno {
    pub fn as_i32(self) -> i32 {
        self as u16 as i32
    }
}

/// Guest memory faults surface as `EFAULT` rather than a trap
impl From<Trap> for WasiErrno {
    fn from(_: Trap) -> Self {
        WasiErrno::Fault
    }
}

/// `filetype::character_device`, what a terminal or pipe reports as
pub const FILETYPE_CHARACTER_DEVICE: u8 = 2;

pub const RIGHT_FD_READ: u64 = 1 << 1;
pub const RIGHT_FD_WRITE: u64 = 1 << 6;

/// `fdstat` is a u8 filetype, u16 flags and two u64 rights sets, padded to 24 bytes
pub const FDSTAT_SIZE: usize = 24;

/// `ciovec` is a u32 pointer followed by a u32 length
pub const IOVEC_SIZE: u32 = 8;
