//! Linear memory
//!
//! An instance's memory is a single [`Block`] drawn from the runtime's
//! allocator. Every access is bounds checked against the current size and
//! fails with [`Trap::OutOfBounds`] rather than touching anything outside
//! the block.
//!
//! The growth ceiling is the smaller of the module's declared maximum and
//! the heap budget the instance was created with. Growth is all or
//! nothing: a refused request leaves size and contents untouched.

use super::allocator::{Allocator, Block};
use super::{Error, Trap};
use crate::parser::module::Limits;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;

/// Page size in bytes (64KiB)
pub const PAGE_SIZE: usize = 65536;

/// Maximum number of pages addressable with 32 bit offsets
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug)]
pub struct Memory {
    data: Block,
    allocator: Allocator,
    current_pages: u32,
    /// Declared maximum clamped to the heap budget
    max_pages: u32,
    heap_size: usize,
}

impl Memory {
    /// Create a memory for the given limits within a heap budget in bytes
    pub fn new(allocator: &Allocator, limits: &Limits, heap_size: usize) -> Result<Memory, Error> {
        let required = limits.min as u64 * PAGE_SIZE as u64;
        if required > heap_size as u64 {
            return Err(Error::MemoryLimitExceeded {
                required,
                budget: heap_size as u64,
            });
        }

        let budget_pages = (heap_size / PAGE_SIZE).min(MAX_PAGES as usize) as u32;
        let max_pages = limits.max.unwrap_or(MAX_PAGES).min(budget_pages);

        let data = allocator.allocate(required as usize).ok_or_else(|| {
            Error::ResourceExhausted(format!("allocator cannot provide {required} bytes of linear memory"))
        })?;

        Ok(Memory {
            data,
            allocator: allocator.clone(),
            current_pages: limits.min,
            max_pages,
            heap_size,
        })
    }

    /// Current size in pages
    pub fn size(&self) -> u32 {
        self.current_pages
    }

    /// Current size in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Effective maximum in pages
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    /// Grow by `delta_pages`, returning the previous size in pages
    ///
    /// `None` if the result would pass the effective maximum or the
    /// allocator refuses; nothing changes in that case.
    pub fn grow(&mut self, delta_pages: u32) -> Option<u32> {
        let previous = self.current_pages;
        let new_pages = previous.checked_add(delta_pages)?;
        if new_pages > self.max_pages {
            return None;
        }
        if delta_pages == 0 {
            return Some(previous);
        }
        let new_bytes = new_pages as usize * PAGE_SIZE;
        if !self.allocator.reallocate(&mut self.data, new_bytes) {
            return None;
        }
        self.current_pages = new_pages;
        Some(previous)
    }

    #[inline]
    fn range(&self, addr: u64, len: usize) -> Result<Range<usize>, Trap> {
        let end = addr.checked_add(len as u64).ok_or(Trap::OutOfBounds)?;
        if end > self.data.len() as u64 {
            return Err(Trap::OutOfBounds);
        }
        Ok(addr as usize..end as usize)
    }

    /// Fixed-width read at an effective address
    #[inline]
    pub fn load<const N: usize>(&self, addr: u64) -> Result<[u8; N], Trap> {
        let range = self.range(addr, N)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[range]);
        Ok(bytes)
    }

    /// Write at an effective address
    #[inline]
    pub fn store(&mut self, addr: u64, bytes: &[u8]) -> Result<(), Trap> {
        let range = self.range(addr, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, addr: u32, len: usize) -> Result<&[u8], Trap> {
        let range = self.range(addr as u64, len)?;
        Ok(&self.data[range])
    }

    pub fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Trap> {
        self.store(addr as u64, bytes)
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, Trap> {
        Ok(self.load::<1>(addr as u64)?[0])
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, Trap> {
        Ok(LittleEndian::read_u16(&self.load::<2>(addr as u64)?))
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, Trap> {
        Ok(LittleEndian::read_u32(&self.load::<4>(addr as u64)?))
    }

    pub fn read_u64(&self, addr: u32) -> Result<u64, Trap> {
        Ok(LittleEndian::read_u64(&self.load::<8>(addr as u64)?))
    }

    pub fn read_i32(&self, addr: u32) -> Result<i32, Trap> {
        Ok(self.read_u32(addr)? as i32)
    }

    pub fn read_i64(&self, addr: u32) -> Result<i64, Trap> {
        Ok(self.read_u64(addr)? as i64)
    }

    pub fn read_f32(&self, addr: u32) -> Result<f32, Trap> {
        Ok(LittleEndian::read_f32(&self.load::<4>(addr as u64)?))
    }

    pub fn read_f64(&self, addr: u32) -> Result<f64, Trap> {
        Ok(LittleEndian::read_f64(&self.load::<8>(addr as u64)?))
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), Trap> {
        self.store(addr as u64, &[value])
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), Trap> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.store(addr as u64, &buf)
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), Trap> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.store(addr as u64, &buf)
    }

    pub fn write_u64(&mut self, addr: u32, value: u64) -> Result<(), Trap> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.store(addr as u64, &buf)
    }

    pub fn write_i32(&mut self, addr: u32, value: i32) -> Result<(), Trap> {
        self.write_u32(addr, value as u32)
    }

    pub fn write_i64(&mut self, addr: u32, value: i64) -> Result<(), Trap> {
        self.write_u64(addr, value as u64)
    }

    pub fn write_f32(&mut self, addr: u32, value: f32) -> Result<(), Trap> {
        self.write_u32(addr, value.to_bits())
    }

    pub fn write_f64(&mut self, addr: u32, value: f64) -> Result<(), Trap> {
        self.write_u64(addr, value.to_bits())
    }

    /// `memory.fill`
    pub fn fill(&mut self, dst: u32, value: u8, len: u32) -> Result<(), Trap> {
        let range = self.range(dst as u64, len as usize)?;
        self.data[range].fill(value);
        Ok(())
    }

    /// `memory.copy`; overlapping ranges behave like `memmove`
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Trap> {
        let src_range = self.range(src as u64, len as usize)?;
        self.range(dst as u64, len as usize)?;
        self.data.copy_within(src_range, dst as usize);
        Ok(())
    }

    /// Whole memory contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
