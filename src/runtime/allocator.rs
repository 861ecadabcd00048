//! Allocator adapter
//!
//! Every buffer the runtime owns on behalf of guests (module images, linear
//! memories, function tables, execution stacks) is drawn from an
//! [`Allocator`]. Two strategies exist:
//!
//! * `System` delegates to the global allocator with no upper bound.
//! * `Pool` carves blocks out of a single caller-supplied buffer. The
//!   buffer is managed as a first-fit free list of holes that are merged
//!   again when blocks are returned. `Pool { capacity }` is shorthand for
//!   a zeroed buffer of that size allocated up front.
//!
//! Allocation failure is reported as `None`/`false`, never as a panic;
//! callers turn it into `ResourceExhausted` or `MemoryLimitExceeded`.
//! Accounting is atomic so a runtime can be moved between threads.

use super::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Allocator strategy chosen when the runtime is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AllocatorConfig {
    #[default]
    System,
    Pool {
        capacity: usize,
    },
}

impl fmt::Display for AllocatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocatorConfig::System => write!(f, "system"),
            AllocatorConfig::Pool { capacity } => write!(f, "pool({capacity})"),
        }
    }
}

#[derive(Debug)]
struct Accounting {
    capacity: Option<usize>,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    blocks: AtomicUsize,
}

impl Accounting {
    fn new(capacity: Option<usize>) -> Arc<Accounting> {
        Arc::new(Accounting {
            capacity,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
        })
    }

    fn reserve(&self, size: usize) -> bool {
        let reserved = self.in_use.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            let next = current.checked_add(size)?;
            match self.capacity {
                Some(capacity) if next > capacity => None,
                _ => Some(next),
            }
        });
        match reserved {
            Ok(previous) => {
                self.peak.fetch_max(previous + size, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }

    fn release(&self, size: usize) {
        self.in_use.fetch_sub(size, Ordering::AcqRel);
    }
}

/* ARENA **********************************************************/

/// Caller-supplied buffer shared by every block of a pool
///
/// Free space is tracked as a list of holes sorted by offset. Adjacent
/// holes are always merged, so two holes never touch.
struct Arena {
    base: NonNull<u8>,
    len: usize,
    holes: Mutex<Vec<Range<usize>>>,
}

// SAFETY: the arena owns its buffer and hands out disjoint ranges of it;
// the hole list is the only shared state and sits behind a mutex.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    fn new(buffer: Box<[u8]>) -> Arena {
        let len = buffer.len();
        let base = NonNull::from(Box::leak(buffer)).cast::<u8>();
        Arena {
            base,
            len,
            holes: Mutex::new(vec![0..len]),
        }
    }

    fn holes(&self) -> MutexGuard<'_, Vec<Range<usize>>> {
        // hole edits never panic part way through
        self.holes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take `size` bytes from the first hole large enough, zero-filled
    fn carve(self: &Arc<Arena>, size: usize) -> Option<Carve> {
        if size == 0 {
            return Some(Carve {
                arena: Arc::clone(self),
                offset: 0,
                len: 0,
            });
        }
        let mut holes = self.holes();
        let idx = holes.iter().position(|hole| hole.len() >= size)?;
        let offset = holes[idx].start;
        holes[idx].start += size;
        if holes[idx].is_empty() {
            holes.remove(idx);
        }
        drop(holes);

        let mut carve = Carve {
            arena: Arc::clone(self),
            offset,
            len: size,
        };
        carve.bytes_mut().fill(0);
        Some(carve)
    }

    /// Extend the range ending at `end` by `extra` bytes if the hole
    /// directly after it is large enough
    fn extend(&self, end: usize, extra: usize) -> bool {
        let mut holes = self.holes();
        let Some(idx) = holes.iter().position(|hole| hole.start == end) else {
            return false;
        };
        if holes[idx].len() < extra {
            return false;
        }
        holes[idx].start += extra;
        if holes[idx].is_empty() {
            holes.remove(idx);
        }
        true
    }

    /// Return `range` to the hole list, merging with its neighbours
    fn free(&self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let mut holes = self.holes();
        let idx = holes.partition_point(|hole| hole.start < range.start);
        let merges_prev = idx > 0 && holes[idx - 1].end == range.start;
        let merges_next = idx < holes.len() && holes[idx].start == range.end;
        match (merges_prev, merges_next) {
            (true, true) => {
                holes[idx - 1].end = holes[idx].end;
                holes.remove(idx);
            }
            (true, false) => holes[idx - 1].end = range.end,
            (false, true) => holes[idx].start = range.start,
            (false, false) => holes.insert(idx, range),
        }
    }

    fn free_bytes(&self) -> usize {
        self.holes().iter().map(|hole| hole.len()).sum()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let buffer = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len);
        // SAFETY: `base` and `len` came from `Box::leak` in `Arena::new`
        // and every carve holds an `Arc` to the arena, so none is alive.
        drop(unsafe { Box::from_raw(buffer) });
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("holes", &self.holes().len())
            .finish()
    }
}

/// Range of an arena owned by one block or reservation
struct Carve {
    arena: Arc<Arena>,
    offset: usize,
    len: usize,
}

impl Carve {
    fn bytes(&self) -> &[u8] {
        // SAFETY: `offset..offset + len` lies inside the arena buffer and is
        // owned by this carve alone until it is freed on drop.
        unsafe { std::slice::from_raw_parts(self.arena.base.as_ptr().add(self.offset), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `bytes`; `&mut self` makes the access unique.
        unsafe { std::slice::from_raw_parts_mut(self.arena.base.as_ptr().add(self.offset), self.len) }
    }

    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Resize within the arena, moving the contents if the range cannot
    /// grow where it is. New bytes are zeroed.
    fn resize(&mut self, new_len: usize) -> bool {
        if new_len <= self.len {
            self.arena.free(self.offset + new_len..self.offset + self.len);
            self.len = new_len;
            return true;
        }
        let old_len = self.len;
        if self.len > 0 && self.arena.extend(self.offset + self.len, new_len - self.len) {
            self.len = new_len;
            self.bytes_mut()[old_len..].fill(0);
            return true;
        }
        let Some(mut moved) = self.arena.carve(new_len) else {
            return false;
        };
        moved.bytes_mut()[..old_len].copy_from_slice(self.bytes());
        *self = moved;
        true
    }
}

impl Drop for Carve {
    fn drop(&mut self) {
        self.arena.free(self.range());
    }
}

/* ALLOCATOR ******************************************************/

/// Handle to an allocation strategy; clones share the same accounting
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocatorConfig,
    accounting: Arc<Accounting>,
    arena: Option<Arc<Arena>>,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Result<Allocator, Error> {
        match config {
            AllocatorConfig::System => Ok(Allocator {
                config,
                accounting: Accounting::new(None),
                arena: None,
            }),
            AllocatorConfig::Pool { capacity } => {
                let mut buffer = Vec::new();
                buffer
                    .try_reserve_exact(capacity)
                    .map_err(|_| Error::ResourceExhausted(format!("cannot allocate a {capacity} byte pool")))?;
                buffer.resize(capacity, 0);
                Allocator::with_buffer(buffer)
            }
        }
    }

    /// Pool allocator that carves every block from `buffer`
    ///
    /// The buffer is owned by the allocator until the last clone of it and
    /// the last block drawn from it are dropped.
    pub fn with_buffer(buffer: impl Into<Box<[u8]>>) -> Result<Allocator, Error> {
        let buffer = buffer.into();
        if buffer.is_empty() {
            return Err(Error::ResourceExhausted("allocator pool has zero capacity".to_string()));
        }
        let capacity = buffer.len();
        Ok(Allocator {
            config: AllocatorConfig::Pool { capacity },
            accounting: Accounting::new(Some(capacity)),
            arena: Some(Arc::new(Arena::new(buffer))),
        })
    }

    /// Allocate a zero-filled block
    pub fn allocate(&self, size: usize) -> Option<Block> {
        if !self.accounting.reserve(size) {
            return None;
        }
        let storage = match &self.arena {
            Some(arena) => arena.carve(size).map(Storage::Arena),
            None => {
                let mut data = Vec::new();
                if data.try_reserve_exact(size).is_ok() {
                    data.resize(size, 0);
                    Some(Storage::Heap(data))
                } else {
                    None
                }
            }
        };
        let Some(storage) = storage else {
            self.accounting.release(size);
            return None;
        };
        self.accounting.blocks.fetch_add(1, Ordering::AcqRel);
        Some(Block {
            storage,
            accounting: Arc::clone(&self.accounting),
        })
    }

    /// Resize a block, zero-filling any new tail
    ///
    /// All or nothing: on failure the block keeps its size and contents.
    pub fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        let old_size = block.len();
        if new_size <= old_size {
            match &mut block.storage {
                Storage::Heap(data) => {
                    data.truncate(new_size);
                    data.shrink_to_fit();
                }
                Storage::Arena(carve) => {
                    carve.resize(new_size);
                }
            }
            self.accounting.release(old_size - new_size);
            return true;
        }
        let extra = new_size - old_size;
        if !self.accounting.reserve(extra) {
            return false;
        }
        let resized = match &mut block.storage {
            Storage::Heap(data) => {
                let reserved = data.try_reserve_exact(extra).is_ok();
                if reserved {
                    data.resize(new_size, 0);
                }
                reserved
            }
            Storage::Arena(carve) => carve.resize(new_size),
        };
        if !resized {
            self.accounting.release(extra);
        }
        resized
    }

    /// Charge `size` bytes against the allocator without handing out a
    /// buffer. Used for regions whose contents live in typed storage
    /// bounded by the reservation, such as execution stacks and tables.
    /// In a pool the bytes are set aside in the arena all the same.
    pub fn reserve(&self, size: usize) -> Option<Reservation> {
        if !self.accounting.reserve(size) {
            return None;
        }
        let region = match &self.arena {
            Some(arena) => match arena.carve(size) {
                Some(carve) => Some(carve),
                None => {
                    self.accounting.release(size);
                    return None;
                }
            },
            None => None,
        };
        self.accounting.blocks.fetch_add(1, Ordering::AcqRel);
        Some(Reservation {
            size,
            _region: region,
            accounting: Arc::clone(&self.accounting),
        })
    }

    /// Return a block to the allocator. Dropping the block is equivalent.
    pub fn free(&self, block: Block) {
        drop(block);
    }

    pub fn config(&self) -> AllocatorConfig {
        self.config
    }

    pub fn in_use(&self) -> usize {
        self.accounting.in_use.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.accounting.peak.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.accounting.capacity
    }

    /// Number of live blocks
    pub fn blocks(&self) -> usize {
        self.accounting.blocks.load(Ordering::Acquire)
    }

    /// Bytes left unclaimed in the pool's arena; `None` for `System`
    pub fn arena_free(&self) -> Option<usize> {
        self.arena.as_ref().map(|arena| arena.free_bytes())
    }
}

enum Storage {
    Heap(Vec<u8>),
    Arena(Carve),
}

/// Buffer drawn from an [`Allocator`]; released on drop
pub struct Block {
    storage: Storage,
    accounting: Arc<Accounting>,
}

impl Block {
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Heap(data) => data.len(),
            Storage::Arena(carve) => carve.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct("Block");
        s.field("len", &self.len());
        if let Storage::Arena(carve) = &self.storage {
            s.field("offset", &carve.offset);
        }
        s.finish()
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(data) => data,
            Storage::Arena(carve) => carve.bytes(),
        }
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Heap(data) => data,
            Storage::Arena(carve) => carve.bytes_mut(),
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.accounting.release(self.len());
        self.accounting.blocks.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accounting-only allocation; released on drop
pub struct Reservation {
    size: usize,
    _region: Option<Carve>,
    accounting: Arc<Accounting>,
}

impl Reservation {
    pub fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Reservation").field("size", &self.size).finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.accounting.release(self.size);
        self.accounting.blocks.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Snapshot of allocator consumption and live object counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub strategy: String,
    pub in_use: usize,
    pub peak: usize,
    pub capacity: Option<usize>,
    pub blocks: usize,
    pub modules: usize,
    pub instances: usize,
    pub contexts: usize,
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} allocator: {} bytes in use (peak {}) across {} blocks",
            self.strategy, self.in_use, self.peak, self.blocks
        )?;
        if let Some(capacity) = self.capacity {
            write!(f, ", capacity {capacity}")?;
        }
        write!(
            f,
            "; {} modules, {} instances, {} contexts",
            self.modules, self.instances, self.contexts
        )
    }
}
