//! Module store
//!
//! Owns every loaded [`Module`] behind an opaque [`ModuleHandle`]. Loading
//! copies the caller's bytes into an allocator block, then parses and
//! validates them; the caller may free its buffer as soon as `load` returns.
//!
//! Slots are never reused, so a handle to an unloaded module keeps failing
//! with `UseAfterDestroy` instead of silently naming a newer module.

use super::allocator::{Allocator, Block};
use super::Error;
use crate::parser::{self, Module};
use log::debug;
use std::sync::Arc;

/// Module handle - index into the store's slot table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

#[derive(Debug)]
struct LoadedModule {
    module: Arc<Module>,
    /// Copy of the binary the module was decoded from
    image: Block,
    live_instances: usize,
}

#[derive(Debug)]
enum ModuleSlot {
    Loaded(LoadedModule),
    Unloaded,
}

#[derive(Debug)]
pub struct ModuleStore {
    allocator: Allocator,
    slots: Vec<ModuleSlot>,
}

impl ModuleStore {
    pub fn new(allocator: Allocator) -> ModuleStore {
        ModuleStore {
            allocator,
            slots: Vec::new(),
        }
    }

    /// Parse and validate `bytes`, returning a handle to the new module
    pub fn load(&mut self, bytes: &[u8]) -> Result<ModuleHandle, Error> {
        let mut image = self.allocator.allocate(bytes.len()).ok_or_else(|| {
            Error::ResourceExhausted(format!("allocator cannot hold a {} byte module image", bytes.len()))
        })?;
        image.copy_from_slice(bytes);

        let module = parser::parse(&image)?;
        parser::validate(&module)?;

        let handle = ModuleHandle(self.slots.len());
        debug!(
            "loaded module {:?}: {} bytes, {} functions, {} exports",
            handle,
            image.len(),
            module.function_count(),
            module.exports.len()
        );
        self.slots.push(ModuleSlot::Loaded(LoadedModule {
            module: Arc::new(module),
            image,
            live_instances: 0,
        }));
        Ok(handle)
    }

    /// Release a module; refused while instances still reference it
    pub fn unload(&mut self, handle: ModuleHandle) -> Result<(), Error> {
        let loaded = self.loaded(handle)?;
        if loaded.live_instances > 0 {
            return Err(Error::ModuleInUse {
                instances: loaded.live_instances,
            });
        }
        self.slots[handle.0] = ModuleSlot::Unloaded;
        debug!("unloaded module {:?}", handle);
        Ok(())
    }

    fn loaded(&self, handle: ModuleHandle) -> Result<&LoadedModule, Error> {
        match self.slots.get(handle.0) {
            Some(ModuleSlot::Loaded(loaded)) => Ok(loaded),
            Some(ModuleSlot::Unloaded) => Err(Error::UseAfterDestroy("module")),
            None => Err(Error::InvalidHandle("module")),
        }
    }

    fn loaded_mut(&mut self, handle: ModuleHandle) -> Result<&mut LoadedModule, Error> {
        match self.slots.get_mut(handle.0) {
            Some(ModuleSlot::Loaded(loaded)) => Ok(loaded),
            Some(ModuleSlot::Unloaded) => Err(Error::UseAfterDestroy("module")),
            None => Err(Error::InvalidHandle("module")),
        }
    }

    pub fn get(&self, handle: ModuleHandle) -> Result<&Arc<Module>, Error> {
        self.loaded(handle).map(|loaded| &loaded.module)
    }

    /// Size of the stored binary image
    pub fn image_len(&self, handle: ModuleHandle) -> Result<usize, Error> {
        self.loaded(handle).map(|loaded| loaded.image.len())
    }

    /// Record a new instance of `handle`
    pub fn retain(&mut self, handle: ModuleHandle) -> Result<(), Error> {
        self.loaded_mut(handle)?.live_instances += 1;
        Ok(())
    }

    /// Record that an instance of `handle` went away
    pub fn release(&mut self, handle: ModuleHandle) -> Result<(), Error> {
        let loaded = self.loaded_mut(handle)?;
        loaded.live_instances = loaded.live_instances.saturating_sub(1);
        Ok(())
    }

    pub fn live_instances(&self, handle: ModuleHandle) -> Result<usize, Error> {
        self.loaded(handle).map(|loaded| loaded.live_instances)
    }

    /// Number of modules currently loaded
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, ModuleSlot::Loaded(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
