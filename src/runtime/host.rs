//! Runtime facade
//!
//! [`Runtime`] owns the allocator, the module store and the handle tables
//! for instances and execution contexts. Every public operation of the host
//! goes through it:
//!
//! ```text
//! bytes ──load──▶ ModuleHandle ──instantiate──▶ InstanceHandle ──create_context──▶ ContextHandle
//!                                                     │                                  │
//!                                                  lookup ──▶ ExportedFunction ──call────┘
//! ```
//!
//! Handles are plain indices into append-only tables, so a handle to
//! something that has been released keeps reporting `UseAfterDestroy`.
//! There is no global state; any number of runtimes can coexist.

use super::allocator::{Allocator, AllocatorConfig, MemoryUsage};
use super::config::RuntimeConfig;
use super::context::{ContextHandle, ContextState, ExecutionContext};
use super::imports::NativeImports;
use super::instance::{Instance, InstanceHandle, InstanceState};
use super::invoke::{self, ExportedFunction};
use super::memory::Memory;
use super::store::{ModuleHandle, ModuleStore};
use super::{Error, Value};
use crate::parser::module::ExportKind;
use crate::source::ModuleSource;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    allocator: Allocator,
    store: ModuleStore,
    instances: Vec<Instance>,
    contexts: Vec<ExecutionContext>,
}

impl Runtime {
    /// Initialise a runtime with its own allocator
    pub fn new(config: RuntimeConfig) -> Result<Runtime, Error> {
        let allocator = Allocator::new(config.allocator)?;
        Ok(Runtime::with_allocator(config, allocator))
    }

    /// Initialise a runtime whose pool allocator carves every module image,
    /// memory, table and stack from `buffer`
    ///
    /// The allocator named in `config` is replaced by the pool.
    pub fn with_buffer(config: RuntimeConfig, buffer: impl Into<Box<[u8]>>) -> Result<Runtime, Error> {
        let allocator = Allocator::with_buffer(buffer)?;
        Ok(Runtime::with_allocator(config, allocator))
    }

    fn with_allocator(mut config: RuntimeConfig, allocator: Allocator) -> Runtime {
        config.allocator = allocator.config();
        debug!("runtime initialised with {} allocator", config.allocator);
        Runtime {
            config,
            store: ModuleStore::new(allocator.clone()),
            allocator,
            instances: Vec::new(),
            contexts: Vec::new(),
        }
    }

    /// Configuration the runtime was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Tear down the runtime, releasing everything it still holds
    pub fn destroy(self) {
        let instances = self.live_instances();
        let contexts = self.live_contexts();
        if instances > 0 || contexts > 0 {
            warn!("runtime destroyed with {instances} live instance(s) and {contexts} live context(s)");
        }
        debug!("runtime destroyed, {} modules still loaded", self.store.len());
    }

    /* MODULES ***************************************************************/

    /// Parse and validate a module; `bytes` may be freed once this returns
    pub fn load(&mut self, bytes: &[u8]) -> Result<ModuleHandle, Error> {
        self.store.load(bytes)
    }

    /// Resolve `name` through `source`, then load the returned bytes
    pub fn load_named(&mut self, source: &dyn ModuleSource, name: &str) -> Result<ModuleHandle, Error> {
        let bytes = source.resolve(name)?;
        debug!("resolved module \"{name}\" ({} bytes)", bytes.len());
        self.load(&bytes)
    }

    /// Unload a module that no live instance references
    pub fn unload(&mut self, module: ModuleHandle) -> Result<(), Error> {
        self.store.unload(module)
    }

    /* INSTANCES *************************************************************/

    /// Instantiate a module that imports no functions
    pub fn instantiate(&mut self, module: ModuleHandle, stack_size: usize, heap_size: usize) -> Result<InstanceHandle, Error> {
        self.instantiate_with_imports(module, &NativeImports::new(), stack_size, heap_size)
    }

    /// Instantiate `module`, binding its function imports from `imports`
    ///
    /// Linear memory is sized from the module's initial declaration and
    /// must fit in `heap_size` bytes. The instance's default context gets a
    /// `stack_size` byte stack; the start function, if any, runs on it.
    /// Nothing is kept if any step fails.
    pub fn instantiate_with_imports(
        &mut self,
        module: ModuleHandle,
        imports: &NativeImports,
        stack_size: usize,
        heap_size: usize,
    ) -> Result<InstanceHandle, Error> {
        let handle = InstanceHandle(self.instances.len());
        let decoded = Arc::clone(self.store.get(module)?);

        let mut instance = Instance::new(decoded, module, &self.allocator, imports, heap_size)?;
        let mut context = ExecutionContext::new(&self.allocator, handle, stack_size)?;

        let stack = context.begin()?;
        let started = instance.run_start(stack, self.config.instruction_budget);
        context.finish();
        started?;

        self.store.retain(module)?;
        let context_handle = ContextHandle(self.contexts.len());
        self.contexts.push(context);
        instance.set_default_context(context_handle);
        self.instances.push(instance);

        debug!(
            "instantiated {:?} as {:?} (stack {} bytes, heap {} bytes)",
            module, handle, stack_size, heap_size
        );
        Ok(handle)
    }

    /// Release an instance's memory and every context bound to it
    pub fn deinstantiate(&mut self, instance: InstanceHandle) -> Result<(), Error> {
        let slot = self.live_instance(instance)?;
        if slot.state() == InstanceState::Running {
            return Err(Error::AlreadyRunning);
        }

        for context in self
            .contexts
            .iter_mut()
            .filter(|context| context.instance() == instance && context.is_live())
        {
            context.destroy()?;
        }

        let slot = self.live_instance_mut(instance)?;
        let module = slot.module_handle();
        slot.release();
        self.store.release(module)?;
        debug!("deinstantiated {:?}", instance);
        Ok(())
    }

    fn instance(&self, instance: InstanceHandle) -> Result<&Instance, Error> {
        self.instances.get(instance.0).ok_or(Error::InvalidHandle("instance"))
    }

    fn live_instance(&self, instance: InstanceHandle) -> Result<&Instance, Error> {
        let slot = self.instance(instance)?;
        slot.ensure_live()?;
        Ok(slot)
    }

    fn live_instance_mut(&mut self, instance: InstanceHandle) -> Result<&mut Instance, Error> {
        let slot = self.instances.get_mut(instance.0).ok_or(Error::InvalidHandle("instance"))?;
        slot.ensure_live()?;
        Ok(slot)
    }

    /// Current lifecycle state; also answers for deinstantiated instances
    pub fn instance_state(&self, instance: InstanceHandle) -> Result<InstanceState, Error> {
        self.instance(instance).map(Instance::state)
    }

    /// Export names with their kinds, in declaration order
    pub fn exports(&self, instance: InstanceHandle) -> Result<Vec<(&str, ExportKind)>, Error> {
        let slot = self.live_instance(instance)?;
        Ok(slot
            .exports()
            .iter()
            .map(|export| (export.name.as_str(), export.kind))
            .collect())
    }

    /// Grow linear memory by `delta_pages`, returning the previous size
    ///
    /// All or nothing: on failure size and contents are unchanged.
    pub fn grow_memory(&mut self, instance: InstanceHandle, delta_pages: u32) -> Result<u32, Error> {
        let previous = self.live_instance_mut(instance)?.grow_memory(delta_pages)?;
        debug!("{:?} memory grown from {} by {} pages", instance, previous, delta_pages);
        Ok(previous)
    }

    /// Linear memory of a live instance, `NotFound` if it declares none
    pub fn memory(&self, instance: InstanceHandle) -> Result<&Memory, Error> {
        self.live_instance(instance)?
            .memory()
            .ok_or_else(|| Error::NotFound("linear memory".to_string()))
    }

    /// Writable view of the same memory, for host-side setup
    pub fn memory_mut(&mut self, instance: InstanceHandle) -> Result<&mut Memory, Error> {
        self.live_instance_mut(instance)?
            .memory_mut()
            .ok_or_else(|| Error::NotFound("linear memory".to_string()))
    }

    /// Message left by the last trapped call, if it has not been cleared
    pub fn exception(&self, instance: InstanceHandle) -> Result<Option<&str>, Error> {
        Ok(self.live_instance(instance)?.exception())
    }

    /// Forget the message left by the last trapped call
    pub fn clear_exception(&mut self, instance: InstanceHandle) -> Result<(), Error> {
        self.live_instance_mut(instance)?.clear_exception();
        Ok(())
    }

    /* CONTEXTS **************************************************************/

    /// Create a context with its own `stack_size` byte stack
    pub fn create_context(&mut self, instance: InstanceHandle, stack_size: usize) -> Result<ContextHandle, Error> {
        self.live_instance(instance)?;
        let context = ExecutionContext::new(&self.allocator, instance, stack_size)?;
        let handle = ContextHandle(self.contexts.len());
        self.contexts.push(context);
        debug!("created {:?} for {:?} with {} byte stack", handle, instance, stack_size);
        Ok(handle)
    }

    /// Release a context's stack; refused while it is running
    pub fn destroy_context(&mut self, context: ContextHandle) -> Result<(), Error> {
        self.contexts
            .get_mut(context.0)
            .ok_or(Error::InvalidHandle("context"))?
            .destroy()?;
        debug!("destroyed {:?}", context);
        Ok(())
    }

    /// Current lifecycle state; also answers for destroyed contexts
    pub fn context_state(&self, context: ContextHandle) -> Result<ContextState, Error> {
        self.contexts
            .get(context.0)
            .map(ExecutionContext::state)
            .ok_or(Error::InvalidHandle("context"))
    }

    /* CALLS *****************************************************************/

    /// Resolve an exported function by exact name
    pub fn lookup(&self, instance: InstanceHandle, name: &str) -> Result<ExportedFunction, Error> {
        invoke::lookup(instance, self.instance(instance)?, name)
    }

    /// Call `function` on `context` with `args`
    pub fn call(&mut self, context: ContextHandle, function: &ExportedFunction, args: &[Value]) -> Result<Vec<Value>, Error> {
        let context = self.contexts.get_mut(context.0).ok_or(Error::InvalidHandle("context"))?;
        let instance = self
            .instances
            .get_mut(function.instance().0)
            .ok_or(Error::InvalidHandle("instance"))?;
        invoke::call(instance, context, function, args, self.config.instruction_budget)
    }

    /// Look up `name` and call it on the instance's default context
    pub fn call_export(&mut self, instance: InstanceHandle, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        let function = self.lookup(instance, name)?;
        let context = self
            .instance(instance)?
            .default_context()
            .ok_or(Error::UseAfterDestroy("context"))?;
        self.call(context, &function, args)
    }

    /* ACCOUNTING ************************************************************/

    fn live_instances(&self) -> usize {
        self.instances.iter().filter(|instance| instance.ensure_live().is_ok()).count()
    }

    fn live_contexts(&self) -> usize {
        self.contexts.iter().filter(|context| context.is_live()).count()
    }

    /// Allocator consumption plus live object counts
    pub fn memory_usage(&self) -> MemoryUsage {
        let strategy = match self.allocator.config() {
            AllocatorConfig::System => "system",
            AllocatorConfig::Pool { .. } => "pool",
        };
        MemoryUsage {
            strategy: strategy.to_string(),
            in_use: self.allocator.in_use(),
            peak: self.allocator.peak(),
            capacity: self.allocator.capacity(),
            blocks: self.allocator.blocks(),
            modules: self.store.len(),
            instances: self.live_instances(),
            contexts: self.live_contexts(),
        }
    }
}
