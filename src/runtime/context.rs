//! Execution contexts
//!
//! A context is bound to one instance for its whole life and owns the fixed
//! size [`Stack`] its calls run on. Only one call may be in flight per
//! context.

use super::allocator::Allocator;
use super::instance::InstanceHandle;
use super::stack::Stack;
use super::Error;

/// Context handle - index into the runtime's context table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Ready,
    Running,
    Destroyed,
}

#[derive(Debug)]
pub struct ExecutionContext {
    instance: InstanceHandle,
    stack: Option<Stack>,
    state: ContextState,
}

impl ExecutionContext {
    pub fn new(allocator: &Allocator, instance: InstanceHandle, stack_size: usize) -> Result<ExecutionContext, Error> {
        Ok(ExecutionContext {
            instance,
            stack: Some(Stack::new(allocator, stack_size)?),
            state: ContextState::Ready,
        })
    }

    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn stack_size(&self) -> usize {
        self.stack.as_ref().map_or(0, Stack::capacity)
    }

    /// Fails unless the context can start a call
    pub fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            ContextState::Ready => Ok(()),
            ContextState::Running => Err(Error::AlreadyRunning),
            ContextState::Destroyed => Err(Error::UseAfterDestroy("context")),
        }
    }

    /// Mark the context running and hand out its stack for the call
    pub fn begin(&mut self) -> Result<&mut Stack, Error> {
        self.ensure_ready()?;
        let stack = self.stack.as_mut().ok_or(Error::UseAfterDestroy("context"))?;
        self.state = ContextState::Running;
        Ok(stack)
    }

    pub fn finish(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Ready;
        }
    }

    /// Release the stack; valid only between calls
    pub fn destroy(&mut self) -> Result<(), Error> {
        self.ensure_ready()?;
        self.stack = None;
        self.state = ContextState::Destroyed;
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.state != ContextState::Destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::allocator::AllocatorConfig;

    #[test]
    fn test_lifecycle() {
        let allocator = Allocator::new(AllocatorConfig::Pool { capacity: 8192 }).unwrap();
        let mut context = ExecutionContext::new(&allocator, InstanceHandle(0), 8192).unwrap();
        assert_eq!(context.state(), ContextState::Ready);
        assert_eq!(context.stack_size(), 8192);
        assert_eq!(allocator.in_use(), 8192);

        context.begin().unwrap();
        assert_eq!(context.state(), ContextState::Running);
        assert!(matches!(context.begin(), Err(Error::AlreadyRunning)));
        assert_eq!(context.destroy(), Err(Error::AlreadyRunning));
        context.finish();

        context.destroy().unwrap();
        assert!(!context.is_live());
        assert_eq!(allocator.in_use(), 0);
        assert!(matches!(context.begin(), Err(Error::UseAfterDestroy("context"))));
        assert_eq!(context.destroy(), Err(Error::UseAfterDestroy("context")));
    }

    #[test]
    fn test_stack_budget_exhausted() {
        let allocator = Allocator::new(AllocatorConfig::Pool { capacity: 1024 }).unwrap();
        assert!(matches!(
            ExecutionContext::new(&allocator, InstanceHandle(0), 2048),
            Err(Error::ResourceExhausted(_))
        ));
    }
}
