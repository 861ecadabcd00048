//! WebAssembly host runtime
//!
//! This module ties the pieces of the host together: the allocator adapter
//! every runtime-owned buffer is drawn from, the module store, instance
//! lifecycle, execution contexts and the function invoker, plus the
//! interpreter that actually runs guest code. [`wasi`] supplies a minimal
//! preview1 import set for command-style guests.
//!
//! Most embedders only need [`Runtime`] and [`Value`].

pub mod allocator;
pub mod config;
pub mod context;
pub mod control;
pub mod executor;
pub mod frame;
pub mod host;
pub mod imports;
pub mod instance;
pub mod invoke;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod store;
pub mod trap;
pub mod value;
pub mod wasi;

pub use allocator::{AllocatorConfig, MemoryUsage};
pub use config::RuntimeConfig;
pub use context::{ContextHandle, ContextState};
pub use host::Runtime;
pub use imports::{HostContext, HostFunction, NativeImports};
pub use instance::{InstanceHandle, InstanceState};
pub use invoke::ExportedFunction;
pub use memory::{Memory, PAGE_SIZE};
pub use store::ModuleHandle;
pub use trap::Trap;
pub use value::Value;

use crate::parser::{ParseError, ValidationError};
use thiserror::Error;

/// Failure to bind a module to its environment during `instantiate`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("unknown import {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("incompatible import type for {module}.{name}: expected {expected}, got {actual}")]
    ImportSignatureMismatch {
        module: String,
        name: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported {kind} import {module}.{name}")]
    UnsupportedImport {
        module: String,
        name: String,
        kind: &'static str,
    },

    #[error("elements segment does not fit: offset {offset} + {len} exceeds table size {table_size}")]
    ElementOutOfBounds { offset: u64, len: usize, table_size: usize },

    #[error("data segment does not fit: offset {offset} + {len} exceeds memory size {memory_size}")]
    DataOutOfBounds { offset: u64, len: usize, memory_size: usize },

    #[error("start function trapped: {0}")]
    StartFunction(Trap),
}

/// Every error the host can report
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Link(#[from] LinkError),

    #[error("memory limit exceeded: {required} bytes required, budget is {budget} bytes")]
    MemoryLimitExceeded { required: u64, budget: u64 },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch { expected: String, actual: String },

    #[error("{0}")]
    Trap(#[from] Trap),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} used after it was destroyed")]
    UseAfterDestroy(&'static str),

    #[error("execution context is already running")]
    AlreadyRunning,

    #[error("module is still referenced by {instances} live instance(s)")]
    ModuleInUse { instances: usize },

    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    #[error("execution context is bound to a different instance")]
    ContextMismatch,

    #[error("module source: {0}")]
    ModuleSource(String),
}

impl Error {
    pub fn signature_mismatch(expected: impl ToString, actual: impl ToString) -> Error {
        Error::SignatureMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
