//! A small WebAssembly module host written in Rust.
//!
//! wasmhost loads WebAssembly binaries, instantiates them with bounded
//! linear memory and call stacks, and invokes their exported functions
//! with typed arguments. It carries its own binary decoder, structural
//! validator and stack-machine interpreter so it stands alone.
//!
//! # Modules
//!
//! - [`parser`] -- Binary format decoder and validator. Reads `.wasm` bytes into a [`parser::Module`].
//! - [`runtime`] -- Allocator adapter, module store, instances, execution contexts and the interpreter.
//! - [`source`] -- Ways of turning a module name into bytes.
//!
//! # Example
//!
//! Load a module exporting `add`, instantiate it with a 64KiB heap and an
//! 8KiB stack, and call it:
//!
//! ```
//! use wasmhost::{Runtime, RuntimeConfig, Value};
//!
//! // (module (func (export "add") (param i32 i32) (result i32)
//! //   local.get 0 local.get 1 i32.add))
//! let bytes = [
//!     0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00,
//!     0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f,
//!     0x03, 0x02, 0x01, 0x00,
//!     0x07, 0x07, 0x01, 0x03, 0x61, 0x64, 0x64, 0x00, 0x00,
//!     0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b,
//! ];
//!
//! let mut runtime = Runtime::new(RuntimeConfig::new()).unwrap();
//! let module = runtime.load(&bytes).unwrap();
//! let instance = runtime.instantiate(module, 8 * 1024, 64 * 1024).unwrap();
//! let context = runtime.create_context(instance, 8 * 1024).unwrap();
//! let add = runtime.lookup(instance, "add").unwrap();
//! let results = runtime.call(context, &add, &[Value::I32(2), Value::I32(3)]).unwrap();
//! assert_eq!(results, vec![Value::I32(5)]);
//! runtime.destroy();
//! ```

pub mod parser;
pub mod runtime;
pub mod source;

pub use runtime::{
    AllocatorConfig, ContextHandle, Error, ExportedFunction, HostFunction, InstanceHandle, ModuleHandle, NativeImports,
    Runtime, RuntimeConfig, Trap, Value,
};
pub use source::{FsModuleSource, ModuleSource};
