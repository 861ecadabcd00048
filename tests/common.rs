//! Common test utilities shared between integration tests

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use wasmhost::{InstanceHandle, ModuleHandle, Runtime, RuntimeConfig};

pub const STACK_SIZE: usize = 8 * 1024;
pub const HEAP_SIZE: usize = 64 * 1024;

pub const ADD_WAT: &str = r#"
(module
  (memory 1)
  (func (export "add") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    i32.add))
"#;

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assemble text format into a binary module
pub fn wasm(source: &str) -> Vec<u8> {
    wat::parse_str(source).unwrap_or_else(|err| panic!("invalid test module: {err}"))
}

pub fn runtime() -> Runtime {
    runtime_with(RuntimeConfig::new())
}

pub fn runtime_with(config: RuntimeConfig) -> Runtime {
    init_logging();
    Runtime::new(config).unwrap()
}

/// Load `source` and instantiate it with the default stack and heap
pub fn instantiate(runtime: &mut Runtime, source: &str) -> (ModuleHandle, InstanceHandle) {
    let module = runtime.load(&wasm(source)).unwrap();
    let instance = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();
    (module, instance)
}

/// `Write` sink whose bytes stay readable after it is handed to a guest
#[derive(Clone, Default)]
pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl CapturedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
