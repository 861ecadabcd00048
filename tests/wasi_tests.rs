mod common;

#[cfg(test)]
mod tests {
    use crate::common::*;
    use std::sync::Arc;
    use wasmhost::runtime::wasi::{self, WasiContext, WasiErrno};
    use wasmhost::runtime::LinkError;
    use wasmhost::{Error, InstanceHandle, NativeImports, Runtime, Trap, Value};

    const HELLO_WAT: &str = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 16) "hello, world\n")
      (func (export "_start")
        (i32.store (i32.const 0) (i32.const 16))
        (i32.store (i32.const 4) (i32.const 13))
        (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8))))
      (func (export "write_to") (param $fd i32) (result i32)
        (call $fd_write (local.get $fd) (i32.const 0) (i32.const 1) (i32.const 8))))
    "#;

    const ARGS_WAT: &str = r#"
    (module
      (import "wasi_snapshot_preview1" "args_sizes_get" (func $args_sizes_get (param i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "args_get" (func $args_get (param i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "environ_sizes_get" (func $environ_sizes_get (param i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "environ_get" (func $environ_get (param i32 i32) (result i32)))
      (memory 1)
      (func (export "argc") (result i32)
        (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
        (drop (call $args_get (i32.const 16) (i32.const 64)))
        (i32.load (i32.const 0)))
      (func (export "envc") (result i32)
        (drop (call $environ_sizes_get (i32.const 0) (i32.const 4)))
        (drop (call $environ_get (i32.const 16) (i32.const 128)))
        (i32.load (i32.const 0))))
    "#;

    const EXIT_WAT: &str = r#"
    (module
      (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
      (func (export "_start")
        (call $proc_exit (i32.const 3))
        unreachable))
    "#;

    fn instantiate_wasi(runtime: &mut Runtime, source: &str, ctx: &Arc<WasiContext>) -> InstanceHandle {
        let module = runtime.load(&wasm(source)).unwrap();
        runtime
            .instantiate_with_imports(module, &wasi::imports(Arc::clone(ctx)), STACK_SIZE, HEAP_SIZE)
            .unwrap()
    }

    #[test]
    fn test_hello_world() {
        let out = CapturedWriter::default();
        let err = CapturedWriter::default();
        let ctx = Arc::new(WasiContext::builder().stdout(out.clone()).stderr(err.clone()).build());
        let mut runtime = runtime();
        let instance = instantiate_wasi(&mut runtime, HELLO_WAT, &ctx);

        assert_eq!(runtime.call_export(instance, "_start", &[]), Ok(vec![]));
        assert_eq!(out.contents(), "hello, world\n");
        assert_eq!(err.contents(), "");
        assert_eq!(runtime.memory(instance).unwrap().read_u32(8), Ok(13));

        assert_eq!(
            runtime.call_export(instance, "write_to", &[Value::I32(2)]),
            Ok(vec![Value::I32(WasiErrno::Success.as_i32())])
        );
        assert_eq!(err.contents(), "hello, world\n");
    }

    #[test]
    fn test_bad_descriptor() {
        let out = CapturedWriter::default();
        let ctx = Arc::new(WasiContext::builder().stdout(out.clone()).build());
        let mut runtime = runtime();
        let instance = instantiate_wasi(&mut runtime, HELLO_WAT, &ctx);
        runtime.call_export(instance, "_start", &[]).unwrap();

        for fd in [0, 3, -1] {
            assert_eq!(
                runtime.call_export(instance, "write_to", &[Value::I32(fd)]),
                Ok(vec![Value::I32(WasiErrno::BadF.as_i32())]),
                "fd {fd}"
            );
        }
        assert_eq!(out.contents(), "hello, world\n");
    }

    #[test]
    fn test_args_and_environ() {
        let ctx = Arc::new(
            WasiContext::builder()
                .args(["guest.wasm", "--fast"])
                .env("LANG", "C")
                .build(),
        );
        let mut runtime = runtime();
        let instance = instantiate_wasi(&mut runtime, ARGS_WAT, &ctx);

        assert_eq!(runtime.call_export(instance, "argc", &[]), Ok(vec![Value::I32(2)]));
        let memory = runtime.memory(instance).unwrap();
        assert_eq!(memory.read_u32(4), Ok(18));
        assert_eq!(memory.read_u32(16), Ok(64));
        assert_eq!(memory.read_u32(20), Ok(75));
        assert_eq!(memory.read_bytes(64, 18), Ok(&b"guest.wasm\0--fast\0"[..]));

        assert_eq!(runtime.call_export(instance, "envc", &[]), Ok(vec![Value::I32(1)]));
        let memory = runtime.memory(instance).unwrap();
        assert_eq!(memory.read_u32(16), Ok(128));
        assert_eq!(memory.read_bytes(128, 7), Ok(&b"LANG=C\0"[..]));
    }

    #[test]
    fn test_proc_exit() {
        let ctx = Arc::new(WasiContext::builder().build());
        let mut runtime = runtime();
        let instance = instantiate_wasi(&mut runtime, EXIT_WAT, &ctx);

        assert_eq!(
            runtime.call_export(instance, "_start", &[]),
            Err(Error::Trap(Trap::Exit(3)))
        );
        assert_eq!(ctx.exit_code(), Some(3));
        assert_eq!(runtime.exception(instance), Ok(Some("process exited with code 3")));
    }

    #[test]
    fn test_unsupported_wasi_import() {
        let mut runtime = runtime();
        let module = runtime
            .load(&wasm(
                r#"(module (import "wasi_snapshot_preview1" "path_open"
                     (func (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32))))"#,
            ))
            .unwrap();

        let mut imports = NativeImports::new();
        wasi::add_to_imports(&mut imports, Arc::new(WasiContext::builder().build()));
        assert_eq!(
            runtime.instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::UnresolvedImport {
                module: wasi::MODULE.to_string(),
                name: "path_open".to_string()
            }))
        );
    }
}
