mod common;

#[cfg(test)]
mod tests {
    use crate::common::{wasm, ADD_WAT};
    use assert_cmd::Command;
    use predicates::str::contains;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    const HELLO_EXIT_WAT: &str = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
      (memory (export "memory") 1)
      (data (i32.const 16) "hello, world\n")
      (func (export "_start")
        (i32.store (i32.const 0) (i32.const 16))
        (i32.store (i32.const 4) (i32.const 13))
        (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
        (call $proc_exit (i32.const 7))))
    "#;

    fn wasmhost() -> Command {
        Command::cargo_bin("wasmhost").unwrap()
    }

    fn write_module(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, wasm(source)).unwrap();
        path
    }

    #[test]
    fn test_missing_export_reports_cause() {
        let dir = tempdir().unwrap();
        let module = write_module(&dir, "add.wasm", ADD_WAT);
        wasmhost()
            .arg(&module)
            .args(["--invoke", "missing"])
            .assert()
            .code(1)
            .stdout(contains(
                "The missing wasm function is not found. error: not found: exported function \"missing\"",
            ));
    }

    #[test]
    fn test_wasi_start_and_exit_code() {
        let dir = tempdir().unwrap();
        let module = write_module(&dir, "hello.wasm", HELLO_EXIT_WAT);
        wasmhost()
            .arg(&module)
            .arg("--wasi")
            .assert()
            .code(7)
            .stdout(contains("hello, world\n"));
    }

    #[test]
    fn test_wasi_imports_need_flag() {
        let dir = tempdir().unwrap();
        let module = write_module(&dir, "hello.wasm", HELLO_EXIT_WAT);
        wasmhost()
            .arg(&module)
            .args(["--invoke", "_start"])
            .assert()
            .code(1)
            .stdout(contains("unknown import wasi_snapshot_preview1.fd_write"));
    }
}
