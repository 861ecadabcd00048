mod common;

#[cfg(test)]
mod tests {
    use crate::common::*;
    use wasmhost::parser::module::ExportKind;
    use wasmhost::runtime::{ContextState, InstanceState, LinkError};
    use wasmhost::source::StaticSource;
    use wasmhost::{Error, RuntimeConfig, Trap, Value};

    #[test]
    fn test_add() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(ADD_WAT)).unwrap();
        let instance = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let add = runtime.lookup(instance, "add").unwrap();

        assert_eq!(runtime.call(context, &add, &[Value::I32(2), Value::I32(3)]), Ok(vec![Value::I32(5)]));
        assert_eq!(runtime.exception(instance), Ok(None));

        runtime.destroy_context(context).unwrap();
        runtime.deinstantiate(instance).unwrap();
        runtime.unload(module).unwrap();
        assert_eq!(runtime.memory_usage().in_use, 0);
        runtime.destroy();
    }

    #[test]
    fn test_exports_follow_declarations() {
        let mut runtime = runtime();
        let (_, silent) = instantiate(&mut runtime, "(module (func (result i32) i32.const 1))");
        assert_eq!(runtime.exports(silent), Ok(vec![]));

        let (_, exporting) = instantiate(
            &mut runtime,
            r#"(module
                 (memory (export "mem") 1)
                 (global (export "g") i32 (i32.const 3))
                 (func (export "f")))"#,
        );
        assert_eq!(
            runtime.exports(exporting),
            Ok(vec![
                ("mem", ExportKind::Memory),
                ("g", ExportKind::Global),
                ("f", ExportKind::Function)
            ])
        );
        assert!(matches!(runtime.lookup(exporting, "mem"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, ADD_WAT);
        assert!(runtime.lookup(instance, "add").is_ok());
        for name in ["Add", "add ", "", "sub"] {
            assert!(matches!(runtime.lookup(instance, name), Err(Error::NotFound(_))), "{name:?}");
        }
    }

    #[test]
    fn test_heap_smaller_than_initial_memory() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm("(module (memory 2))")).unwrap();
        let before = runtime.memory_usage();

        assert_eq!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::MemoryLimitExceeded {
                required: 2 * 65536,
                budget: 65536
            })
        );

        let after = runtime.memory_usage();
        assert_eq!(after.in_use, before.in_use);
        assert_eq!((after.instances, after.contexts), (0, 0));

        // nothing half-built holds the module
        runtime.unload(module).unwrap();
    }

    #[test]
    fn test_unload_with_live_instance() {
        let mut runtime = runtime();
        let (module, first) = instantiate(&mut runtime, ADD_WAT);
        let second = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();

        assert_eq!(runtime.unload(module), Err(Error::ModuleInUse { instances: 2 }));
        runtime.deinstantiate(first).unwrap();
        assert_eq!(runtime.unload(module), Err(Error::ModuleInUse { instances: 1 }));

        // the survivor still works
        assert_eq!(runtime.call_export(second, "add", &[Value::I32(1), Value::I32(1)]), Ok(vec![Value::I32(2)]));

        runtime.deinstantiate(second).unwrap();
        runtime.unload(module).unwrap();
        assert_eq!(runtime.unload(module), Err(Error::UseAfterDestroy("module")));
        assert_eq!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::UseAfterDestroy("module"))
        );
    }

    #[test]
    fn test_use_after_deinstantiate() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, ADD_WAT);
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let add = runtime.lookup(instance, "add").unwrap();

        runtime.deinstantiate(instance).unwrap();

        let dead = Error::UseAfterDestroy("instance");
        assert_eq!(runtime.lookup(instance, "add").unwrap_err(), dead);
        assert_eq!(runtime.grow_memory(instance, 1).unwrap_err(), dead);
        assert_eq!(runtime.exports(instance).unwrap_err(), dead);
        assert_eq!(runtime.exception(instance).unwrap_err(), dead);
        assert_eq!(runtime.memory(instance).unwrap_err(), dead);
        assert_eq!(runtime.create_context(instance, STACK_SIZE).unwrap_err(), dead);
        assert_eq!(runtime.deinstantiate(instance).unwrap_err(), dead);
        assert_eq!(runtime.instance_state(instance), Ok(InstanceState::Deinstantiated));

        // contexts bound to the instance went with it
        assert_eq!(runtime.context_state(context), Ok(ContextState::Destroyed));
        assert_eq!(
            runtime.call(context, &add, &[Value::I32(1), Value::I32(2)]),
            Err(Error::UseAfterDestroy("context"))
        );
        assert_eq!(
            runtime.call_export(instance, "add", &[Value::I32(1), Value::I32(2)]),
            Err(Error::UseAfterDestroy("instance"))
        );
    }

    #[test]
    fn test_destroyed_context() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, ADD_WAT);
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let add = runtime.lookup(instance, "add").unwrap();

        runtime.destroy_context(context).unwrap();
        assert_eq!(runtime.destroy_context(context), Err(Error::UseAfterDestroy("context")));
        assert_eq!(
            runtime.call(context, &add, &[Value::I32(1), Value::I32(2)]),
            Err(Error::UseAfterDestroy("context"))
        );

        // the instance and its other contexts are unaffected
        let other = runtime.create_context(instance, STACK_SIZE).unwrap();
        assert_eq!(runtime.call(other, &add, &[Value::I32(1), Value::I32(2)]), Ok(vec![Value::I32(3)]));
        assert_eq!(runtime.instance_state(instance), Ok(InstanceState::Instantiated));
    }

    #[test]
    fn test_load_rejects_bad_bytes() {
        let mut runtime = runtime();
        assert!(matches!(runtime.load(b"not wasm at all"), Err(Error::Parse(_))));
        assert!(matches!(runtime.load(&[]), Err(Error::Parse(_))));

        // (module (func call 3)) with a patched function index
        let invalid = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x01, 0x04, 0x01, 0x60, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00,
            0x0a, 0x06, 0x01, 0x04, 0x00, 0x10, 0x03, 0x0b,
        ];
        assert!(matches!(runtime.load(&invalid), Err(Error::Validation(_))));
        assert_eq!(runtime.memory_usage().modules, 0);
    }

    #[test]
    fn test_load_named() {
        let mut runtime = runtime();
        let mut source = StaticSource::new();
        source.insert("add", wasm(ADD_WAT));

        let module = runtime.load_named(&source, "add").unwrap();
        let instance = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();
        assert_eq!(runtime.call_export(instance, "add", &[Value::I32(20), Value::I32(22)]), Ok(vec![Value::I32(42)]));

        assert!(matches!(runtime.load_named(&source, "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_start_function() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (global $g (mut i32) (i32.const 0))
                 (func $init i32.const 7 global.set $g)
                 (start $init)
                 (func (export "get") (result i32) global.get $g))"#,
        );
        assert_eq!(runtime.call_export(instance, "get", &[]), Ok(vec![Value::I32(7)]));
    }

    #[test]
    fn test_start_function_trap() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm("(module (func $s unreachable) (start $s))")).unwrap();
        assert_eq!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::StartFunction(Trap::Unreachable)))
        );
        let usage = runtime.memory_usage();
        assert_eq!((usage.instances, usage.contexts), (0, 0));
        runtime.unload(module).unwrap();
    }

    #[test]
    fn test_segments_initialise_instance() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (memory 1)
                 (data (i32.const 8) "hello")
                 (func (export "at") (param i32) (result i32)
                   local.get 0
                   i32.load8_u))"#,
        );
        assert_eq!(runtime.memory(instance).unwrap().read_bytes(8, 5), Ok(&b"hello"[..]));
        assert_eq!(runtime.call_export(instance, "at", &[Value::I32(9)]), Ok(vec![Value::I32(b'e' as i32)]));
    }

    #[test]
    fn test_data_segment_out_of_bounds() {
        let mut runtime = runtime();
        let module = runtime
            .load(&wasm(r#"(module (memory 1) (data (i32.const 65534) "abc"))"#))
            .unwrap();
        assert!(matches!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::DataOutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_independent_instances() {
        let mut runtime = runtime();
        let source = r#"(module
                 (global $count (mut i32) (i32.const 0))
                 (func (export "bump") (result i32)
                   global.get $count
                   i32.const 1
                   i32.add
                   global.set $count
                   global.get $count))"#;
        let (module, a) = instantiate(&mut runtime, source);
        let b = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();

        for _ in 0..3 {
            runtime.call_export(a, "bump", &[]).unwrap();
        }
        assert_eq!(runtime.call_export(a, "bump", &[]), Ok(vec![Value::I32(4)]));
        assert_eq!(runtime.call_export(b, "bump", &[]), Ok(vec![Value::I32(1)]));
    }

    #[test]
    fn test_runtimes_coexist() {
        let mut first = runtime();
        let mut second = runtime();
        let (_, a) = instantiate(&mut first, ADD_WAT);
        let (_, b) = instantiate(&mut second, ADD_WAT);

        first.deinstantiate(a).unwrap();
        assert_eq!(second.call_export(b, "add", &[Value::I32(1), Value::I32(2)]), Ok(vec![Value::I32(3)]));
        first.destroy();
        assert_eq!(second.memory_usage().instances, 1);
    }

    #[test]
    fn test_oversized_table_refused() {
        let mut runtime = runtime_with(RuntimeConfig::pool(1 << 20));
        let bytes = wasm(r#"(module (table 1000000000 funcref) (func (export "f")))"#);
        let module = runtime.load(&bytes).unwrap();

        assert!(matches!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::ResourceExhausted(_))
        ));
        let usage = runtime.memory_usage();
        assert_eq!(usage.instances, 0);
        assert_eq!(usage.in_use, bytes.len());

        // a table that fits is charged while the instance lives
        let small = runtime.load(&wasm(r#"(module (table 1024 funcref) (func (export "f")))"#)).unwrap();
        let before = runtime.memory_usage().in_use;
        let instance = runtime.instantiate(small, STACK_SIZE, HEAP_SIZE).unwrap();
        assert!(runtime.memory_usage().in_use >= before + 1024 * std::mem::size_of::<Option<u32>>() + STACK_SIZE);
        runtime.deinstantiate(instance).unwrap();
        assert_eq!(runtime.memory_usage().in_use, before);
    }
}
