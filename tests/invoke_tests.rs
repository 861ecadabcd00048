mod common;

#[cfg(test)]
mod tests {
    use crate::common::*;
    use rstest::rstest;
    use wasmhost::parser::module::{FunctionType, ValueType};
    use wasmhost::runtime::{ContextState, LinkError};
    use wasmhost::{Error, HostFunction, NativeImports, RuntimeConfig, Trap, Value};

    const RECORD_WAT: &str = r#"
    (module
      (memory 1)
      (func (export "record") (param i32 i32) (result i32)
        i32.const 0
        i32.const 1
        i32.store
        local.get 0
        local.get 1
        i32.add))
    "#;

    const DIV_WAT: &str = r#"
    (module
      (func (export "div") (param i32 i32) (result i32)
        local.get 0
        local.get 1
        i32.div_s))
    "#;

    const RECURSE_WAT: &str = r#"
    (module
      (func $recurse (export "recurse") (param i32) (result i32)
        local.get 0
        i32.eqz
        if (result i32)
          i32.const 0
        else
          local.get 0
          i32.const 1
          i32.sub
          call $recurse
          i32.const 1
          i32.add
        end))
    "#;

    const DOUBLE_WAT: &str = r#"
    (module
      (import "env" "double" (func $double (param i32) (result i32)))
      (func (export "quad") (param i32) (result i32)
        local.get 0
        call $double
        call $double))
    "#;

    fn i32_to_i32() -> FunctionType {
        FunctionType::new(vec![ValueType::I32], vec![ValueType::I32])
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![Value::I32(1)])]
    #[case(vec![Value::I32(1), Value::I64(2)])]
    #[case(vec![Value::F32(1.0), Value::F32(2.0)])]
    #[case(vec![Value::I32(1), Value::I32(2), Value::I32(3)])]
    fn test_signature_mismatch(#[case] args: Vec<Value>) {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, RECORD_WAT);
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let record = runtime.lookup(instance, "record").unwrap();

        let err = runtime.call(context, &record, &args).unwrap_err();
        assert!(matches!(err, Error::SignatureMismatch { ref expected, .. } if expected == "(i32, i32)"), "{err}");

        // the guest never ran
        assert_eq!(runtime.memory(instance).unwrap().read_i32(0), Ok(0));
        assert_eq!(runtime.exception(instance), Ok(None));
        assert_eq!(runtime.context_state(context), Ok(ContextState::Ready));

        assert_eq!(runtime.call(context, &record, &[Value::I32(4), Value::I32(5)]), Ok(vec![Value::I32(9)]));
        assert_eq!(runtime.memory(instance).unwrap().read_i32(0), Ok(1));
    }

    #[test]
    fn test_trap_isolation() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, DIV_WAT);
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let div = runtime.lookup(instance, "div").unwrap();

        assert_eq!(
            runtime.call(context, &div, &[Value::I32(1), Value::I32(0)]),
            Err(Error::Trap(Trap::DivisionByZero))
        );
        assert_eq!(runtime.exception(instance), Ok(Some("integer divide by zero")));
        assert_eq!(runtime.context_state(context), Ok(ContextState::Ready));

        assert_eq!(runtime.call(context, &div, &[Value::I32(6), Value::I32(3)]), Ok(vec![Value::I32(2)]));
        assert_eq!(runtime.exception(instance), Ok(None));

        assert_eq!(
            runtime.call(context, &div, &[Value::I32(i32::MIN), Value::I32(-1)]),
            Err(Error::Trap(Trap::IntegerOverflow))
        );
        runtime.clear_exception(instance).unwrap();
        assert_eq!(runtime.exception(instance), Ok(None));
    }

    #[test]
    fn test_stack_overflow() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(&mut runtime, RECURSE_WAT);
        let context = runtime.create_context(instance, STACK_SIZE).unwrap();
        let recurse = runtime.lookup(instance, "recurse").unwrap();

        assert_eq!(
            runtime.call(context, &recurse, &[Value::I32(1000)]),
            Err(Error::Trap(Trap::StackOverflow))
        );
        assert_eq!(runtime.exception(instance), Ok(Some("call stack exhausted")));

        // the same context is still usable at a depth that fits
        assert_eq!(runtime.call(context, &recurse, &[Value::I32(10)]), Ok(vec![Value::I32(10)]));

        // the stack budget belongs to the context
        let deep = runtime.create_context(instance, 1 << 20).unwrap();
        assert_eq!(runtime.call(deep, &recurse, &[Value::I32(1000)]), Ok(vec![Value::I32(1000)]));
    }

    #[test]
    fn test_traps() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (memory 1)
                 (func (export "boom") unreachable)
                 (func (export "load") (param i32) (result i32)
                   local.get 0
                   i32.load)
                 (func (export "trunc") (param f32) (result i32)
                   local.get 0
                   i32.trunc_f32_s))"#,
        );

        assert_eq!(runtime.call_export(instance, "boom", &[]), Err(Error::Trap(Trap::Unreachable)));
        assert_eq!(runtime.call_export(instance, "load", &[Value::I32(65532)]), Ok(vec![Value::I32(0)]));
        assert_eq!(
            runtime.call_export(instance, "load", &[Value::I32(65533)]),
            Err(Error::Trap(Trap::OutOfBounds))
        );
        assert_eq!(
            runtime.call_export(instance, "load", &[Value::I32(-1)]),
            Err(Error::Trap(Trap::OutOfBounds))
        );
        assert_eq!(
            runtime.call_export(instance, "trunc", &[Value::F32(f32::NAN)]),
            Err(Error::Trap(Trap::InvalidConversion))
        );
        assert_eq!(
            runtime.call_export(instance, "trunc", &[Value::F32(3e9)]),
            Err(Error::Trap(Trap::IntegerOverflow))
        );
        assert_eq!(runtime.call_export(instance, "trunc", &[Value::F32(-7.9)]), Ok(vec![Value::I32(-7)]));
    }

    #[test]
    fn test_instruction_budget() {
        let mut runtime = runtime_with(RuntimeConfig::new().with_instruction_budget(10_000));
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (func (export "spin") (loop br 0))
                 (func (export "one") (result i32) i32.const 1))"#,
        );
        assert_eq!(
            runtime.call_export(instance, "spin", &[]),
            Err(Error::Trap(Trap::InstructionBudgetExhausted))
        );
        // every call starts with a fresh budget
        assert_eq!(runtime.call_export(instance, "one", &[]), Ok(vec![Value::I32(1)]));
    }

    #[test]
    fn test_numeric_results() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (func (export "fac") (param i64) (result i64) (local i64)
                   i64.const 1
                   local.set 1
                   block
                     loop
                       local.get 0
                       i64.eqz
                       br_if 1
                       local.get 1
                       local.get 0
                       i64.mul
                       local.set 1
                       local.get 0
                       i64.const 1
                       i64.sub
                       local.set 0
                       br 0
                     end
                   end
                   local.get 1)
                 (func (export "hyp") (param f64 f64) (result f64)
                   local.get 0
                   local.get 0
                   f64.mul
                   local.get 1
                   local.get 1
                   f64.mul
                   f64.add
                   f64.sqrt)
                 (func (export "swap") (param i32 i64) (result i64 i32)
                   local.get 1
                   local.get 0))"#,
        );

        assert_eq!(
            runtime.call_export(instance, "fac", &[Value::I64(20)]),
            Ok(vec![Value::I64(2_432_902_008_176_640_000)])
        );
        assert_eq!(
            runtime.call_export(instance, "hyp", &[Value::F64(3.0), Value::F64(4.0)]),
            Ok(vec![Value::F64(5.0)])
        );
        assert_eq!(
            runtime.call_export(instance, "swap", &[Value::I32(1), Value::I64(2)]),
            Ok(vec![Value::I64(2), Value::I32(1)])
        );
    }

    #[test]
    fn test_call_indirect() {
        let mut runtime = runtime();
        let (_, instance) = instantiate(
            &mut runtime,
            r#"(module
                 (type $ret (func (result i32)))
                 (table 4 funcref)
                 (elem (i32.const 0) $one $identity)
                 (func $one (result i32) i32.const 1)
                 (func $identity (param i32) (result i32) local.get 0)
                 (func (export "dispatch") (param i32) (result i32)
                   local.get 0
                   call_indirect (type $ret)))"#,
        );

        assert_eq!(runtime.call_export(instance, "dispatch", &[Value::I32(0)]), Ok(vec![Value::I32(1)]));
        assert!(matches!(
            runtime.call_export(instance, "dispatch", &[Value::I32(1)]),
            Err(Error::Trap(Trap::IndirectCallTypeMismatch { .. }))
        ));
        assert_eq!(
            runtime.call_export(instance, "dispatch", &[Value::I32(2)]),
            Err(Error::Trap(Trap::UninitializedElement(2)))
        );
        assert_eq!(
            runtime.call_export(instance, "dispatch", &[Value::I32(4)]),
            Err(Error::Trap(Trap::UndefinedElement))
        );
    }

    #[test]
    fn test_context_mismatch() {
        let mut runtime = runtime();
        let (module, a) = instantiate(&mut runtime, ADD_WAT);
        let b = runtime.instantiate(module, STACK_SIZE, HEAP_SIZE).unwrap();
        let context = runtime.create_context(a, STACK_SIZE).unwrap();
        let add_b = runtime.lookup(b, "add").unwrap();

        assert_eq!(
            runtime.call(context, &add_b, &[Value::I32(1), Value::I32(2)]),
            Err(Error::ContextMismatch)
        );
    }

    #[test]
    fn test_host_import() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(DOUBLE_WAT)).unwrap();

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "double",
            HostFunction::new(i32_to_i32(), |_, args: &[Value]| {
                let value = args[0].as_i32().ok_or(Trap::type_mismatch("i32", "other"))?;
                Ok(vec![Value::I32(value * 2)])
            }),
        );

        let instance = runtime
            .instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE)
            .unwrap();
        assert_eq!(runtime.call_export(instance, "quad", &[Value::I32(3)]), Ok(vec![Value::I32(12)]));
    }

    #[test]
    fn test_host_import_memory() {
        let mut runtime = runtime();
        let module = runtime
            .load(&wasm(
                r#"(module
                     (import "env" "poke" (func $poke (param i32 i32)))
                     (memory 1)
                     (func (export "run") (result i32)
                       i32.const 16
                       i32.const 0x5eed
                       call $poke
                       i32.const 16
                       i32.load))"#,
            ))
            .unwrap();

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "poke",
            HostFunction::new(
                FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![]),
                |ctx, args: &[Value]| {
                    let (Some(addr), Some(value)) = (args[0].as_i32(), args[1].as_i32()) else {
                        return Err(Trap::type_mismatch("(i32, i32)", "other"));
                    };
                    let memory = ctx.memory_mut().ok_or(Trap::OutOfBounds)?;
                    memory.write_i32(addr as u32, value)?;
                    Ok(vec![])
                },
            ),
        );

        let instance = runtime
            .instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE)
            .unwrap();
        assert_eq!(runtime.call_export(instance, "run", &[]), Ok(vec![Value::I32(0x5eed)]));
        assert_eq!(runtime.memory(instance).unwrap().read_i32(16), Ok(0x5eed));
    }

    #[test]
    fn test_host_reentry_refused() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(DOUBLE_WAT)).unwrap();

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "double",
            HostFunction::new(i32_to_i32(), |ctx, args: &[Value]| {
                ctx.call_export("quad", args).map_err(|err| Trap::Host(err.to_string()))
            }),
        );

        let instance = runtime
            .instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE)
            .unwrap();
        assert_eq!(
            runtime.call_export(instance, "quad", &[Value::I32(1)]),
            Err(Error::Trap(Trap::Host("execution context is already running".to_string())))
        );
        assert_eq!(runtime.exception(instance), Ok(Some("execution context is already running")));
    }

    #[test]
    fn test_host_reentry_unknown_export() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(DOUBLE_WAT)).unwrap();

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "double",
            HostFunction::new(i32_to_i32(), |ctx, args: &[Value]| {
                ctx.call_export("missing", args).map_err(|err| Trap::Host(err.to_string()))
            }),
        );

        let instance = runtime
            .instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE)
            .unwrap();
        assert_eq!(
            runtime.call_export(instance, "quad", &[Value::I32(1)]),
            Err(Error::Trap(Trap::Host("not found: exported function \"missing\"".to_string())))
        );
    }

    #[test]
    fn test_host_results_checked() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(DOUBLE_WAT)).unwrap();

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "double",
            HostFunction::new(i32_to_i32(), |_, _: &[Value]| Ok(vec![Value::F64(1.0)])),
        );

        let instance = runtime
            .instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE)
            .unwrap();
        assert!(matches!(
            runtime.call_export(instance, "quad", &[Value::I32(1)]),
            Err(Error::Trap(Trap::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_link_errors() {
        let mut runtime = runtime();
        let module = runtime.load(&wasm(DOUBLE_WAT)).unwrap();

        assert_eq!(
            runtime.instantiate(module, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::UnresolvedImport {
                module: "env".to_string(),
                name: "double".to_string()
            }))
        );

        let mut imports = NativeImports::new();
        imports.register(
            "env",
            "double",
            HostFunction::new(FunctionType::new(vec![ValueType::I64], vec![ValueType::I64]), |_, args: &[Value]| {
                Ok(args.to_vec())
            }),
        );
        assert!(matches!(
            runtime.instantiate_with_imports(module, &imports, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::ImportSignatureMismatch { .. }))
        ));

        let memory_import = runtime.load(&wasm(r#"(module (import "env" "mem" (memory 1)))"#)).unwrap();
        assert!(matches!(
            runtime.instantiate(memory_import, STACK_SIZE, HEAP_SIZE),
            Err(Error::Link(LinkError::UnsupportedImport { kind: "memory", .. }))
        ));

        assert_eq!(runtime.memory_usage().instances, 0);
    }
}
