//! Native imports
//!
//! Host functions are registered under `(module, name)` in a
//! [`NativeImports`] table and bound to a module's function imports during
//! instantiation. Only function imports can be satisfied; a module that
//! imports a table, memory or global fails to link.

use super::memory::Memory;
use super::{Error, LinkError, Trap, Value};
use crate::parser::module::{FunctionType, ImportKind, Module};
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Callback = dyn Fn(&mut HostContext<'_>, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync;

/// Host-provided callable with a declared signature
#[derive(Clone)]
pub struct HostFunction {
    signature: FunctionType,
    callback: Arc<Callback>,
}

impl HostFunction {
    pub fn new<F>(signature: FunctionType, callback: F) -> HostFunction
    where
        F: Fn(&mut HostContext<'_>, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        HostFunction {
            signature,
            callback: Arc::new(callback),
        }
    }

    pub fn signature(&self) -> &FunctionType {
        &self.signature
    }

    /// Run the callback and check its results against the signature
    pub fn call(&self, context: &mut HostContext<'_>, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let results = (self.callback)(context, args)?;
        let matches = results.len() == self.signature.return_types.len()
            && results
                .iter()
                .zip(&self.signature.return_types)
                .all(|(value, expected)| value.typ() == *expected);
        if !matches {
            return Err(Trap::type_mismatch(
                format!("results {}", self.signature),
                super::value::kinds(&results),
            ));
        }
        Ok(results)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HostFunction").field("signature", &self.signature).finish()
    }
}

/// What a host function can reach while it runs
pub struct HostContext<'a> {
    module: &'a Module,
    memory: Option<&'a mut Memory>,
}

impl<'a> HostContext<'a> {
    pub fn new(module: &'a Module, memory: Option<&'a mut Memory>) -> HostContext<'a> {
        HostContext { module, memory }
    }

    /// Module of the calling instance
    pub fn module(&self) -> &Module {
        self.module
    }

    /// The calling instance's linear memory, if it has one
    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_deref()
    }

    /// Writable view of the calling instance's linear memory
    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        self.memory.as_deref_mut()
    }

    /// Call back into the calling instance
    ///
    /// The export is resolved first, so an unknown name reports `NotFound`.
    /// A known one is refused with `AlreadyRunning`: the instance's only
    /// context is the one already running this host function.
    pub fn call_export(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        let func_idx = self
            .module
            .exported_function(name)
            .ok_or_else(|| Error::NotFound(format!("exported function \"{name}\"")))?;
        trace!(
            "host callback attempted re-entrant call to {name} (function {func_idx}) with {} argument(s)",
            args.len()
        );
        Err(Error::AlreadyRunning)
    }
}

/// Host functions available to `instantiate`, keyed by `(module, name)`
#[derive(Debug, Clone, Default)]
pub struct NativeImports {
    functions: HashMap<(String, String), HostFunction>,
}

impl NativeImports {
    pub fn new() -> NativeImports {
        NativeImports::default()
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        function: HostFunction,
    ) -> &mut NativeImports {
        self.functions.insert((module.into(), name.into()), function);
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&HostFunction> {
        self.functions.get(&(module.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Bind every import of `module`, in function index order
    pub fn resolve(&self, module: &Module) -> Result<Vec<HostFunction>, LinkError> {
        let mut resolved = Vec::with_capacity(module.imported_function_count());
        for import in &module.imports {
            let kind = match &import.kind {
                ImportKind::Function(type_idx) => {
                    let function = self.get(&import.module, &import.name).ok_or_else(|| {
                        LinkError::UnresolvedImport {
                            module: import.module.clone(),
                            name: import.name.clone(),
                        }
                    })?;
                    let expected = module.types.get(*type_idx as usize).ok_or_else(|| {
                        LinkError::UnresolvedImport {
                            module: import.module.clone(),
                            name: import.name.clone(),
                        }
                    })?;
                    if function.signature() != expected {
                        return Err(LinkError::ImportSignatureMismatch {
                            module: import.module.clone(),
                            name: import.name.clone(),
                            expected: expected.to_string(),
                            actual: function.signature().to_string(),
                        });
                    }
                    resolved.push(function.clone());
                    continue;
                }
                ImportKind::Table(_) => "table",
                ImportKind::Memory(_) => "memory",
                ImportKind::Global(_) => "global",
            };
            return Err(LinkError::UnsupportedImport {
                module: import.module.clone(),
                name: import.name.clone(),
                kind,
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::module::{Export, ExportKind, Import, Limits, ValueType};

    fn i32_to_i32() -> FunctionType {
        FunctionType::new(vec![ValueType::I32], vec![ValueType::I32])
    }

    fn module_importing(kind: ImportKind) -> Module {
        let mut module = Module::new();
        module.types.push(i32_to_i32());
        module.imports.push(Import {
            module: "env".to_string(),
            name: "f".to_string(),
            kind,
        });
        module
    }

    #[test]
    fn test_call_checks_results() {
        let good = HostFunction::new(i32_to_i32(), |_, args| Ok(vec![args[0]]));
        let bad = HostFunction::new(i32_to_i32(), |_, _| Ok(vec![Value::I64(0)]));
        let module = Module::new();
        let mut context = HostContext::new(&module, None);
        assert_eq!(good.call(&mut context, &[Value::I32(4)]), Ok(vec![Value::I32(4)]));
        assert!(matches!(
            bad.call(&mut context, &[Value::I32(4)]),
            Err(Trap::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_reentry_refused() {
        let mut module = module_importing(ImportKind::Function(0));
        module.exports.push(Export {
            name: "run".to_string(),
            kind: ExportKind::Function,
            index: 0,
        });
        let mut context = HostContext::new(&module, None);
        assert!(context.memory().is_none());
        assert_eq!(context.call_export("run", &[]), Err(Error::AlreadyRunning));
        assert_eq!(
            context.call_export("walk", &[]),
            Err(Error::NotFound("exported function \"walk\"".to_string()))
        );
    }

    #[test]
    fn test_resolve() {
        let module = module_importing(ImportKind::Function(0));
        let mut imports = NativeImports::new();
        assert_eq!(
            imports.resolve(&module).unwrap_err(),
            LinkError::UnresolvedImport {
                module: "env".to_string(),
                name: "f".to_string()
            }
        );

        imports.register("env", "f", HostFunction::new(FunctionType::default(), |_, _| Ok(vec![])));
        assert!(matches!(
            imports.resolve(&module),
            Err(LinkError::ImportSignatureMismatch { .. })
        ));

        imports.register("env", "f", HostFunction::new(i32_to_i32(), |_, args| Ok(args.to_vec())));
        assert_eq!(imports.resolve(&module).unwrap().len(), 1);
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn test_unsupported_kind() {
        let module = module_importing(ImportKind::Memory(Limits { min: 1, max: None }));
        assert_eq!(
            NativeImports::new().resolve(&module).unwrap_err(),
            LinkError::UnsupportedImport {
                module: "env".to_string(),
                name: "f".to_string(),
                kind: "memory"
            }
        );
    }
}
