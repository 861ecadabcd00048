//! Function invoker
//!
//! Resolves exports by name and marshals typed calls into an instance.
//! Arguments are checked against the export's signature before any guest
//! code runs; a trap is recorded on the instance and leaves it usable.

use super::context::ExecutionContext;
use super::instance::{Instance, InstanceHandle};
use super::value::kinds;
use super::{Error, Value};
use crate::parser::module::{FunctionType, ValueType};
use log::{trace, warn};

/// Callable export resolved by [`lookup`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFunction {
    instance: InstanceHandle,
    name: String,
    func_idx: u32,
    signature: FunctionType,
}

impl ExportedFunction {
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &FunctionType {
        &self.signature
    }
}

/// Find an exported function by exact name
pub fn lookup(handle: InstanceHandle, instance: &Instance, name: &str) -> Result<ExportedFunction, Error> {
    instance.ensure_live()?;
    let module = instance.module();
    let not_found = || Error::NotFound(format!("exported function \"{name}\""));
    let func_idx = module.exported_function(name).ok_or_else(not_found)?;
    let signature = module.function_type(func_idx).cloned().ok_or_else(not_found)?;
    Ok(ExportedFunction {
        instance: handle,
        name: name.to_string(),
        func_idx,
        signature,
    })
}

fn type_list(types: &[ValueType]) -> String {
    let types: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", types.join(", "))
}

/// Argument count and kinds must match the parameters exactly
pub fn check_arguments(signature: &FunctionType, args: &[Value]) -> Result<(), Error> {
    let matches = args.len() == signature.parameters.len()
        && args
            .iter()
            .zip(&signature.parameters)
            .all(|(arg, expected)| arg.typ() == *expected);
    if !matches {
        return Err(Error::signature_mismatch(type_list(&signature.parameters), kinds(args)));
    }
    Ok(())
}

/// Run `function` on `context`
///
/// Both the instance and the context are `Running` for the duration of the
/// call. On success the instance's exception is cleared; on a trap it is
/// set to the trap's message.
pub fn call(
    instance: &mut Instance,
    context: &mut ExecutionContext,
    function: &ExportedFunction,
    args: &[Value],
    instruction_budget: Option<u64>,
) -> Result<Vec<Value>, Error> {
    context.ensure_ready()?;
    instance.ensure_live()?;
    if context.instance() != function.instance {
        return Err(Error::ContextMismatch);
    }
    check_arguments(&function.signature, args)?;

    instance.begin_call()?;
    let stack = match context.begin() {
        Ok(stack) => stack,
        Err(err) => {
            instance.end_call();
            return Err(err);
        }
    };

    trace!("call {:?}.{} {}", function.instance, function.name, kinds(args));
    let result = instance
        .executor(stack, instruction_budget)
        .invoke(function.func_idx, args);
    context.finish();
    instance.end_call();

    match result {
        Ok(results) => {
            trace!("return {:?}.{} {}", function.instance, function.name, kinds(&results));
            instance.clear_exception();
            Ok(results)
        }
        Err(trap) => {
            warn!("{:?}.{} trapped: {}", function.instance, function.name, trap);
            instance.set_exception(&trap);
            Err(trap.into())
        }
    }
}
