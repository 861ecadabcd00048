//! WASI preview1 imports
//!
//! Just enough of `wasi_snapshot_preview1` to run a command-style guest
//! that talks through the standard streams:
//!
//! - `fd_write`, `fd_close`, `fd_seek`, `fd_fdstat_get` on the standard streams
//! - `args_sizes_get` / `args_get`
//! - `environ_sizes_get` / `environ_get`
//! - `proc_exit`
//!
//! There is no filesystem. Every call except `proc_exit` returns an errno
//! to the guest; pointer arguments that fall outside linear memory give
//! `EFAULT` instead of a trap. `proc_exit` traps with [`Trap::Exit`] so
//! the call unwinds back to the embedder.
//!
//! See: <https://github.com/WebAssembly/WASI/blob/wasi-0.1/preview1/docs.md>

pub mod context;
pub mod types;

pub use context::{FdStat, WasiContext, WasiContextBuilder};
pub use types::WasiErrno;

use super::imports::{HostContext, HostFunction, NativeImports};
use super::memory::Memory;
use super::value::kinds;
use super::{Trap, Value};
use crate::parser::module::{FunctionType, ValueType};
use log::{debug, trace};
use std::sync::Arc;
use types::FDSTAT_SIZE;

pub const MODULE: &str = "wasi_snapshot_preview1";

const I32: ValueType = ValueType::I32;
const I64: ValueType = ValueType::I64;

/// An import that reports failure through its `errno` result
type Syscall = fn(&WasiContext, &mut HostContext<'_>, &[Value]) -> Result<(), WasiErrno>;

const SYSCALLS: &[(&str, &[ValueType], Syscall)] = &[
    ("fd_write", &[I32, I32, I32, I32], fd_write),
    ("fd_close", &[I32], fd_close),
    ("fd_seek", &[I32, I64, I32, I32], fd_seek),
    ("fd_fdstat_get", &[I32, I32], fd_fdstat_get),
    ("args_sizes_get", &[I32, I32], args_sizes_get),
    ("args_get", &[I32, I32], args_get),
    ("environ_sizes_get", &[I32, I32], environ_sizes_get),
    ("environ_get", &[I32, I32], environ_get),
];

/// A fresh import table holding the WASI functions bound to `ctx`
pub fn imports(ctx: Arc<WasiContext>) -> NativeImports {
    let mut imports = NativeImports::new();
    add_to_imports(&mut imports, ctx);
    imports
}

/// Register the WASI functions bound to `ctx` alongside other host functions
pub fn add_to_imports(imports: &mut NativeImports, ctx: Arc<WasiContext>) {
    for &(name, params, syscall) in SYSCALLS {
        let ctx = Arc::clone(&ctx);
        let signature = FunctionType::new(params.to_vec(), vec![I32]);
        imports.register(
            MODULE,
            name,
            HostFunction::new(signature, move |host, args| {
                let errno = match syscall(&ctx, host, args) {
                    Ok(()) => WasiErrno::Success,
                    Err(errno) => {
                        debug!("{MODULE}.{name}: {errno:?}");
                        errno
                    }
                };
                Ok(vec![Value::I32(errno.as_i32())])
            }),
        );
    }

    imports.register(
        MODULE,
        "proc_exit",
        HostFunction::new(FunctionType::new(vec![I32], vec![]), move |_, args| proc_exit(&ctx, args)),
    );
}

fn arg_u32(args: &[Value], index: usize) -> Result<u32, WasiErrno> {
    args.get(index)
        .and_then(Value::as_i32)
        .map(|value| value as u32)
        .ok_or(WasiErrno::Inval)
}

fn memory<'h>(host: &'h mut HostContext<'_>) -> Result<&'h mut Memory, WasiErrno> {
    host.memory_mut().ok_or(WasiErrno::Fault)
}

/* STREAMS ****/

fn fd_write(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    let fd = arg_u32(args, 0)?;
    let iovs_ptr = arg_u32(args, 1)?;
    let iovs_len = arg_u32(args, 2)?;
    let nwritten_ptr = arg_u32(args, 3)?;

    let memory = memory(host)?;
    let written = ctx.fd_write(fd, memory, iovs_ptr, iovs_len)?;
    trace!("fd {fd}: wrote {written} byte(s) from {iovs_len} iovec(s)");
    memory.write_u32(nwritten_ptr, written)?;
    Ok(())
}

fn fd_close(ctx: &WasiContext, _: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    ctx.close(arg_u32(args, 0)?)
}

fn fd_seek(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    let fd = arg_u32(args, 0)?;
    let newoffset_ptr = arg_u32(args, 3)?;
    let offset = ctx.seek(fd)?;
    memory(host)?.write_u64(newoffset_ptr, offset)?;
    Ok(())
}

fn fd_fdstat_get(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    let fd = arg_u32(args, 0)?;
    let buf_ptr = arg_u32(args, 1)?;
    let stat = ctx.fdstat(fd)?;

    // u8 filetype, u16 flags at 2, rights_base at 8, rights_inheriting at 16
    let mut buf = [0u8; FDSTAT_SIZE];
    buf[0] = stat.filetype;
    buf[8..16].copy_from_slice(&stat.rights.to_le_bytes());
    memory(host)?.write_bytes(buf_ptr, &buf)?;
    Ok(())
}

/* ARGUMENTS AND ENVIRONMENT ****/

/// Count and total NUL-terminated size of `strings`
fn write_sizes(memory: &mut Memory, strings: &[String], count_ptr: u32, size_ptr: u32) -> Result<(), WasiErrno> {
    let count = u32::try_from(strings.len()).map_err(|_| WasiErrno::Overflow)?;
    let size = strings.iter().map(|s| s.len() + 1).sum::<usize>();
    let size = u32::try_from(size).map_err(|_| WasiErrno::Overflow)?;
    memory.write_u32(count_ptr, count)?;
    memory.write_u32(size_ptr, size)?;
    Ok(())
}

/// Copy `strings` into `buf_ptr` back to back, pointing each entry of the
/// table at `table_ptr` to its string
fn write_strings(memory: &mut Memory, strings: &[String], table_ptr: u32, buf_ptr: u32) -> Result<(), WasiErrno> {
    let mut entry = table_ptr;
    let mut addr = buf_ptr;
    for s in strings {
        memory.write_u32(entry, addr)?;
        memory.write_bytes(addr, s.as_bytes())?;
        let end = u32::try_from(s.len())
            .ok()
            .and_then(|len| addr.checked_add(len))
            .ok_or(WasiErrno::Fault)?;
        memory.write_u8(end, 0)?;
        addr = end.checked_add(1).ok_or(WasiErrno::Fault)?;
        entry = entry.checked_add(4).ok_or(WasiErrno::Fault)?;
    }
    Ok(())
}

fn args_sizes_get(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    write_sizes(memory(host)?, ctx.args(), arg_u32(args, 0)?, arg_u32(args, 1)?)
}

fn args_get(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    write_strings(memory(host)?, ctx.args(), arg_u32(args, 0)?, arg_u32(args, 1)?)
}

fn environ_sizes_get(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    write_sizes(memory(host)?, ctx.env(), arg_u32(args, 0)?, arg_u32(args, 1)?)
}

fn environ_get(ctx: &WasiContext, host: &mut HostContext<'_>, args: &[Value]) -> Result<(), WasiErrno> {
    write_strings(memory(host)?, ctx.env(), arg_u32(args, 0)?, arg_u32(args, 1)?)
}

/* EXIT ****/

fn proc_exit(ctx: &WasiContext, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let code = args
        .first()
        .and_then(Value::as_i32)
        .ok_or_else(|| Trap::type_mismatch("i32", kinds(args)))?;
    ctx.set_exit_code(code);
    debug!("{MODULE}.proc_exit({code})");
    Err(Trap::Exit(code))
}
