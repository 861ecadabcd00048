//! WASI context for managing WASI state
//!
//! A [`WasiContext`] holds what a preview1 guest can observe of its
//! process: arguments, environment, the three standard streams and the
//! exit code it asked for. It is shared between every import through an
//! `Arc`, so the mutable parts sit behind mutexes.

use super::types::{WasiErrno, FILETYPE_CHARACTER_DEVICE, IOVEC_SIZE, RIGHT_FD_READ, RIGHT_FD_WRITE};
use crate::runtime::Memory;
use log::debug;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A standard stream slot
enum Stream {
    /// stdin, present so `fd_fdstat_get` answers for it but never readable
    Input,
    Output(Box<dyn Write + Send>),
}

/// File type and rights reported by `fd_fdstat_get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdStat {
    pub filetype: u8,
    pub rights: u64,
}

pub struct WasiContext {
    args: Vec<String>,
    env: Vec<String>,
    streams: Mutex<Vec<Option<Stream>>>,
    exit_code: Mutex<Option<i32>>,
}

impl WasiContext {
    pub fn builder() -> WasiContextBuilder {
        WasiContextBuilder::default()
    }

    /// Arguments as the guest sees them, `argv[0]` first
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment as `KEY=VALUE` strings
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Code passed to `proc_exit`, if the guest called it
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    fn streams(&self) -> MutexGuard<'_, Vec<Option<Stream>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gather the iovecs at `iovs_ptr` out of `memory` and write them to `fd`
    ///
    /// Returns the number of bytes written. Each iovec is written as it is
    /// read, so a fault part way through leaves the earlier ones written.
    pub fn fd_write(&self, fd: u32, memory: &Memory, iovs_ptr: u32, iovs_len: u32) -> Result<u32, WasiErrno> {
        let mut streams = self.streams();
        let writer = match streams.get_mut(fd as usize) {
            Some(Some(Stream::Output(writer))) => writer,
            _ => return Err(WasiErrno::BadF),
        };

        let mut written: u32 = 0;
        for index in 0..iovs_len {
            let entry = index
                .checked_mul(IOVEC_SIZE)
                .and_then(|offset| iovs_ptr.checked_add(offset))
                .ok_or(WasiErrno::Fault)?;
            let buf = memory.read_u32(entry)?;
            let len = memory.read_u32(entry.checked_add(4).ok_or(WasiErrno::Fault)?)?;
            let bytes = memory.read_bytes(buf, len as usize)?;
            writer.write_all(bytes).map_err(|err| {
                debug!("fd {fd}: write failed: {err}");
                WasiErrno::Io
            })?;
            written = written.checked_add(len).ok_or(WasiErrno::Overflow)?;
        }
        writer.flush().map_err(|_| WasiErrno::Io)?;
        Ok(written)
    }

    pub fn close(&self, fd: u32) -> Result<(), WasiErrno> {
        let mut streams = self.streams();
        let slot = streams.get_mut(fd as usize).ok_or(WasiErrno::BadF)?;
        match slot.take() {
            Some(Stream::Output(mut writer)) => writer.flush().map_err(|_| WasiErrno::Io)?,
            Some(Stream::Input) => {}
            None => return Err(WasiErrno::BadF),
        }
        debug!("fd {fd}: closed");
        Ok(())
    }

    pub fn fdstat(&self, fd: u32) -> Result<FdStat, WasiErrno> {
        let rights = match self.streams().get(fd as usize) {
            Some(Some(Stream::Input)) => RIGHT_FD_READ,
            Some(Some(Stream::Output(_))) => RIGHT_FD_WRITE,
            _ => return Err(WasiErrno::BadF),
        };
        Ok(FdStat {
            filetype: FILETYPE_CHARACTER_DEVICE,
            rights,
        })
    }

    /// The standard streams are pipes as far as the guest knows
    pub fn seek(&self, fd: u32) -> Result<u64, WasiErrno> {
        match self.streams().get(fd as usize) {
            Some(Some(_)) => Err(WasiErrno::Spipe),
            _ => Err(WasiErrno::BadF),
        }
    }
}

impl fmt::Debug for WasiContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let open = self.streams().iter().filter(|slot| slot.is_some()).count();
        f.debug_struct("WasiContext")
            .field("args", &self.args)
            .field("env", &self.env)
            .field("open_fds", &open)
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

/// Builder for [`WasiContext`]
///
/// Output goes to the host's stdout and stderr unless redirected.
#[derive(Default)]
pub struct WasiContextBuilder {
    args: Vec<String>,
    env: Vec<String>,
    stdout: Option<Box<dyn Write + Send>>,
    stderr: Option<Box<dyn Write + Send>>,
}

impl WasiContextBuilder {
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    pub fn stdout(mut self, writer: impl Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    pub fn stderr(mut self, writer: impl Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    pub fn build(self) -> WasiContext {
        let stdout = self.stdout.unwrap_or_else(|| Box::new(io::stdout()));
        let stderr = self.stderr.unwrap_or_else(|| Box::new(io::stderr()));
        WasiContext {
            args: self.args,
            env: self.env,
            streams: Mutex::new(vec![
                Some(Stream::Input),
                Some(Stream::Output(stdout)),
                Some(Stream::Output(stderr)),
            ]),
            exit_code: Mutex::new(None),
        }
    }
}
