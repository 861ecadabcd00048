//! Module byte sources
//!
//! A [`ModuleSource`] turns a module name into owned bytes. The runtime
//! never reads files itself; hosts hand it a source and
//! [`Runtime::load_named`](crate::runtime::Runtime::load_named) does the
//! rest. Ownership of the returned buffer passes to the caller and is
//! released by dropping it.

use crate::runtime::Error;
use log::trace;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ModuleSource {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, Error>;
}

impl<F> ModuleSource for F
where
    F: Fn(&str) -> Result<Vec<u8>, Error>,
{
    fn resolve(&self, name: &str) -> Result<Vec<u8>, Error> {
        self(name)
    }
}

/// Reads `<search_path>/<name>.<extension>` from the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsModuleSource {
    search_path: PathBuf,
    extension: String,
}

impl FsModuleSource {
    pub fn new(search_path: impl Into<PathBuf>) -> FsModuleSource {
        FsModuleSource {
            search_path: search_path.into(),
            extension: "wasm".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> FsModuleSource {
        self.extension = extension.into();
        self
    }

    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    pub fn module_path(&self, name: &str) -> PathBuf {
        self.search_path.join(format!("{}.{}", name, self.extension))
    }
}

impl ModuleSource for FsModuleSource {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, Error> {
        let path = self.module_path(name);
        trace!("reading module {} from {}", name, path.display());
        fs::read(&path).map_err(|err| Error::ModuleSource(format!("{}: {}", path.display(), err)))
    }
}

/// In-memory modules keyed by name
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    modules: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn new() -> StaticSource {
        StaticSource::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> &mut StaticSource {
        self.modules.insert(name.into(), bytes);
        self
    }
}

impl ModuleSource for StaticSource {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("module \"{name}\"")))
    }
}
