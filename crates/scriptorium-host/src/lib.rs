//! Host runtime for script environments
//!
//! This crate owns the registry of running environments and their lifecycle.
//! Parsing and running source text is left to an [`Executor`] supplied by the
//! embedding application; scripts are loaded and saved through a
//! [`ScriptPersister`].
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod bindings;
mod builtins;
pub mod environment;
pub mod error;
pub mod executor;
pub mod registry;
pub mod script;
pub mod store;

#[cfg(test)]
extern crate self as scriptorium_host;
#[cfg(test)]
pub(crate) mod testing;

pub use bindings::{
    FunctionBindings, PackageConfigurator, PackageTable, Packages, TypeBinding, TypeBindings,
};
pub use environment::{EnvId, Environment, OutputSink};
pub use error::{Error, Result};
pub use executor::{ExecError, Executor, HostFunction, Namespace, Value};
pub use registry::{Registry, RegistryBuilder, DEFAULT_SCRIPT_KIND};
pub use script::{Script, ScriptLoader, ScriptPersister, ScriptStorer, AUTORUN_NEVER};
pub use store::{DirStore, MemoryStore, StoreError};

// Re-exported so executors don't need their own tokio-util dependency
pub use tokio_util::sync::CancellationToken;

/// Every critical section in this crate leaves its data consistent, so a
/// poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
