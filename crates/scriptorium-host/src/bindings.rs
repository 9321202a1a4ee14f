//! Process-wide package bindings exposed to every environment
//!
//! There is exactly one [`PackageTable`] per process. Applying a
//! [`PackageConfigurator`] to it (which [`RegistryBuilder::with_configurator`]
//! does at build time) changes the packages seen by every environment created
//! afterwards by *any* registry, not just the one being built. Environments
//! that already exist keep the snapshot they were created with.
//!
//! [`RegistryBuilder::with_configurator`]: crate::RegistryBuilder::with_configurator

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::executor::HostFunction;

/// package name -> function name -> function
pub type FunctionBindings = HashMap<String, HashMap<String, HostFunction>>;

/// package name -> type name -> type
pub type TypeBindings = HashMap<String, HashMap<String, TypeBinding>>;

/// A host type made visible to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeBinding {
    name: &'static str,
    id: TypeId,
}

impl TypeBinding {
    pub fn of<T: 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// Populates package bindings
pub trait PackageConfigurator: Send + Sync {
    fn configure_packages(&self, functions: &mut FunctionBindings, types: &mut TypeBindings);
}

/// An immutable snapshot of the package bindings
#[derive(Clone, Default)]
pub struct Packages {
    functions: FunctionBindings,
    types: TypeBindings,
}

impl Packages {
    pub fn function(&self, package: &str, name: &str) -> Option<&HostFunction> {
        self.functions.get(package)?.get(name)
    }

    pub fn type_binding(&self, package: &str, name: &str) -> Option<&TypeBinding> {
        self.types.get(package)?.get(name)
    }

    /// Names of all packages with at least one function or type, sorted
    pub fn package_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .functions
            .keys()
            .chain(self.types.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Debug for Packages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packages")
            .field("packages", &self.package_names())
            .finish()
    }
}

/// The process-wide owner of package bindings
pub struct PackageTable {
    current: RwLock<Arc<Packages>>,
}

static PACKAGE_TABLE: OnceLock<PackageTable> = OnceLock::new();

impl PackageTable {
    /// The table for this process, created empty on first use
    pub fn global() -> &'static PackageTable {
        PACKAGE_TABLE.get_or_init(|| PackageTable {
            current: RwLock::new(Arc::new(Packages::default())),
        })
    }

    /// Apply `configurator` on top of the current bindings
    ///
    /// Configurators are additive. A binding with an existing package and
    /// name replaces the old one for environments created from now on.
    pub fn configure(&self, configurator: &dyn PackageConfigurator) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Packages::clone(&current);
        configurator.configure_packages(&mut next.functions, &mut next.types);
        debug!(
            target: "scripting",
            "Package bindings reconfigured process-wide: {:?}",
            next.package_names()
        );
        *current = Arc::new(next);
    }

    /// The bindings new environments will see
    pub fn snapshot(&self) -> Arc<Packages> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
