//! Contract between environments and the interpreter that runs their source

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use crate::bindings::Packages;
use crate::{read, write};

/// A value passed between host functions and the interpreter
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Errors raised while running source text
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The run observed its cancellation token and stopped
    #[error("execution cancelled")]
    Cancelled,

    #[error("undefined: {0}")]
    Undefined(String),

    /// The output sink rejected a message, aborting the script
    #[error("output sink failed: {0:#}")]
    Sink(anyhow::Error),

    #[error("{0}")]
    Runtime(String),

    #[error("interpreter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A function callable from script code
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, ExecError> + Send + Sync>;

/// Interpreter state owned by one environment
///
/// Holds script variables, host builtins defined for this environment and
/// the package bindings visible when the environment was created. Shared by
/// every run of the environment at once, so a fragment can execute while a
/// long-running script is still going. No lock is held while a builtin or
/// package function runs.
pub struct Namespace {
    vars: RwLock<HashMap<String, Value>>,
    builtins: RwLock<HashMap<String, HostFunction>>,
    packages: Arc<Packages>,
}

impl Namespace {
    pub fn new(packages: Arc<Packages>) -> Self {
        Self {
            vars: RwLock::new(HashMap::new()),
            builtins: RwLock::new(HashMap::new()),
            packages,
        }
    }

    /// Define (or replace) a builtin function
    pub fn define(&self, name: impl Into<String>, function: HostFunction) {
        write(&self.builtins).insert(name.into(), function);
    }

    pub fn builtin(&self, name: &str) -> Option<HostFunction> {
        read(&self.builtins).get(name).cloned()
    }

    /// Call a builtin by name
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExecError> {
        let function = self
            .builtin(name)
            .ok_or_else(|| ExecError::Undefined(name.to_string()))?;
        function(args)
    }

    /// Call a function from the package bindings
    pub fn call_package(
        &self,
        package: &str,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ExecError> {
        let function = self
            .packages
            .function(package, name)
            .ok_or_else(|| ExecError::Undefined(format!("{package}.{name}")))?;
        function(args)
    }

    pub fn packages(&self) -> &Packages {
        &self.packages
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        read(&self.vars).get(name).cloned()
    }

    /// Set a script variable, returning the previous value
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        write(&self.vars).insert(name.into(), value)
    }

    /// A snapshot of the script variables, sorted by name
    pub fn vars(&self) -> Vec<(String, Value)> {
        let mut vars: Vec<(String, Value)> = read(&self.vars)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    /// Drop all script variables; builtins and packages are kept
    pub fn clear_vars(&self) {
        write(&self.vars).clear();
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builtins: Vec<String> = read(&self.builtins).keys().cloned().collect();
        builtins.sort_unstable();
        f.debug_struct("Namespace")
            .field("vars", &self.vars())
            .field("builtins", &builtins)
            .finish()
    }
}

/// Runs source text against a namespace
///
/// Implementations must be callable repeatedly, and concurrently, against the
/// same namespace and must check `cancel` often enough that a suspended
/// environment actually stops. Nothing in the host preempts a run that
/// ignores its token.
pub trait Executor: Send + Sync + 'static {
    fn execute(
        &self,
        cancel: &CancellationToken,
        namespace: &Namespace,
        source: &str,
    ) -> Result<Value, ExecError>;
}

impl<F> Executor for F
where
    F: Fn(&CancellationToken, &Namespace, &str) -> Result<Value, ExecError>
        + Send
        + Sync
        + 'static,
{
    fn execute(
        &self,
        cancel: &CancellationToken,
        namespace: &Namespace,
        source: &str,
    ) -> Result<Value, ExecError> {
        self(cancel, namespace, source)
    }
}
