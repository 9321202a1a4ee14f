//! A line-oriented executor shared by the unit and integration tests
//!
//! One command per line:
//! - `print <text>` / `println <text>` call the builtin of the same name
//! - `set <name> <value>` / `get <name>`
//! - `call <package>.<function> <int>...`
//! - `spin` loops until cancelled
//! - `fail <message>` returns a runtime error
//!
//! Blank lines and `//` comments are skipped. The result is the value of the
//! last `print`, `println`, `get` or `call`, or nil.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use scriptorium_host::{CancellationToken, ExecError, Executor, Namespace, Value};

#[derive(Default)]
pub struct LineExecutor {
    runs: AtomicUsize,
    last_source: Mutex<Option<String>>,
}

impl LineExecutor {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn last_source(&self) -> Option<String> {
        self.last_source.lock().unwrap().clone()
    }
}

impl Executor for LineExecutor {
    fn execute(
        &self,
        cancel: &CancellationToken,
        namespace: &Namespace,
        source: &str,
    ) -> Result<Value, ExecError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_source.lock().unwrap() = Some(source.to_string());

        let mut result = Value::Nil;
        for line in source.lines().map(str::trim) {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "print" | "println" => {
                    result = namespace.call(command, &[Value::from(rest)])?;
                }
                "set" => {
                    let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                    namespace.set(name, Value::from(value));
                }
                "get" => {
                    result = namespace.get(rest).unwrap_or_default();
                }
                "call" => {
                    let mut parts = rest.split_whitespace();
                    let target = parts.next().unwrap_or_default();
                    let (package, function) = target
                        .split_once('.')
                        .ok_or_else(|| ExecError::Runtime(format!("bad call target {target}")))?;
                    let args: Vec<Value> = parts
                        .filter_map(|a| a.parse::<i64>().ok())
                        .map(Value::Int)
                        .collect();
                    result = namespace.call_package(package, function, &args)?;
                }
                "spin" => loop {
                    if cancel.is_cancelled() {
                        return Err(ExecError::Cancelled);
                    }
                    thread::sleep(Duration::from_millis(1));
                },
                "fail" => return Err(ExecError::Runtime(rest.to_string())),
                other => return Err(ExecError::Undefined(other.to_string())),
            }
        }
        Ok(result)
    }
}
