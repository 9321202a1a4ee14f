use std::fmt::Write;
use std::sync::Arc;

use crate::executor::{ExecError, Namespace, Value};

/// Delivers one message to the environment's output sink
pub(crate) type Emit = Arc<dyn Fn(&str) -> Result<(), ExecError> + Send + Sync>;

/// Define `print`, `println` and `printf` in `namespace`
///
/// Each returns the byte length of the emitted message, or the sink's error.
pub(crate) fn install(namespace: &Namespace, emit: Emit) {
    let out = emit.clone();
    namespace.define(
        "print",
        Arc::new(move |args: &[Value]| -> Result<Value, ExecError> {
            let msg = join(args, "");
            out(&msg)?;
            Ok(Value::Int(msg.len() as i64))
        }),
    );

    let out = emit.clone();
    namespace.define(
        "println",
        Arc::new(move |args: &[Value]| -> Result<Value, ExecError> {
            let mut msg = join(args, " ");
            msg.push('\n');
            out(&msg)?;
            Ok(Value::Int(msg.len() as i64))
        }),
    );

    namespace.define(
        "printf",
        Arc::new(move |args: &[Value]| -> Result<Value, ExecError> {
            let (format, rest) = match args.split_first() {
                Some((Value::Str(format), rest)) => (format, rest),
                _ => return Err(ExecError::Runtime("printf: format must be a string".into())),
            };
            let msg = sprintf(format, rest)?;
            emit(&msg)?;
            Ok(Value::Int(msg.len() as i64))
        }),
    );
}

fn join(args: &[Value], sep: &str) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        let _ = write!(out, "{arg}");
    }
    out
}

/// Substitute `%v`, `%s` and `%d` in order; `%%` is a literal percent.
/// Unknown verbs are copied through unchanged and extra arguments are ignored.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> Result<String, ExecError> {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('v' | 's' | 'd')) => {
                let arg = args.next().ok_or_else(|| {
                    ExecError::Runtime(format!("printf: missing argument for %{verb}"))
                })?;
                if verb == 'd' && !matches!(arg, Value::Int(_)) {
                    return Err(ExecError::Runtime(format!(
                        "printf: %d expects an integer, got {arg}"
                    )));
                }
                let _ = write!(out, "{arg}");
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    Ok(out)
}
