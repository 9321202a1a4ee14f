//! Runs scriptorium scripts as child processes
//!
//! Each piece of source text is handed to `<program> <args...> <source>`,
//! `sh -c` by default. Script variables travel as environment variables on the
//! way in and as `::set NAME=VALUE` stdout lines on the way out; every other
//! stdout line is printed through the environment's `println`.
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use scriptorium_host::{CancellationToken, ExecError, Executor, Namespace, Value};
use tracing::{debug, warn};

/// Prefix of a stdout line that assigns a script variable
pub const SET_DIRECTIVE: &str = "::set ";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    poll_interval: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new("sh", ["-c"])
    }
}

impl ProcessExecutor {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How long to wait on the child before checking for cancellation again
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, namespace: &Namespace, source: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        for (name, value) in namespace.vars() {
            if is_env_name(&name) {
                command.env(&name, value.to_string());
            } else {
                debug!(target: "scripting", "Not exporting variable {name:?} to child");
            }
        }
        command
    }

    /// Forward child output until stdout closes, then wait for the exit status
    fn drive(
        &self,
        child: &mut Child,
        lines: &Receiver<std::io::Result<String>>,
        cancel: &CancellationToken,
        namespace: &Namespace,
    ) -> Result<ExitStatus, ExecError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
            match lines.recv_timeout(self.poll_interval) {
                Ok(line) => handle_line(namespace, &line?)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl Executor for ProcessExecutor {
    fn execute(
        &self,
        cancel: &CancellationToken,
        namespace: &Namespace,
        source: &str,
    ) -> Result<Value, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let mut child = self.command(namespace, source).spawn()?;
        debug!(target: "scripting", "Spawned {} (pid {})", self.program, child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Runtime("child stdout was not captured".into()))?;
        let (tx, rx) = mpsc::channel();
        // Detached: a grandchild may hold stdout open after the child is killed
        thread::Builder::new()
            .name("scriptorium-stdout".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        let status = match self.drive(&mut child, &rx, cancel, namespace) {
            Ok(status) => status,
            Err(e) => {
                if let Err(kill_err) = child.kill() {
                    warn!(target: "scripting", "Failed to kill {}: {}", self.program, kill_err);
                }
                // Reap so the child doesn't linger as a zombie
                let _ = child.wait();
                return Err(e);
            }
        };

        match status.code() {
            Some(0) => Ok(Value::Int(0)),
            Some(code) => Err(ExecError::Runtime(format!(
                "{} exited with status {}",
                self.program, code
            ))),
            None => Err(ExecError::Runtime(format!(
                "{} terminated by signal",
                self.program
            ))),
        }
    }
}

fn handle_line(namespace: &Namespace, line: &str) -> Result<(), ExecError> {
    let Some(assignment) = line.strip_prefix(SET_DIRECTIVE) else {
        namespace.call("println", &[Value::from(line)])?;
        return Ok(());
    };

    let (name, value) = assignment
        .split_once('=')
        .ok_or_else(|| ExecError::Runtime(format!("malformed directive: {line}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ExecError::Runtime(format!("malformed directive: {line}")));
    }
    namespace.set(name, Value::from(value));
    Ok(())
}

fn is_env_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}
